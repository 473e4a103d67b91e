// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Tracks a histogram of 1–10 ratings over the most recent records of a stream with one DGIM
//! sketch per rating, and prints it next to the exact histogram.
//!
//! ```shell
//! cargo run -p demos --bin rating_window -- --window-size 1024 --error-rate 0.1
//! ```

use std::collections::VecDeque;

use clap::Parser;
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;
use windowsketches::dgim::DgimSketch;
use windowsketches::error::Error;
use windowsketches::error::ErrorKind;

const NUM_RATINGS: usize = 10;

// Review ratings cluster at the extremes, with 10 by far the most common.
const RATING_WEIGHTS: [u32; NUM_RATINGS] = [13, 4, 4, 3, 5, 4, 6, 12, 17, 32];

#[derive(Parser, Debug)]
#[command(author, version, about = "Sliding-window rating histogram with DGIM sketches")]
struct Args {
    /// Number of most recent records the histogram covers.
    #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u64).range(16..))]
    window_size: u64,

    /// Target relative error of each per-rating count, in (0, 1).
    #[arg(long, default_value_t = 0.5, value_parser = parse_error_rate)]
    error_rate: f64,

    /// Number of synthetic records to stream.
    #[arg(long, default_value_t = 20_000)]
    records: u64,

    /// Seed of the record generator.
    #[arg(long, default_value_t = 9001)]
    seed: u64,
}

fn parse_error_rate(value: &str) -> Result<f64, String> {
    let error_rate: f64 = value.parse().map_err(|err| format!("{err}"))?;
    if error_rate > 0.0 && error_rate < 1.0 {
        Ok(error_rate)
    } else {
        Err(format!("error rate must be in (0, 1), got {error_rate}"))
    }
}

/// Exact rating histogram over the last `window_size` records.
struct ExactHistogram {
    window: VecDeque<usize>,
    window_size: usize,
    counts: [u64; NUM_RATINGS],
}

impl ExactHistogram {
    fn new(window_size: u64) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size as usize + 1),
            window_size: window_size as usize,
            counts: [0; NUM_RATINGS],
        }
    }

    fn push(&mut self, rating: usize) {
        self.window.push_back(rating);
        self.counts[rating] += 1;
        if self.window.len() > self.window_size {
            if let Some(expired) = self.window.pop_front() {
                self.counts[expired] -= 1;
            }
        }
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(
        window_size = args.window_size,
        error_rate = args.error_rate,
        records = args.records,
        seed = args.seed,
        "streaming synthetic ratings"
    );

    let mut sketches = (0..NUM_RATINGS)
        .map(|_| DgimSketch::new(args.window_size, args.error_rate))
        .collect::<Result<Vec<_>, _>>()?;
    let mut exact = ExactHistogram::new(args.window_size);

    let ratings = WeightedIndex::new(RATING_WEIGHTS).map_err(|err| {
        Error::new(ErrorKind::InvalidConfig, "invalid rating weights").set_source(err)
    })?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    for _ in 0..args.records {
        let rating = ratings.sample(&mut rng);
        // one-hot: sketch k sees a 1 exactly when the record is rated k + 1
        for (k, sketch) in sketches.iter_mut().enumerate() {
            sketch.update(k == rating);
        }
        exact.push(rating);
    }

    let retained: usize = sketches.iter().map(DgimSketch::num_buckets).sum();
    tracing::info!(
        retained_buckets = retained,
        max_relative_error = sketches[0].max_relative_error(),
        "finished streaming"
    );

    println!("{:>6} {:>8} {:>8} {:>8} {:>8}", "rating", "actual", "dgim", "lower", "upper");
    for (k, sketch) in sketches.iter().enumerate() {
        println!(
            "{:>6} {:>8} {:>8} {:>8} {:>8}",
            k + 1,
            exact.counts[k],
            sketch.get_count(),
            sketch.lower_bound(),
            sketch.upper_bound()
        );
    }

    Ok(())
}
