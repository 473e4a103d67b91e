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

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::VecDeque;

use windowsketches::dgim::Bucket;
use windowsketches::dgim::DgimSketch;

/// Xorshift-based generator so randomized tests are reproducible across platforms.
#[derive(Debug, Clone, Copy)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn seeded(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Returns true with probability `percent / 100`.
    pub fn next_bit(&mut self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }
}

/// Exact count of 1-bits among the last `size` bits, kept by storing the window.
#[derive(Debug, Clone)]
pub struct ExactWindow {
    bits: VecDeque<bool>,
    size: usize,
    ones: u64,
}

impl ExactWindow {
    pub fn new(size: u64) -> Self {
        Self {
            bits: VecDeque::with_capacity(size as usize + 1),
            size: size as usize,
            ones: 0,
        }
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push_back(bit);
        self.ones += bit as u64;
        if self.bits.len() > self.size {
            let expired = self.bits.pop_front().unwrap();
            self.ones -= expired as u64;
        }
    }

    pub fn count(&self) -> u64 {
        self.ones
    }
}

/// Largest number of distinct bucket sizes a window of `window_size` bits can hold.
pub fn max_size_classes(window_size: u64) -> usize {
    (window_size + 1).ilog2() as usize + 2
}

/// Checks the bucket invariants that must hold after every update.
pub fn assert_invariants(sketch: &DgimSketch) {
    let buckets: Vec<Bucket> = sketch.iter().collect();
    let position = sketch.position();
    let window_size = sketch.window_size();
    assert_eq!(buckets.len(), sketch.num_buckets());

    for bucket in &buckets {
        assert!(bucket.size().is_power_of_two(), "{bucket:?}");
        assert!(bucket.timestamp() < position, "{bucket:?} at {position}");
        assert!(
            position - bucket.timestamp() <= window_size,
            "{bucket:?} outside window {window_size} at {position}"
        );
    }

    for pair in buckets.windows(2) {
        let (newer, older) = (pair[0], pair[1]);
        assert!(newer.timestamp() > older.timestamp(), "{pair:?}");
        assert!(newer.size() <= older.size(), "{pair:?}");
    }

    let mut class_counts: HashMap<u8, usize> = HashMap::new();
    for bucket in &buckets {
        *class_counts.entry(bucket.lg_size()).or_default() += 1;
    }
    for (lg_size, count) in &class_counts {
        assert!(
            *count <= sketch.max_buckets_per_size(),
            "{count} buckets of size 2^{lg_size}"
        );
    }
    assert!(class_counts.len() <= max_size_classes(window_size));

    let total: u64 = buckets.iter().map(|b| b.size()).sum();
    assert_eq!(sketch.upper_bound(), total);
}
