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

//! DGIM sketch for counting 1-bits over a sliding window of a bit stream.
//!
//! The sketch answers "how many of the last `N` bits were 1?" without storing the window.
//! It keeps a sequence of buckets, each summarizing a power-of-two number of 1-bits together
//! with the position of the most recent of them. At most `r = ceil(1 / (2 * error_rate))`
//! buckets of each size are retained: when a size overflows, its two oldest buckets merge
//! into one bucket of twice the size, which may in turn overflow the next size. Buckets
//! whose most recent 1-bit has left the window are dropped, so the sketch holds
//! `O(r * log(N))` buckets regardless of stream length.
//!
//! The count is the total size of all buckets except the oldest, which only contributes half
//! its size. [`DgimSketch::lower_bound`] and [`DgimSketch::upper_bound`] bracket the exact
//! count, and [`DgimSketch::max_relative_error`] reports the worst-case relative error the
//! configured `r` guarantees.
//!
//! Each sketch tracks a single stream. Counting several signals, for example one per
//! category of a one-hot encoded record, takes one sketch per signal.
//!
//! # References
//!
//! - Mayur Datar, Aristides Gionis, Piotr Indyk, Rajeev Motwani, "Maintaining Stream
//!   Statistics over Sliding Windows", SIAM Journal on Computing, 2002.
//!
//! # Usage
//!
//! ```rust
//! # use windowsketches::dgim::DgimSketch;
//! let mut sketch = DgimSketch::new(8, 0.5).unwrap();
//! for bit in [true, false, true, true, false, false, true, false] {
//!     sketch.update(bit);
//! }
//! let count = sketch.get_count();
//! assert!((2..=6).contains(&count));
//! assert!(sketch.lower_bound() <= 4 && 4 <= sketch.upper_bound());
//! ```
//!
//! # Serialization
//!
//! ```rust
//! # use windowsketches::dgim::DgimSketch;
//! let mut sketch = DgimSketch::new(1024, 0.1).unwrap();
//! for i in 0..4096u32 {
//!     sketch.update(i % 3 == 0);
//! }
//! let bytes = sketch.serialize();
//! let restored = DgimSketch::deserialize(&bytes).unwrap();
//! assert_eq!(restored.get_count(), sketch.get_count());
//! ```

mod bucket;
mod serialization;
mod sketch;

pub use self::bucket::Bucket;
pub use self::sketch::BucketIter;
pub use self::sketch::DgimSketch;
pub use self::sketch::MAX_BUCKETS_PER_SIZE;
