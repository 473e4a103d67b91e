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

use std::collections::vec_deque;

use crate::dgim::bucket::Bucket;
use crate::dgim::bucket::BucketStore;
use crate::dgim::serialization;
use crate::error::Error;

/// Largest supported number of buckets per size class; the serialized form stores it as a `u32`.
pub const MAX_BUCKETS_PER_SIZE: usize = u32::MAX as usize;

/// DGIM sketch counting the 1-bits among the last `window_size` bits of a stream.
///
/// See the [module documentation](super) for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct DgimSketch {
    window_size: u64,
    error_rate: f64,
    max_buckets_per_size: usize,
    position: u64,
    store: BucketStore,
}

impl DgimSketch {
    /// Creates a sketch over the last `window_size` bits with the given target relative error.
    ///
    /// The number of buckets kept per size class is `ceil(1 / (2 * error_rate))`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](crate::error::ErrorKind::InvalidConfig) if
    /// `window_size` is zero, `error_rate` is not in `(0, 1)`, or `error_rate` is so small that
    /// more than [`MAX_BUCKETS_PER_SIZE`] buckets per size would be needed.
    pub fn new(window_size: u64, error_rate: f64) -> Result<Self, Error> {
        ensure_error_rate(error_rate)?;
        Self::with_config(
            window_size,
            error_rate,
            max_buckets_for_error_rate(error_rate),
        )
    }

    /// Creates a sketch keeping at most `max_buckets_per_size` buckets of each size.
    ///
    /// The reported [`error_rate`](Self::error_rate) is `1 / (2 * max_buckets_per_size)`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](crate::error::ErrorKind::InvalidConfig) if
    /// `window_size` or `max_buckets_per_size` is zero, or if `max_buckets_per_size` exceeds
    /// [`MAX_BUCKETS_PER_SIZE`].
    pub fn with_max_buckets_per_size(
        window_size: u64,
        max_buckets_per_size: usize,
    ) -> Result<Self, Error> {
        if max_buckets_per_size == 0 {
            return Err(
                Error::invalid_config("max buckets per size must be positive")
                    .with_context("max_buckets_per_size", max_buckets_per_size),
            );
        }
        let error_rate = error_rate_for_max_buckets(max_buckets_per_size);
        Self::with_config(window_size, error_rate, max_buckets_per_size)
    }

    fn with_config(
        window_size: u64,
        error_rate: f64,
        max_buckets_per_size: usize,
    ) -> Result<Self, Error> {
        if window_size == 0 {
            return Err(Error::invalid_config("window size must be positive")
                .with_context("window_size", window_size));
        }
        ensure_error_rate(error_rate)?;
        debug_assert!(max_buckets_per_size > 0);
        if max_buckets_per_size > MAX_BUCKETS_PER_SIZE {
            return Err(
                Error::invalid_config("max buckets per size is too large")
                    .with_context("max_buckets_per_size", max_buckets_per_size),
            );
        }

        tracing::debug!(
            window_size,
            error_rate,
            max_buckets_per_size,
            "created DGIM sketch"
        );
        Ok(Self {
            window_size,
            error_rate,
            max_buckets_per_size,
            position: 0,
            store: BucketStore::default(),
        })
    }

    /// Deserializes a sketch from bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let decoded = serialization::deserialize(bytes)?;
        let mut sketch = Self::with_config(
            decoded.window_size,
            decoded.error_rate,
            decoded.max_buckets_per_size,
        )?;
        sketch.position = decoded.position;
        sketch.store = decoded.store;
        Ok(sketch)
    }

    /// Serializes the sketch to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        serialization::serialize(self)
    }

    /// Returns the number of most recent bits the count covers.
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Returns the configured target relative error.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Returns the maximum number of buckets kept for each size.
    pub fn max_buckets_per_size(&self) -> usize {
        self.max_buckets_per_size
    }

    /// Returns the number of bits observed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the number of retained buckets.
    pub fn num_buckets(&self) -> usize {
        self.store.len()
    }

    /// Returns true if no 1-bit lies in the current window.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Observes the next bit of the stream.
    pub fn update(&mut self, bit: bool) {
        let position = self.position;
        self.position += 1;

        if bit {
            self.store.push_newest(position);
            self.merge_overflowing_classes();
        }
        self.evict_expired(position);
    }

    /// Returns the estimated number of 1-bits among the last `window_size` bits.
    ///
    /// Every bucket counts fully except the oldest, which counts for half its size because only
    /// its most recent 1-bit is known to lie in the window.
    ///
    /// The oldest bucket contributes `size - size / 2` rather than `size / 2`. The two agree for
    /// every size above one, but a lone oldest bucket of size one counts as one instead of zero,
    /// since its single 1-bit is the one known to be inside the window.
    pub fn get_count(&self) -> u64 {
        match self.store.oldest() {
            None => 0,
            Some(oldest) => self.store.total_size() - oldest.size() / 2,
        }
    }

    /// Returns the smallest count consistent with the retained buckets.
    pub fn lower_bound(&self) -> u64 {
        match self.store.oldest() {
            None => 0,
            Some(oldest) => self.store.total_size() - oldest.size() + 1,
        }
    }

    /// Returns the largest count consistent with the retained buckets.
    pub fn upper_bound(&self) -> u64 {
        self.store.total_size()
    }

    /// Returns the worst-case relative error of [`get_count`](Self::get_count).
    ///
    /// Every size class below the oldest bucket's holds at least `r - 1` buckets, where `r` is
    /// [`max_buckets_per_size`](Self::max_buckets_per_size). That bounds overestimates by
    /// `1 / (2 * (r - 1))` and underestimates by `1 / (r + 1)`. With `r == 1` the lower classes
    /// may be empty and no relative bound exists, so this returns infinity.
    pub fn max_relative_error(&self) -> f64 {
        if self.max_buckets_per_size < 2 {
            return f64::INFINITY;
        }
        let r = self.max_buckets_per_size as f64;
        (1.0 / (2.0 * (r - 1.0))).max(1.0 / (r + 1.0))
    }

    /// Returns an iterator over retained buckets, most recent first.
    pub fn iter(&self) -> BucketIter<'_> {
        BucketIter {
            inner: self.store.iter(),
        }
    }

    /// Resets the sketch to an empty state, keeping its configuration.
    pub fn reset(&mut self) {
        self.store.clear();
        self.position = 0;
    }

    fn merge_overflowing_classes(&mut self) {
        let mut lg_size = 0u8;
        while self.store.class_count(lg_size) > self.max_buckets_per_size {
            self.store.merge_oldest_pair(lg_size);
            lg_size += 1;
        }
    }

    fn evict_expired(&mut self, position: u64) {
        let Some(cutoff) = position.checked_sub(self.window_size) else {
            return;
        };
        let evicted = self.store.evict_through(cutoff);
        if evicted > 0 {
            tracing::trace!(position, cutoff, evicted, "evicted expired DGIM buckets");
        }
    }
}

/// Iterator over retained buckets, most recent first.
pub struct BucketIter<'a> {
    inner: vec_deque::Iter<'a, Bucket>,
}

impl Iterator for BucketIter<'_> {
    type Item = Bucket;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().copied()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for BucketIter<'_> {}

impl<'a> IntoIterator for &'a DgimSketch {
    type Item = Bucket;
    type IntoIter = BucketIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(super) fn ensure_error_rate(error_rate: f64) -> Result<(), Error> {
    // written to reject NaN
    if error_rate > 0.0 && error_rate < 1.0 {
        Ok(())
    } else {
        Err(Error::invalid_config("error rate must be in (0, 1)")
            .with_context("error_rate", error_rate))
    }
}

pub(super) fn max_buckets_for_error_rate(error_rate: f64) -> usize {
    // saturates for vanishingly small error rates
    (1.0 / (2.0 * error_rate)).ceil() as usize
}

pub(super) fn error_rate_for_max_buckets(max_buckets_per_size: usize) -> f64 {
    1.0 / (2.0 * max_buckets_per_size as f64)
}
