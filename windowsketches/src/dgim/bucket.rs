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

use std::collections::VecDeque;
use std::collections::vec_deque;

/// A run of 1-bits summarized by its size and the position of its most recent 1-bit.
///
/// Sizes are always powers of two and are stored by their base-2 logarithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    lg_size: u8,
    timestamp: u64,
}

impl Bucket {
    pub(super) fn new(lg_size: u8, timestamp: u64) -> Self {
        debug_assert!(lg_size < 64, "bucket size must fit in u64");
        Self { lg_size, timestamp }
    }

    /// Returns the number of 1-bits this bucket represents.
    pub fn size(&self) -> u64 {
        1u64 << self.lg_size
    }

    /// Returns the base-2 logarithm of [`size`](Self::size).
    pub fn lg_size(&self) -> u8 {
        self.lg_size
    }

    /// Returns the stream position of the most recent 1-bit in this bucket.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Bucket sequence ordered from most recent (front) to oldest (back).
///
/// Buckets of one size class are contiguous because sizes never decrease towards the back, so
/// the per-class counts locate any class without scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct BucketStore {
    buckets: VecDeque<Bucket>,
    // Indexed by lg_size; trailing zero entries are trimmed.
    class_counts: Vec<usize>,
    total_size: u64,
}

impl BucketStore {
    pub(super) fn len(&self) -> usize {
        self.buckets.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sum of the sizes of all retained buckets.
    pub(super) fn total_size(&self) -> u64 {
        self.total_size
    }

    pub(super) fn oldest(&self) -> Option<&Bucket> {
        self.buckets.back()
    }

    pub(super) fn iter(&self) -> vec_deque::Iter<'_, Bucket> {
        self.buckets.iter()
    }

    pub(super) fn class_count(&self, lg_size: u8) -> usize {
        self.class_counts
            .get(lg_size as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct size classes spanned, counting empty classes below the largest.
    #[cfg(test)]
    fn num_classes(&self) -> usize {
        self.class_counts.len()
    }

    /// Inserts a size-1 bucket at the most recent end.
    pub(super) fn push_newest(&mut self, timestamp: u64) {
        debug_assert!(
            self.buckets.front().is_none_or(|b| b.timestamp < timestamp),
            "timestamps must strictly increase"
        );
        self.buckets.push_front(Bucket::new(0, timestamp));
        self.bump_class(0);
        self.total_size += 1;
    }

    /// Appends a bucket at the oldest end. Callers are responsible for ordering.
    pub(super) fn push_oldest(&mut self, bucket: Bucket) {
        self.buckets.push_back(bucket);
        self.bump_class(bucket.lg_size);
        self.total_size += bucket.size();
    }

    /// Replaces the two oldest buckets of class `lg_size` with one bucket of the next class.
    ///
    /// The merged bucket keeps the newer of the two timestamps. It lands exactly where the newer
    /// bucket was, which is after the remaining buckets of `lg_size` and ahead of every older
    /// bucket of the next class, so the sequence stays ordered by both timestamp and size.
    pub(super) fn merge_oldest_pair(&mut self, lg_size: u8) -> Bucket {
        let class = lg_size as usize;
        let count = self.class_count(lg_size);
        assert!(count >= 2, "merging requires two buckets of size 2^{lg_size}");
        assert!(lg_size < 63, "bucket size overflow");

        let start: usize = self.class_counts[..class].iter().sum();
        let older = start + count - 1;
        let newer = older - 1;

        let merged = Bucket::new(lg_size + 1, self.buckets[newer].timestamp);
        self.buckets[newer] = merged;
        self.buckets.remove(older);

        self.class_counts[class] -= 2;
        self.bump_class(lg_size + 1);
        merged
    }

    /// Removes every bucket from the oldest end whose timestamp is at or before `cutoff`.
    ///
    /// Returns the number of removed buckets.
    pub(super) fn evict_through(&mut self, cutoff: u64) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.buckets.back().copied() {
            if oldest.timestamp > cutoff {
                break;
            }
            self.buckets.pop_back();
            self.class_counts[oldest.lg_size as usize] -= 1;
            self.total_size -= oldest.size();
            evicted += 1;
        }
        if evicted > 0 {
            self.trim_classes();
        }
        evicted
    }

    pub(super) fn clear(&mut self) {
        self.buckets.clear();
        self.class_counts.clear();
        self.total_size = 0;
    }

    fn bump_class(&mut self, lg_size: u8) {
        let class = lg_size as usize;
        if self.class_counts.len() <= class {
            self.class_counts.resize(class + 1, 0);
        }
        self.class_counts[class] += 1;
    }

    fn trim_classes(&mut self) {
        while self.class_counts.last() == Some(&0) {
            self.class_counts.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(buckets: &[(u8, u64)]) -> BucketStore {
        let mut store = BucketStore::default();
        for &(lg_size, timestamp) in buckets {
            store.push_oldest(Bucket::new(lg_size, timestamp));
        }
        store
    }

    fn snapshot(store: &BucketStore) -> Vec<(u64, u64)> {
        store.iter().map(|b| (b.size(), b.timestamp())).collect()
    }

    #[test]
    fn test_bucket_size() {
        assert_eq!(Bucket::new(0, 3).size(), 1);
        assert_eq!(Bucket::new(5, 3).size(), 32);
        assert_eq!(Bucket::new(63, 3).size(), 1 << 63);
    }

    #[test]
    fn test_push_newest_tracks_totals() {
        let mut store = BucketStore::default();
        assert!(store.is_empty());
        store.push_newest(0);
        store.push_newest(4);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_size(), 2);
        assert_eq!(store.class_count(0), 2);
        assert_eq!(store.class_count(1), 0);
        assert_eq!(store.oldest().map(|b| b.timestamp()), Some(0));
    }

    #[test]
    fn test_merge_places_bucket_between_classes() {
        // newest first: three ones, then two twos
        let mut store = store_of(&[(0, 9), (0, 8), (0, 6), (1, 5), (1, 2)]);
        let merged = store.merge_oldest_pair(0);
        assert_eq!(merged.size(), 2);
        assert_eq!(merged.timestamp(), 8);
        assert_eq!(snapshot(&store), vec![(1, 9), (2, 8), (2, 5), (2, 2)]);
        assert_eq!(store.class_count(0), 1);
        assert_eq!(store.class_count(1), 3);
        assert_eq!(store.total_size(), 7);
    }

    #[test]
    fn test_merge_into_new_class() {
        let mut store = store_of(&[(1, 7), (1, 3)]);
        store.merge_oldest_pair(1);
        assert_eq!(snapshot(&store), vec![(4, 7)]);
        assert_eq!(store.num_classes(), 3);
        assert_eq!(store.class_count(1), 0);
        assert_eq!(store.class_count(2), 1);
    }

    #[test]
    #[should_panic(expected = "merging requires two buckets")]
    fn test_merge_requires_pair() {
        let mut store = store_of(&[(0, 1)]);
        store.merge_oldest_pair(0);
    }

    #[test]
    fn test_evict_through_cutoff() {
        let mut store = store_of(&[(0, 9), (1, 7), (2, 4), (2, 3)]);
        assert_eq!(store.evict_through(2), 0);
        assert_eq!(store.evict_through(4), 2);
        assert_eq!(snapshot(&store), vec![(1, 9), (2, 7)]);
        assert_eq!(store.num_classes(), 2);
        assert_eq!(store.total_size(), 3);

        assert_eq!(store.evict_through(100), 2);
        assert!(store.is_empty());
        assert_eq!(store.num_classes(), 0);
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn test_clear() {
        let mut store = store_of(&[(0, 2), (3, 1)]);
        store.clear();
        assert_eq!(store, BucketStore::default());
    }
}
