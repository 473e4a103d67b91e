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

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::assert::ensure_serial_version_is;
use crate::codec::family::Family;
use crate::dgim::DgimSketch;
use crate::dgim::bucket::Bucket;
use crate::dgim::bucket::BucketStore;
use crate::dgim::sketch::ensure_error_rate;
use crate::dgim::sketch::error_rate_for_max_buckets;
use crate::dgim::sketch::max_buckets_for_error_rate;
use crate::error::Error;

const PREAMBLE_LONGS_EMPTY: u8 = 4;
const PREAMBLE_LONGS_NON_EMPTY: u8 = 5;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 2;
const BUCKET_SIZE_BYTES: usize = 9;
const MAX_LG_SIZE: u8 = 62;

pub(super) struct DecodedSketch {
    pub(super) window_size: u64,
    pub(super) error_rate: f64,
    pub(super) max_buckets_per_size: usize,
    pub(super) position: u64,
    pub(super) store: BucketStore,
}

pub(super) fn serialize(sketch: &DgimSketch) -> Vec<u8> {
    let is_empty = sketch.is_empty();
    let preamble_longs = if is_empty {
        PREAMBLE_LONGS_EMPTY
    } else {
        PREAMBLE_LONGS_NON_EMPTY
    };
    let size_bytes = preamble_longs as usize * 8 + sketch.num_buckets() * BUCKET_SIZE_BYTES;

    let mut bytes = SketchBytes::with_capacity(size_bytes);
    bytes.write_u8(preamble_longs);
    bytes.write_u8(SERIAL_VERSION);
    bytes.write_u8(Family::DGIM.id);
    bytes.write_u8(if is_empty { FLAGS_IS_EMPTY } else { 0 });
    // bounded by MAX_BUCKETS_PER_SIZE at construction
    bytes.write_u32_le(sketch.max_buckets_per_size() as u32);
    bytes.write_u64_le(sketch.window_size());
    bytes.write_f64_le(sketch.error_rate());
    bytes.write_u64_le(sketch.position());

    if is_empty {
        return bytes.into_bytes();
    }

    bytes.write_u64_le(sketch.num_buckets() as u64);
    for bucket in sketch.iter() {
        bytes.write_u64_le(bucket.timestamp());
        bytes.write_u8(bucket.lg_size());
    }
    bytes.into_bytes()
}

pub(super) fn deserialize(bytes: &[u8]) -> Result<DecodedSketch, Error> {
    fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
        move |err| Error::insufficient_data(tag).set_source(err)
    }

    let mut cursor = SketchSlice::new(bytes);
    let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
    let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
    let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
    let flags = cursor.read_u8().map_err(make_error("flags"))?;
    let max_buckets_per_size = cursor
        .read_u32_le()
        .map_err(make_error("max_buckets_per_size"))?;

    Family::DGIM.validate_id(family_id)?;
    ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
    Family::DGIM.validate_pre_longs(preamble_longs)?;

    let is_empty = (flags & FLAGS_IS_EMPTY) != 0;
    let expected_preamble = if is_empty {
        PREAMBLE_LONGS_EMPTY
    } else {
        PREAMBLE_LONGS_NON_EMPTY
    };
    if preamble_longs != expected_preamble {
        return Err(Error::deserial("preamble longs do not match the empty flag")
            .with_context("preamble_longs", preamble_longs)
            .with_context("flags", flags));
    }
    if max_buckets_per_size == 0 {
        return Err(Error::invalid_config("max buckets per size must be positive"));
    }

    let window_size = cursor.read_u64_le().map_err(make_error("window_size"))?;
    let error_rate = cursor.read_f64_le().map_err(make_error("error_rate"))?;
    let position = cursor.read_u64_le().map_err(make_error("position"))?;
    if window_size == 0 {
        return Err(Error::invalid_config("window size must be positive"));
    }
    ensure_error_rate(error_rate)?;
    let max_buckets_per_size = max_buckets_per_size as usize;
    if max_buckets_for_error_rate(error_rate) != max_buckets_per_size
        && error_rate_for_max_buckets(max_buckets_per_size) != error_rate
    {
        return Err(
            Error::deserial("error rate does not match max buckets per size")
                .with_context("error_rate", error_rate)
                .with_context("max_buckets_per_size", max_buckets_per_size),
        );
    }

    let mut decoded = DecodedSketch {
        window_size,
        error_rate,
        max_buckets_per_size,
        position,
        store: BucketStore::default(),
    };
    if is_empty {
        ensure_consumed(&cursor)?;
        return Ok(decoded);
    }

    let num_buckets = cursor.read_u64_le().map_err(make_error("num_buckets"))?;
    if num_buckets == 0 {
        return Err(Error::deserial("non-empty sketch without buckets"));
    }
    let expected_bytes = (num_buckets as u128) * BUCKET_SIZE_BYTES as u128;
    if expected_bytes != cursor.remaining() as u128 {
        return Err(Error::deserial("bucket section length mismatch")
            .with_context("num_buckets", num_buckets)
            .with_context("remaining_bytes", cursor.remaining()));
    }

    let mut previous: Option<Bucket> = None;
    for index in 0..num_buckets {
        let timestamp = cursor.read_u64_le().map_err(make_error("bucket_timestamp"))?;
        let lg_size = cursor.read_u8().map_err(make_error("bucket_lg_size"))?;
        let bucket = decode_bucket(&decoded, previous, timestamp, lg_size)
            .map_err(|err| err.with_context("bucket_index", index))?;
        if decoded.store.total_size().checked_add(bucket.size()).is_none() {
            return Err(Error::deserial("bucket sizes overflow the total count")
                .with_context("bucket_index", index)
                .with_context("lg_size", lg_size));
        }
        decoded.store.push_oldest(bucket);
        if decoded.store.class_count(lg_size) > decoded.max_buckets_per_size {
            return Err(Error::deserial("too many buckets of one size")
                .with_context("bucket_index", index)
                .with_context("lg_size", lg_size));
        }
        previous = Some(bucket);
    }

    Ok(decoded)
}

fn decode_bucket(
    decoded: &DecodedSketch,
    previous: Option<Bucket>,
    timestamp: u64,
    lg_size: u8,
) -> Result<Bucket, Error> {
    if lg_size > MAX_LG_SIZE {
        return Err(Error::deserial(format!(
            "bucket size 2^{lg_size} exceeds 2^{MAX_LG_SIZE}"
        )));
    }
    if timestamp >= decoded.position {
        return Err(Error::deserial("bucket timestamp is not before the stream position")
            .with_context("timestamp", timestamp)
            .with_context("position", decoded.position));
    }
    // the newest bit sits at position - 1
    if decoded.position - 1 - timestamp >= decoded.window_size {
        return Err(Error::deserial("bucket lies outside the window")
            .with_context("timestamp", timestamp)
            .with_context("position", decoded.position));
    }
    if let Some(previous) = previous {
        if timestamp >= previous.timestamp() {
            return Err(Error::deserial("bucket timestamps must strictly decrease"));
        }
        if lg_size < previous.lg_size() {
            return Err(Error::deserial("bucket sizes must not decrease towards the oldest"));
        }
    }
    Ok(Bucket::new(lg_size, timestamp))
}

fn ensure_consumed(cursor: &SketchSlice<'_>) -> Result<(), Error> {
    match cursor.remaining() {
        0 => Ok(()),
        remaining => Err(Error::deserial("trailing bytes after sketch")
            .with_context("remaining_bytes", remaining)),
    }
}
