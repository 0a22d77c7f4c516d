//! Bucket boundary arithmetic.
//!
//! All times are Unix seconds. A bucket is the half-open range
//! `[start, start + interval)`. The first start is aligned with an offset;
//! every later start is reached by adding `interval` so boundaries never drift.

use crate::config::RotationSettings;

/// How the first bucket boundary is aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOffset {
    /// Non-negative shift of the boundary past the natural multiple of the
    /// interval.
    Seconds(i64),
    /// Signed distance of the wall clock from UTC (`+09:00` is `32400`).
    /// Boundaries land on multiples of the interval in that local time.
    Utc(i64),
}

impl BucketOffset {
    /// A non-zero UTC offset wins over the second offset.
    pub fn from_parts(offset_secs: i64, utc_offset_secs: i64) -> Self {
        if utc_offset_secs != 0 {
            BucketOffset::Utc(utc_offset_secs)
        } else {
            BucketOffset::Seconds(offset_secs)
        }
    }
}

/// Returns true if `ts` falls past the bucket starting at `last_start`.
/// Always false when rotation is disabled (`interval == 0`).
pub fn should_rotate(ts: i64, last_start: i64, interval: i64) -> bool {
    interval > 0 && ts.saturating_sub(last_start) >= interval
}

/// Start of the bucket containing `ts`.
///
/// Only used to establish the first bucket of a session; the offset cannot be
/// applied incrementally because the natural origin is not necessarily 0.
/// Offsets of any size are reduced modulo the interval first, so the cost
/// does not depend on them.
pub fn first_bucket_start(ts: i64, interval: i64, offset: BucketOffset) -> i64 {
    if interval <= 0 {
        return ts;
    }

    // Boundaries satisfy `start = offset (mod interval)` for the second form
    // and `start + utc_offset = 0 (mod interval)` for the UTC form.
    let phase = match offset {
        BucketOffset::Seconds(offset) => i128::from(ts) - i128::from(offset),
        BucketOffset::Utc(utc_offset) => i128::from(ts) + i128::from(utc_offset),
    }
    .rem_euclid(i128::from(interval));

    // phase < interval, so it fits in i64.
    ts.saturating_sub(phase as i64)
}

/// Next bucket start after `last_start` that contains `ts`. Always at least
/// one interval past `last_start`; a single idle gap spanning several
/// intervals yields one rotation.
pub fn next_bucket_start(last_start: i64, ts: i64, interval: i64) -> i64 {
    if interval <= 0 {
        return last_start;
    }
    let steps = (ts.saturating_sub(last_start) / interval).max(1);
    last_start.saturating_add(steps.saturating_mul(interval))
}

/// Rotation parameters taken from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    interval: i64,
    offset: BucketOffset,
}

impl RotationSchedule {
    pub fn new(interval: i64, offset: BucketOffset) -> Self {
        Self { interval, offset }
    }

    pub fn from_settings(settings: &RotationSettings) -> Self {
        Self::new(
            settings.interval,
            BucketOffset::from_parts(settings.offset, settings.utc_offset.seconds()),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.interval > 0
    }

    pub fn should_rotate(&self, ts: i64, last_start: i64) -> bool {
        should_rotate(ts, last_start, self.interval)
    }

    pub fn first_bucket_start(&self, ts: i64) -> i64 {
        first_bucket_start(ts, self.interval, self.offset)
    }

    pub fn next_bucket_start(&self, last_start: i64, ts: i64) -> i64 {
        next_bucket_start(last_start, ts, self.interval)
    }
}
