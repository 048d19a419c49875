//! ==============================================================================
//! aggregate.rs - fixed-width time bucketing
//! ==============================================================================
//!
//! purpose:
//!     groups measurements into `[start, start + width)` buckets and sums
//!     their counts. bucket boundaries are anchored to the unix epoch, not to
//!     the query range, so two calls over different ranges of the same data
//!     produce comparable buckets.
//!
//! policy:
//!     - empty buckets are omitted, never zero-filled
//!     - output is ordered by bucket start, whatever the input order
//!     - a measurement exactly on a boundary opens the next bucket
//!
//! relationships:
//!     - used by: server.rs (hourly summary endpoint)
//!     - used by: chart.rs (dashboard series)
//!
//! ==============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Bucket, Measurement, SubjectBucket, TimeRange};
use crate::error::AggregateError;

/// sum counts per bucket for a single-subject series
pub fn aggregate<'a, I>(
    measurements: I,
    width: Duration,
    range: Option<TimeRange>,
) -> Result<Vec<Bucket>, AggregateError>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let width_ms = width_millis(width)?;
    let mut totals: BTreeMap<i64, u64> = BTreeMap::new();

    for m in in_range(measurements, range) {
        let start = bucket_start_millis(m.observed_at, width_ms);
        let total = totals.entry(start).or_insert(0);
        *total = total.saturating_add(m.count);
    }

    totals
        .into_iter()
        .map(|(start, total)| make_bucket(start, width_ms, total))
        .collect()
}

/// sum counts per `(subject, bucket)`, ordered by start then subject
pub fn aggregate_by_subject<'a, I>(
    measurements: I,
    width: Duration,
    range: Option<TimeRange>,
) -> Result<Vec<SubjectBucket>, AggregateError>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let width_ms = width_millis(width)?;
    let mut totals: BTreeMap<(i64, &'a str), u64> = BTreeMap::new();

    for m in in_range(measurements, range) {
        let start = bucket_start_millis(m.observed_at, width_ms);
        let total = totals.entry((start, m.subject_id.as_str())).or_insert(0);
        *total = total.saturating_add(m.count);
    }

    totals
        .into_iter()
        .map(|((start, subject), total)| {
            Ok(SubjectBucket {
                subject_id: subject.to_string(),
                bucket: make_bucket(start, width_ms, total)?,
            })
        })
        .collect()
}

/// floor `t` onto the epoch-anchored grid of `width`
pub fn bucket_start(t: DateTime<Utc>, width: Duration) -> Result<DateTime<Utc>, AggregateError> {
    let width_ms = width_millis(width)?;
    from_millis(bucket_start_millis(t, width_ms))
}

fn in_range<'a, I>(measurements: I, range: Option<TimeRange>) -> impl Iterator<Item = &'a Measurement>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    measurements
        .into_iter()
        .filter(move |m| range.map_or(true, |r| r.contains(m.observed_at)))
}

fn width_millis(width: Duration) -> Result<i64, AggregateError> {
    let ms = width.num_milliseconds();
    if ms <= 0 {
        return Err(AggregateError::InvalidArgument(format!(
            "bucket width must be positive, got {}ms",
            ms
        )));
    }
    Ok(ms)
}

// div_euclid keeps pre-epoch timestamps flooring downwards
fn bucket_start_millis(t: DateTime<Utc>, width_ms: i64) -> i64 {
    t.timestamp_millis().div_euclid(width_ms) * width_ms
}

fn make_bucket(start_ms: i64, width_ms: i64, total: u64) -> Result<Bucket, AggregateError> {
    let start = from_millis(start_ms)?;
    let end = from_millis(start_ms.saturating_add(width_ms))?;
    Ok(Bucket { start, end, total })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, AggregateError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AggregateError::InvalidArgument(format!("timestamp {}ms out of range", ms)))
}
