//! dashboard chart series: fixed look-back ranges, each with its own bucket width.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate;
use crate::domain::{Measurement, TimeRange};
use crate::error::AggregateError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    LastSixHours,
    #[default]
    #[serde(rename = "1d")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
}

impl ChartRange {
    pub fn label(&self) -> &'static str {
        match self {
            ChartRange::LastHour => "Last hour",
            ChartRange::LastSixHours => "Last 6 hours",
            ChartRange::LastDay => "Last day",
            ChartRange::LastWeek => "Last 7 days",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            ChartRange::LastHour => Duration::hours(1),
            ChartRange::LastSixHours => Duration::hours(6),
            ChartRange::LastDay => Duration::days(1),
            ChartRange::LastWeek => Duration::days(7),
        }
    }

    pub fn bucket_width(&self) -> Duration {
        match self {
            ChartRange::LastHour => Duration::minutes(5),
            ChartRange::LastSixHours => Duration::minutes(15),
            ChartRange::LastDay => Duration::hours(1),
            ChartRange::LastWeek => Duration::days(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub x: DateTime<Utc>,
    pub y: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub range: ChartRange,
    pub label: &'static str,
    pub bucket_ms: i64,
    pub points: Vec<ChartPoint>,
    pub total_steps: u64,
    pub average_per_bucket: u64,
}

/// bucket everything observed in `[now - range, now]` for plotting
pub fn chart_series(
    measurements: &[Measurement],
    range: ChartRange,
    now: DateTime<Utc>,
) -> Result<ChartSeries, AggregateError> {
    let window = TimeRange {
        from: Some(now - range.duration()),
        to: None,
    };
    let buckets = aggregate(
        measurements.iter().filter(|m| m.observed_at <= now),
        range.bucket_width(),
        Some(window),
    )?;

    let points: Vec<ChartPoint> = buckets
        .iter()
        .map(|b| ChartPoint { x: b.start, y: b.total })
        .collect();
    let total_steps = points.iter().fold(0u64, |acc, p| acc.saturating_add(p.y));
    let average_per_bucket = match points.len() as u64 {
        0 => 0,
        // rounded mean
        len => total_steps.saturating_add(len / 2) / len,
    };

    Ok(ChartSeries {
        range,
        label: range.label(),
        bucket_ms: range.bucket_width().num_milliseconds(),
        points,
        total_steps,
        average_per_bucket,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_range_uses_five_minute_buckets() {
        let now = DateTime::from_timestamp(10 * 3600, 0).unwrap();
        let data = vec![
            Measurement::new("default", 10, now - Duration::minutes(2)),
            Measurement::new("default", 5, now - Duration::minutes(3)),
            Measurement::new("default", 7, now - Duration::minutes(12)),
            // outside the hour
            Measurement::new("default", 100, now - Duration::hours(2)),
        ];

        let series = chart_series(&data, ChartRange::LastHour, now).unwrap();
        assert_eq!(series.bucket_ms, 5 * 60 * 1000);
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].y, 7);
        assert_eq!(series.points[1].y, 15);
        assert_eq!(series.total_steps, 22);
        assert_eq!(series.average_per_bucket, 11);
    }

    #[test]
    fn huge_counts_saturate_instead_of_wrapping() {
        let now = DateTime::from_timestamp(10 * 3600, 0).unwrap();
        let big = u64::MAX / 2 + 10;
        let data = vec![
            Measurement::new("default", big, now - Duration::minutes(2)),
            Measurement::new("default", big, now - Duration::minutes(20)),
        ];

        let series = chart_series(&data, ChartRange::LastHour, now).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.total_steps, u64::MAX);
        assert_eq!(series.average_per_bucket, u64::MAX / 2);
    }

    #[test]
    fn empty_series_averages_to_zero() {
        let series = chart_series(&[], ChartRange::LastWeek, Utc::now()).unwrap();
        assert!(series.points.is_empty());
        assert_eq!(series.average_per_bucket, 0);
    }
}
