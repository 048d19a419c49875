use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// subject identifier used when a payload omits `userId`
pub const DEFAULT_SUBJECT: &str = "default";

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

/// one timestamped, subject-tagged step count
///
/// serialized with the wire names the hub expects:
/// `{"userId": "default", "steps": 42, "takenAt": "2024-05-01T10:00:00Z"}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// who took the steps
    #[serde(rename = "userId", default = "default_subject")]
    pub subject_id: String,

    /// steps counted in the sampled window
    #[serde(rename = "steps")]
    pub count: u64,

    /// end of the sampled window
    #[serde(rename = "takenAt")]
    pub observed_at: DateTime<Utc>,
}

impl Measurement {
    pub fn new(subject_id: impl Into<String>, count: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            count,
            observed_at,
        }
    }
}

/// where the offline queue currently stands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Offline,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Offline => "offline",
            SyncState::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// half-open time window `[from, to)`; either side may be open-ended
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| t >= from) && self.to.map_or(true, |to| t < to)
    }
}

/// fixed-width interval `[start, end)` with the summed count inside it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total: u64,
}

/// a bucket belonging to one subject, for multi-subject aggregation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubjectBucket {
    pub subject_id: String,
    #[serde(flatten)]
    pub bucket: Bucket,
}
