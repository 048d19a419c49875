//! ==============================================================================
//! storage.rs - hub step readings, one json file
//! ==============================================================================
//!
//! purpose:
//!     keeps every accepted reading in memory and rewrites the whole file on
//!     each insert. the file is read lazily on first access; a missing file
//!     starts an empty set, a corrupt one is logged and replaced.
//!
//! relationships:
//!     - used by: server.rs (insert + query + summary)
//!
//! ==============================================================================

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::Measurement;
use crate::error::StoreError;

/// one stored reading
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: String,
    pub user_id: String,
    pub steps: u64,
    pub taken_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn to_measurement(&self) -> Measurement {
        Measurement::new(self.user_id.clone(), self.steps, self.taken_at)
    }
}

/// filter for reading queries; both time bounds are inclusive
#[derive(Clone, Debug, Default)]
pub struct StepQuery {
    pub user_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Default)]
struct State {
    records: Vec<StepRecord>,
    next_id: u64,
    loaded: bool,
}

pub struct StepStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl StepStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(State::default()),
        }
    }

    async fn ensure_loaded(&self, state: &mut State) -> Result<(), StoreError> {
        if state.loaded {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        match tokio::fs::read(&self.path).await {
            Ok(raw) => match serde_json::from_slice::<Vec<StepRecord>>(&raw) {
                Ok(records) => {
                    state.next_id = next_id(&records);
                    state.records = records;
                    tracing::info!(
                        "[STORE] Loaded {} readings from {}",
                        state.records.len(),
                        self.path.display()
                    );
                }
                Err(e) => {
                    tracing::warn!("[STORE] ⚠ Failed to read step data store, starting fresh: {}", e);
                    state.records.clear();
                    state.next_id = 1;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.next_id = 1;
            }
            Err(e) => return Err(e.into()),
        }

        state.loaded = true;
        Ok(())
    }

    async fn persist(&self, records: &[StepRecord]) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, payload).await?;
        Ok(())
    }

    /// store a measurement, allocating the next id
    pub async fn insert(&self, reading: &Measurement) -> Result<StepRecord, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        let now = Utc::now();
        let record = StepRecord {
            id: state.next_id.to_string(),
            user_id: reading.subject_id.clone(),
            steps: reading.count,
            taken_at: reading.observed_at,
            created_at: now,
            updated_at: now,
        };

        state.records.push(record.clone());
        if let Err(e) = self.persist(&state.records).await {
            state.records.pop();
            return Err(e);
        }
        state.next_id += 1;
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<StepRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.records.clone())
    }

    /// readings of one subject in `[from, to]`, oldest first, truncated to `limit`
    pub async fn query(&self, query: &StepQuery) -> Result<Vec<StepRecord>, StoreError> {
        let mut rows: Vec<StepRecord> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.user_id == query.user_id)
            .filter(|r| query.from.map_or(true, |from| r.taken_at >= from))
            .filter(|r| query.to.map_or(true, |to| r.taken_at <= to))
            .collect();

        // stable: equal timestamps keep insertion order
        rows.sort_by_key(|r| r.taken_at);

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

fn next_id(records: &[StepRecord]) -> u64 {
    records
        .iter()
        .filter_map(|r| r.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_skips_non_numeric_ids() {
        let now = Utc::now();
        let rec = |id: &str| StepRecord {
            id: id.to_string(),
            user_id: "default".into(),
            steps: 1,
            taken_at: now,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(next_id(&[rec("3"), rec("abc"), rec("7")]), 8);
        assert_eq!(next_id(&[]), 1);
    }
}
