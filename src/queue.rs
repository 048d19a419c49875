//! ==============================================================================
//! queue.rs - offline queue and sync engine
//! ==============================================================================
//!
//! purpose:
//!     accumulates locally observed step counts into a pending queue, mirrors
//!     that queue to a durable slot, and drains it against the hub whenever a
//!     trigger fires and the hub is reachable.
//!
//! delivery rules:
//!     - entries are delivered oldest first, one at a time
//!     - an entry leaves the queue only after the sink accepted it
//!     - the first rejection or transport failure halts the pass; accepted
//!       entries stay removed, the rest wait for the next trigger
//!     - only one pass runs at a time; triggers that land while a pass is
//!       in flight are coalesced into it
//!
//! state machine:
//!
//! ```text
//!     Idle ──► Syncing ──► Idle | Error
//!     Idle ──► Offline ──► (next trigger with connectivity) ──► Syncing
//!     Error ──► Syncing   (every trigger retries)
//! ```
//!
//! relationships:
//!     - uses: hal.rs (SampleSource, Clock)
//!     - uses: persist.rs (QueueStore + write-behind task)
//!     - uses: remote.rs (RemoteSink, ConnectivityProbe)
//!     - used by: tracker.rs (timers + status api)
//!
//! ==============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::{Measurement, SyncState};
use crate::hal::{Clock, SampleSource};
use crate::persist::{QueueStore, WriteBehind};
use crate::remote::{ConnectivityProbe, RemoteSink};

/// the engine's view of the outside world
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SampleSource>,
    pub store: Arc<dyn QueueStore>,
    pub sink: Arc<dyn RemoteSink>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub clock: Arc<dyn Clock>,
}

/// what asked for a drain; only used for logging and reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    Startup,
    Interval,
    Foreground,
    UserRequest,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
            Trigger::Foreground => "foreground",
            Trigger::UserRequest => "user-request",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrainOutcome {
    /// nothing was pending
    Empty,
    /// probe said the hub is unreachable; sink untouched
    Offline,
    /// every entry of the pass was accepted
    Delivered,
    /// a submission failed; the pass stopped there
    Halted,
    /// another pass was already in flight
    Coalesced,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub trigger: Trigger,
    pub outcome: DrainOutcome,
    pub delivered: usize,
    pub remaining: usize,
}

/// read-only snapshot for status displays
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub state: SyncState,
    pub pending_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sample: DateTime<Utc>,
    pub today_steps: u64,
    /// newest pending entries, newest first
    pub recent: Vec<Measurement>,
}

const RECENT_LIMIT: usize = 5;

struct Inner {
    pending: VecDeque<Measurement>,
    state: SyncState,
    pass_active: bool,
    last_sync: Option<DateTime<Utc>>,
    last_sample: DateTime<Utc>,
    today: Option<(NaiveDate, u64)>,
    writer: Option<WriteBehind>,
}

impl Inner {
    fn mirror(&self) {
        match &self.writer {
            Some(writer) => writer.submit(self.pending.iter().cloned().collect()),
            None => tracing::debug!("[QUEUE] engine shut down, mutation not mirrored"),
        }
    }
}

pub struct OfflineQueueEngine {
    subject_id: String,
    parts: Collaborators,
    inner: Mutex<Inner>,
}

impl OfflineQueueEngine {
    /// seed the queue from the durable slot and start the write-behind task
    ///
    /// must run inside a tokio runtime.
    pub async fn open(subject_id: impl Into<String>, parts: Collaborators) -> Self {
        let pending: VecDeque<Measurement> = match parts.store.load().await {
            Ok(saved) => {
                if !saved.is_empty() {
                    tracing::info!("[QUEUE] restored {} pending entries", saved.len());
                }
                saved.into()
            }
            Err(e) => {
                tracing::warn!("[QUEUE] ⚠ failed to load cached entries, starting empty: {}", e);
                VecDeque::new()
            }
        };

        let writer = WriteBehind::spawn(parts.store.clone());
        let last_sample = parts.clock.now();

        Self {
            subject_id: subject_id.into(),
            inner: Mutex::new(Inner {
                pending,
                state: SyncState::Idle,
                pass_active: false,
                last_sync: None,
                last_sample,
                today: None,
                writer: Some(writer),
            }),
            parts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // never held across an await, so a poisoned guard still holds consistent data
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==========================================================================
    // producing
    // ==========================================================================

    /// append a measurement; zero counts are dropped
    ///
    /// returns whether the measurement was queued.
    pub fn enqueue(&self, measurement: Measurement) -> bool {
        if measurement.count == 0 {
            return false;
        }

        let mut inner = self.lock();

        let day = measurement.observed_at.date_naive();
        inner.today = match inner.today {
            Some((d, steps)) if d == day => Some((d, steps.saturating_add(measurement.count))),
            Some((d, steps)) if d > day => Some((d, steps)),
            _ => Some((day, measurement.count)),
        };

        tracing::debug!(
            "[QUEUE] +{} steps at {} ({} pending)",
            measurement.count,
            measurement.observed_at,
            inner.pending.len() + 1
        );
        inner.pending.push_back(measurement);
        inner.mirror();
        true
    }

    /// read `[last_sample, now)` from the sensor and queue any steps
    ///
    /// on sensor failure the window start is kept, so the next sample reads
    /// an overlapping window and may count some steps twice. that is an
    /// accepted approximation. returns the count read, or None on failure.
    pub async fn sample(&self, now: DateTime<Utc>) -> Option<u64> {
        let from = self.lock().last_sample;

        match self.parts.source.read_count(from, now).await {
            Ok(count) => {
                self.lock().last_sample = now;
                if count > 0 {
                    self.enqueue(Measurement::new(self.subject_id.clone(), count, now));
                }
                Some(count)
            }
            Err(e) => {
                tracing::warn!("[SAMPLE] ⚠ failed to sample step count: {}", e);
                None
            }
        }
    }

    // ==========================================================================
    // draining
    // ==========================================================================

    pub async fn drain(&self) -> DrainReport {
        self.drain_with(Trigger::UserRequest).await
    }

    /// one delivery pass over the pending queue
    pub async fn drain_with(&self, trigger: Trigger) -> DrainReport {
        {
            let mut inner = self.lock();
            if inner.pass_active {
                tracing::debug!("[SYNC] {} trigger coalesced into running pass", trigger);
                return report(trigger, DrainOutcome::Coalesced, 0, inner.pending.len());
            }
            if inner.pending.is_empty() {
                inner.state = SyncState::Idle;
                return report(trigger, DrainOutcome::Empty, 0, 0);
            }
            inner.pass_active = true;
        }
        let _pass = PassGuard { engine: self };

        if !self.parts.probe.is_connected().await {
            let mut inner = self.lock();
            inner.state = SyncState::Offline;
            tracing::info!("[SYNC] offline, {} entries kept ({})", inner.pending.len(), trigger);
            return report(trigger, DrainOutcome::Offline, 0, inner.pending.len());
        }

        let batch: Vec<Measurement> = {
            let mut inner = self.lock();
            inner.state = SyncState::Syncing;
            inner.pending.iter().cloned().collect()
        };
        tracing::info!("[SYNC] delivering {} entries ({})", batch.len(), trigger);

        let mut delivered = 0;
        for entry in &batch {
            match self.parts.sink.submit(entry).await {
                Ok(()) => {
                    // enqueue only appends, so the head is still this entry
                    let mut inner = self.lock();
                    inner.pending.pop_front();
                    inner.mirror();
                    delivered += 1;
                    tracing::debug!("[SYNC] delivered {} steps at {}", entry.count, entry.observed_at);
                }
                Err(e) => {
                    let mut inner = self.lock();
                    inner.state = SyncState::Error;
                    tracing::warn!(
                        "[SYNC] ⚠ {} failure after {} delivered, halting pass: {}",
                        e.kind(),
                        delivered,
                        e
                    );
                    return report(trigger, DrainOutcome::Halted, delivered, inner.pending.len());
                }
            }
        }

        let now = self.parts.clock.now();
        let mut inner = self.lock();
        inner.last_sync = Some(now);
        inner.state = SyncState::Idle;
        tracing::info!("[SYNC] ✓ {} entries delivered", delivered);
        report(trigger, DrainOutcome::Delivered, delivered, inner.pending.len())
    }

    // ==========================================================================
    // lifecycle + accessors
    // ==========================================================================

    /// flush the final snapshot and stop the write-behind task
    pub async fn shutdown(&self) {
        let writer = {
            let mut inner = self.lock();
            let snapshot: Vec<Measurement> = inner.pending.iter().cloned().collect();
            inner.writer.take().map(|w| {
                w.submit(snapshot);
                w
            })
        };
        if let Some(writer) = writer {
            writer.close().await;
            tracing::info!("[QUEUE] pending entries flushed");
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn pending(&self) -> Vec<Measurement> {
        self.lock().pending.iter().cloned().collect()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync
    }

    pub fn last_sample(&self) -> DateTime<Utc> {
        self.lock().last_sample
    }

    /// steps enqueued for the current utc day
    pub fn today_steps(&self) -> u64 {
        let today = self.parts.clock.now().date_naive();
        match self.lock().today {
            Some((day, steps)) if day == today => steps,
            _ => 0,
        }
    }

    pub fn status(&self) -> QueueStatus {
        let today_steps = self.today_steps();
        let inner = self.lock();
        QueueStatus {
            state: inner.state,
            pending_count: inner.pending.len(),
            last_sync: inner.last_sync,
            last_sample: inner.last_sample,
            today_steps,
            recent: inner.pending.iter().rev().take(RECENT_LIMIT).cloned().collect(),
        }
    }
}

fn report(trigger: Trigger, outcome: DrainOutcome, delivered: usize, remaining: usize) -> DrainReport {
    DrainReport {
        trigger,
        outcome,
        delivered,
        remaining,
    }
}

/// releases the pass slot even if the drain future is dropped mid-flight
struct PassGuard<'a> {
    engine: &'a OfflineQueueEngine,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.engine.lock();
        inner.pass_active = false;
        // a pass abandoned while syncing counts as failed
        if inner.state == SyncState::Syncing {
            inner.state = SyncState::Error;
        }
    }
}
