//! ==============================================================================
//! hal.rs - step sensor abstraction
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for reading step counts.
//!     abstracts away the difference between a real pedometer owned by the
//!     host platform and a development machine (using a simulated cadence).
//!
//! relationships:
//!     - used by: queue.rs (OfflineQueueEngine::sample)
//!     - used by: tracker.rs (builds the simulated pedometer from config)
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// reports steps taken inside `[from, to)`
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn read_count(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64, SourceError>;
}

/// wall clock, swappable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ==============================================================================================
// SIMULATED PEDOMETER (For hosts without a motion sensor)
// ==============================================================================================

/// deterministic cadence source: `steps_per_minute * elapsed`
///
/// fractional steps are carried over to the next read so a run of short
/// windows adds up to the same total as one long window.
pub struct SimulatedPedometer {
    steps_per_minute: u32,
    available: AtomicBool,
    carry_millisteps: Mutex<u64>,
}

impl SimulatedPedometer {
    pub fn new(steps_per_minute: u32) -> Self {
        tracing::info!("Using SIMULATED pedometer ({} steps/min)", steps_per_minute);
        Self {
            steps_per_minute,
            available: AtomicBool::new(true),
            carry_millisteps: Mutex::new(0),
        }
    }

    /// toggle sensor availability; unavailable reads fail with SourceUnavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl SampleSource for SimulatedPedometer {
    async fn read_count(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64, SourceError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("simulated sensor switched off".into()));
        }

        let elapsed_ms = (to - from).num_milliseconds().max(0) as u64;
        // steps/min * ms / 60 = milli-steps
        let produced = u64::from(self.steps_per_minute) * elapsed_ms / 60;

        let mut carry = self
            .carry_millisteps
            .lock()
            .map_err(|_| SourceError::Unavailable("pedometer state poisoned".into()))?;
        let total = *carry + produced;
        *carry = total % 1000;

        tracing::debug!("[MOCK PEDOMETER] {}ms window -> {} steps", elapsed_ms, total / 1000);
        Ok(total / 1000)
    }
}
