//! ==============================================================================
//! walktrack - step tracking with an offline sync queue
//! ==============================================================================
//!
//! two halves, one crate:
//!     - tracker side: sample a step source, queue measurements locally,
//!       mirror the queue to disk and drain it to the hub when reachable
//!     - hub side: store pushed readings in a json file and serve them back
//!       raw, as hourly summaries, or as dashboard chart series
//!
//! the bucketing in aggregate.rs is shared by both halves.
//!
//! ==============================================================================

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod domain;
pub mod error;
pub mod hal;
pub mod persist;
pub mod queue;
pub mod remote;
pub mod server;
pub mod storage;
pub mod tracker;

pub use aggregate::{aggregate, aggregate_by_subject};
pub use domain::{Bucket, Measurement, SubjectBucket, SyncState, TimeRange};
pub use queue::{Collaborators, DrainOutcome, DrainReport, OfflineQueueEngine, Trigger};
