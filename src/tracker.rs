//! ==============================================================================
//! tracker.rs - step tracker node
//! ==============================================================================
//!
//! purpose:
//!     wires the offline queue to real collaborators and drives it:
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                       tracker (this file)                     │
//!     │  ┌─────────────┐   ┌─────────────┐   ┌────────────────────┐  │
//!     │  │ sample loop │   │  sync loop  │   │  status api        │  │
//!     │  │ (5s cycle)  │   │ (15s cycle) │   │  /api/status|sync  │  │
//!     │  └──────┬──────┘   └──────┬──────┘   └─────────┬──────────┘  │
//!     │         └─────────────────┼────────────────────┘             │
//!     │                    ┌──────┴──────┐                           │
//!     │                    │ queue engine│ <- queue.rs               │
//!     │                    └──────┬──────┘                           │
//!     └───────────────────────────┼──────────────────────────────────┘
//!                                 │ http
//!                            ┌────┴────┐
//!                            │   hub   │ <- server.rs
//!                            └─────────┘
//! ```
//!
//! relationships:
//!     - uses: queue.rs, hal.rs, persist.rs, remote.rs
//!     - used by: main.rs (role = "tracker")
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;

use crate::config::WalkConfig;
use crate::hal::{SimulatedPedometer, SystemClock};
use crate::persist::JsonFileQueueStore;
use crate::queue::{Collaborators, OfflineQueueEngine, Trigger};
use crate::remote::{HealthProbe, HttpSink};

/// build the production collaborators described by `config`
pub fn collaborators(config: &WalkConfig) -> Result<Collaborators> {
    let tracker = &config.tracker;
    Ok(Collaborators {
        source: Arc::new(SimulatedPedometer::new(tracker.steps_per_minute)),
        store: Arc::new(JsonFileQueueStore::new(tracker.queue_file.clone())),
        sink: Arc::new(HttpSink::new(&tracker.hub_url, tracker.request_timeout())?),
        probe: Arc::new(HealthProbe::new(&tracker.hub_url, tracker.request_timeout())?),
        clock: Arc::new(SystemClock),
    })
}

/// run sampling, periodic sync and the status api until ctrl-c
pub async fn run_tracker(config: &WalkConfig) -> Result<()> {
    let engine = Arc::new(OfflineQueueEngine::open(config.node.subject_id.clone(), collaborators(config)?).await);

    // first pass right away, like a freshly opened app
    let startup = engine.clone();
    tokio::spawn(async move {
        startup.drain_with(Trigger::Startup).await;
    });

    let sampler = tokio::spawn(sample_loop(engine.clone(), config.tracker.sample_interval()));
    let syncer = tokio::spawn(sync_loop(engine.clone(), config.tracker.sync_interval()));

    let listener = tokio::net::TcpListener::bind(config.tracker.status_bind).await?;
    tracing::info!("[TRACKER] ✓ status api at http://{}", listener.local_addr()?);
    let api_engine = engine.clone();
    let api = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, status_router(api_engine)).await {
            tracing::error!("[TRACKER] status api error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("[TRACKER] shutting down");

    sampler.abort();
    syncer.abort();
    api.abort();
    engine.shutdown().await;
    Ok(())
}

async fn sample_loop(engine: Arc<OfflineQueueEngine>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        engine.sample(Utc::now()).await;
    }
}

async fn sync_loop(engine: Arc<OfflineQueueEngine>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        engine.drain_with(Trigger::Interval).await;
    }
}

// ==============================================================================
// status api
// ==============================================================================

pub fn status_router(engine: Arc<OfflineQueueEngine>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/foreground", post(foreground_handler))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn status_handler(State(engine): State<Arc<OfflineQueueEngine>>) -> impl IntoResponse {
    Json(engine.status())
}

/// "sync now" button
async fn sync_handler(State(engine): State<Arc<OfflineQueueEngine>>) -> impl IntoResponse {
    run_pass(engine, Trigger::UserRequest).await
}

/// host shell reports the app came back to the foreground
async fn foreground_handler(State(engine): State<Arc<OfflineQueueEngine>>) -> impl IntoResponse {
    run_pass(engine, Trigger::Foreground).await
}

// detached so a dropped request cannot cut a pass short
async fn run_pass(engine: Arc<OfflineQueueEngine>, trigger: Trigger) -> axum::response::Response {
    match tokio::spawn(async move { engine.drain_with(trigger).await }).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!("[TRACKER] sync task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
