//! ==============================================================================
//! remote.rs - delivery side of the tracker
//! ==============================================================================
//!
//! purpose:
//!     the two network collaborators the offline queue drains against:
//!     - RemoteSink: accepts one measurement per call
//!     - ConnectivityProbe: answers "can we reach the hub right now?"
//!
//! ```text
//!     the http implementations push to a hub's `/api/steps` and probe its
//!     `/health` endpoint. timeouts live here, not in the queue engine.
//! ```
//!
//! relationships:
//!     - used by: queue.rs (drain)
//!     - talks to: server.rs (hub routes) over http
//!
//! ==============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Measurement;
use crate::error::SubmitError;

#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn submit(&self, measurement: &Measurement) -> Result<(), SubmitError>;
}

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_connected(&self) -> bool;
}

// ==============================================================================
// http sink - POST /api/steps
// ==============================================================================

#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(hub_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/steps", hub_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RemoteSink for HttpSink {
    async fn submit(&self, measurement: &Measurement) -> Result<(), SubmitError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(measurement)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // body is only for the log line; an unreadable body is not worth a second error
        let body = response.text().await.unwrap_or_default();
        Err(SubmitError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// ==============================================================================
// health probe - GET /health
// ==============================================================================

#[derive(Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    endpoint: String,
}

impl HealthProbe {
    pub fn new(hub_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/health", hub_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HealthProbe {
    async fn is_connected(&self) -> bool {
        match self.client.get(&self.endpoint).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::debug!("[PROBE] hub unreachable: {}", e);
                false
            }
        }
    }
}
