//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `walktrack.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides (WALKTRACK_PORT, WALKTRACK_DATA_FILE,
//!     WALKTRACK_HUB_URL).
//!
//! structure:
//!     - NodeConfig: role ("hub" or "tracker") and the tracked subject.
//!     - ServerConfig: hub listen address and data file.
//!     - TrackerConfig: hub url, queue file, sampling + sync cadence.
//!     - LoggingConfig: default log level.
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WalkConfig {
    pub node: NodeConfig,
    pub server: ServerConfig,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Hub,
    Tracker,
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hub" => Ok(Role::Hub),
            "tracker" => Ok(Role::Tracker),
            other => Err(anyhow::anyhow!("unknown role '{}' (expected hub or tracker)", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    pub role: Role,
    pub subject_id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Hub,
            subject_id: crate::domain::DEFAULT_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 4000)),
            data_file: PathBuf::from("data").join("step-readings.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    pub hub_url: String,
    pub queue_file: PathBuf,
    pub sample_interval_ms: u64,
    pub sync_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub status_bind: SocketAddr,
    pub steps_per_minute: u32,
}

impl TrackerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            hub_url: "http://127.0.0.1:4000".to_string(),
            queue_file: PathBuf::from("data").join("pending-entries.json"),
            sample_interval_ms: 5_000,
            sync_interval_ms: 15_000,
            request_timeout_ms: 5_000,
            status_bind: SocketAddr::from(([127, 0, 0, 1], 4100)),
            steps_per_minute: 90,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// where the running configuration was read from
#[derive(Debug, Clone)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// no usable file; carries the load failures, if any
    Defaults(Vec<String>),
}

impl WalkConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load with default fallback
    ///
    /// runs before the log subscriber exists, so it reports where the
    /// configuration came from instead of logging it.
    pub fn load_or_default() -> (Self, ConfigOrigin) {
        let paths = [
            PathBuf::from("config").join("walktrack.toml"),
            PathBuf::from("..").join("config").join("walktrack.toml"),
        ];

        let mut failures = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => return (config, ConfigOrigin::File(path.clone())),
                    Err(e) => failures.push(format!("Failed to load {}: {:#}", path.display(), e)),
                }
            }
        }

        (Self::default(), ConfigOrigin::Defaults(failures))
    }

    /// environment overrides for container deployments
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = var("WALKTRACK_PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            self.server.bind.set_port(port);
        }
        if let Some(file) = var("WALKTRACK_DATA_FILE") {
            self.server.data_file = PathBuf::from(file);
        }
        if let Some(url) = var("WALKTRACK_HUB_URL") {
            self.tracker.hub_url = url;
        }
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│         WALKTRACK CONFIGURATION         │");
        tracing::info!("├─────────────────────────────────────────┤");
        tracing::info!("│ Role: {:?}", self.node.role);
        tracing::info!("│ Subject: {}", self.node.subject_id);
        match self.node.role {
            Role::Hub => {
                tracing::info!("│ Bind: {}", self.server.bind);
                tracing::info!("│ Data File: {}", self.server.data_file.display());
            }
            Role::Tracker => {
                tracing::info!("│ Hub: {}", self.tracker.hub_url);
                tracing::info!("│ Queue File: {}", self.tracker.queue_file.display());
                tracing::info!("│ Sample Interval: {}ms", self.tracker.sample_interval_ms);
                tracing::info!("│ Sync Interval: {}ms", self.tracker.sync_interval_ms);
            }
        }
        tracing::info!("│ Log Level: {}", self.logging.level);
        tracing::info!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = WalkConfig::parse(
            r#"
            [node]
            role = "tracker"

            [tracker]
            hub_url = "http://hub.local:4000"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.role, Role::Tracker);
        assert_eq!(config.node.subject_id, "default");
        assert_eq!(config.tracker.hub_url, "http://hub.local:4000");
        assert_eq!(config.tracker.sync_interval_ms, 15_000);
        assert_eq!(config.server.bind.port(), 4000);
    }

    #[test]
    fn env_overrides_win() {
        let mut config = WalkConfig::default();
        config.apply_overrides(|key| match key {
            "WALKTRACK_PORT" => Some("4555".into()),
            "WALKTRACK_DATA_FILE" => Some("/tmp/steps.json".into()),
            _ => None,
        });
        assert_eq!(config.server.bind.port(), 4555);
        assert_eq!(config.server.data_file, PathBuf::from("/tmp/steps.json"));
        assert_eq!(config.tracker.hub_url, "http://127.0.0.1:4000");
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("spoke".parse::<Role>().is_err());
        assert_eq!("Tracker".parse::<Role>().unwrap(), Role::Tracker);
    }
}
