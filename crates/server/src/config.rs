use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use arena::{DispatcherConfig, SyncConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub timeout_ms: u64,
    pub resend_ms: u64,
    pub queue_capacity: usize,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            resend_ms: defaults.resend_interval.as_millis() as u64,
            queue_capacity: defaults.queue_capacity,
        }
    }
}

/// Optional TOML file; command-line flags override what it sets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Seconds between status lines in headless mode.
    pub status_interval_secs: u64,
    pub game: SyncConfig,
    pub network: NetworkSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: arena::net::DEFAULT_PORT,
            status_interval_secs: 10,
            game: SyncConfig::default(),
            network: NetworkSection::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            // Rejected joins still need a slot to hear why.
            max_peers: self.game.max_players + 4,
            timeout: Duration::from_millis(self.network.timeout_ms),
            resend_interval: Duration::from_millis(self.network.resend_ms),
            queue_capacity: self.network.queue_capacity,
        }
    }
}
