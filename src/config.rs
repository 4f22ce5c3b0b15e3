use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::ntp::NTP_PORT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub ntp_server: String,
    pub ntp_port: u16,
    pub local_port: u16,            // replies arrive here
    pub healthy_interval_secs: u32, // resync cadence once synchronized
    pub error_interval_secs: u32,   // retry cadence while unsynchronized or failing
    pub sync_timeout_ms: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            ntp_server: "pool.ntp.org".to_string(),
            ntp_port: NTP_PORT,
            local_port: 8888,
            healthy_interval_secs: 7200, // 2 hours
            error_interval_secs: 300,    // 5 minutes
            sync_timeout_ms: 3000,
        }
    }
}

/// Values given on the command line; each `Some` replaces the file/default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ntp_server: Option<String>,
    pub ntp_port: Option<u16>,
    pub local_port: Option<u16>,
    pub healthy_interval_secs: Option<u32>,
    pub error_interval_secs: Option<u32>,
    pub sync_timeout_ms: Option<u32>,
}

impl SyncConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` (or starts from defaults), applies `overrides`, then validates
    /// the merged result.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read_file(path)?,
            None => SyncConfig::default(),
        };
        config.with_overrides(overrides)
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(server) = &overrides.ntp_server {
            self.ntp_server = server.clone();
        }
        if let Some(port) = overrides.ntp_port {
            self.ntp_port = port;
        }
        if let Some(port) = overrides.local_port {
            self.local_port = port;
        }
        if let Some(secs) = overrides.healthy_interval_secs {
            self.healthy_interval_secs = secs;
        }
        if let Some(secs) = overrides.error_interval_secs {
            self.error_interval_secs = secs;
        }
        if let Some(ms) = overrides.sync_timeout_ms {
            self.sync_timeout_ms = ms;
        }

        self.validate()?;
        Ok(self)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.ntp_server.trim().is_empty() {
            return Err(anyhow!("ntp_server must not be empty"));
        }
        if self.healthy_interval_secs == 0 || self.error_interval_secs == 0 {
            return Err(anyhow!("Resync intervals must be at least 1 second"));
        }
        if self.sync_timeout_ms == 0 {
            return Err(anyhow!("sync_timeout_ms must be non-zero"));
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms as u64)
    }
}
