use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Resynchronization cadence.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cadence {
    /// Last attempt succeeded; resync at the healthy interval.
    Healthy,
    /// Never synchronized, or the last attempt failed; retry at the error interval.
    Degraded,
}

/// Synchronization state, mutated only by the scheduler after each attempt.
///
/// Also written out as the JSON status file for other processes to read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SyncState {
    /// Epoch returned by the most recent successful sync
    pub last_epoch: Option<i64>,

    /// Always either the healthy or the error interval
    pub current_interval_secs: u32,

    pub consecutive_failures: u32,

    pub cadence: Cadence,

    /// Message of the most recent failure, cleared on success
    pub last_error: Option<String>,
}

impl SyncState {
    pub fn initial(error_interval_secs: u32) -> Self {
        SyncState {
            last_epoch: None,
            current_interval_secs: error_interval_secs,
            consecutive_failures: 0,
            cadence: Cadence::Degraded,
            last_error: None,
        }
    }

    pub fn record_success(&mut self, epoch: i64, healthy_interval_secs: u32) {
        self.last_epoch = Some(epoch);
        self.current_interval_secs = healthy_interval_secs;
        self.consecutive_failures = 0;
        self.cadence = Cadence::Healthy;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String, error_interval_secs: u32) {
        self.current_interval_secs = error_interval_secs;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.cadence = Cadence::Degraded;
        self.last_error = Some(error);
    }
}

/// Writes `state` as JSON to `path`.
///
/// The JSON goes to a sibling `.tmp` file first and is renamed over `path`, so
/// readers see either the previous or the new snapshot, never a partial one.
pub fn write_status_file(path: &Path, state: &SyncState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;

    let tmp = tmp_path(path);
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
