//! Wall-clock state owned by the sync scheduler.
//!
//! Initialization order: construct the [`ClockService`] before any formatting call,
//! hand it to the scheduler, and do not trust [`ClockService::now`] until it returns
//! `Some` (i.e. at least one sync has succeeded).

mod monotonic;

pub use self::monotonic::SystemMonotonic;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::format::{format_time, TimeStyle};
use crate::status::SyncState;
use crate::traits::MonotonicClock;

pub type SharedClock<M = SystemMonotonic> = Arc<RwLock<ClockService<M>>>;

/// A synchronized epoch paired with the monotonic reading taken when it arrived.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    epoch: i64,
    at: Duration,
}

pub struct ClockService<M: MonotonicClock = SystemMonotonic> {
    monotonic: M,
    baseline: Option<Baseline>,
    state: SyncState,
}

impl<M: MonotonicClock> ClockService<M> {
    pub fn new(monotonic: M, error_interval_secs: u32) -> Self {
        ClockService {
            monotonic,
            baseline: None,
            state: SyncState::initial(error_interval_secs),
        }
    }

    pub fn shared(self) -> SharedClock<M> {
        Arc::new(RwLock::new(self))
    }

    /// Current Unix epoch, or `None` if no sync has ever succeeded.
    pub fn now(&self) -> Option<i64> {
        self.baseline.map(|b| {
            let since = self.monotonic.elapsed().saturating_sub(b.at);
            b.epoch + since.as_secs() as i64
        })
    }

    pub fn is_synchronized(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// "Now" rendered in `style`, or "Time Unknown".
    pub fn current_time(&self, style: TimeStyle) -> String {
        format_time(self.now(), style)
    }

    pub(crate) fn record_success(&mut self, epoch: i64, healthy_interval_secs: u32) {
        self.baseline = Some(Baseline {
            epoch,
            at: self.monotonic.elapsed(),
        });
        self.state.record_success(epoch, healthy_interval_secs);
    }

    /// The baseline is left untouched; "now" keeps advancing from the last good sync.
    pub(crate) fn record_failure(&mut self, error: String, error_interval_secs: u32) {
        self.state.record_failure(error, error_interval_secs);
    }
}
