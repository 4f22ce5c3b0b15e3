//! Sync Scheduler - owns the resynchronization cadence.
//!
//! Two re-entrant cadence states:
//! - **DEGRADED**: never synchronized or the last attempt failed; retry every
//!   `error_interval_secs` (default 5 minutes).
//! - **HEALTHY**: the last attempt succeeded; resync every `healthy_interval_secs`
//!   (default 2 hours).
//!
//! The scheduler is the only caller of its [`NtpSource`] and the only writer of
//! the [`ClockService`], so exactly one attempt is ever in flight.

use log::{error, info, warn};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;

use crate::clock::{ClockService, SharedClock};
use crate::config::SyncConfig;
use crate::error::TimeSyncError;
use crate::format::TimeStyle;
use crate::status::{Cadence, SyncState};
use crate::traits::{MonotonicClock, NtpSource};

pub struct SyncScheduler<S, M>
where
    S: NtpSource,
    M: MonotonicClock,
{
    source: S,
    config: SyncConfig,
    clock: SharedClock<M>,
}

impl<S, M> SyncScheduler<S, M>
where
    S: NtpSource,
    M: MonotonicClock,
{
    pub fn new(source: S, config: SyncConfig, monotonic: M) -> Self {
        let clock = ClockService::new(monotonic, config.error_interval_secs).shared();
        SyncScheduler {
            source,
            config,
            clock,
        }
    }

    /// Handle for readers (formatters, upload naming, status output).
    pub fn clock(&self) -> SharedClock<M> {
        self.clock.clone()
    }

    pub fn state(&self) -> SyncState {
        self.read_clock().state().clone()
    }

    /// Wait before the next attempt, as dictated by the current cadence.
    pub fn current_interval(&self) -> Duration {
        Duration::from_secs(self.read_clock().state().current_interval_secs as u64)
    }

    fn read_clock(&self) -> RwLockReadGuard<'_, ClockService<M>> {
        self.clock.read().unwrap_or_else(|poisoned| {
            error!("Clock state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_clock(&self) -> RwLockWriteGuard<'_, ClockService<M>> {
        self.clock.write().unwrap_or_else(|poisoned| {
            error!("Clock state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Performs one synchronization attempt now (timer fire or manual trigger).
    pub async fn sync_now(&mut self) -> Result<i64, TimeSyncError> {
        let result = self
            .source
            .synchronize(&self.config.ntp_server, self.config.sync_timeout())
            .await;

        let mut clock = self.write_clock();
        let previous = clock.state().cadence;

        match &result {
            Ok(epoch) => {
                clock.record_success(*epoch, self.config.healthy_interval_secs);
                info!(
                    "NTP Sync: {} from {} (epoch {}), next sync in {}s",
                    clock.current_time(TimeStyle::Human),
                    self.config.ntp_server,
                    epoch,
                    self.config.healthy_interval_secs
                );
                if previous != Cadence::Healthy {
                    info!("Clock synchronized, switching to healthy cadence");
                }
            }
            Err(e) => {
                clock.record_failure(e.to_string(), self.config.error_interval_secs);
                warn!(
                    "NTP Sync failed ({} consecutive): {}. Retrying in {}s",
                    clock.state().consecutive_failures,
                    e,
                    self.config.error_interval_secs
                );
            }
        }

        result
    }

    /// Runs the sync loop until `shutdown` flips to true (or its sender is dropped).
    ///
    /// `on_attempt` is called with the updated state after every attempt.
    pub async fn run<F>(&mut self, mut shutdown: watch::Receiver<bool>, mut on_attempt: F)
    where
        F: FnMut(&SyncState),
    {
        info!(
            "Starting sync loop against {} (healthy {}s, error {}s, timeout {}ms)",
            self.config.ntp_server,
            self.config.healthy_interval_secs,
            self.config.error_interval_secs,
            self.config.sync_timeout_ms
        );

        while !*shutdown.borrow() {
            // Errors are already logged and reflected in the cadence
            let _ = self.sync_now().await;
            on_attempt(&self.state());

            tokio::select! {
                _ = tokio::time::sleep(self.current_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Sync loop stopped.");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockMonotonicClock;
    use std::collections::VecDeque;

    const SUMMER_EPOCH: i64 = 1_720_094_400;

    /// Replays scripted outcomes, one per call.
    struct ScriptedSource {
        outcomes: VecDeque<Result<i64, TimeSyncError>>,
        calls: Vec<(String, Duration)>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<i64, TimeSyncError>>) -> Self {
            ScriptedSource {
                outcomes: outcomes.into(),
                calls: Vec::new(),
            }
        }
    }

    impl NtpSource for ScriptedSource {
        async fn synchronize(&mut self, server: &str, timeout: Duration) -> Result<i64, TimeSyncError> {
            self.calls.push((server.to_string(), timeout));
            self.outcomes.pop_front().unwrap_or_else(|| {
                Err(TimeSyncError::NetworkTimeout {
                    server: server.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            })
        }
    }

    fn timeout_err() -> TimeSyncError {
        TimeSyncError::NetworkTimeout {
            server: "pool.ntp.org".to_string(),
            timeout_ms: 3000,
        }
    }

    fn frozen_clock() -> MockMonotonicClock {
        let mut mono = MockMonotonicClock::new();
        mono.expect_elapsed().return_const(Duration::from_secs(42));
        mono
    }

    #[tokio::test]
    async fn test_initial_state_is_degraded() {
        let scheduler = SyncScheduler::new(ScriptedSource::new(vec![]), SyncConfig::default(), frozen_clock());

        let state = scheduler.state();
        assert_eq!(state.cadence, Cadence::Degraded);
        assert_eq!(state.last_epoch, None);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_success_switches_to_healthy() {
        let _ = env_logger::builder().is_test(true).try_init();
        let source = ScriptedSource::new(vec![Ok(SUMMER_EPOCH)]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());

        assert_eq!(scheduler.sync_now().await.unwrap(), SUMMER_EPOCH);

        let state = scheduler.state();
        assert_eq!(state.cadence, Cadence::Healthy);
        assert_eq!(state.last_epoch, Some(SUMMER_EPOCH));
        assert_eq!(state.current_interval_secs, 7200);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(7200));
        assert_eq!(scheduler.clock().read().unwrap().now(), Some(SUMMER_EPOCH));
    }

    #[tokio::test]
    async fn test_failure_keeps_error_interval() {
        let source = ScriptedSource::new(vec![Err(timeout_err())]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());

        assert!(scheduler.sync_now().await.is_err());

        let state = scheduler.state();
        assert_eq!(state.cadence, Cadence::Degraded);
        assert_eq!(state.current_interval_secs, 300);
        assert_eq!(state.consecutive_failures, 1);
        assert!(!scheduler.clock().read().unwrap().is_synchronized());
    }

    #[tokio::test]
    async fn test_cadence_follows_latest_attempt() {
        let source = ScriptedSource::new(vec![
            Err(timeout_err()),
            Err(TimeSyncError::MalformedPacket { len: 12, expected: 48 }),
            Ok(SUMMER_EPOCH),
            Err(timeout_err()),
            Ok(SUMMER_EPOCH + 7200),
        ]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());

        let _ = scheduler.sync_now().await;
        let _ = scheduler.sync_now().await;
        assert_eq!(scheduler.state().consecutive_failures, 2);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(300));

        let _ = scheduler.sync_now().await;
        assert_eq!(scheduler.state().consecutive_failures, 0);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(7200));

        // Failure after success falls back to the error interval but keeps the baseline
        let _ = scheduler.sync_now().await;
        let state = scheduler.state();
        assert_eq!(state.current_interval_secs, 300);
        assert_eq!(state.last_epoch, Some(SUMMER_EPOCH));
        assert_eq!(scheduler.clock().read().unwrap().now(), Some(SUMMER_EPOCH));

        let _ = scheduler.sync_now().await;
        assert_eq!(scheduler.current_interval(), Duration::from_secs(7200));
        assert_eq!(scheduler.clock().read().unwrap().now(), Some(SUMMER_EPOCH + 7200));
    }

    #[tokio::test]
    async fn test_passes_configured_server_and_timeout() {
        let config = SyncConfig {
            ntp_server: "time.example.net".to_string(),
            sync_timeout_ms: 1500,
            ..SyncConfig::default()
        };
        let mut scheduler = SyncScheduler::new(ScriptedSource::new(vec![Ok(SUMMER_EPOCH)]), config, frozen_clock());

        let _ = scheduler.sync_now().await;
        assert_eq!(
            scheduler.source.calls,
            vec![("time.example.net".to_string(), Duration::from_millis(1500))]
        );
    }

    #[tokio::test]
    async fn test_single_failed_attempt_reports_unknown_time() {
        let source = ScriptedSource::new(vec![Err(timeout_err())]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());

        assert!(scheduler.sync_now().await.is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        crate::status::write_status_file(&path, &scheduler.state()).unwrap();
        let written: SyncState =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.cadence, Cadence::Degraded);
        assert_eq!(written.consecutive_failures, 1);
        assert!(written.last_error.unwrap().starts_with("No NTP reply"));

        let clock = scheduler.clock();
        let clock = clock.read().unwrap();
        assert_eq!(clock.current_time(TimeStyle::Human), "Time Unknown");
        assert_eq!(clock.current_time(TimeStyle::Filename), "Time Unknown");
    }

    #[tokio::test]
    async fn test_poisoned_lock_still_reports_state() {
        let source = ScriptedSource::new(vec![Ok(SUMMER_EPOCH), Err(timeout_err())]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());
        let _ = scheduler.sync_now().await;

        let clock = scheduler.clock();
        let _ = std::thread::spawn(move || {
            let _guard = clock.write().unwrap();
            panic!("reader crashed while holding the clock");
        })
        .join();
        assert!(scheduler.clock().is_poisoned());

        assert_eq!(scheduler.state().cadence, Cadence::Healthy);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(7200));

        let _ = scheduler.sync_now().await;
        assert_eq!(scheduler.state().consecutive_failures, 1);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_at_error_interval() {
        let source = ScriptedSource::new(vec![Err(timeout_err()), Err(timeout_err()), Ok(SUMMER_EPOCH)]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());
        let (tx, rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        let mut attempts = Vec::new();
        scheduler
            .run(rx, |state| {
                attempts.push((start.elapsed().as_secs(), state.cadence));
                if state.cadence == Cadence::Healthy {
                    let _ = tx.send(true);
                }
            })
            .await;

        assert_eq!(
            attempts,
            vec![(0, Cadence::Degraded), (300, Cadence::Degraded), (600, Cadence::Healthy)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_sender_dropped() {
        let source = ScriptedSource::new(vec![Ok(SUMMER_EPOCH)]);
        let mut scheduler = SyncScheduler::new(source, SyncConfig::default(), frozen_clock());
        let (tx, rx) = watch::channel(false);

        let mut count = 0;
        let mut tx = Some(tx);
        scheduler.run(rx, |_| {
            count += 1;
            tx.take();
        }).await;

        assert_eq!(count, 1);
        assert_eq!(scheduler.source.calls.len(), 1);
    }
}
