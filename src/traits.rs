use std::future::Future;
use std::time::Duration;

use crate::error::TimeSyncError;

/// A source of UTC time, queried one request at a time.
pub trait NtpSource {
    /// Fetches the current Unix epoch (seconds) from `server`, waiting at most
    /// `timeout` for the reply.
    fn synchronize(
        &mut self,
        server: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<i64, TimeSyncError>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait MonotonicClock {
    /// Time elapsed since an arbitrary fixed origin. Never goes backwards.
    fn elapsed(&self) -> Duration;
}
