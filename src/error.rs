use std::io;

/// Failures of the time-keeping core.
///
/// None of these are fatal: network errors are retried by the scheduler at the
/// error interval, and `UnknownTime` is rendered as [`crate::format::TIME_UNKNOWN`].
#[derive(thiserror::Error, Debug)]
pub enum TimeSyncError {
    #[error("Failed to send NTP request to {server}: {source}")]
    NetworkSend {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("No NTP reply from {server} within {timeout_ms}ms")]
    NetworkTimeout { server: String, timeout_ms: u64 },

    #[error("Malformed NTP reply ({len} bytes, expected {expected})")]
    MalformedPacket { len: usize, expected: usize },

    #[error("Time Unknown")]
    UnknownTime,
}

impl TimeSyncError {
    pub(crate) fn send(server: &str, source: io::Error) -> Self {
        TimeSyncError::NetworkSend {
            server: server.to_string(),
            source,
        }
    }
}
