use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use log::debug;

use crate::bst::is_summer_time;
use crate::error::TimeSyncError;

/// Rendered in place of a timestamp when the clock has never synchronized.
pub const TIME_UNKNOWN: &str = "Time Unknown";

/// Any epoch before this year is treated as an unsynchronized clock.
pub const MIN_VALID_YEAR: i32 = 2021;

const BST_OFFSET_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStyle {
    /// `YYYYMMDD_HHMMSS_DDD`, sorts by time and is safe as a file basename.
    Filename,
    /// `DDD DD/MM/YYYY HH:MM:SS`
    Human,
}

impl TimeStyle {
    fn pattern(self) -> &'static str {
        match self {
            TimeStyle::Filename => "%Y%m%d_%H%M%S_%a",
            TimeStyle::Human => "%a %d/%m/%Y %H:%M:%S",
        }
    }
}

/// Renders a Unix epoch as UK civil time.
///
/// Fails with [`TimeSyncError::UnknownTime`] if the UTC year is before
/// [`MIN_VALID_YEAR`].
pub fn try_format(epoch: i64, style: TimeStyle) -> Result<String, TimeSyncError> {
    let utc: DateTime<Utc> =
        DateTime::from_timestamp(epoch, 0).ok_or(TimeSyncError::UnknownTime)?;

    if utc.year() < MIN_VALID_YEAR {
        return Err(TimeSyncError::UnknownTime);
    }

    let local = if is_summer_time(utc.year(), utc.month(), utc.day(), utc.hour()) {
        utc + Duration::seconds(BST_OFFSET_SECS)
    } else {
        utc
    };

    Ok(local.format(style.pattern()).to_string())
}

/// Like [`try_format`], but always yields a usable string.
pub fn format_time(epoch: Option<i64>, style: TimeStyle) -> String {
    let rendered = epoch
        .ok_or(TimeSyncError::UnknownTime)
        .and_then(|e| try_format(e, style));

    match rendered {
        Ok(s) => s,
        Err(e) => {
            debug!("Formatting {:?} as {:?}: {}", epoch, style, e);
            TIME_UNKNOWN.to_string()
        }
    }
}
