//! British Summer Time check.
//!
//! BST runs from 01:00 UTC on the last Sunday of March until 01:00 UTC on the last
//! Sunday of October. The last Sundays are found with the linear congruence
//! `31 - ((5 * year / 4 + k) % 7)`, which only holds for 1901 to 2099. Outside that
//! range it must be replaced with a calendar-accurate last-Sunday computation.
//! No other daylight-saving regime is supported.

/// Day of month of the last Sunday in March.
pub fn last_sunday_of_march(year: i32) -> u32 {
    (31 - (5 * year as i64 / 4 + 4) % 7) as u32
}

/// Day of month of the last Sunday in October.
pub fn last_sunday_of_october(year: i32) -> u32 {
    (31 - (5 * year as i64 / 4 + 1) % 7) as u32
}

/// Returns true if the given UTC calendar fields fall within British Summer Time.
pub fn is_summer_time(year: i32, month: u32, day: u32, hour: u32) -> bool {
    match month {
        4..=9 => true,
        3 => {
            let last_sunday = last_sunday_of_march(year);
            if day != last_sunday {
                return day > last_sunday;
            }
            hour >= 1
        }
        10 => {
            let last_sunday = last_sunday_of_october(year);
            if day != last_sunday {
                return day < last_sunday;
            }
            hour < 1
        }
        _ => false,
    }
}
