//! Timestamp conversions for container metadata.
//!
//! Containers store modification times in different ways: tar headers
//! carry Unix seconds, zip entries carry MS-DOS date/time fields (local
//! calendar values with two-second resolution, years 1980-2107). This
//! module converts both to and from [`SystemTime`], treating DOS values as
//! UTC.
//!
//! # Example
//!
//! ```rust
//! use arcfs::timestamp::{DosDateTime, from_unix_secs, unix_secs};
//!
//! let t = from_unix_secs(1_700_000_000);
//! assert_eq!(unix_secs(t), 1_700_000_000);
//!
//! let dos = DosDateTime::from_system_time(t);
//! assert_eq!((dos.year, dos.month, dos.day), (2023, 11, 14));
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: i64 = 86_400;

/// Returns whole seconds since the Unix epoch, 0 for earlier times.
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Converts Unix seconds to a [`SystemTime`].
pub fn from_unix_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Converts a file timestamp read with `filetime` to a [`SystemTime`].
pub fn from_file_time(time: filetime::FileTime) -> SystemTime {
    let nanos = Duration::from_nanos(u64::from(time.nanoseconds()));
    match u64::try_from(time.unix_seconds()) {
        Ok(secs) => UNIX_EPOCH + Duration::from_secs(secs) + nanos,
        Err(_) => UNIX_EPOCH - Duration::from_secs(time.unix_seconds().unsigned_abs()) + nanos,
    }
}

/// Broken-down calendar time as stored in zip headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DosDateTime {
    /// Year, 1980-2107.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-58 in steps of two.
    pub second: u8,
}

impl DosDateTime {
    /// The earliest representable value, 1980-01-01 00:00:00.
    pub const MIN: DosDateTime = DosDateTime {
        year: 1980,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// The latest representable value, 2107-12-31 23:59:58.
    pub const MAX: DosDateTime = DosDateTime {
        year: 2107,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 58,
    };

    /// Converts a [`SystemTime`], clamping to the representable range and
    /// rounding seconds down to an even value.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = unix_secs(time) as i64;
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let rem = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::MAX;
        }
        Self {
            year: year as u16,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60 / 2 * 2) as u8,
        }
    }

    /// Converts back to a [`SystemTime`].
    pub fn to_system_time(&self) -> SystemTime {
        let days = days_from_civil(i64::from(self.year), self.month, self.day);
        let secs = days * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second);
        from_unix_secs(secs.max(0) as u64)
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let month = i64::from(month);
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Proleptic Gregorian date for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_time() {
        let time = filetime::FileTime::from_unix_time(1_700_000_000, 500);
        assert_eq!(
            from_file_time(time),
            UNIX_EPOCH + Duration::new(1_700_000_000, 500)
        );
        let before = filetime::FileTime::from_unix_time(-10, 0);
        assert_eq!(from_file_time(before), UNIX_EPOCH - Duration::from_secs(10));
    }

    #[test]
    fn test_unix_round_trip() {
        assert_eq!(unix_secs(from_unix_secs(0)), 0);
        assert_eq!(unix_secs(from_unix_secs(1_234_567_890)), 1_234_567_890);
    }

    #[test]
    fn test_pre_epoch_is_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(unix_secs(before), 0);
    }

    #[test]
    fn test_civil_conversions() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(civil_from_days(days_from_civil(2000, 2, 29)), (2000, 2, 29));
        assert_eq!(civil_from_days(days_from_civil(2107, 12, 31)), (2107, 12, 31));
    }

    #[test]
    fn test_dos_round_trip_even_seconds() {
        let t = from_unix_secs(1_700_000_000);
        let dos = DosDateTime::from_system_time(t);
        assert_eq!(
            dos,
            DosDateTime {
                year: 2023,
                month: 11,
                day: 14,
                hour: 22,
                minute: 13,
                second: 20,
            }
        );
        assert_eq!(dos.to_system_time(), t);
    }

    #[test]
    fn test_dos_rounds_odd_seconds_down() {
        let dos = DosDateTime::from_system_time(from_unix_secs(1_700_000_001));
        assert_eq!(dos.second, 20);
    }

    #[test]
    fn test_dos_clamps_range() {
        assert_eq!(DosDateTime::from_system_time(UNIX_EPOCH), DosDateTime::MIN);
        let far = from_unix_secs(5_000_000_000);
        assert_eq!(DosDateTime::from_system_time(far), DosDateTime::MAX);
    }
}
