//! Automatic backup scheduling rules.
//!
//! The scheduler loop asks [`is_backup_due`] on every tick. A backup is due
//! when the most recent automatic backup predates the latest schedule slot.

use chrono::{Datelike, Duration, NaiveTime, Timelike};

use crate::error::CoreError;
use crate::types::Timestamp;

pub const FREQUENCY_HOURLY: &str = "hourly";
pub const FREQUENCY_DAILY: &str = "daily";
pub const FREQUENCY_WEEKLY: &str = "weekly";

/// All valid backup frequencies.
pub const VALID_FREQUENCIES: &[&str] = &[FREQUENCY_HOURLY, FREQUENCY_DAILY, FREQUENCY_WEEKLY];

/// Name prefix given to backups started by the scheduler.
pub const AUTO_BACKUP_PREFIX: &str = "auto_";

/// Validate that a frequency string is one of the known values.
pub fn validate_frequency(frequency: &str) -> Result<(), CoreError> {
    if VALID_FREQUENCIES.contains(&frequency) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown backup frequency: '{frequency}'. Valid values: {}",
            VALID_FREQUENCIES.join(", ")
        )))
    }
}

/// Validate an hour-of-day value (0-23).
pub fn validate_hour(hour: i32) -> Result<(), CoreError> {
    if (0..=23).contains(&hour) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Backup hour must be between 0 and 23, got {hour}"
        )))
    }
}

/// The most recent schedule slot at or before `now`.
///
/// - `hourly`: the top of the current hour (`hour` is ignored).
/// - `daily`: `hour:00` today, or yesterday if that is still ahead.
/// - `weekly`: `hour:00` on the most recent Monday at or before `now`.
pub fn latest_slot(frequency: &str, hour: i32, now: Timestamp) -> Result<Timestamp, CoreError> {
    validate_frequency(frequency)?;
    validate_hour(hour)?;

    if frequency == FREQUENCY_HOURLY {
        let top = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .ok_or_else(|| CoreError::Internal("failed to truncate timestamp".into()))?;
        return Ok(top);
    }

    let at_hour = NaiveTime::from_hms_opt(hour as u32, 0, 0)
        .ok_or_else(|| CoreError::Validation(format!("invalid hour {hour}")))?;
    let mut slot = now.date_naive().and_time(at_hour).and_utc();
    if slot > now {
        slot -= Duration::days(1);
    }

    if frequency == FREQUENCY_WEEKLY {
        let back = i64::from(slot.weekday().num_days_from_monday());
        slot -= Duration::days(back);
    }

    Ok(slot)
}

/// Whether an automatic backup should start at `now`.
pub fn is_backup_due(
    frequency: &str,
    hour: i32,
    last_automatic: Option<Timestamp>,
    now: Timestamp,
) -> Result<bool, CoreError> {
    let slot = latest_slot(frequency, hour, now)?;
    Ok(last_automatic.map_or(true, |last| last < slot))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn unknown_frequency_is_rejected() {
        assert!(validate_frequency("monthly").is_err());
        assert!(is_backup_due("monthly", 2, None, at(2026, 10, 18, 3, 0)).is_err());
    }

    #[test]
    fn hour_out_of_range_is_rejected() {
        assert!(validate_hour(24).is_err());
        assert!(validate_hour(-1).is_err());
        assert!(validate_hour(0).is_ok());
    }

    #[test]
    fn first_backup_is_always_due() {
        for freq in VALID_FREQUENCIES {
            assert!(is_backup_due(freq, 2, None, at(2026, 10, 18, 3, 0)).unwrap());
        }
    }

    #[test]
    fn hourly_slot_is_top_of_hour() {
        let now = at(2026, 10, 18, 14, 37);
        assert_eq!(latest_slot("hourly", 0, now).unwrap(), at(2026, 10, 18, 14, 0));
        assert!(!is_backup_due("hourly", 0, Some(at(2026, 10, 18, 14, 5)), now).unwrap());
        assert!(is_backup_due("hourly", 0, Some(at(2026, 10, 18, 13, 59)), now).unwrap());
    }

    #[test]
    fn daily_before_hour_uses_yesterday() {
        let now = at(2026, 10, 18, 1, 30);
        assert_eq!(latest_slot("daily", 2, now).unwrap(), at(2026, 10, 17, 2, 0));
        // Backed up yesterday after the slot: not due until 02:00 today.
        assert!(!is_backup_due("daily", 2, Some(at(2026, 10, 17, 2, 1)), now).unwrap());
    }

    #[test]
    fn daily_after_hour_is_due_once() {
        let now = at(2026, 10, 18, 2, 10);
        assert!(is_backup_due("daily", 2, Some(at(2026, 10, 17, 2, 1)), now).unwrap());
        assert!(!is_backup_due("daily", 2, Some(at(2026, 10, 18, 2, 1)), now).unwrap());
    }

    #[test]
    fn weekly_slot_is_most_recent_monday() {
        // 2026-10-18 is a Sunday; the previous Monday is 2026-10-12.
        let now = at(2026, 10, 18, 9, 0);
        assert_eq!(latest_slot("weekly", 2, now).unwrap(), at(2026, 10, 12, 2, 0));
        assert!(!is_backup_due("weekly", 2, Some(at(2026, 10, 13, 0, 0)), now).unwrap());
        assert!(is_backup_due("weekly", 2, Some(at(2026, 10, 11, 23, 0)), now).unwrap());
    }
}
