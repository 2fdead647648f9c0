//! Calendar breakdown of an event timestamp.

use crate::error::EtlError;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// The six calendar fields of the time dimension, all pure functions of
/// the epoch-millisecond `start_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParts {
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    /// ISO 8601 week number.
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Full English weekday name.
    pub weekday: String,
}

impl TimeParts {
    pub fn from_epoch_millis(millis: i64) -> Result<Self, EtlError> {
        let instant: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
            .ok_or(EtlError::TimestampOutOfRange(millis))?;
        Ok(TimeParts {
            start_time: millis,
            hour: instant.hour(),
            day: instant.day(),
            week: instant.iso_week().week(),
            month: instant.month(),
            year: instant.year(),
            weekday: instant.format("%A").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaks_down_a_known_timestamp() {
        // 2018-11-02T01:25:34.796Z, a Friday in ISO week 44.
        let parts = TimeParts::from_epoch_millis(1541121934796).unwrap();
        assert_eq!(
            parts,
            TimeParts {
                start_time: 1541121934796,
                hour: 1,
                day: 2,
                week: 44,
                month: 11,
                year: 2018,
                weekday: "Friday".to_string(),
            }
        );
    }

    #[test]
    fn iso_week_at_year_boundary() {
        // 2018-12-31 belongs to ISO week 1 of 2019.
        let parts = TimeParts::from_epoch_millis(1546214400000).unwrap();
        assert_eq!(parts.day, 31);
        assert_eq!(parts.month, 12);
        assert_eq!(parts.year, 2018);
        assert_eq!(parts.week, 1);
        assert_eq!(parts.weekday, "Monday");
    }

    #[test]
    fn out_of_range_timestamp_is_an_error() {
        let err = TimeParts::from_epoch_millis(i64::MAX).unwrap_err();
        assert!(matches!(err, EtlError::TimestampOutOfRange(_)));
    }
}
