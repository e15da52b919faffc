// libs/doctor-cell/src/timezone.rs
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

// Zones without daylight saving, so a fixed offset is exact all year.
const SUPPORTED_TIMEZONES: [(&str, i32); 9] = [
    ("UTC", 0),
    ("Asia/Kolkata", 330),
    ("Asia/Calcutta", 330),
    ("Asia/Kathmandu", 345),
    ("Asia/Dhaka", 360),
    ("Asia/Colombo", 330),
    ("Asia/Dubai", 240),
    ("Asia/Singapore", 480),
    ("Asia/Karachi", 300),
];

pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

pub fn utc_offset(timezone: &str) -> Option<FixedOffset> {
    SUPPORTED_TIMEZONES
        .iter()
        .find(|(name, _)| *name == timezone)
        .and_then(|(_, minutes)| FixedOffset::east_opt(minutes * 60))
}

pub fn is_valid_timezone(timezone: &str) -> bool {
    utc_offset(timezone).is_some()
}

/// Converts a wall-clock time on `date` in `offset` to UTC.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kolkata_offset() {
        let offset = utc_offset("Asia/Kolkata").unwrap();
        let utc = local_to_utc(
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            offset,
        ).unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-06-03T04:30:00+00:00");
    }

    #[test]
    fn test_unknown_zone() {
        assert!(!is_valid_timezone("America/New_York"));
        assert!(is_valid_timezone("UTC"));
    }
}
