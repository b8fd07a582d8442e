//! Calendar bucketing in the practice's local time
//!
//! Streaks and quest periods are defined on local calendar days:
//! - Day keys: "YYYY-MM-DD"
//! - Week keys: ISO weeks, "YYYY-Www" (weeks start on Monday)

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};

/// Build the practice offset from minutes east of UTC (invalid values fall back to UTC)
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Convert Unix milliseconds to local time
pub fn local_datetime(timestamp_ms: i64, offset: FixedOffset) -> DateTime<FixedOffset> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_else(Utc::now)
        .with_timezone(&offset)
}

/// Local calendar day key for a timestamp
pub fn day_key(timestamp_ms: i64, offset: FixedOffset) -> String {
    local_datetime(timestamp_ms, offset)
        .format("%Y-%m-%d")
        .to_string()
}

/// ISO week key for a timestamp
pub fn week_key(timestamp_ms: i64, offset: FixedOffset) -> String {
    let week = local_datetime(timestamp_ms, offset).iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

/// Local hour of day (0-23)
pub fn local_hour(timestamp_ms: i64, offset: FixedOffset) -> u32 {
    local_datetime(timestamp_ms, offset).hour()
}

/// Parse a day key back to a date
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Whole calendar days from `earlier` to `later` (negative if reversed)
pub fn days_between(earlier: &str, later: &str) -> Option<i64> {
    Some((parse_day_key(later)? - parse_day_key(earlier)?).num_days())
}

/// Unix milliseconds of local midnight starting `date`
fn local_midnight_ms(date: NaiveDate, offset: FixedOffset) -> i64 {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    naive.and_utc().timestamp_millis() - i64::from(offset.local_minus_utc()) * 1000
}

/// Start of the local day following `timestamp_ms`
pub fn end_of_day_ms(timestamp_ms: i64, offset: FixedOffset) -> i64 {
    let date = local_datetime(timestamp_ms, offset).date_naive();
    local_midnight_ms(date + Duration::days(1), offset)
}

/// Start of the local ISO week following `timestamp_ms`
pub fn end_of_week_ms(timestamp_ms: i64, offset: FixedOffset) -> i64 {
    let date = local_datetime(timestamp_ms, offset).date_naive();
    let days_to_monday = 7 - i64::from(date.weekday().num_days_from_monday());
    local_midnight_ms(date + Duration::days(days_to_monday), offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-10-19 (a Monday) 12:00:00 UTC
    const MONDAY_NOON: i64 = 1_792_411_200_000;

    #[test]
    fn test_day_key() {
        assert_eq!(day_key(MONDAY_NOON, offset_from_minutes(0)), "2026-10-19");
        // 12:00 UTC is already Tuesday in UTC+13
        assert_eq!(day_key(MONDAY_NOON, offset_from_minutes(13 * 60)), "2026-10-20");
        // ...and still Monday morning in UTC-3
        assert_eq!(day_key(MONDAY_NOON, offset_from_minutes(-180)), "2026-10-19");
    }

    #[test]
    fn test_week_key() {
        assert_eq!(week_key(MONDAY_NOON, offset_from_minutes(0)), "2026-W43");
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between("2026-10-18", "2026-10-19"), Some(1));
        assert_eq!(days_between("2026-10-19", "2026-10-19"), Some(0));
        assert_eq!(days_between("2026-02-27", "2026-03-02"), Some(3));
        assert_eq!(days_between("garbage", "2026-03-02"), None);
    }

    #[test]
    fn test_period_ends() {
        let utc = offset_from_minutes(0);
        assert_eq!(end_of_day_ms(MONDAY_NOON, utc), MONDAY_NOON + 12 * 3_600_000);
        assert_eq!(
            end_of_week_ms(MONDAY_NOON, utc),
            MONDAY_NOON + 12 * 3_600_000 + 6 * 86_400_000
        );

        // UTC-3: local midnight is 03:00 UTC
        let brt = offset_from_minutes(-180);
        assert_eq!(end_of_day_ms(MONDAY_NOON, brt), MONDAY_NOON + 15 * 3_600_000);
    }

    #[test]
    fn test_local_hour() {
        assert_eq!(local_hour(MONDAY_NOON, offset_from_minutes(-180)), 9);
    }
}
