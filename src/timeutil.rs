//! Local-calendar helpers. Slot boundaries and payment deadlines are
//! expressed in local wall-clock time, never UTC, so everything here works
//! on naive dates and times.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parses an `HH:MM` wall-clock time.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Parses a local datetime, with or without seconds (`YYYY-MM-DDTHH:MM[:SS]`).
pub fn parse_local_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Month key (`YYYY-MM`) of a local instant. Payment records and deadlines
/// are scoped by this key.
pub fn month_key(t: NaiveDateTime) -> String {
    format!("{:04}-{:02}", t.year(), t.month())
}

pub fn month_key_of(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Half-open bounds of a local calendar day: `[00:00, next day 00:00)`.
pub fn day_bounds(day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
    (start, start + Duration::days(1))
}

/// Half-open bounds spanning `[from, to]` inclusive of both boundary days.
pub fn range_bounds(from: NaiveDate, to: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (day_bounds(from).0, day_bounds(to).1)
}

/// Weekday index with Sunday = 0 .. Saturday = 6.
pub fn weekday_index(day: NaiveDate) -> u8 {
    day.weekday().num_days_from_sunday() as u8
}

/// Tiles `[start, end)` of one day into consecutive `step_minutes` intervals.
/// A trailing interval that would overrun `end` is discarded; an empty or
/// inverted window tiles to nothing.
pub fn tile_day(
    day: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    step_minutes: i64,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    if step_minutes <= 0 {
        return Vec::new();
    }
    let step = Duration::minutes(step_minutes);
    let day_end = day.and_time(end);
    let mut cur = day.and_time(start);
    let mut intervals = Vec::new();
    while cur + step <= day_end {
        intervals.push((cur, cur + step));
        cur = cur + step;
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn parses_dates_and_times() {
        assert_eq!(date("2025-03-14"), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert!(parse_date("14/03/2025").is_none());
        assert_eq!(
            parse_time("09:30"),
            Some(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        );
        assert!(parse_time("25:00").is_none());
        assert!(parse_local_datetime("2025-03-14T09:30").is_some());
        assert!(parse_local_datetime("2025-03-14T09:30:15").is_some());
        assert!(parse_local_datetime("2025-03-14").is_none());
    }

    #[test]
    fn month_key_is_zero_padded() {
        let t = parse_local_datetime("2025-03-14T09:00").unwrap();
        assert_eq!(month_key(t), "2025-03");
        assert_eq!(month_key_of(2025, 3), "2025-03");
        assert_eq!(month_key_of(2025, 11), "2025-11");
    }

    #[test]
    fn day_bounds_are_half_open() {
        let (from, to) = day_bounds(date("2025-03-14"));
        assert_eq!(from, parse_local_datetime("2025-03-14T00:00").unwrap());
        assert_eq!(to, parse_local_datetime("2025-03-15T00:00").unwrap());
    }

    #[test]
    fn range_bounds_include_both_boundary_days() {
        let (from, to) = range_bounds(date("2025-03-14"), date("2025-03-16"));
        assert_eq!(from, parse_local_datetime("2025-03-14T00:00").unwrap());
        assert_eq!(to, parse_local_datetime("2025-03-17T00:00").unwrap());
    }

    #[test]
    fn weekday_index_starts_at_sunday() {
        // 2025-03-16 is a Sunday.
        assert_eq!(weekday_index(date("2025-03-16")), 0);
        assert_eq!(weekday_index(date("2025-03-17")), 1);
        assert_eq!(weekday_index(date("2025-03-22")), 6);
    }

    #[test]
    fn tile_day_discards_trailing_partial_interval() {
        let tiles = tile_day(
            date("2025-03-14"),
            parse_time("09:00").unwrap(),
            parse_time("09:45").unwrap(),
            30,
        );
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].0, parse_local_datetime("2025-03-14T09:00").unwrap());
        assert_eq!(tiles[0].1, parse_local_datetime("2025-03-14T09:30").unwrap());
    }

    #[test]
    fn tile_day_empty_window_yields_nothing() {
        let nine = parse_time("09:00").unwrap();
        assert!(tile_day(date("2025-03-14"), nine, nine, 30).is_empty());
        let eight = parse_time("08:00").unwrap();
        assert!(tile_day(date("2025-03-14"), nine, eight, 30).is_empty());
    }

    #[test]
    fn tile_day_exact_fit() {
        let tiles = tile_day(
            date("2025-03-14"),
            parse_time("09:00").unwrap(),
            parse_time("11:00").unwrap(),
            30,
        );
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[3].1, parse_local_datetime("2025-03-14T11:00").unwrap());
    }
}
