//! Calendar-day handling for daily datasets.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{GeoError, GeoResult};

/// Parse a calendar day from "YYYY-MM-DD" or a full ISO 8601 timestamp.
///
/// Timestamps are truncated to their (UTC) date.
pub fn parse_day(s: &str) -> GeoResult<NaiveDate> {
    let s = s.trim();

    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(day);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc().date());
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ndt.date());
    }

    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y%m%d") {
        return Ok(day);
    }

    Err(GeoError::InvalidDate(s.to_string()))
}

/// An inclusive range of calendar days.
///
/// A range whose start lies after its end is empty rather than invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A query range: a missing end means the single day `start`.
    pub fn from_query(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        Self::new(start, end.unwrap_or(start))
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Number of days in the range (0 when empty).
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            ((self.end - self.start).num_days() + 1) as usize
        }
    }

    /// Every day in the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len() as i64).map(move |offset| start + chrono::Duration::days(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_day_formats() {
        assert_eq!(parse_day("2022-03-01").unwrap(), day(2022, 3, 1));
        assert_eq!(parse_day("2022-03-01T18:30:00Z").unwrap(), day(2022, 3, 1));
        assert_eq!(parse_day("2022-03-01T18:30:00").unwrap(), day(2022, 3, 1));
        assert_eq!(parse_day("20220301").unwrap(), day(2022, 3, 1));
        assert!(parse_day("March first").is_err());
    }

    #[test]
    fn test_day_range_iteration() {
        let range = DayRange::new(day(2022, 2, 27), day(2022, 3, 2));
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], day(2022, 2, 27));
        assert_eq!(days[3], day(2022, 3, 2));
    }

    #[test]
    fn test_reversed_range_is_empty() {
        let range = DayRange::new(day(2022, 3, 2), day(2022, 3, 1));
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.days().count(), 0);
    }

    #[test]
    fn test_from_query_defaults_to_single_day() {
        let range = DayRange::from_query(day(2023, 7, 1), None);
        assert_eq!(range.len(), 1);
        assert!(range.contains(day(2023, 7, 1)));
    }
}
