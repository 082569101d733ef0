//! Calendar arithmetic for timeline requests
//!
//! A request covers an inclusive [`DateWindow`]. Transit fetches are
//! decomposed into calendar months ([`MonthKey`]), and each month is only
//! fetched for the part of it that the window actually touches.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::{Result, TransitError};

// =============================================================================
// Date Window
// =============================================================================

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

/// Unchecked wire shape of a [`DateWindow`]
#[derive(Deserialize)]
struct RawWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawWindow> for DateWindow {
    type Error = TransitError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        DateWindow::new(raw.start, raw.end)
    }
}

impl DateWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(TransitError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the window
    pub fn day_count(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Overlap of two windows, if any
    pub fn intersect(&self, other: &DateWindow) -> Option<DateWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateWindow { start, end })
    }

    /// Every day in the window, in chronological order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.day_count() as i64).map(move |offset| start + Duration::days(offset))
    }

    /// Every calendar month intersecting the window, in chronological order
    pub fn months(&self) -> Vec<MonthKey> {
        let mut months = Vec::new();
        let mut current = MonthKey::of(self.start);
        let last = MonthKey::of(self.end);
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// Keep only items whose day falls inside the window
    pub fn retain<T>(&self, items: Vec<T>, day_of: impl Fn(&T) -> NaiveDate) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| self.contains(day_of(item)))
            .collect()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// =============================================================================
// Month Key
// =============================================================================

/// A calendar month, rendered as `yyyy-mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonthKey")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawMonthKey {
    year: i32,
    month: u32,
}

impl TryFrom<RawMonthKey> for MonthKey {
    type Error = TransitError;

    fn try_from(raw: RawMonthKey) -> Result<Self> {
        MonthKey::new(raw.year, raw.month).ok_or_else(|| {
            TransitError::invalid_config(format!("invalid month {}-{}", raw.year, raw.month))
        })
    }
}

impl MonthKey {
    /// Build from year and month (1-12)
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// Month containing `day`
    pub fn of(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    /// The whole month as a window
    pub fn bounds(&self) -> DateWindow {
        DateWindow {
            start: self.first_day(),
            end: self.last_day(),
        }
    }

    /// Following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = TransitError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || TransitError::invalid_config(format!("invalid month key '{value}'"));
        let (year, month) = value.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

/// Parse an ISO `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| TransitError::invalid_config(format!("invalid date '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_rejects_reversed_range() {
        let err = DateWindow::new(day(2025, 2, 10), day(2025, 1, 15)).unwrap_err();
        assert!(matches!(err, TransitError::InvalidRange { .. }));
    }

    #[test]
    fn test_deserialized_window_is_validated() {
        let reversed =
            serde_json::from_str::<DateWindow>(r#"{"start":"2025-02-10","end":"2025-01-01"}"#);
        assert!(reversed.is_err());

        let window: DateWindow =
            serde_json::from_str(r#"{"start":"2025-01-01","end":"2025-02-10"}"#).unwrap();
        assert_eq!(window.day_count(), 41);
        let json = serde_json::to_string(&window).unwrap();
        assert_eq!(serde_json::from_str::<DateWindow>(&json).unwrap(), window);
    }

    #[test]
    fn test_deserialized_month_key_is_validated() {
        assert!(serde_json::from_str::<MonthKey>(r#"{"year":2025,"month":13}"#).is_err());
        assert!(serde_json::from_str::<MonthKey>(r#"{"year":2025,"month":0}"#).is_err());
        let key: MonthKey = serde_json::from_str(r#"{"year":2025,"month":12}"#).unwrap();
        assert_eq!(key.to_string(), "2025-12");
    }

    #[test]
    fn test_single_day_window() {
        let window = DateWindow::new(day(2025, 1, 15), day(2025, 1, 15)).unwrap();
        assert_eq!(window.day_count(), 1);
        assert_eq!(window.months(), vec![MonthKey::of(day(2025, 1, 15))]);
    }

    #[test]
    fn test_months_cross_year_boundary() {
        let window = DateWindow::new(day(2024, 11, 20), day(2025, 2, 3)).unwrap();
        let months: Vec<String> = window.months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn test_month_bounds_handle_leap_years() {
        assert_eq!(MonthKey::new(2024, 2).unwrap().last_day(), day(2024, 2, 29));
        assert_eq!(MonthKey::new(2025, 2).unwrap().last_day(), day(2025, 2, 28));
        assert_eq!(MonthKey::new(2025, 12).unwrap().last_day(), day(2025, 12, 31));
    }

    #[test]
    fn test_intersection_clips_to_month() {
        let window = DateWindow::new(day(2025, 1, 15), day(2025, 2, 10)).unwrap();
        let january = MonthKey::new(2025, 1).unwrap().bounds();
        let february = MonthKey::new(2025, 2).unwrap().bounds();

        assert_eq!(
            window.intersect(&january),
            Some(DateWindow::new(day(2025, 1, 15), day(2025, 1, 31)).unwrap())
        );
        assert_eq!(
            window.intersect(&february),
            Some(DateWindow::new(day(2025, 2, 1), day(2025, 2, 10)).unwrap())
        );
        assert_eq!(window.intersect(&MonthKey::new(2025, 3).unwrap().bounds()), None);
    }

    #[test]
    fn test_days_are_chronological() {
        let window = DateWindow::new(day(2025, 2, 27), day(2025, 3, 2)).unwrap();
        let days: Vec<NaiveDate> = window.days().collect();
        assert_eq!(
            days,
            vec![day(2025, 2, 27), day(2025, 2, 28), day(2025, 3, 1), day(2025, 3, 2)]
        );
    }

    #[test]
    fn test_retain_filters_exact_window() {
        let window = DateWindow::new(day(2025, 1, 15), day(2025, 1, 16)).unwrap();
        let kept = window.retain(
            vec![day(2025, 1, 14), day(2025, 1, 15), day(2025, 1, 16), day(2025, 1, 17)],
            |d| *d,
        );
        assert_eq!(kept, vec![day(2025, 1, 15), day(2025, 1, 16)]);
    }

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2025-03".parse().unwrap();
        assert_eq!(key.to_string(), "2025-03");
        assert!("2025-3".parse::<MonthKey>().is_err());
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("march".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("2025-01-15").unwrap(), day(2025, 1, 15));
        assert!(parse_day("15/01/2025").is_err());
    }
}
