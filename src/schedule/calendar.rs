use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

/// Monday through Friday.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Move `date` back to the first day of its week.
pub fn align_to_week_start(date: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let offset = match week_start {
        WeekStart::Monday => date.weekday().num_days_from_monday(),
        WeekStart::Sunday => date.weekday().num_days_from_sunday(),
    };
    date - Duration::days(offset as i64)
}

/// Inclusive range of calendar days shown in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(RosterError::validation(format!(
                "date range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// `days` consecutive days starting at `start`. Zero days yields a single day.
    pub fn from_days(start: NaiveDate, days: u32) -> Self {
        let span = days.saturating_sub(1) as i64;
        Self {
            start,
            end: start + Duration::days(span),
        }
    }

    /// Whole weeks starting at the week containing `anchor`.
    pub fn weeks(anchor: NaiveDate, weeks: u32, week_start: WeekStart) -> Self {
        Self::from_days(align_to_week_start(anchor, week_start), weeks.max(1) * 7)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len() as i64).map(move |i| start + Duration::days(i))
    }

    pub fn weekdays(&self) -> impl Iterator<Item = NaiveDate> {
        self.days().filter(|d| is_weekday(*d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn weekday_classification() {
        assert!(is_weekday(date("2025-08-18"))); // Monday
        assert!(is_weekday(date("2025-08-22"))); // Friday
        assert!(!is_weekday(date("2025-08-23")));
        assert!(!is_weekday(date("2025-08-24")));
    }

    #[test]
    fn align_monday_and_sunday() {
        let wed = date("2025-08-20");
        assert_eq!(align_to_week_start(wed, WeekStart::Monday), date("2025-08-18"));
        assert_eq!(align_to_week_start(wed, WeekStart::Sunday), date("2025-08-17"));
        let sun = date("2025-08-24");
        assert_eq!(align_to_week_start(sun, WeekStart::Monday), date("2025-08-18"));
        assert_eq!(align_to_week_start(sun, WeekStart::Sunday), sun);
    }

    #[test]
    fn two_weeks_have_ten_weekdays() {
        let range = DateRange::weeks(date("2025-08-20"), 2, WeekStart::Monday);
        assert_eq!(range.start, date("2025-08-18"));
        assert_eq!(range.end, date("2025-08-31"));
        assert_eq!(range.len(), 14);
        assert_eq!(range.weekdays().count(), 10);
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(DateRange::new(date("2025-08-20"), date("2025-08-19")).is_err());
    }

    #[test]
    fn single_day_range() {
        let range = DateRange::from_days(date("2025-08-18"), 0);
        assert_eq!(range.len(), 1);
        assert!(range.contains(date("2025-08-18")));
        assert!(!range.contains(date("2025-08-19")));
    }
}
