use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which calendar days may receive new problems.
///
/// A day is a study day unless its weekday is a review day or the date is
/// blacked out. Every query is bounded by its input range, so a calendar whose
/// every weekday is a review day is legal and simply has no study days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyCalendar {
    review_days: HashSet<Weekday>,
    blackout_dates: HashSet<NaiveDate>,
}

impl StudyCalendar {
    pub const ALL_WEEKDAYS: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn with_review_days<I>(review_days: I) -> Self
    where
        I: IntoIterator<Item = Weekday>,
    {
        Self {
            review_days: review_days.into_iter().collect(),
            blackout_dates: HashSet::new(),
        }
    }

    pub fn set_review_days(&mut self, days: Vec<Weekday>) {
        self.review_days = days.into_iter().collect();
    }

    /// Weekdays on which new problems may be assigned, Monday first.
    pub fn study_weekdays(&self) -> Vec<Weekday> {
        Self::ALL_WEEKDAYS
            .into_iter()
            .filter(|day| !self.review_days.contains(day))
            .collect()
    }

    pub fn has_study_weekday(&self) -> bool {
        Self::ALL_WEEKDAYS
            .iter()
            .any(|day| !self.review_days.contains(day))
    }

    pub fn is_review_day(&self, weekday: Weekday) -> bool {
        self.review_days.contains(&weekday)
    }

    /// Exclude a single date (exam day, trip) regardless of its weekday.
    pub fn add_blackout_date(&mut self, date: NaiveDate) {
        self.blackout_dates.insert(date);
    }

    pub fn add_blackout_dates(&mut self, dates: &[NaiveDate]) {
        self.blackout_dates.extend(dates);
    }

    pub fn is_study_day(&self, date: NaiveDate) -> bool {
        !self.blackout_dates.contains(&date) && !self.review_days.contains(&date.weekday())
    }

    /// First study day strictly after `from`, looking at most `horizon_days` ahead.
    pub fn next_study_day(&self, from: NaiveDate, horizon_days: u32) -> Option<NaiveDate> {
        let mut current = from;
        for _ in 0..horizon_days {
            current = current.succ_opt()?;
            if self.is_study_day(current) {
                return Some(current);
            }
        }
        None
    }

    /// Study days in `start..=end`, in order.
    pub fn study_days_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| self.is_study_day(*day))
            .collect()
    }

    pub fn count_study_days(&self, start: NaiveDate, end: NaiveDate) -> usize {
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| self.is_study_day(*day))
            .count()
    }
}
