use crate::calendar::StudyCalendar;
use crate::problem::{AttemptStatus, ProblemLevel};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Status buckets a plan revision may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeSelector {
    Unsolved,
    Incorrect,
    Partial,
    Complete,
}

impl RangeSelector {
    pub fn matches(&self, status: Option<AttemptStatus>) -> bool {
        matches!(
            (self, status),
            (RangeSelector::Unsolved, None)
                | (RangeSelector::Incorrect, Some(AttemptStatus::Incorrect))
                | (RangeSelector::Partial, Some(AttemptStatus::Partial))
                | (RangeSelector::Complete, Some(AttemptStatus::Complete))
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemRange(pub BTreeSet<RangeSelector>);

impl ProblemRange {
    pub fn new<I>(selectors: I) -> Self
    where
        I: IntoIterator<Item = RangeSelector>,
    {
        Self(selectors.into_iter().collect())
    }

    /// Whether a problem with `status` belongs to the range. An empty range admits nothing.
    pub fn admits(&self, status: Option<AttemptStatus>) -> bool {
        self.0.iter().any(|selector| selector.matches(status))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("at least one problem level must be selected")]
    EmptyLevels,
    #[error("review days cover the whole week, leaving no study day")]
    NoStudyWeekday,
    #[error("review period must be at least one day, got {0}")]
    InvalidReviewPeriod(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleSettings {
    pub levels: BTreeSet<ProblemLevel>,
    pub review_period_days: u32,
    pub review_days: Vec<Weekday>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_range: Option<ProblemRange>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            levels: ProblemLevel::ALL.into_iter().collect(),
            review_period_days: 14,
            review_days: vec![Weekday::Sun],
            problem_range: None,
        }
    }
}

impl ScheduleSettings {
    pub fn with_levels<I>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = ProblemLevel>,
    {
        self.levels = levels.into_iter().collect();
        self
    }

    pub fn with_review_days(mut self, days: Vec<Weekday>) -> Self {
        self.review_days = normalize_weekdays(days);
        self
    }

    pub fn with_review_period(mut self, days: u32) -> Self {
        self.review_period_days = days;
        self
    }

    pub fn with_range(mut self, range: ProblemRange) -> Self {
        self.problem_range = Some(range);
        self
    }

    /// Checks meant for the settings form. The engine tolerates every failure listed here.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.levels.is_empty() {
            return Err(SettingsError::EmptyLevels);
        }
        if self.review_period_days == 0 {
            return Err(SettingsError::InvalidReviewPeriod(self.review_period_days));
        }
        if !self.calendar().has_study_weekday() {
            return Err(SettingsError::NoStudyWeekday);
        }
        Ok(())
    }

    pub fn calendar(&self) -> StudyCalendar {
        StudyCalendar::with_review_days(self.review_days.iter().copied())
    }

    /// Last day of a window of `review_period_days` starting on `start`.
    pub fn window_end(&self, start: NaiveDate) -> NaiveDate {
        let span = u64::from(self.review_period_days.max(1) - 1);
        start
            .checked_add_days(chrono::Days::new(span))
            .unwrap_or(NaiveDate::MAX)
    }
}

fn normalize_weekdays(mut days: Vec<Weekday>) -> Vec<Weekday> {
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_every_level_and_sunday_review() {
        let settings = ScheduleSettings::default();
        assert_eq!(settings.levels.len(), 3);
        assert_eq!(settings.review_days, vec![Weekday::Sun]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validation_reports_first_problem() {
        let empty = ScheduleSettings::default().with_levels(Vec::<ProblemLevel>::new());
        assert_eq!(empty.validate(), Err(SettingsError::EmptyLevels));

        let all_review = ScheduleSettings::default().with_review_days(StudyCalendar::ALL_WEEKDAYS.to_vec());
        assert_eq!(all_review.validate(), Err(SettingsError::NoStudyWeekday));

        let zero = ScheduleSettings::default().with_review_period(0);
        assert_eq!(zero.validate(), Err(SettingsError::InvalidReviewPeriod(0)));
    }

    #[test]
    fn review_days_are_sorted_and_deduplicated() {
        let settings = ScheduleSettings::default()
            .with_review_days(vec![Weekday::Sun, Weekday::Sat, Weekday::Sun]);
        assert_eq!(settings.review_days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn range_admits_matching_statuses() {
        let range = ProblemRange::new([RangeSelector::Unsolved, RangeSelector::Incorrect]);
        assert!(range.admits(None));
        assert!(range.admits(Some(AttemptStatus::Incorrect)));
        assert!(!range.admits(Some(AttemptStatus::Complete)));
        assert!(!ProblemRange::default().admits(None));
    }

    #[test]
    fn window_end_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 5, 19).unwrap();
        let settings = ScheduleSettings::default().with_review_period(10);
        assert_eq!(settings.window_end(start), NaiveDate::from_ymd_opt(2025, 5, 28).unwrap());
        assert_eq!(settings.clone().with_review_period(0).window_end(start), start);
    }

    #[test]
    fn settings_round_trip_as_camel_case() {
        let settings = ScheduleSettings::default()
            .with_range(ProblemRange::new([RangeSelector::Partial]));
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["reviewPeriodDays"], 14);
        assert_eq!(value["problemRange"], serde_json::json!(["partial"]));
        let back: ScheduleSettings = serde_json::from_value(value).unwrap();
        assert_eq!(back, settings);
    }
}
