use crate::calendar::StudyCalendar;
use crate::date_safety;
use crate::problem::{Problem, ProblemKey};
use crate::task::NewTask;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributionError {
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

pub type DistributionResult<T> = Result<T, DistributionError>;

/// Why a distribution assigned nothing. Reported, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmptyEligibleSet {
    /// Level and range filters left no problem to schedule.
    NoProblems,
    /// Every day in the window is a review day or blacked out.
    NoStudyDays,
}

/// The batch of problems placed on one study day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayAssignment {
    pub date: NaiveDate,
    /// Section label of the first problem in the batch. Display only.
    pub label: String,
    pub problems: Vec<ProblemKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    /// One task per assigned problem, in day order, ready for the task store.
    pub tasks: Vec<NewTask>,
    pub days: Vec<DayAssignment>,
    pub per_day: usize,
    pub total_days: usize,
    pub study_days: usize,
    pub unassigned: usize,
    pub unassigned_problems: Vec<ProblemKey>,
    pub empty_reason: Option<EmptyEligibleSet>,
}

impl Distribution {
    pub fn assigned(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_complete(&self) -> bool {
        self.unassigned == 0
    }
}

/// Spreads an ordered problem list evenly over the study days of a window.
pub struct TaskDistributor<'a> {
    calendar: &'a StudyCalendar,
}

impl<'a> TaskDistributor<'a> {
    pub fn new(calendar: &'a StudyCalendar) -> Self {
        Self { calendar }
    }

    /// Assign `problems` to study days in `start..=end`.
    ///
    /// The per-day quota is `ceil(n / total_days)` where `total_days` counts every
    /// calendar day of the window, review days included. Problems left over when
    /// the window runs out are reported in `unassigned` rather than dropped.
    pub fn distribute(
        &self,
        problems: &[Problem],
        start: NaiveDate,
        end: NaiveDate,
    ) -> DistributionResult<Distribution> {
        if start > end {
            return Err(DistributionError::InvalidRange { start, end });
        }

        let total_days = usize::try_from(date_safety::days_between(start, end) + 1)
            .unwrap_or(usize::MAX)
            .max(1);
        let n = problems.len();
        let per_day = if n == 0 { 0 } else { n.div_ceil(total_days) };

        let mut tasks = Vec::with_capacity(n);
        let mut days = Vec::new();
        let mut study_days = 0usize;
        let mut cursor = 0usize;

        for date in start.iter_days().take_while(|date| *date <= end) {
            if !self.calendar.is_study_day(date) {
                continue;
            }
            study_days += 1;
            if cursor >= n {
                continue;
            }

            let batch = &problems[cursor..(cursor + per_day).min(n)];
            cursor += batch.len();
            let label = batch[0].section_label();
            for problem in batch {
                tasks.push(NewTask::for_problem(problem, date, label.clone()));
            }
            days.push(DayAssignment {
                date,
                label,
                problems: batch.iter().map(|problem| problem.key).collect(),
            });
        }

        let unassigned_problems: Vec<ProblemKey> =
            problems[cursor..].iter().map(|problem| problem.key).collect();
        let empty_reason = if n == 0 {
            Some(EmptyEligibleSet::NoProblems)
        } else if study_days == 0 {
            Some(EmptyEligibleSet::NoStudyDays)
        } else {
            None
        };

        if unassigned_problems.is_empty() {
            tracing::info!(
                assigned = tasks.len(),
                per_day,
                study_days,
                total_days,
                "distribution complete"
            );
        } else {
            tracing::warn!(
                assigned = tasks.len(),
                unassigned = unassigned_problems.len(),
                per_day,
                study_days,
                total_days,
                "distribution left problems unassigned"
            );
        }

        Ok(Distribution {
            tasks,
            days,
            per_day,
            total_days,
            study_days,
            unassigned: unassigned_problems.len(),
            unassigned_problems,
            empty_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemLevel;
    use chrono::Weekday;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn problems(n: u32) -> Vec<Problem> {
        (1..=n)
            .map(|id| {
                Problem::new(
                    ProblemKey::new(1, 1 + (id - 1) / 5, id),
                    "Sets and Functions",
                    format!("Section {}", 1 + (id - 1) / 5),
                    ProblemLevel::Basic,
                )
            })
            .collect()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let calendar = StudyCalendar::default();
        let err = TaskDistributor::new(&calendar)
            .distribute(&problems(3), d(2025, 5, 20), d(2025, 5, 19))
            .unwrap_err();
        assert_eq!(
            err,
            DistributionError::InvalidRange {
                start: d(2025, 5, 20),
                end: d(2025, 5, 19)
            }
        );
    }

    #[test]
    fn single_day_window_takes_everything() {
        let calendar = StudyCalendar::default();
        let result = TaskDistributor::new(&calendar)
            .distribute(&problems(7), d(2025, 5, 20), d(2025, 5, 20))
            .unwrap();
        assert_eq!(result.total_days, 1);
        assert_eq!(result.per_day, 7);
        assert_eq!(result.assigned(), 7);
        assert!(result.is_complete());
    }

    #[test]
    fn label_comes_from_first_problem_of_the_day() {
        let calendar = StudyCalendar::default();
        let result = TaskDistributor::new(&calendar)
            .distribute(&problems(8), d(2025, 5, 19), d(2025, 5, 20))
            .unwrap();
        assert_eq!(result.per_day, 4);
        assert_eq!(result.days[1].label, "Chapter 1.1 Section 1");
        assert!(result.tasks[4..].iter().all(|t| t.subject == "Chapter 1.1 Section 1"));
        assert_eq!(result.tasks[7].id.as_deref(), Some("spark-1-8"));
    }

    #[test]
    fn every_day_review_terminates_with_everything_unassigned() {
        let calendar = StudyCalendar::with_review_days(StudyCalendar::ALL_WEEKDAYS);
        let result = TaskDistributor::new(&calendar)
            .distribute(&problems(5), d(2025, 1, 1), d(2025, 12, 31))
            .unwrap();
        assert_eq!(result.assigned(), 0);
        assert_eq!(result.unassigned, 5);
        assert_eq!(result.empty_reason, Some(EmptyEligibleSet::NoStudyDays));
    }

    #[test]
    fn no_problems_is_reported_not_raised() {
        let calendar = StudyCalendar::with_review_days([Weekday::Sun]);
        let result = TaskDistributor::new(&calendar)
            .distribute(&[], d(2025, 5, 19), d(2025, 5, 25))
            .unwrap();
        assert_eq!(result.per_day, 0);
        assert_eq!(result.study_days, 6);
        assert_eq!(result.empty_reason, Some(EmptyEligibleSet::NoProblems));
    }
}
