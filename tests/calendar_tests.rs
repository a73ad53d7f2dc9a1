use chrono::{Datelike, NaiveDate, Weekday};
use spark_planner::StudyCalendar;
use spark_planner::settings::ScheduleSettings;

#[test]
fn default_settings_calendar_reserves_sunday() {
    let cal = ScheduleSettings::default().calendar();
    // 2025-01-05 is a Sunday, 2025-01-04 a Saturday
    let sat = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
    let sun = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
    assert!(cal.is_study_day(sat));
    assert!(!cal.is_study_day(sun));
    assert!(cal.is_review_day(Weekday::Sun));
}

#[test]
fn next_study_day_skips_weekend_review() {
    let cal = StudyCalendar::with_review_days([Weekday::Sat, Weekday::Sun]);
    let fri = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
    let next = cal.next_study_day(fri, 14).unwrap();
    assert_eq!(next.weekday(), Weekday::Mon);
    assert_eq!(next, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
}

#[test]
fn study_days_in_range_and_count_match() {
    let cal = StudyCalendar::with_review_days([Weekday::Wed]);
    let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(); // Mon
    let end = NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(); // Sun
    let days = cal.study_days_in_range(start, end);
    assert_eq!(days.len(), cal.count_study_days(start, end));
    assert_eq!(days.len(), 6);
    assert_eq!(days.first().copied(), Some(start));
    assert_eq!(days.last().copied(), Some(end));
    assert!(days.iter().all(|day| day.weekday() != Weekday::Wed));
}

#[test]
fn replacing_review_days_changes_study_weekdays() {
    let mut cal = StudyCalendar::default();
    assert_eq!(cal.study_weekdays().len(), 7);
    cal.set_review_days(vec![Weekday::Tue, Weekday::Thu]);
    assert_eq!(
        cal.study_weekdays(),
        vec![Weekday::Mon, Weekday::Wed, Weekday::Fri, Weekday::Sat, Weekday::Sun]
    );
}

#[test]
fn next_study_day_gives_up_after_horizon() {
    let mut cal = StudyCalendar::with_review_days([Weekday::Sat, Weekday::Sun]);
    let fri = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
    cal.add_blackout_date(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    assert_eq!(cal.next_study_day(fri, 3), None);
    assert_eq!(
        cal.next_study_day(fri, 4),
        NaiveDate::from_ymd_opt(2025, 1, 7)
    );
}
