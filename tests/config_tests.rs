use chrono::Weekday;
use spark_planner::{
    ConfigError, PlannerConfig, ProblemLevel, SettingsError, StorageBackend, StudyPlanner,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn full_config_parses() {
    let text = r#"
        rollover_hour = 22
        week_start = "Sun"

        [storage]
        kind = "json"
        dir = "/tmp/spark-data"

        [default_settings]
        levels = ["basic", "advanced"]
        reviewPeriodDays = 21
        reviewDays = ["Sat", "Sun"]
    "#;
    let config = PlannerConfig::from_toml_str(text).unwrap();
    assert_eq!(config.rollover_hour, 22);
    assert_eq!(config.week_start, Weekday::Sun);
    assert_eq!(
        config.storage,
        StorageBackend::Json {
            dir: "/tmp/spark-data".into()
        }
    );
    assert_eq!(config.default_settings.review_period_days, 21);
    assert!(config.default_settings.levels.contains(&ProblemLevel::Advanced));
    assert!(!config.default_settings.levels.contains(&ProblemLevel::Standard));
    assert_eq!(config.default_settings.review_days, vec![Weekday::Sat, Weekday::Sun]);
}

#[test]
fn settings_that_leave_no_study_day_are_rejected() {
    let text = r#"
        [default_settings]
        reviewDays = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
    "#;
    let err = PlannerConfig::from_toml_str(text).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Settings(SettingsError::NoStudyWeekday)
    ));
}

#[test]
fn unknown_backend_kind_is_a_parse_error() {
    let err = PlannerConfig::from_toml_str("[storage]\nkind = \"redis\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_reports_missing_file_path() {
    let err = PlannerConfig::load(std::path::Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.toml"));
}

#[test]
fn planner_opens_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "rollover_hour = 21").unwrap();
    writeln!(file, "[storage]").unwrap();
    writeln!(file, "kind = \"json\"").unwrap();
    writeln!(file, "dir = {:?}", dir.path().display().to_string()).unwrap();
    file.flush().unwrap();

    let config = PlannerConfig::load(file.path()).unwrap();
    let planner = StudyPlanner::open(&config).unwrap();
    assert_eq!(planner.rollover().hour(), 21);
    assert!(planner.store().is_empty());
    assert_eq!(planner.catalog().len(), 94);
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_backend_opens() {
    let file = NamedTempFile::new().unwrap();
    let config = PlannerConfig::default().with_storage(StorageBackend::Sqlite {
        path: file.path().to_path_buf(),
    });
    let planner = StudyPlanner::open(&config).unwrap();
    assert!(planner.store().is_empty());
}
