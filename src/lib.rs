pub mod calendar;
pub mod catalog;
pub mod config;
pub mod date_safety;
pub mod distributor;
pub mod error;
pub mod persistence;
pub mod planner;
pub mod postpone;
pub mod problem;
pub mod settings;
pub mod store;
pub mod sync_bus;
pub mod task;
pub(crate) mod task_validation;
pub mod views;

pub use calendar::StudyCalendar;
pub use catalog::{CatalogCounts, CatalogShape, CatalogState, ChapterSummary, ProblemCatalog};
pub use config::{ConfigError, PlannerConfig, StorageBackend};
pub use date_safety::{DateError, DateInput, days_between, normalize, same_day};
pub use distributor::{
    DayAssignment, Distribution, DistributionError, EmptyEligibleSet, TaskDistributor,
};
pub use error::{PlannerError, PlannerResult};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteRecordStore;
pub use persistence::{
    JsonFileRecordStore, MemoryRecordStore, PersistenceError, RecordStore, load_tasks_from_csv,
    save_tasks_to_csv,
};
pub use planner::{PlanOutcome, StudyPlanner};
pub use postpone::{PostponeBatch, PostponementEngine, RolloverCheck};
pub use problem::{AttemptStatus, Problem, ProblemKey, ProblemLevel};
pub use settings::{ProblemRange, RangeSelector, ScheduleSettings, SettingsError};
pub use store::{ReplaceSummary, StoreError, StoreResult, TaskStatistics, TaskStore};
pub use sync_bus::{ChangeHint, DirtyFlag, Notification, PublishHold, Subscription, SyncBus, Topic};
pub use task::{NewTask, ScheduledTask, TaskOrigin, TaskPatch};
pub use task_validation::TaskValidationError;
