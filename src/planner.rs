use crate::catalog::ProblemCatalog;
use crate::config::PlannerConfig;
use crate::date_safety::{self, DateError, DateInput};
use crate::distributor::{Distribution, TaskDistributor};
use crate::error::PlannerResult;
use crate::persistence::{MemoryRecordStore, RecordStore, SETTINGS_KEY};
use crate::postpone::{PostponeBatch, PostponementEngine, RolloverCheck};
use crate::problem::{AttemptStatus, Problem};
use crate::settings::{ProblemRange, ScheduleSettings};
use crate::store::{ReplaceSummary, TaskStore};
use crate::sync_bus::SyncBus;
use crate::task::{ScheduledTask, TaskPatch, scheduler_task_id};
use crate::views::{LiveView, ViewKind};
use chrono::{NaiveDate, NaiveDateTime, Utc, Weekday};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOutcome {
    pub distribution: Distribution,
    /// `None` when the distribution was empty and the store was left alone.
    pub replaced: Option<ReplaceSummary>,
}

impl PlanOutcome {
    pub fn assigned(&self) -> usize {
        self.distribution.assigned()
    }

    pub fn unassigned(&self) -> usize {
        self.distribution.unassigned
    }
}

/// Entry point tying the catalog, the task store and the bus together.
pub struct StudyPlanner {
    store: Arc<TaskStore>,
    catalog: Arc<ProblemCatalog>,
    bus: SyncBus,
    backend: Arc<dyn RecordStore>,
    settings: RwLock<ScheduleSettings>,
    rollover: RolloverCheck,
    week_start: Weekday,
}

impl StudyPlanner {
    /// Open the configured backend and load tasks, catalog state and settings from it.
    pub fn open(config: &PlannerConfig) -> PlannerResult<Self> {
        config.validate()?;
        let backend = config.storage.open()?;
        Self::with_backend(config, backend)
    }

    /// Like [`StudyPlanner::open`], over a record store the caller already holds.
    /// `config.storage` is not consulted.
    pub fn with_backend(config: &PlannerConfig, backend: Arc<dyn RecordStore>) -> PlannerResult<Self> {
        config.validate()?;
        let bus = SyncBus::new();
        let store = TaskStore::with_backend(bus.clone(), backend.clone())?;
        let catalog = ProblemCatalog::seeded(bus.clone()).with_backend(backend.clone())?;
        let settings = load_settings(backend.as_ref(), &config.default_settings)?;
        tracing::info!(
            backend = config.storage.name(),
            tasks = store.len(),
            problems = catalog.len(),
            "planner opened"
        );
        Ok(Self {
            store: Arc::new(store),
            catalog: Arc::new(catalog),
            bus,
            backend,
            settings: RwLock::new(settings),
            rollover: RolloverCheck::new(config.rollover_hour),
            week_start: config.week_start,
        })
    }

    /// A planner over the seed catalog that keeps nothing beyond the process.
    pub fn in_memory() -> Self {
        let bus = SyncBus::new();
        Self {
            store: Arc::new(TaskStore::new(bus.clone())),
            catalog: Arc::new(ProblemCatalog::seeded(bus.clone())),
            bus,
            backend: Arc::new(MemoryRecordStore::new()),
            settings: RwLock::new(ScheduleSettings::default()),
            rollover: RolloverCheck::default(),
            week_start: Weekday::Mon,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<ProblemCatalog> {
        &self.catalog
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn settings(&self) -> ScheduleSettings {
        self.settings.read().clone()
    }

    pub fn rollover(&self) -> RolloverCheck {
        self.rollover
    }

    pub fn save_settings(&self, settings: &ScheduleSettings) -> PlannerResult<()> {
        self.backend
            .save_record(SETTINGS_KEY, &serde_json::to_value(settings)?)?;
        *self.settings.write() = settings.clone();
        Ok(())
    }

    /// Create a plan over `start..=end` from every problem at the selected levels.
    pub fn plan(
        &self,
        start: impl Into<DateInput>,
        end: impl Into<DateInput>,
        settings: &ScheduleSettings,
    ) -> PlannerResult<PlanOutcome> {
        let (start, end) = (required_date(start)?, required_date(end)?);
        self.run_plan(start, end, settings, None)
    }

    /// [`StudyPlanner::plan`] over a window of `review_period_days` starting at `start`.
    pub fn plan_from(
        &self,
        start: impl Into<DateInput>,
        settings: &ScheduleSettings,
    ) -> PlannerResult<PlanOutcome> {
        let start = required_date(start)?;
        self.run_plan(start, settings.window_end(start), settings, None)
    }

    /// Re-plan restricted to problems whose status the settings' range admits.
    /// Without a range every status is eligible.
    pub fn revise_plan(
        &self,
        start: impl Into<DateInput>,
        end: impl Into<DateInput>,
        settings: &ScheduleSettings,
    ) -> PlannerResult<PlanOutcome> {
        let (start, end) = (required_date(start)?, required_date(end)?);
        self.run_plan(start, end, settings, settings.problem_range.as_ref())
    }

    fn run_plan(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        settings: &ScheduleSettings,
        range: Option<&ProblemRange>,
    ) -> PlannerResult<PlanOutcome> {
        let problems = self.catalog.filter(&settings.levels, range);
        let calendar = settings.calendar();
        let distribution = TaskDistributor::new(&calendar).distribute(&problems, start, end)?;

        if let Some(reason) = distribution.empty_reason {
            tracing::info!(?reason, unassigned = distribution.unassigned, "plan is empty, tasks kept");
            self.save_settings(settings)?;
            return Ok(PlanOutcome {
                distribution,
                replaced: None,
            });
        }

        let replaced = self.store.replace_scheduler_owned(distribution.tasks.clone())?;
        self.save_settings(settings)?;
        Ok(PlanOutcome {
            distribution,
            replaced: Some(replaced),
        })
    }

    /// Toggle a problem's status and mirror it onto its scheduled task.
    ///
    /// If the task write fails the catalog change is rolled back. Both topics are
    /// announced once the whole operation is done.
    pub fn mark_problem(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: AttemptStatus,
    ) -> PlannerResult<Option<Problem>> {
        let Some(snapshot) = self.catalog.find(chapter_id, problem_id) else {
            return Ok(None);
        };
        let _hold = self.bus.hold();

        let Some(updated) =
            self.catalog
                .try_toggle_status(chapter_id, problem_id, status, Utc::now())?
        else {
            return Ok(None);
        };

        let task_id = scheduler_task_id(chapter_id, problem_id);
        if self.store.find_by_id(&task_id).is_some() {
            if let Err(err) = self.store.update(&task_id, TaskPatch::status(updated.status)) {
                if let Err(restore_err) = self.catalog.restore(&snapshot) {
                    tracing::warn!(
                        chapter_id,
                        problem_id,
                        error = %restore_err,
                        "catalog rollback failed"
                    );
                }
                return Err(err.into());
            }
        }
        Ok(Some(updated))
    }

    pub fn postpone_task(&self, id: &str, new_date: impl Into<DateInput>) -> PlannerResult<ScheduledTask> {
        let new_date = required_date(new_date)?;
        Ok(PostponementEngine::new(&self.store).postpone(id, new_date)?)
    }

    pub fn restore_task(&self, id: &str) -> PlannerResult<ScheduledTask> {
        Ok(PostponementEngine::new(&self.store).restore_original(id)?)
    }

    pub fn postpone_day(
        &self,
        day: impl Into<DateInput>,
        new_date: impl Into<DateInput>,
    ) -> PlannerResult<PostponeBatch> {
        let (day, new_date) = (required_date(day)?, required_date(new_date)?);
        Ok(PostponementEngine::new(&self.store).postpone_day(day, new_date)?)
    }

    pub fn rollover_candidates(&self, now: NaiveDateTime) -> Vec<ScheduledTask> {
        self.rollover.candidates(&self.store, now)
    }

    /// Move today's incomplete tasks to tomorrow once the rollover hour has passed.
    pub fn postpone_to_tomorrow(&self, now: NaiveDateTime) -> PlannerResult<PostponeBatch> {
        let candidates = self.rollover_candidates(now);
        if candidates.is_empty() {
            return Ok(PostponeBatch::default());
        }
        let tomorrow = self
            .rollover
            .tomorrow(now)
            .ok_or_else(|| DateError::InvalidDate(now.to_string()))?;
        Ok(PostponementEngine::new(&self.store).postpone_all_incomplete(&candidates, tomorrow)?)
    }

    pub fn week_of(&self, date: NaiveDate) -> ViewKind {
        ViewKind::Week {
            containing: date,
            week_start: self.week_start,
        }
    }

    pub fn live_view(&self, kind: ViewKind) -> LiveView {
        LiveView::new(kind, &self.bus)
    }
}

fn required_date(input: impl Into<DateInput>) -> Result<NaiveDate, DateError> {
    let input = input.into();
    let shown = match &input {
        DateInput::Text(text) => text.clone(),
        other => format!("{other:?}"),
    };
    date_safety::normalize(input).ok_or(DateError::InvalidDate(shown))
}

fn load_settings(
    backend: &dyn RecordStore,
    default: &ScheduleSettings,
) -> PlannerResult<ScheduleSettings> {
    let Some(value) = backend.load_record(SETTINGS_KEY)? else {
        return Ok(default.clone());
    };
    match serde_json::from_value(value) {
        Ok(settings) => Ok(settings),
        Err(err) => {
            tracing::warn!(error = %err, "stored schedule settings unreadable, using defaults");
            Ok(default.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemLevel;

    #[test]
    fn unparseable_dates_surface_as_invalid_date() {
        let planner = StudyPlanner::in_memory();
        let err = planner
            .plan("next tuesday", "2025-05-30", &ScheduleSettings::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid date 'next tuesday'");
    }

    #[test]
    fn empty_level_set_leaves_store_untouched() {
        let planner = StudyPlanner::in_memory();
        let settings = ScheduleSettings::default();
        planner.plan("2025-05-19", "2025-05-28", &settings).unwrap();
        let before = planner.store().len();

        let outcome = planner
            .plan("2025-05-19", "2025-05-28", &settings.clone().with_levels(Vec::<ProblemLevel>::new()))
            .unwrap();
        assert_eq!(outcome.replaced, None);
        assert_eq!(planner.store().len(), before);
    }
}
