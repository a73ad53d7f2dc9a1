use crate::persistence::{PersistenceError, RecordStore, TASKS_KEY};
use crate::problem::AttemptStatus;
use crate::sync_bus::{ChangeHint, SyncBus, Topic};
use crate::task::{NewTask, ScheduledTask, TaskOrigin, TaskPatch};
use crate::task_validation::{TaskValidationError, validate_task, validate_task_collection};
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task '{0}' not found")]
    NotFound(String),
    #[error("invalid task: {0}")]
    Invalid(#[from] TaskValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(PersistenceError::Serialization(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate view of the live task set. `completed + partial + incorrect + pending == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub completed: usize,
    pub partial: usize,
    pub incorrect: usize,
    pub pending: usize,
    /// Tasks carrying an original date. Overlaps the status buckets.
    pub postponed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    pub removed: usize,
    pub inserted: usize,
    pub kept: usize,
}

/// Owner of the scheduled task collection.
///
/// Readers take a shared lock and see either the state before or after a write,
/// never a mix. Writers are serialized; each builds the next collection on a
/// copy, persists it when a backend is attached, swaps it in, then publishes on
/// [`Topic::TaskMutation`]. A failure at any step leaves the visible state untouched.
pub struct TaskStore {
    tasks: RwLock<Vec<ScheduledTask>>,
    writer: Mutex<()>,
    bus: SyncBus,
    backend: Option<Arc<dyn RecordStore>>,
}

impl TaskStore {
    pub fn new(bus: SyncBus) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            bus,
            backend: None,
        }
    }

    /// Open a store backed by `backend`, loading whatever `scheduled_tasks` holds.
    pub fn with_backend(bus: SyncBus, backend: Arc<dyn RecordStore>) -> StoreResult<Self> {
        let tasks = load_tasks(backend.as_ref())?;
        Ok(Self {
            tasks: RwLock::new(tasks),
            writer: Mutex::new(()),
            bus,
            backend: Some(backend),
        })
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    /// Re-read the backend, replacing the in-memory collection. Returns the task count.
    pub fn reload(&self) -> StoreResult<usize> {
        let Some(backend) = &self.backend else {
            return Ok(self.len());
        };
        let _writer = self.writer.lock();
        let tasks = load_tasks(backend.as_ref())?;
        let count = tasks.len();
        *self.tasks.write() = tasks;
        drop(_writer);
        self.bus.publish(Topic::TaskMutation, ChangeHint::Reloaded);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    pub fn find_all(&self) -> Vec<ScheduledTask> {
        self.tasks.read().clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.read().iter().find(|task| task.id == id).cloned()
    }

    /// Tasks due in `start..=end`, ordered by due date.
    pub fn find_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<ScheduledTask> {
        let mut tasks = self.filter(|task| task.due_date >= start && task.due_date <= end);
        tasks.sort_by_key(|task| task.due_date);
        tasks
    }

    pub fn find_for_day(&self, date: NaiveDate) -> Vec<ScheduledTask> {
        self.filter(|task| task.due_date == date)
    }

    pub fn find_by_status(&self, status: Option<AttemptStatus>) -> Vec<ScheduledTask> {
        self.filter(|task| task.status == status)
    }

    pub fn find_by_subject(&self, subject: &str) -> Vec<ScheduledTask> {
        self.filter(|task| task.subject == subject)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<ScheduledTask> {
        self.filter(|task| task.has_tag(tag))
    }

    pub fn find_scheduler_owned(&self) -> Vec<ScheduledTask> {
        self.filter(ScheduledTask::is_scheduler_owned)
    }

    fn filter<F>(&self, predicate: F) -> Vec<ScheduledTask>
    where
        F: Fn(&ScheduledTask) -> bool,
    {
        self.tasks
            .read()
            .iter()
            .filter(|&task| predicate(task))
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> TaskStatistics {
        self.tasks
            .read()
            .iter()
            .fold(TaskStatistics::default(), |mut stats, task| {
                stats.total += 1;
                match task.status {
                    Some(AttemptStatus::Complete) => stats.completed += 1,
                    Some(AttemptStatus::Partial) => stats.partial += 1,
                    Some(AttemptStatus::Incorrect) => stats.incorrect += 1,
                    None => stats.pending += 1,
                }
                if task.is_postponed() {
                    stats.postponed += 1;
                }
                stats
            })
    }

    /// Insert a task.
    ///
    /// Manual tasks always get a fresh id. A task carrying a scheduler id keeps it
    /// and replaces any task already stored under that id.
    pub fn create(&self, new_task: NewTask) -> StoreResult<ScheduledTask> {
        let (id, origin) = match &new_task.id {
            Some(id) if new_task.has_scheduler_id() => (id.clone(), TaskOrigin::Scheduler),
            _ => (Uuid::new_v4().to_string(), TaskOrigin::Manual),
        };
        let task = new_task.into_task(id, origin);
        validate_task(&task)?;

        let hint = if self.find_by_id(&task.id).is_some() {
            ChangeHint::Updated
        } else {
            ChangeHint::Created
        };
        self.commit(hint, |tasks| {
            match tasks.iter_mut().find(|existing| existing.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
            Ok(task)
        })
    }

    pub fn update(&self, id: &str, patch: TaskPatch) -> StoreResult<ScheduledTask> {
        self.commit(ChangeHint::Updated, |tasks| apply_patch(tasks, id, patch))
    }

    /// Apply several patches as one write. Any unknown id aborts the whole batch.
    pub fn update_many(&self, patches: Vec<(String, TaskPatch)>) -> StoreResult<Vec<ScheduledTask>> {
        if patches.is_empty() {
            return Ok(Vec::new());
        }
        self.commit(ChangeHint::Updated, |tasks| {
            patches
                .into_iter()
                .map(|(id, patch)| apply_patch(tasks, &id, patch))
                .collect()
        })
    }

    /// Patch a task with a patch derived from the task as currently stored.
    pub fn update_with<F>(&self, id: &str, derive: F) -> StoreResult<ScheduledTask>
    where
        F: FnOnce(&ScheduledTask) -> TaskPatch,
    {
        self.commit(ChangeHint::Updated, |tasks| {
            let task = find_mut(tasks, id)?;
            derive(task).apply(task);
            Ok(task.clone())
        })
    }

    /// One write over `ids`, each patch decided from the stored task.
    ///
    /// Returns `(updated, untouched)`; a task is untouched when `decide` yields
    /// `None`. Any unknown id aborts the whole batch.
    pub fn update_many_with<F>(
        &self,
        ids: &[String],
        mut decide: F,
    ) -> StoreResult<(Vec<ScheduledTask>, Vec<ScheduledTask>)>
    where
        F: FnMut(&ScheduledTask) -> Option<TaskPatch>,
    {
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        self.commit(ChangeHint::Updated, |tasks| {
            let mut updated = Vec::new();
            let mut untouched = Vec::new();
            for id in ids {
                let task = find_mut(tasks, id)?;
                match decide(task) {
                    Some(patch) => {
                        patch.apply(task);
                        updated.push(task.clone());
                    }
                    None => untouched.push(task.clone()),
                }
            }
            Ok((updated, untouched))
        })
    }

    pub fn delete(&self, id: &str) -> StoreResult<ScheduledTask> {
        self.commit(ChangeHint::Deleted, |tasks| {
            let Some(position) = tasks.iter().position(|task| task.id == id) else {
                tracing::debug!(task_id = id, "delete on unknown task");
                return Err(StoreError::NotFound(id.to_string()));
            };
            Ok(tasks.remove(position))
        })
    }

    /// Swap the whole scheduler-owned subset for `new_tasks` in one write.
    ///
    /// Manual tasks are never removed or altered. Every replacement must carry a
    /// scheduler id; otherwise nothing changes.
    pub fn replace_scheduler_owned(&self, new_tasks: Vec<NewTask>) -> StoreResult<ReplaceSummary> {
        let mut replacements = Vec::with_capacity(new_tasks.len());
        for new_task in new_tasks {
            let Some(id) = new_task.id.clone().filter(|_| new_task.has_scheduler_id()) else {
                return Err(TaskValidationError::new(format!(
                    "replacement task '{}' has no scheduler id",
                    new_task.title
                ))
                .into());
            };
            replacements.push(new_task.into_task(id, TaskOrigin::Scheduler));
        }

        let summary = self.commit(ChangeHint::Replaced, |tasks| {
            let before = tasks.len();
            tasks.retain(|task| !task.is_scheduler_owned());
            let kept = tasks.len();
            let inserted = replacements.len();
            tasks.extend(replacements);
            Ok(ReplaceSummary {
                removed: before - kept,
                inserted,
                kept,
            })
        })?;
        tracing::info!(
            removed = summary.removed,
            inserted = summary.inserted,
            kept = summary.kept,
            "scheduler-owned tasks replaced"
        );
        Ok(summary)
    }

    fn commit<T, F>(&self, hint: ChangeHint, mutate: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Vec<ScheduledTask>) -> StoreResult<T>,
    {
        let writer = self.writer.lock();
        let mut next = self.tasks.read().clone();
        let output = mutate(&mut next)?;
        validate_task_collection(&next)?;
        if let Some(backend) = &self.backend {
            backend.save_record(TASKS_KEY, &serde_json::to_value(&next)?)?;
        }
        *self.tasks.write() = next;
        drop(writer);

        self.bus.publish(Topic::TaskMutation, hint);
        Ok(output)
    }
}

fn find_mut<'t>(tasks: &'t mut [ScheduledTask], id: &str) -> StoreResult<&'t mut ScheduledTask> {
    tasks.iter_mut().find(|task| task.id == id).ok_or_else(|| {
        tracing::debug!(task_id = id, "update on unknown task");
        StoreError::NotFound(id.to_string())
    })
}

fn apply_patch(tasks: &mut [ScheduledTask], id: &str, patch: TaskPatch) -> StoreResult<ScheduledTask> {
    let task = find_mut(tasks, id)?;
    patch.apply(task);
    Ok(task.clone())
}

/// Decode the persisted task array, dropping records that cannot be trusted.
fn load_tasks(backend: &dyn RecordStore) -> StoreResult<Vec<ScheduledTask>> {
    let Some(value) = backend.load_record(TASKS_KEY)? else {
        return Ok(Vec::new());
    };
    let Value::Array(records) = value else {
        return Err(PersistenceError::InvalidData(format!("{TASKS_KEY} must be an array")).into());
    };

    let mut seen = HashSet::with_capacity(records.len());
    let mut tasks = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let Some(task) = ScheduledTask::from_record(record) else {
            tracing::warn!(index, "dropping task record without a usable id or due date");
            continue;
        };
        if let Err(err) = validate_task(&task) {
            tracing::warn!(index, task_id = %task.id, error = %err, "dropping invalid task record");
            continue;
        }
        if !seen.insert(task.id.clone()) {
            tracing::warn!(index, task_id = %task.id, "dropping duplicate task record");
            continue;
        }
        tasks.push(task);
    }
    tracing::debug!(loaded = tasks.len(), stored = records.len(), "tasks loaded");
    Ok(tasks)
}
