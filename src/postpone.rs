use crate::store::{StoreResult, TaskStore};
use crate::task::{ScheduledTask, TaskPatch};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

/// Move `task` to `new_date`, anchoring its first-ever due date.
///
/// `original_date` is captured on the first postponement only; later moves keep it.
pub fn postpone(task: &ScheduledTask, new_date: NaiveDate) -> ScheduledTask {
    let mut moved = task.clone();
    moved.original_date = Some(task.original_date.unwrap_or(task.due_date));
    moved.due_date = new_date;
    moved
}

/// Undo every postponement: back to the original date, audit anchor cleared.
pub fn restore_original(task: &ScheduledTask) -> ScheduledTask {
    let mut restored = task.clone();
    if let Some(original) = restored.original_date.take() {
        restored.due_date = original;
    }
    restored
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostponeBatch {
    pub moved: Vec<ScheduledTask>,
    /// Complete tasks included in the batch and left where they were.
    pub skipped: Vec<ScheduledTask>,
}

pub fn postpone_all_incomplete(tasks: &[ScheduledTask], new_date: NaiveDate) -> PostponeBatch {
    let mut batch = PostponeBatch::default();
    for task in tasks {
        if task.is_complete() {
            batch.skipped.push(task.clone());
        } else {
            batch.moved.push(postpone(task, new_date));
        }
    }
    batch
}

fn move_patch(task: &ScheduledTask) -> TaskPatch {
    TaskPatch::default()
        .with_due_date(task.due_date)
        .with_original_date(task.original_date)
}

/// End-of-day check: once local time reaches `hour`, incomplete tasks due today
/// are candidates for moving to tomorrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverCheck {
    hour: u32,
}

impl Default for RolloverCheck {
    fn default() -> Self {
        Self { hour: 23 }
    }
}

impl RolloverCheck {
    /// Hours past 23 are clamped to 23.
    pub fn new(hour: u32) -> Self {
        Self { hour: hour.min(23) }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.hour() >= self.hour
    }

    pub fn tomorrow(&self, now: NaiveDateTime) -> Option<NaiveDate> {
        now.date().succ_opt()
    }

    /// Incomplete tasks due on `now`'s date, or nothing before the rollover hour.
    pub fn candidates(&self, store: &TaskStore, now: NaiveDateTime) -> Vec<ScheduledTask> {
        if !self.is_due(now) {
            return Vec::new();
        }
        let candidates: Vec<ScheduledTask> = store
            .find_for_day(now.date())
            .into_iter()
            .filter(|task| !task.is_complete())
            .collect();
        if !candidates.is_empty() {
            tracing::info!(
                date = %now.date(),
                count = candidates.len(),
                "incomplete tasks ready to roll over"
            );
        }
        candidates
    }
}

/// Applies postponements through a [`TaskStore`], one write per call.
pub struct PostponementEngine<'a> {
    store: &'a TaskStore,
}

impl<'a> PostponementEngine<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    pub fn postpone(&self, id: &str, new_date: NaiveDate) -> StoreResult<ScheduledTask> {
        self.store
            .update_with(id, |task| move_patch(&postpone(task, new_date)))
    }

    /// Postpone the given tasks that are still incomplete, as one store write.
    ///
    /// `tasks` only names the batch. Completion and the date anchor are read from
    /// the stored records at write time, so a task completed since the list was
    /// taken stays put.
    pub fn postpone_all_incomplete(
        &self,
        tasks: &[ScheduledTask],
        new_date: NaiveDate,
    ) -> StoreResult<PostponeBatch> {
        let ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        let (moved, skipped) = self.store.update_many_with(&ids, |task| {
            (!task.is_complete()).then(|| move_patch(&postpone(task, new_date)))
        })?;
        tracing::debug!(
            moved = moved.len(),
            skipped = skipped.len(),
            to = %new_date,
            "batch postponed"
        );
        Ok(PostponeBatch { moved, skipped })
    }

    /// Move every incomplete task due on `day` to `new_date`.
    pub fn postpone_day(&self, day: NaiveDate, new_date: NaiveDate) -> StoreResult<PostponeBatch> {
        let tasks = self.store.find_for_day(day);
        self.postpone_all_incomplete(&tasks, new_date)
    }

    pub fn restore_original(&self, id: &str) -> StoreResult<ScheduledTask> {
        self.store
            .update_with(id, |task| move_patch(&restore_original(task)))
    }
}
