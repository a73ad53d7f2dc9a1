use crate::task::{ScheduledTask, TaskOrigin, is_scheduler_id};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskValidationError {
    message: String,
}

impl TaskValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_task(task: &ScheduledTask) -> Result<(), TaskValidationError> {
    if task.id.trim().is_empty() {
        return Err(TaskValidationError::new("task id must not be empty"));
    }

    if task.title.trim().is_empty() {
        return Err(TaskValidationError::new(format!(
            "task {} has an empty title",
            task.id
        )));
    }

    // The origin field and the id convention must agree, otherwise a distribution
    // run could delete a manual task or keep a stale scheduler one.
    match (task.origin, is_scheduler_id(&task.id)) {
        (TaskOrigin::Scheduler, false) => {
            return Err(TaskValidationError::new(format!(
                "task {} is marked as scheduler-owned but does not use the scheduler id convention",
                task.id
            )));
        }
        (TaskOrigin::Manual, true) => {
            return Err(TaskValidationError::new(format!(
                "task {} uses a scheduler id but is marked as manual",
                task.id
            )));
        }
        _ => {}
    }

    Ok(())
}

pub fn validate_task_collection(tasks: &[ScheduledTask]) -> Result<(), TaskValidationError> {
    let mut seen_ids = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen_ids.insert(task.id.as_str()) {
            return Err(TaskValidationError::new(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        validate_task(task)?;
    }
    Ok(())
}
