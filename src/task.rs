use crate::date_safety;
use crate::problem::{AttemptStatus, Problem};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every task id minted by the distributor.
pub const SCHEDULER_ID_PREFIX: &str = "spark-";

/// Deterministic id of the scheduler task for a problem.
pub fn scheduler_task_id(chapter_id: u32, problem_id: u32) -> String {
    format!("{SCHEDULER_ID_PREFIX}{chapter_id}-{problem_id}")
}

/// Parse `spark-<chapter>-<problem>` back into its numeric parts.
pub fn parse_scheduler_id(id: &str) -> Option<(u32, u32)> {
    let rest = id.strip_prefix(SCHEDULER_ID_PREFIX)?;
    let (chapter, problem) = rest.split_once('-')?;
    Some((chapter.parse().ok()?, problem.parse().ok()?))
}

pub fn is_scheduler_id(id: &str) -> bool {
    parse_scheduler_id(id).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrigin {
    Scheduler,
    Manual,
}

impl TaskOrigin {
    /// Records written before `origin` existed are classified by id prefix.
    pub fn infer_from_id(id: &str) -> Self {
        if is_scheduler_id(id) {
            TaskOrigin::Scheduler
        } else {
            TaskOrigin::Manual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOrigin::Scheduler => "scheduler",
            TaskOrigin::Manual => "manual",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduler" => Some(TaskOrigin::Scheduler),
            "manual" => Some(TaskOrigin::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub status: Option<AttemptStatus>,
    pub due_date: NaiveDate,
    /// First-ever due date, captured by the first postponement only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub origin: TaskOrigin,
}

impl ScheduledTask {
    pub fn is_complete(&self) -> bool {
        self.status == Some(AttemptStatus::Complete)
    }

    pub fn is_scheduler_owned(&self) -> bool {
        self.origin == TaskOrigin::Scheduler
    }

    pub fn is_postponed(&self) -> bool {
        self.original_date.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Lenient decode of one persisted task.
    ///
    /// Dates go through [`date_safety::normalize`]; a record without a usable id
    /// or due date yields `None` so the caller can drop it from every view.
    pub fn from_record(record: &Value) -> Option<Self> {
        let object = record.as_object()?;
        let id = object.get("id").and_then(record_string)?;
        if id.trim().is_empty() {
            return None;
        }
        let due_date = date_safety::normalize(object.get("dueDate").or_else(|| object.get("date")))?;
        let original_date = date_safety::normalize(object.get("originalDate"));
        let title = object
            .get("title")
            .and_then(record_string)
            .unwrap_or_else(|| id.clone());
        let subject = object
            .get("subject")
            .and_then(record_string)
            .unwrap_or_default();
        let status = object
            .get("status")
            .and_then(Value::as_str)
            .and_then(AttemptStatus::from_str);
        let user_id = object.get("userId").and_then(record_string);
        let tags = object
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(record_string).collect())
            .unwrap_or_default();
        let origin = object
            .get("origin")
            .and_then(Value::as_str)
            .and_then(TaskOrigin::from_str)
            .unwrap_or_else(|| TaskOrigin::infer_from_id(&id));

        Some(Self {
            id,
            title,
            subject,
            status,
            due_date,
            original_date,
            user_id,
            tags,
            origin,
        })
    }
}

fn record_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Input to [`crate::TaskStore::create`] and bulk replacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Only honoured when it follows the scheduler id convention.
    pub id: Option<String>,
    pub title: String,
    pub subject: String,
    pub status: Option<AttemptStatus>,
    pub due_date: NaiveDate,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn manual(title: impl Into<String>, subject: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            id: None,
            title: title.into(),
            subject: subject.into(),
            status: None,
            due_date,
            user_id: None,
            tags: Vec::new(),
        }
    }

    /// Scheduler task for `problem`, due on `due_date`, grouped under `subject`.
    pub fn for_problem(problem: &Problem, due_date: NaiveDate, subject: impl Into<String>) -> Self {
        Self {
            id: Some(scheduler_task_id(
                problem.key.chapter_id,
                problem.key.problem_id,
            )),
            title: format!("{} #{}", problem.section_title, problem.key.problem_id),
            subject: subject.into(),
            status: problem.status,
            due_date,
            user_id: None,
            tags: vec![
                problem.level.as_str().to_string(),
                format!("chapter-{}", problem.key.chapter_id),
            ],
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_scheduler_id(&self) -> bool {
        self.id.as_deref().is_some_and(is_scheduler_id)
    }

    pub(crate) fn into_task(self, id: String, origin: TaskOrigin) -> ScheduledTask {
        ScheduledTask {
            id,
            title: self.title,
            subject: self.subject,
            status: self.status,
            due_date: self.due_date,
            original_date: None,
            user_id: self.user_id,
            tags: self.tags,
            origin,
        }
    }
}

/// Partial update. `None` leaves a field alone; nested options set or clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub status: Option<Option<AttemptStatus>>,
    pub due_date: Option<NaiveDate>,
    pub original_date: Option<Option<NaiveDate>>,
    pub user_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn status(status: Option<AttemptStatus>) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_original_date(mut self, date: Option<NaiveDate>) -> Self {
        self.original_date = Some(date);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(self, task: &mut ScheduledTask) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(subject) = self.subject {
            task.subject = subject;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(date) = self.due_date {
            task.due_date = date;
        }
        if let Some(original) = self.original_date {
            task.original_date = original;
        }
        if let Some(user_id) = self.user_id {
            task.user_id = user_id;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
    }
}
