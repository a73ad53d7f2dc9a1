use super::{PersistenceError, PersistenceResult, RecordStore, validate_key};
use crate::date_safety;
use crate::problem::AttemptStatus;
use crate::task::{ScheduledTask, TaskOrigin};
use crate::task_validation::validate_task_collection;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// One pretty-printed JSON file per record key under `dir`.
///
/// Writes go to `<key>.json.tmp` first and are renamed into place, so a crash
/// mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> PersistenceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn load_record(&self, key: &str) -> PersistenceResult<Option<Value>> {
        validate_key(key)?;
        let file = match File::open(self.record_path(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value = serde_json::from_reader(file)?;
        Ok(Some(value))
    }

    fn save_record(&self, key: &str, value: &Value) -> PersistenceResult<()> {
        validate_key(key)?;
        let path = self.record_path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        tracing::debug!(key, path = %path.display(), "record written");
        Ok(())
    }

    fn remove_record(&self, key: &str) -> PersistenceResult<bool> {
        validate_key(key)?;
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct TaskCsvRecord {
    id: String,
    title: String,
    subject: String,
    status: String,
    due_date: String,
    #[serde(default)]
    original_date: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    origin: String,
}

impl TaskCsvRecord {
    fn from_task(task: &ScheduledTask) -> PersistenceResult<Self> {
        let tags = if task.tags.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&task.tags)?
        };
        Ok(Self {
            id: task.id.clone(),
            title: task.title.clone(),
            subject: task.subject.clone(),
            status: task
                .status
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            due_date: date_safety::format_date(task.due_date),
            original_date: format_date(task.original_date),
            user_id: task.user_id.clone().unwrap_or_default(),
            tags,
            origin: task.origin.as_str().to_string(),
        })
    }

    fn into_task(self) -> PersistenceResult<ScheduledTask> {
        if self.id.trim().is_empty() {
            return Err(PersistenceError::InvalidData("task row without id".into()));
        }
        let due_date = date_safety::parse_date(&self.due_date).map_err(|err| {
            PersistenceError::InvalidData(format!("task {}: {err}", self.id))
        })?;
        let original_date = parse_date(&self.original_date)?;
        let status = parse_status(&self.status)?;
        let origin = if self.origin.trim().is_empty() {
            TaskOrigin::infer_from_id(&self.id)
        } else {
            TaskOrigin::from_str(&self.origin).ok_or_else(|| {
                PersistenceError::InvalidData(format!("invalid origin '{}'", self.origin))
            })?
        };
        Ok(ScheduledTask {
            id: self.id,
            title: self.title,
            subject: self.subject,
            status,
            due_date,
            original_date,
            user_id: parse_string_option(self.user_id),
            tags: parse_tags(&self.tags)?,
            origin,
        })
    }
}

pub fn save_tasks_to_csv<P: AsRef<Path>>(tasks: &[ScheduledTask], path: P) -> PersistenceResult<()> {
    validate_task_collection(tasks)
        .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for task in tasks {
        writer.serialize(TaskCsvRecord::from_task(task)?)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_tasks_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<ScheduledTask>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut tasks = Vec::new();
    for record in reader.deserialize::<TaskCsvRecord>() {
        tasks.push(record?.into_task()?);
    }
    validate_task_collection(&tasks)
        .map_err(|err| PersistenceError::InvalidData(err.to_string()))?;
    Ok(tasks)
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(date_safety::format_date).unwrap_or_default()
}

fn parse_date(input: &str) -> PersistenceResult<Option<NaiveDate>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    date_safety::parse_date(input)
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(e.to_string()))
}

fn parse_status(input: &str) -> PersistenceResult<Option<AttemptStatus>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    AttemptStatus::from_str(input)
        .map(Some)
        .ok_or_else(|| PersistenceError::InvalidData(format!("invalid status '{input}'")))
}

/// Tags are written as a JSON array. Older exports used a `;`-separated list.
fn parse_tags(input: &str) -> PersistenceResult<Vec<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if input.starts_with('[') {
        return serde_json::from_str(input)
            .map_err(|err| PersistenceError::InvalidData(format!("invalid tags: {err}")));
    }
    Ok(input
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect())
}

fn parse_string_option(input: String) -> Option<String> {
    if input.trim().is_empty() {
        None
    } else {
        Some(input)
    }
}
