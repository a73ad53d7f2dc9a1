use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemLevel {
    Basic,
    Standard,
    Advanced,
}

impl ProblemLevel {
    pub const ALL: [ProblemLevel; 3] = [
        ProblemLevel::Basic,
        ProblemLevel::Standard,
        ProblemLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemLevel::Basic => "basic",
            ProblemLevel::Standard => "standard",
            ProblemLevel::Advanced => "advanced",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(ProblemLevel::Basic),
            "standard" => Some(ProblemLevel::Standard),
            "advanced" => Some(ProblemLevel::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for ProblemLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the latest attempt. An unattempted problem has no status at all
/// (`Option::None`), which serializes as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Complete,
    Partial,
    Incorrect,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Complete => "complete",
            AttemptStatus::Partial => "partial",
            AttemptStatus::Incorrect => "incorrect",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "complete" | "completed" | "done" => Some(AttemptStatus::Complete),
            "partial" => Some(AttemptStatus::Partial),
            "incorrect" | "wrong" => Some(AttemptStatus::Incorrect),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize an optional status, treating unknown strings as unattempted.
pub(crate) fn lenient_status<'de, D>(deserializer: D) -> Result<Option<AttemptStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(AttemptStatus::from_str))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemKey {
    pub chapter_id: u32,
    pub section_id: u32,
    pub problem_id: u32,
}

impl ProblemKey {
    pub fn new(chapter_id: u32, section_id: u32, problem_id: u32) -> Self {
        Self {
            chapter_id,
            section_id,
            problem_id,
        }
    }
}

impl fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}-{}",
            self.chapter_id, self.section_id, self.problem_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub key: ProblemKey,
    pub chapter_title: String,
    pub section_title: String,
    pub level: ProblemLevel,
    pub status: Option<AttemptStatus>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Problem {
    pub fn new(
        key: ProblemKey,
        chapter_title: impl Into<String>,
        section_title: impl Into<String>,
        level: ProblemLevel,
    ) -> Self {
        Self {
            key,
            chapter_title: chapter_title.into(),
            section_title: section_title.into(),
            level,
            status: None,
            last_updated: None,
        }
    }

    /// Display label for the chapter/section the problem belongs to.
    pub fn section_label(&self) -> String {
        format!(
            "Chapter {}.{} {}",
            self.key.chapter_id, self.key.section_id, self.section_title
        )
    }

    pub fn is_attempted(&self) -> bool {
        self.status.is_some()
    }
}
