//! Persisted per-problem attempt state.
//!
//! Two record shapes exist in stored data and both must be written back in the
//! shape they were read in:
//!
//! * flat: `[{"id": 30, "chapter": 1, "status": "complete", "lastUpdated": "..."}, ...]`,
//!   possibly day-based entries carrying a `date` key instead of `chapter`
//!   (the id is then `"<chapter>-<problem>"`);
//! * nested: `[{"chapterId": 1, "problems": [{"id": 30, "status": ..., "lastUpdated": ...}]}]`.

use crate::persistence::{PersistenceError, PersistenceResult};
use crate::problem::{AttemptStatus, lenient_status};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogShape {
    Flat,
    Nested,
}

/// One problem's persisted state, independent of record shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub chapter_id: u32,
    pub problem_id: u32,
    pub status: Option<AttemptStatus>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A stored element that either parsed or is carried through as it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Slot<T> {
    Known(T),
    Unreadable(Value),
}

impl<T> Slot<T> {
    fn known(&self) -> Option<&T> {
        match self {
            Slot::Known(item) => Some(item),
            Slot::Unreadable(_) => None,
        }
    }

    fn known_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Known(item) => Some(item),
            Slot::Unreadable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatEntry {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<AttemptStatus>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlatEntry {
    /// `(chapter, problem)` for this entry, if it can be resolved.
    fn key(&self) -> Option<(u32, u32)> {
        if let Some((c, p)) = self.id.as_str().and_then(|text| text.split_once('-')) {
            return Some((c.trim().parse().ok()?, p.trim().parse().ok()?));
        }
        Some((id_number(self.chapter.as_ref()?)?, id_number(&self.id)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedProblem {
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<AttemptStatus>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedChapter {
    pub chapter_id: Value,
    #[serde(default, deserialize_with = "lenient_slots")]
    pub problems: Vec<Slot<NestedProblem>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogState {
    Flat(Vec<Slot<FlatEntry>>),
    Nested(Vec<Slot<NestedChapter>>),
}

impl Default for CatalogState {
    fn default() -> Self {
        CatalogState::Nested(Vec::new())
    }
}

impl CatalogState {
    /// Sniff the shape once. A `chapter` or `date` key on the first element marks the flat shape.
    ///
    /// Elements that do not parse are kept verbatim and written back untouched.
    pub fn detect(value: &Value) -> PersistenceResult<Self> {
        let Some(items) = value.as_array() else {
            return Err(PersistenceError::InvalidData(
                "catalog state must be an array".into(),
            ));
        };
        let flat = items
            .first()
            .and_then(Value::as_object)
            .is_some_and(|first| first.contains_key("chapter") || first.contains_key("date"));

        let state = if flat {
            CatalogState::Flat(read_slots(items.iter().cloned()))
        } else {
            CatalogState::Nested(read_slots(items.iter().cloned()))
        };
        tracing::debug!(shape = ?state.shape(), entries = items.len(), "catalog state detected");
        Ok(state)
    }

    pub fn shape(&self) -> CatalogShape {
        match self {
            CatalogState::Flat(_) => CatalogShape::Flat,
            CatalogState::Nested(_) => CatalogShape::Nested,
        }
    }

    /// Resolvable entries in stored order. Later duplicates of a key follow earlier ones.
    pub fn entries(&self) -> Vec<StateEntry> {
        match self {
            CatalogState::Flat(entries) => entries
                .iter()
                .filter_map(Slot::known)
                .filter_map(|entry| {
                    let (chapter_id, problem_id) = entry.key()?;
                    Some(StateEntry {
                        chapter_id,
                        problem_id,
                        status: entry.status,
                        last_updated: entry.last_updated,
                    })
                })
                .collect(),
            CatalogState::Nested(chapters) => chapters
                .iter()
                .filter_map(Slot::known)
                .filter_map(|chapter| Some((id_number(&chapter.chapter_id)?, chapter)))
                .flat_map(|(chapter_id, chapter)| {
                    chapter
                        .problems
                        .iter()
                        .filter_map(Slot::known)
                        .filter_map(move |problem| {
                            Some(StateEntry {
                                chapter_id,
                                problem_id: id_number(&problem.id)?,
                                status: problem.status,
                                last_updated: problem.last_updated,
                            })
                        })
                })
                .collect(),
        }
    }

    /// Record a status in whichever shape this state already has.
    ///
    /// Every stored entry for the problem is updated, so a problem listed under
    /// several days reads back the same whichever entry wins on load.
    pub fn set_status(
        &mut self,
        chapter_id: u32,
        problem_id: u32,
        status: Option<AttemptStatus>,
        last_updated: Option<DateTime<Utc>>,
    ) {
        let key = (chapter_id, problem_id);
        match self {
            CatalogState::Flat(entries) => {
                let mut matched = false;
                for entry in entries
                    .iter_mut()
                    .filter_map(Slot::known_mut)
                    .filter(|entry| entry.key() == Some(key))
                {
                    entry.status = status;
                    entry.last_updated = last_updated;
                    matched = true;
                }
                if !matched {
                    entries.push(Slot::Known(FlatEntry {
                        id: Value::from(problem_id),
                        chapter: Some(Value::from(chapter_id)),
                        date: None,
                        status,
                        last_updated,
                        extra: Map::new(),
                    }));
                }
            }
            CatalogState::Nested(chapters) => {
                let existing = chapters.iter().position(|slot| {
                    slot.known()
                        .is_some_and(|chapter| id_number(&chapter.chapter_id) == Some(chapter_id))
                });
                let index = match existing {
                    Some(index) => index,
                    None => {
                        chapters.push(Slot::Known(NestedChapter {
                            chapter_id: Value::from(chapter_id),
                            problems: Vec::new(),
                            extra: Map::new(),
                        }));
                        chapters.len() - 1
                    }
                };
                let Some(chapter) = chapters[index].known_mut() else {
                    return;
                };
                let mut matched = false;
                for problem in chapter
                    .problems
                    .iter_mut()
                    .filter_map(Slot::known_mut)
                    .filter(|p| id_number(&p.id) == Some(problem_id))
                {
                    problem.status = status;
                    problem.last_updated = last_updated;
                    matched = true;
                }
                if !matched {
                    chapter.problems.push(Slot::Known(NestedProblem {
                        id: Value::from(problem_id),
                        status,
                        last_updated,
                        extra: Map::new(),
                    }));
                }
            }
        }
    }

    pub fn to_value(&self) -> PersistenceResult<Value> {
        let value = match self {
            CatalogState::Flat(entries) => serde_json::to_value(entries)?,
            CatalogState::Nested(chapters) => serde_json::to_value(chapters)?,
        };
        Ok(value)
    }
}

/// Ids are stored as numbers, though some writers used numeric strings.
fn id_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn read_slots<T, I>(items: I) -> Vec<Slot<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = Value>,
{
    items
        .into_iter()
        .map(|item| match serde_json::from_value(item.clone()) {
            Ok(parsed) => Slot::Known(parsed),
            Err(err) => {
                tracing::warn!(error = %err, "unreadable catalog state entry kept as is");
                Slot::Unreadable(item)
            }
        })
        .collect()
}

fn lenient_slots<'de, D, T>(deserializer: D) -> Result<Vec<Slot<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<Value> = Vec::deserialize(deserializer)?;
    Ok(read_slots(items))
}

/// Unparseable timestamps read as absent rather than failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}
