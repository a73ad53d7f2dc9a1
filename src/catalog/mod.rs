use crate::persistence::{CATALOG_KEY, PersistenceResult, RecordStore};
use crate::problem::{AttemptStatus, Problem, ProblemLevel};
use crate::settings::ProblemRange;
use crate::sync_bus::{ChangeHint, SyncBus, Topic};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub mod seed;
pub mod state;

pub use seed::seed_problems;
pub use state::{CatalogShape, CatalogState, Slot, StateEntry};

/// Per-status tally over the whole catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub total: usize,
    pub unattempted: usize,
    pub complete: usize,
    pub partial: usize,
    pub incorrect: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterSummary {
    pub chapter_id: u32,
    pub title: String,
    pub problem_count: usize,
}

struct CatalogBackend {
    store: Arc<dyn RecordStore>,
    state: Mutex<CatalogState>,
}

/// The fixed set of study problems and their mutable attempt status.
///
/// Problems are never added or removed after construction. Status writes go
/// through [`ProblemCatalog::try_set_status`] and its wrappers only, each of
/// which persists (when a backend is attached) before updating memory and then
/// announces [`Topic::CatalogMutation`].
pub struct ProblemCatalog {
    problems: RwLock<Vec<Problem>>,
    index: HashMap<(u32, u32), usize>,
    bus: SyncBus,
    backend: Option<CatalogBackend>,
}

impl ProblemCatalog {
    pub fn new(problems: Vec<Problem>, bus: SyncBus) -> Self {
        let mut problems = problems;
        problems.sort_by_key(|problem| problem.key);
        let index = problems
            .iter()
            .enumerate()
            .map(|(idx, problem)| ((problem.key.chapter_id, problem.key.problem_id), idx))
            .collect();
        Self {
            problems: RwLock::new(problems),
            index,
            bus,
            backend: None,
        }
    }

    pub fn seeded(bus: SyncBus) -> Self {
        Self::new(seed_problems(), bus)
    }

    /// Attach a record store and apply the persisted state found under
    /// [`CATALOG_KEY`]. The detected shape is kept for every later write.
    pub fn with_backend(mut self, store: Arc<dyn RecordStore>) -> PersistenceResult<Self> {
        let state = match store.load_record(CATALOG_KEY)? {
            Some(value) => CatalogState::detect(&value)?,
            None => CatalogState::default(),
        };
        self.apply_state(&state);
        self.backend = Some(CatalogBackend {
            store,
            state: Mutex::new(state),
        });
        Ok(self)
    }

    fn apply_state(&mut self, state: &CatalogState) {
        let problems = self.problems.get_mut();
        let mut applied = 0usize;
        for entry in state.entries() {
            if let Some(&idx) = self.index.get(&(entry.chapter_id, entry.problem_id)) {
                problems[idx].status = entry.status;
                problems[idx].last_updated = entry.last_updated;
                applied += 1;
            }
        }
        tracing::debug!(applied, "catalog state applied");
    }

    pub fn shape(&self) -> Option<CatalogShape> {
        self.backend.as_ref().map(|backend| backend.state.lock().shape())
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every problem, ordered by chapter, section, then problem id.
    pub fn all_problems(&self) -> Vec<Problem> {
        self.problems.read().clone()
    }

    pub fn find(&self, chapter_id: u32, problem_id: u32) -> Option<Problem> {
        let idx = *self.index.get(&(chapter_id, problem_id))?;
        self.problems.read().get(idx).cloned()
    }

    /// Problems at one of `levels` and, when `range` is given, whose status it admits.
    pub fn filter(&self, levels: &BTreeSet<ProblemLevel>, range: Option<&ProblemRange>) -> Vec<Problem> {
        self.problems
            .read()
            .iter()
            .filter(|problem| levels.contains(&problem.level))
            .filter(|problem| range.is_none_or(|range| range.admits(problem.status)))
            .cloned()
            .collect()
    }

    pub fn counts_by_status(&self) -> CatalogCounts {
        self.problems
            .read()
            .iter()
            .fold(CatalogCounts::default(), |mut counts, problem| {
                counts.total += 1;
                match problem.status {
                    None => counts.unattempted += 1,
                    Some(AttemptStatus::Complete) => counts.complete += 1,
                    Some(AttemptStatus::Partial) => counts.partial += 1,
                    Some(AttemptStatus::Incorrect) => counts.incorrect += 1,
                }
                counts
            })
    }

    pub fn chapters(&self) -> Vec<ChapterSummary> {
        let mut chapters: Vec<ChapterSummary> = Vec::new();
        for problem in self.problems.read().iter() {
            match chapters.last_mut() {
                Some(last) if last.chapter_id == problem.key.chapter_id => last.problem_count += 1,
                _ => chapters.push(ChapterSummary {
                    chapter_id: problem.key.chapter_id,
                    title: problem.chapter_title.clone(),
                    problem_count: 1,
                }),
            }
        }
        chapters
    }

    /// Set a status, stamping `lastUpdated` with the current time.
    ///
    /// Unknown ids are a silent no-op returning `None`. A persistence failure is
    /// logged and leaves the catalog unchanged.
    pub fn set_status(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: Option<AttemptStatus>,
    ) -> Option<Problem> {
        self.set_status_at(chapter_id, problem_id, status, Utc::now())
    }

    pub fn set_status_at(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: Option<AttemptStatus>,
        at: DateTime<Utc>,
    ) -> Option<Problem> {
        match self.try_set_status(chapter_id, problem_id, status, at) {
            Ok(problem) => problem,
            Err(err) => {
                tracing::warn!(chapter_id, problem_id, error = %err, "catalog status not saved");
                self.find(chapter_id, problem_id)
            }
        }
    }

    /// Clearing a status (`None`) also clears `lastUpdated`.
    pub fn try_set_status(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: Option<AttemptStatus>,
        at: DateTime<Utc>,
    ) -> PersistenceResult<Option<Problem>> {
        let last_updated = status.map(|_| at);
        self.write(chapter_id, problem_id, status, last_updated)
    }

    /// Mark with `status`, or clear the mark when the problem already carries it.
    pub fn toggle_status(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: AttemptStatus,
    ) -> Option<Problem> {
        match self.try_toggle_status(chapter_id, problem_id, status, Utc::now()) {
            Ok(problem) => problem,
            Err(err) => {
                tracing::warn!(chapter_id, problem_id, error = %err, "catalog toggle not saved");
                self.find(chapter_id, problem_id)
            }
        }
    }

    pub fn try_toggle_status(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: AttemptStatus,
        at: DateTime<Utc>,
    ) -> PersistenceResult<Option<Problem>> {
        let Some(current) = self.find(chapter_id, problem_id) else {
            tracing::debug!(chapter_id, problem_id, "toggle on unknown problem ignored");
            return Ok(None);
        };
        let next = if current.status == Some(status) {
            None
        } else {
            Some(status)
        };
        self.try_set_status(chapter_id, problem_id, next, at)
    }

    /// Put a problem back exactly as captured, used to undo a failed compound write.
    pub(crate) fn restore(&self, snapshot: &Problem) -> PersistenceResult<()> {
        self.write(
            snapshot.key.chapter_id,
            snapshot.key.problem_id,
            snapshot.status,
            snapshot.last_updated,
        )
        .map(|_| ())
    }

    fn write(
        &self,
        chapter_id: u32,
        problem_id: u32,
        status: Option<AttemptStatus>,
        last_updated: Option<DateTime<Utc>>,
    ) -> PersistenceResult<Option<Problem>> {
        let Some(&idx) = self.index.get(&(chapter_id, problem_id)) else {
            tracing::debug!(chapter_id, problem_id, "status write on unknown problem ignored");
            return Ok(None);
        };

        // Held across the memory update so persisted and in-memory order agree.
        let backend_guard = match &self.backend {
            Some(backend) => {
                let mut guard = backend.state.lock();
                let mut next = guard.clone();
                next.set_status(chapter_id, problem_id, status, last_updated);
                backend.store.save_record(CATALOG_KEY, &next.to_value()?)?;
                *guard = next;
                Some(guard)
            }
            None => None,
        };

        let updated = {
            let mut problems = self.problems.write();
            let problem = &mut problems[idx];
            problem.status = status;
            problem.last_updated = last_updated;
            problem.clone()
        };
        drop(backend_guard);

        self.bus.publish(Topic::CatalogMutation, ChangeHint::StatusChanged);
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryRecordStore;
    use crate::settings::RangeSelector;
    use serde_json::json;

    #[test]
    fn toggle_twice_clears_status_and_timestamp() {
        let catalog = ProblemCatalog::seeded(SyncBus::new());
        let first = catalog.toggle_status(1, 30, AttemptStatus::Complete).unwrap();
        assert_eq!(first.status, Some(AttemptStatus::Complete));
        assert!(first.last_updated.is_some());
        let second = catalog.toggle_status(1, 30, AttemptStatus::Complete).unwrap();
        assert_eq!(second.status, None);
        assert_eq!(second.last_updated, None);
    }

    #[test]
    fn unknown_problem_is_a_silent_noop() {
        let bus = SyncBus::new();
        let catalog = ProblemCatalog::seeded(bus.clone());
        assert!(catalog.set_status(9, 999, Some(AttemptStatus::Complete)).is_none());
        assert_eq!(bus.last_sequence(), 0);
    }

    #[test]
    fn filter_by_level_and_range() {
        let catalog = ProblemCatalog::seeded(SyncBus::new());
        catalog.set_status(1, 1, Some(AttemptStatus::Incorrect));
        let basic: BTreeSet<_> = [ProblemLevel::Basic].into_iter().collect();
        assert_eq!(catalog.filter(&basic, None).len(), 12 + 10 + 10);
        let range = ProblemRange::new([RangeSelector::Incorrect]);
        let wrong = catalog.filter(&basic, Some(&range));
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].key.problem_id, 1);
    }

    #[test]
    fn writes_persist_in_detected_shape() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .save_record(CATALOG_KEY, &json!([{ "id": 2, "chapter": 1, "status": "partial" }]))
            .unwrap();
        let catalog = ProblemCatalog::seeded(SyncBus::new())
            .with_backend(store.clone())
            .unwrap();
        assert_eq!(catalog.shape(), Some(CatalogShape::Flat));
        assert_eq!(catalog.find(1, 2).unwrap().status, Some(AttemptStatus::Partial));

        catalog.set_status(2, 5, Some(AttemptStatus::Complete));
        let saved = store.load_record(CATALOG_KEY).unwrap().unwrap();
        assert_eq!(saved[1]["chapter"], json!(2));
        assert_eq!(saved[1]["status"], json!("complete"));
    }

    #[test]
    fn chapters_summarize_counts() {
        let catalog = ProblemCatalog::seeded(SyncBus::new());
        let chapters = catalog.chapters();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].problem_count, 36);
        assert_eq!(catalog.counts_by_status().unattempted, catalog.len());
    }
}
