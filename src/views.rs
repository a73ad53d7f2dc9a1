use crate::store::TaskStore;
use crate::sync_bus::{DirtyFlag, SyncBus, Topic};
use crate::task::ScheduledTask;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;

/// The calendar window a view displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Day(NaiveDate),
    Week { containing: NaiveDate, week_start: Weekday },
    Month { year: i32, month: u32 },
}

impl ViewKind {
    /// Inclusive date range covered, or `None` for an impossible month.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            ViewKind::Day(date) => Some((date, date)),
            ViewKind::Week {
                containing,
                week_start,
            } => {
                let offset = (7 + containing.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                let start = containing.checked_sub_days(Days::new(u64::from(offset)))?;
                let end = start.checked_add_days(Days::new(6))?;
                Some((start, end))
            }
            ViewKind::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)?
                };
                Some((start, next.pred_opt()?))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub tasks: Vec<ScheduledTask>,
}

impl DayBucket {
    pub fn completed(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_complete()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// One bucket per calendar day of the view, tasks sorted by title.
pub fn load_buckets(store: &TaskStore, kind: ViewKind) -> Vec<DayBucket> {
    let Some((start, end)) = kind.range() else {
        return Vec::new();
    };
    let tasks = store.find_by_date_range(start, end);
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| {
            let mut day_tasks: Vec<ScheduledTask> = tasks
                .iter()
                .filter(|task| task.due_date == date)
                .cloned()
                .collect();
            day_tasks.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
            DayBucket {
                date,
                tasks: day_tasks,
            }
        })
        .collect()
}

/// A view that re-reads the store only after a task mutation was announced.
#[derive(Debug)]
pub struct LiveView {
    kind: ViewKind,
    flag: DirtyFlag,
    buckets: Vec<DayBucket>,
}

impl LiveView {
    /// The view starts dirty, so the first refresh always loads.
    pub fn new(kind: ViewKind, bus: &SyncBus) -> Self {
        Self {
            kind,
            flag: bus.dirty_flag(Topic::TaskMutation),
            buckets: Vec::new(),
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ViewKind) {
        if kind != self.kind {
            self.kind = kind;
            self.flag.mark();
        }
    }

    pub fn is_stale(&self) -> bool {
        self.flag.is_dirty()
    }

    /// Returns whether the buckets were reloaded.
    pub fn refresh_if_dirty(&mut self, store: &TaskStore) -> bool {
        // Clear before reading so a write landing mid-read raises the flag again.
        if !self.flag.take() {
            return false;
        }
        self.buckets = load_buckets(store, self.kind);
        true
    }

    pub fn buckets(&self) -> &[DayBucket] {
        &self.buckets
    }
}
