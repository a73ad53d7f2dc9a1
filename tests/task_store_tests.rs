use chrono::NaiveDate;
use spark_planner::{
    AttemptStatus, MemoryRecordStore, NewTask, RecordStore, StoreError, SyncBus, TaskOrigin,
    TaskPatch, TaskStore, Topic,
    persistence::TASKS_KEY,
};
use std::sync::Arc;

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn scheduled(chapter: u32, problem: u32, due: NaiveDate) -> NewTask {
    let mut task = NewTask::manual(format!("Problem #{problem}"), "Chapter 1.1 Sets", due);
    task.id = Some(format!("spark-{chapter}-{problem}"));
    task
}

#[test]
fn create_assigns_fresh_ids_to_manual_tasks() {
    let store = TaskStore::new(SyncBus::new());
    let mut with_foreign_id = NewTask::manual("Read notes", "Math", d(2025, 5, 20));
    with_foreign_id.id = Some("my-own-id".into());

    let a = store.create(with_foreign_id).unwrap();
    let b = store
        .create(NewTask::manual("Read notes", "Math", d(2025, 5, 20)))
        .unwrap();

    assert_ne!(a.id, "my-own-id");
    assert_ne!(a.id, b.id);
    assert_eq!(a.origin, TaskOrigin::Manual);
    assert_eq!(store.len(), 2);
}

#[test]
fn create_with_scheduler_id_is_idempotent() {
    let store = TaskStore::new(SyncBus::new());
    store.create(scheduled(1, 30, d(2025, 5, 20))).unwrap();
    let again = store.create(scheduled(1, 30, d(2025, 5, 22))).unwrap();
    assert_eq!(again.id, "spark-1-30");
    assert_eq!(again.origin, TaskOrigin::Scheduler);
    assert_eq!(store.len(), 1);
    assert_eq!(store.find_by_id("spark-1-30").unwrap().due_date, d(2025, 5, 22));
}

#[test]
fn update_and_delete_on_missing_id_fail_without_mutation() {
    let bus = SyncBus::new();
    let store = TaskStore::new(bus.clone());
    store
        .create(NewTask::manual("Read notes", "Math", d(2025, 5, 20)))
        .unwrap();
    let sequence = bus.last_sequence();

    let err = store
        .update("nope", TaskPatch::status(Some(AttemptStatus::Complete)))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ref id) if id == "nope"));
    assert!(matches!(store.delete("nope"), Err(StoreError::NotFound(_))));
    assert_eq!(bus.last_sequence(), sequence);
    assert_eq!(store.find_by_status(None).len(), 1);
}

#[test]
fn queries_filter_live_data() {
    let store = TaskStore::new(SyncBus::new());
    store.create(scheduled(1, 1, d(2025, 5, 19))).unwrap();
    store.create(scheduled(1, 2, d(2025, 5, 21))).unwrap();
    let manual = store
        .create(NewTask::manual("Flashcards", "Biology", d(2025, 5, 20)).with_tag("memory"))
        .unwrap();
    store
        .update("spark-1-2", TaskPatch::status(Some(AttemptStatus::Partial)))
        .unwrap();

    let range: Vec<String> = store
        .find_by_date_range(d(2025, 5, 19), d(2025, 5, 20))
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(range, vec!["spark-1-1".to_string(), manual.id.clone()]);
    assert_eq!(store.find_by_status(Some(AttemptStatus::Partial)).len(), 1);
    assert_eq!(store.find_by_subject("Biology").len(), 1);
    assert_eq!(store.find_by_tag("MEMORY")[0].id, manual.id);
    assert_eq!(store.find_scheduler_owned().len(), 2);
    assert_eq!(store.find_for_day(d(2025, 5, 21))[0].id, "spark-1-2");
}

#[test]
fn statistics_buckets_always_sum_to_total() {
    let store = TaskStore::new(SyncBus::new());
    let statuses = [
        None,
        Some(AttemptStatus::Complete),
        Some(AttemptStatus::Partial),
        Some(AttemptStatus::Incorrect),
        Some(AttemptStatus::Complete),
    ];
    for (i, status) in statuses.into_iter().enumerate() {
        let task = store.create(scheduled(2, i as u32 + 1, d(2025, 5, 20))).unwrap();
        store.update(&task.id, TaskPatch::status(status)).unwrap();
        let stats = store.statistics();
        assert_eq!(
            stats.completed + stats.partial + stats.incorrect + stats.pending,
            stats.total
        );
    }
    let stats = store.statistics();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.pending, 1);

    store.delete("spark-2-2").unwrap();
    assert_eq!(store.statistics().completed, 1);
}

#[test]
fn replace_scheduler_owned_never_touches_manual_tasks() {
    let bus = SyncBus::new();
    let store = TaskStore::new(bus.clone());
    store.create(scheduled(1, 1, d(2025, 5, 19))).unwrap();
    store.create(scheduled(1, 2, d(2025, 5, 19))).unwrap();
    let manual = store
        .create(NewTask::manual("Flashcards", "Biology", d(2025, 5, 19)))
        .unwrap();
    let (_sub, rx) = bus.subscribe_channel(Topic::TaskMutation);

    let summary = store
        .replace_scheduler_owned(vec![
            scheduled(1, 2, d(2025, 6, 1)),
            scheduled(1, 3, d(2025, 6, 2)),
            scheduled(1, 4, d(2025, 6, 2)),
        ])
        .unwrap();

    assert_eq!(summary.removed, 2);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.kept, 1);
    assert_eq!(store.find_by_id(&manual.id), Some(manual));
    assert!(store.find_by_id("spark-1-1").is_none());
    assert_eq!(store.find_by_id("spark-1-2").unwrap().due_date, d(2025, 6, 1));
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn duplicate_replacements_leave_the_store_untouched() {
    let store = TaskStore::new(SyncBus::new());
    store.create(scheduled(1, 1, d(2025, 5, 19))).unwrap();
    let err = store
        .replace_scheduler_owned(vec![
            scheduled(1, 5, d(2025, 6, 1)),
            scheduled(1, 5, d(2025, 6, 2)),
        ])
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert_eq!(store.find_all().len(), 1);
    assert!(store.find_by_id("spark-1-1").is_some());
}

#[test]
fn writes_are_persisted_and_reloaded() {
    let backend = Arc::new(MemoryRecordStore::new());
    let store = TaskStore::with_backend(SyncBus::new(), backend.clone()).unwrap();
    let manual = store
        .create(NewTask::manual("Flashcards", "Biology", d(2025, 5, 19)).with_user("u-7"))
        .unwrap();

    let saved = backend.load_record(TASKS_KEY).unwrap().unwrap();
    assert_eq!(saved[0]["dueDate"], "2025-05-19");
    assert_eq!(saved[0]["userId"], "u-7");

    let reopened = TaskStore::with_backend(SyncBus::new(), backend.clone()).unwrap();
    assert_eq!(reopened.find_by_id(&manual.id), Some(manual));

    backend.save_record(TASKS_KEY, &serde_json::json!([])).unwrap();
    assert_eq!(reopened.reload().unwrap(), 0);
    assert!(reopened.is_empty());
}
