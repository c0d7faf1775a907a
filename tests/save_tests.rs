use chrono::NaiveDate;

use shift_roster::config::SessionConfig;
use shift_roster::remote::{MemoryBackend, ShiftRepository};
use shift_roster::schedule::{
    CellKey, DateRange, Employee, SaveOutcome, ScheduleSession, ShiftEntry, ShiftNotice,
};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn range() -> DateRange {
    DateRange::new(date("2025-08-18"), date("2025-08-24")).unwrap()
}

fn employees() -> Vec<Employee> {
    vec![Employee::new("e1", "Aino"), Employee::new("e2", "Bea")]
}

fn seeded() -> Vec<ShiftEntry> {
    vec![
        ShiftEntry::normal("e1", date("2025-08-18"), 8.0),
        ShiftEntry::normal("e2", date("2025-08-18"), 8.0),
    ]
}

async fn loaded(backend: &MemoryBackend, config: SessionConfig) -> ScheduleSession {
    let shifts = backend.fetch_shifts(&range()).await.unwrap();
    let mut session = ScheduleSession::new(config, range());
    session.hydrate(employees(), range(), shifts);
    session
}

/// Three upserts and two deletes.
fn edit_five(s: &mut ScheduleSession) {
    s.apply_cell_change("e1", date("2025-08-19"), Some(8.0));
    s.apply_cell_change("e1", date("2025-08-20"), Some(6.0));
    s.apply_cell_change("e2", date("2025-08-19"), Some(4.0));
    s.apply_cell_change("e1", date("2025-08-18"), None);
    s.apply_cell_change("e2", date("2025-08-18"), None);
}

#[tokio::test]
async fn empty_buffer_makes_no_calls() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    let before = s.store().clone();

    let outcome = s.save_all(&backend).await.unwrap();
    assert_eq!(outcome, SaveOutcome::NothingToSave);
    assert_eq!(backend.upsert_calls(), 0);
    assert!(backend.delete_calls().is_empty());
    assert_eq!(s.store(), &before);
    assert!(!s.has_unsaved_changes());
}

#[tokio::test]
async fn successful_save_clears_buffer_and_persists() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    edit_five(&mut s);

    let SaveOutcome::Saved(report) = s.save_all(&backend).await.unwrap() else {
        panic!("expected a save");
    };
    assert_eq!(report.upserted, 3);
    assert_eq!(report.deleted, 2);
    assert!(s.pending().is_empty());
    assert!(!s.has_unsaved_changes());
    assert_eq!(backend.upsert_calls(), 1);
    assert_eq!(backend.delete_calls(), vec![2]);

    let remote: Vec<CellKey> = backend.shifts().iter().map(ShiftEntry::key).collect();
    let local: Vec<CellKey> = s.store().entries().map(ShiftEntry::key).collect();
    assert_eq!(remote, local);
}

#[tokio::test]
async fn failed_upsert_keeps_all_five_operations() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    edit_five(&mut s);
    let pending_before = s.pending().clone();
    let store_before = s.store().clone();

    backend.fail_upserts(true);
    let err = s.save_all(&backend).await.unwrap_err();
    assert!(!err.is_validation());

    assert_eq!(s.pending(), &pending_before);
    assert_eq!(s.pending().len(), 5);
    assert_eq!(s.store(), &store_before);
    assert!(s.has_unsaved_changes());
    // Deletes never ran because the upsert failed first
    assert!(backend.delete_calls().is_empty());
    assert_eq!(backend.shifts(), seeded());
}

#[tokio::test]
async fn failed_delete_keeps_buffer_and_retry_succeeds() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    edit_five(&mut s);
    let pending_before = s.pending().clone();

    backend.fail_deletes(true);
    assert!(s.save_all(&backend).await.is_err());
    assert_eq!(s.pending(), &pending_before);
    assert!(s.has_unsaved_changes());

    backend.fail_deletes(false);
    assert!(matches!(
        s.save_all(&backend).await.unwrap(),
        SaveOutcome::Saved(_)
    ));
    assert!(s.pending().is_empty());
    assert_eq!(backend.shifts().len(), 3);
}

#[tokio::test]
async fn deletes_are_chunked() {
    let week: Vec<ShiftEntry> = range()
        .days()
        .map(|d| ShiftEntry::normal("e1", d, 8.0))
        .collect();
    let backend = MemoryBackend::new().with_shifts(week.clone());
    let config = SessionConfig {
        delete_chunk_size: 3,
        ..Default::default()
    };
    let mut s = loaded(&backend, config).await;
    for e in &week {
        s.apply_cell_change("e1", e.work_date, None);
    }

    s.save_all(&backend).await.unwrap();
    assert_eq!(backend.delete_calls(), vec![3, 3, 1]);
    assert_eq!(backend.upsert_calls(), 0);
    assert!(backend.shifts().is_empty());
}

#[tokio::test]
async fn notices_classify_against_persisted_state() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    s.apply_cell_change("e1", date("2025-08-18"), Some(4.0));
    s.apply_cell_change("e1", date("2025-08-19"), Some(8.0));
    s.apply_cell_change("e2", date("2025-08-18"), None);
    // Added then cleared before saving: a delete of a row that never existed
    s.apply_cell_change("e2", date("2025-08-20"), Some(5.0));
    s.apply_cell_change("e2", date("2025-08-20"), None);

    let SaveOutcome::Saved(report) = s.save_all(&backend).await.unwrap() else {
        panic!("expected a save");
    };
    assert_eq!(report.notices.len(), 3);
    assert!(report.notices.iter().any(|n| matches!(
        n,
        ShiftNotice::Changed { before, after } if before.hours == Some(8.0) && after.hours == Some(4.0)
    )));
    assert!(report
        .notices
        .iter()
        .any(|n| matches!(n, ShiftNotice::Added { entry } if entry.work_date == date("2025-08-19"))));
    assert!(report
        .notices
        .iter()
        .any(|n| matches!(n, ShiftNotice::Removed { entry } if entry.employee_id == "e2")));
}

#[tokio::test]
async fn edits_made_during_submit_stay_pending() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    s.apply_cell_change("e1", date("2025-08-19"), Some(8.0));
    s.apply_cell_change("e2", date("2025-08-19"), Some(8.0));

    let plan = s.prepare_save().unwrap();
    // Re-edit one key and touch a new one while the plan is in flight
    s.apply_cell_change("e1", date("2025-08-19"), Some(3.0));
    s.apply_cell_change("e1", date("2025-08-21"), Some(2.0));
    plan.submit(&backend).await.unwrap();
    let report = s.commit_save(&plan);

    assert_eq!(report.upserted, 2);
    assert_eq!(s.pending().len(), 2);
    assert!(s.pending().get(&CellKey::new("e2", date("2025-08-19"))).is_none());
    assert!(s.has_unsaved_changes());
    assert_eq!(s.entry("e1", date("2025-08-19")).unwrap().hours, Some(3.0));
}

#[tokio::test]
async fn undo_after_save_is_persisted_by_next_save() {
    let backend = MemoryBackend::new().with_shifts(seeded());
    let mut s = loaded(&backend, SessionConfig::default()).await;
    s.apply_cell_change("e1", date("2025-08-18"), None);
    s.save_all(&backend).await.unwrap();
    assert_eq!(backend.shifts().len(), 1);

    assert!(s.undo());
    assert!(s.has_unsaved_changes());
    s.save_all(&backend).await.unwrap();
    assert_eq!(backend.shifts(), seeded());
}
