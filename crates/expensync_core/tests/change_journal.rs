use chrono::Utc;
use expensync_core::db::{open_db, open_db_in_memory};
use expensync_core::model::expense::{ChangeOp, ExpenseDraft, ExpenseRecord};
use expensync_core::model::money::Money;
use expensync_core::repo::journal_repo::{ChangeJournal, SqliteChangeJournal, SyncStatus};
use expensync_core::repo::RepoError;
use expensync_core::session::UserSession;

fn record(cents: i64) -> ExpenseRecord {
    let session = UserSession::new("user-1", "device-a").unwrap();
    ExpenseRecord::new(
        &session,
        ExpenseDraft {
            amount: Money::from_cents(cents),
            category: "food".to_string(),
            occurred_at: Utc::now(),
            note: String::new(),
        },
        Utc::now(),
    )
}

#[test]
fn append_assigns_strictly_increasing_sequence_numbers() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);

    let first = journal.append(ChangeOp::Create, &record(100)).unwrap();
    let second = journal.append(ChangeOp::Create, &record(200)).unwrap();
    let third = journal.append(ChangeOp::Create, &record(300)).unwrap();

    assert!(first < second && second < third);
}

#[test]
fn sequence_numbers_are_never_reused_after_pruning_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.db");

    let highest_before = {
        let conn = open_db(&path).unwrap();
        let journal = SqliteChangeJournal::new(&conn);

        journal.append(ChangeOp::Create, &record(100)).unwrap();
        let last = journal.append(ChangeOp::Update, &record(200)).unwrap();
        journal.mark_acknowledged(last - 1).unwrap();
        journal.mark_acknowledged(last).unwrap();
        assert_eq!(journal.delete_acknowledged().unwrap(), 2);
        last
    };

    let conn = open_db(&path).unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let after_restart = journal.append(ChangeOp::Create, &record(300)).unwrap();
    assert!(after_restart > highest_before);
}

#[test]
fn unacknowledged_since_returns_pending_and_in_flight_in_order() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);

    let first = journal.append(ChangeOp::Create, &record(100)).unwrap();
    let second = journal.append(ChangeOp::Create, &record(200)).unwrap();
    let third = journal.append(ChangeOp::Create, &record(300)).unwrap();

    journal.mark_in_flight(first).unwrap();
    journal.mark_acknowledged(second).unwrap();

    let entries = journal.unacknowledged_since(0, 10).unwrap();
    let seqs: Vec<i64> = entries.iter().map(|entry| entry.seq).collect();
    assert_eq!(seqs, vec![first, third]);
    assert_eq!(entries[0].status, SyncStatus::InFlight);
    assert_eq!(entries[1].status, SyncStatus::Pending);

    let limited = journal.unacknowledged_since(0, 1).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].seq, first);

    let resumed = journal.unacknowledged_since(first, 10).unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].seq, third);
}

#[test]
fn entry_round_trips_payload_and_metadata() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let rec = record(1234);

    let seq = journal.append(ChangeOp::Update, &rec).unwrap();
    let entries = journal.unacknowledged_since(0, 10).unwrap();

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.seq, seq);
    assert_eq!(entry.record_id, rec.id);
    assert_eq!(entry.op, ChangeOp::Update);
    assert_eq!(entry.payload, rec);
    assert_eq!(entry.base_revision, 0);
    assert_eq!(entry.failure_reason, None);
}

#[test]
fn mark_acknowledged_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let seq = journal.append(ChangeOp::Create, &record(100)).unwrap();

    journal.mark_in_flight(seq).unwrap();
    journal.mark_acknowledged(seq).unwrap();
    journal.mark_acknowledged(seq).unwrap();

    assert!(journal.unacknowledged_since(0, 10).unwrap().is_empty());
}

#[test]
fn backward_transitions_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let seq = journal.append(ChangeOp::Create, &record(100)).unwrap();

    // Requeue only applies to quarantined entries.
    assert!(matches!(
        journal.requeue(seq),
        Err(RepoError::InvalidTransition { .. })
    ));

    journal.mark_acknowledged(seq).unwrap();
    assert!(matches!(
        journal.quarantine(seq, "too late"),
        Err(RepoError::InvalidTransition { .. })
    ));
    assert!(matches!(
        journal.mark_in_flight(seq),
        Err(RepoError::InvalidTransition { .. })
    ));
}

#[test]
fn unknown_sequence_numbers_report_entry_not_found() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);

    assert!(matches!(
        journal.mark_in_flight(42),
        Err(RepoError::EntryNotFound(42))
    ));
    assert!(matches!(
        journal.discard(42),
        Err(RepoError::EntryNotFound(42))
    ));
}

#[test]
fn quarantine_requeue_and_discard_lifecycle() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let seq = journal.append(ChangeOp::Create, &record(100)).unwrap();

    journal.mark_in_flight(seq).unwrap();
    journal.quarantine(seq, "amount exceeds plan limit").unwrap();

    let quarantined = journal.quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].status, SyncStatus::Failed);
    assert_eq!(
        quarantined[0].failure_reason.as_deref(),
        Some("amount exceeds plan limit")
    );
    assert!(journal.unacknowledged_since(0, 10).unwrap().is_empty());

    journal.requeue(seq).unwrap();
    assert!(journal.quarantined().unwrap().is_empty());
    let entries = journal.unacknowledged_since(0, 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, SyncStatus::Pending);
    assert_eq!(entries[0].failure_reason, None);

    // Discard only removes quarantined entries.
    assert!(matches!(
        journal.discard(seq),
        Err(RepoError::InvalidTransition { .. })
    ));
    journal.quarantine(seq, "rejected again").unwrap();
    journal.discard(seq).unwrap();
    assert!(journal.quarantined().unwrap().is_empty());
}

#[test]
fn pending_count_tracks_one_record_across_statuses() {
    let conn = open_db_in_memory().unwrap();
    let journal = SqliteChangeJournal::new(&conn);
    let rec = record(100);

    let first = journal.append(ChangeOp::Create, &rec).unwrap();
    let second = journal.append(ChangeOp::Update, &rec).unwrap();
    journal.append(ChangeOp::Create, &record(999)).unwrap();

    assert_eq!(journal.pending_count_for(rec.id).unwrap(), 2);

    journal.mark_in_flight(first).unwrap();
    assert_eq!(journal.pending_count_for(rec.id).unwrap(), 2);

    journal.mark_acknowledged(first).unwrap();
    journal.mark_acknowledged(second).unwrap();
    assert_eq!(journal.pending_count_for(rec.id).unwrap(), 0);
}
