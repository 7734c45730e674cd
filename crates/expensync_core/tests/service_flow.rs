use chrono::{TimeZone, Utc};
use expensync_core::aggregate::{DayBucket, TotalsFilter};
use expensync_core::db::open_db_in_memory;
use expensync_core::model::expense::ExpenseDraft;
use expensync_core::model::money::Money;
use expensync_core::notify::{ChangeKind, SubscriptionFilter};
use expensync_core::repo::expense_repo::{ExpenseQuery, SqliteExpenseStore};
use expensync_core::repo::journal_repo::SqliteChangeJournal;
use expensync_core::service::expense_service::{AmendExpense, ExpenseService, ServiceError};
use expensync_core::session::UserSession;
use expensync_core::sync::engine::SyncEngine;
use expensync_core::sync::memory::MemoryRemote;
use uuid::Uuid;

fn session() -> UserSession {
    UserSession::new("user-1", "device-a").unwrap()
}

fn draft(cents: i64, category: &str, month: u32) -> ExpenseDraft {
    dated_draft(cents, category, month, 15)
}

fn dated_draft(cents: i64, category: &str, month: u32, day: u32) -> ExpenseDraft {
    ExpenseDraft {
        amount: Money::from_cents(cents),
        category: category.to_string(),
        occurred_at: Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap(),
        note: String::new(),
    }
}

fn service(
    conn: &rusqlite::Connection,
) -> ExpenseService<SqliteExpenseStore<'_>, SqliteChangeJournal<'_>> {
    ExpenseService::new(SqliteExpenseStore::new(conn), SqliteChangeJournal::new(conn)).unwrap()
}

#[test]
fn recorded_expenses_are_queryable_and_journaled() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    let food = service.record_expense(&session, draft(1000, " Food ", 1)).unwrap();
    service.record_expense(&session, draft(2000, "travel", 1)).unwrap();

    let loaded = service.expense(&session, food).unwrap().unwrap();
    assert_eq!(loaded.category, "food");
    assert_eq!(loaded.amount, Money::from_cents(1000));

    let only_food = service
        .expenses(
            &session,
            &ExpenseQuery {
                categories: vec!["food".to_string()],
                ..ExpenseQuery::default()
            },
        )
        .unwrap();
    assert_eq!(only_food.len(), 1);
    assert_eq!(only_food[0].id, food);

    assert_eq!(service.pending_sync_count(food).unwrap(), 1);
}

#[test]
fn invalid_draft_leaves_no_trace() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    let err = service
        .record_expense(&session, draft(100, "   ", 1))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(service
        .expenses(&session, &ExpenseQuery::default())
        .unwrap()
        .is_empty());
    assert!(service.totals(&session, &TotalsFilter::default()).is_empty());
}

#[test]
fn totals_follow_record_amend_and_remove() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    let id = service.record_expense(&session, draft(1000, "food", 1)).unwrap();
    service.record_expense(&session, draft(500, "food", 2)).unwrap();

    let all = service.totals(&session, &TotalsFilter::default());
    assert_eq!(all["food"], Money::from_cents(1500));

    service
        .amend_expense(
            &session,
            id,
            AmendExpense {
                amount: Some(Money::from_cents(1700)),
                category: Some("Travel".to_string()),
                ..AmendExpense::default()
            },
        )
        .unwrap();

    let after_amend = service.totals(&session, &TotalsFilter::default());
    assert_eq!(after_amend["food"], Money::from_cents(500));
    assert_eq!(after_amend["travel"], Money::from_cents(1700));

    service.remove_expense(&session, id).unwrap();
    let after_remove = service.totals(&session, &TotalsFilter::default());
    assert_eq!(after_remove.get("travel"), None);
    assert_eq!(after_remove["food"], Money::from_cents(500));
}

#[test]
fn daily_totals_track_spending_per_day() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    service
        .record_expense(&session, dated_draft(1000, "food", 1, 5))
        .unwrap();
    service
        .record_expense(&session, dated_draft(300, "travel", 1, 5))
        .unwrap();
    let id = service
        .record_expense(&session, dated_draft(500, "food", 1, 6))
        .unwrap();

    let days = service.daily_totals(&session, &TotalsFilter::default());
    let day5 = DayBucket {
        year: 2024,
        month: 1,
        day: 5,
    };
    let day6 = DayBucket {
        year: 2024,
        month: 1,
        day: 6,
    };
    assert_eq!(days[&day5], Money::from_cents(1300));
    assert_eq!(days[&day6], Money::from_cents(500));

    service.remove_expense(&session, id).unwrap();
    let after = service.daily_totals(&session, &TotalsFilter::default());
    assert_eq!(after.get(&day6), None);
    assert_eq!(after[&day5], Money::from_cents(1300));
}

#[test]
fn remove_hides_the_record_and_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    let id = service.record_expense(&session, draft(1000, "food", 1)).unwrap();
    service.remove_expense(&session, id).unwrap();

    assert!(service.expense(&session, id).unwrap().is_none());
    assert_eq!(service.pending_sync_count(id).unwrap(), 2);

    // Removing again journals nothing new.
    service.remove_expense(&session, id).unwrap();
    assert_eq!(service.pending_sync_count(id).unwrap(), 2);
}

#[test]
fn mutations_enforce_existence_and_ownership() {
    let conn = open_db_in_memory().unwrap();
    let owner = session();
    let intruder = UserSession::new("user-2", "device-z").unwrap();
    let mut service = service(&conn);

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.amend_expense(&owner, missing, AmendExpense::default()),
        Err(ServiceError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.remove_expense(&owner, missing),
        Err(ServiceError::NotFound(_))
    ));

    let id = service.record_expense(&owner, draft(1000, "food", 1)).unwrap();
    assert!(matches!(
        service.amend_expense(&intruder, id, AmendExpense::default()),
        Err(ServiceError::NotOwner(_))
    ));
    assert!(matches!(
        service.remove_expense(&intruder, id),
        Err(ServiceError::NotOwner(_))
    ));
    assert_eq!(
        service.expense(&owner, id).unwrap().unwrap().amount,
        Money::from_cents(1000)
    );
}

#[test]
fn reads_are_scoped_to_the_session_user() {
    let conn = open_db_in_memory().unwrap();
    let alice = UserSession::new("alice", "device-a").unwrap();
    let bob = UserSession::new("bob", "device-b").unwrap();
    let mut service = service(&conn);

    let alices = service.record_expense(&alice, draft(1000, "food", 1)).unwrap();
    let bobs = service.record_expense(&bob, draft(700, "food", 1)).unwrap();

    // Another user's record is invisible, not an error.
    assert!(service.expense(&bob, alices).unwrap().is_none());
    assert!(service.expense(&alice, bobs).unwrap().is_none());

    let listed = service.expenses(&alice, &ExpenseQuery::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, alices);

    // An explicit owner in the query cannot widen the scope.
    let forged = service
        .expenses(
            &bob,
            &ExpenseQuery {
                owner: Some("alice".to_string()),
                ..ExpenseQuery::default()
            },
        )
        .unwrap();
    assert_eq!(forged.len(), 1);
    assert_eq!(forged[0].id, bobs);

    assert_eq!(
        service.totals(&alice, &TotalsFilter::default())["food"],
        Money::from_cents(1000)
    );
    assert_eq!(
        service.totals(&bob, &TotalsFilter::default())["food"],
        Money::from_cents(700)
    );
}

#[test]
fn subscribers_observe_the_record_lifecycle() {
    let conn = open_db_in_memory().unwrap();
    let session = session();
    let mut service = service(&conn);

    let all_events = service.subscribe(SubscriptionFilter::default());
    let food_only = service.subscribe(SubscriptionFilter {
        category: Some("food".to_string()),
        ..SubscriptionFilter::default()
    });

    let id = service.record_expense(&session, draft(1000, "food", 1)).unwrap();
    service
        .amend_expense(
            &session,
            id,
            AmendExpense {
                category: Some("travel".to_string()),
                ..AmendExpense::default()
            },
        )
        .unwrap();
    service.remove_expense(&session, id).unwrap();

    let kinds: Vec<ChangeKind> = all_events.drain().iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
    );

    let food_kinds: Vec<ChangeKind> = food_only.drain().iter().map(|event| event.kind).collect();
    assert_eq!(food_kinds, vec![ChangeKind::Created]);
}

#[test]
fn absorbed_cycle_report_updates_totals_and_subscribers() {
    let remote = MemoryRemote::new();

    let conn_a = open_db_in_memory().unwrap();
    let session_a = session();
    let mut service_a = service(&conn_a);
    service_a.record_expense(&session_a, draft(1000, "food", 1)).unwrap();
    SyncEngine::new(&conn_a, &remote).sync_cycle(&session_a).unwrap();

    let conn_b = open_db_in_memory().unwrap();
    let session_b = UserSession::new("user-1", "device-b").unwrap();
    let mut service_b = service(&conn_b);
    let events = service_b.subscribe(SubscriptionFilter::default());

    let report = SyncEngine::new(&conn_b, &remote).sync_cycle(&session_b).unwrap();
    assert_eq!(report.pulled, 1);
    service_b.absorb_cycle_report(&report);

    let totals = service_b.totals(&session_b, &TotalsFilter::default());
    assert_eq!(totals["food"], Money::from_cents(1000));

    let drained = events.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].kind, ChangeKind::Created);
    assert_eq!(drained[0].category, "food");
}
