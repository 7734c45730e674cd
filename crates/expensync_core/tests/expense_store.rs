use chrono::{TimeZone, Utc};
use expensync_core::db::open_db_in_memory;
use expensync_core::model::expense::{ExpenseDraft, ExpenseRecord, ExpenseValidationError};
use expensync_core::model::money::Money;
use expensync_core::repo::expense_repo::{
    ExpenseQuery, ExpenseSort, ExpenseStore, SortDirection, SqliteExpenseStore,
};
use expensync_core::repo::RepoError;
use expensync_core::session::UserSession;

fn session() -> UserSession {
    UserSession::new("user-1", "device-a").unwrap()
}

fn record(cents: i64, category: &str, day: u32) -> ExpenseRecord {
    ExpenseRecord::new(
        &session(),
        ExpenseDraft {
            amount: Money::from_cents(cents),
            category: category.to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            note: "lunch".to_string(),
        },
        Utc::now(),
    )
}

#[test]
fn put_then_get_returns_equal_record() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    let rec = record(1050, "food", 3);

    store.put(&rec).unwrap();
    let loaded = store.get(rec.id, false).unwrap().unwrap();
    assert_eq!(loaded, rec);
}

#[test]
fn get_of_unknown_id_is_none_not_error() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);

    let loaded = store.get(uuid::Uuid::new_v4(), true).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn put_rejects_invalid_record_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    let rec = record(-100, "food", 3);

    let err = store.put(&rec).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ExpenseValidationError::NegativeAmount(_))
    ));
    assert!(store.get(rec.id, true).unwrap().is_none());
}

#[test]
fn put_replaces_existing_record_by_id() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    let mut rec = record(1000, "food", 3);
    store.put(&rec).unwrap();

    rec.amount = Money::from_cents(2500);
    rec.note = "dinner".to_string();
    store.put(&rec).unwrap();

    let loaded = store.get(rec.id, false).unwrap().unwrap();
    assert_eq!(loaded.amount, Money::from_cents(2500));
    assert_eq!(loaded.note, "dinner");

    let all = store.query(&ExpenseQuery::default()).unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn tombstones_are_hidden_unless_requested() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    let mut rec = record(1000, "food", 3);
    rec.tombstone(&session(), Utc::now());
    store.put(&rec).unwrap();

    assert!(store.get(rec.id, false).unwrap().is_none());
    assert!(store.query(&ExpenseQuery::default()).unwrap().is_empty());

    let loaded = store.get(rec.id, true).unwrap().unwrap();
    assert!(loaded.is_deleted);

    let query = ExpenseQuery {
        include_deleted: true,
        ..ExpenseQuery::default()
    };
    assert_eq!(store.query(&query).unwrap().len(), 1);
}

#[test]
fn query_filters_by_category_and_date_range() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    store.put(&record(100, "food", 1)).unwrap();
    store.put(&record(200, "food", 10)).unwrap();
    store.put(&record(300, "travel", 10)).unwrap();
    store.put(&record(400, "food", 20)).unwrap();

    let query = ExpenseQuery {
        categories: vec!["food".to_string()],
        occurred_from: Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
        occurred_to: Some(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()),
        ..ExpenseQuery::default()
    };

    let matches = store.query(&query).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].amount, Money::from_cents(200));
}

#[test]
fn query_matches_any_category_in_the_set() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    store.put(&record(100, "food", 1)).unwrap();
    store.put(&record(200, "travel", 2)).unwrap();
    store.put(&record(300, "rent", 3)).unwrap();

    let query = ExpenseQuery {
        categories: vec!["food".to_string(), "rent".to_string()],
        ..ExpenseQuery::default()
    };

    let matches = store.query(&query).unwrap();
    let categories: Vec<&str> = matches.iter().map(|rec| rec.category.as_str()).collect();
    assert_eq!(categories, vec!["rent", "food"]);
}

#[test]
fn query_filters_by_amount_bounds() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    store.put(&record(100, "food", 1)).unwrap();
    store.put(&record(250, "food", 2)).unwrap();
    store.put(&record(900, "food", 3)).unwrap();

    let query = ExpenseQuery {
        min_amount: Some(Money::from_cents(200)),
        max_amount: Some(Money::from_cents(500)),
        ..ExpenseQuery::default()
    };

    let matches = store.query(&query).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].amount, Money::from_cents(250));
}

#[test]
fn query_filters_by_owner() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    store.put(&record(100, "food", 1)).unwrap();

    let bob = UserSession::new("user-2", "device-b").unwrap();
    let mut other = record(700, "food", 2);
    other.owner = bob.user_id.clone();
    store.put(&other).unwrap();

    let query = ExpenseQuery {
        owner: Some("user-2".to_string()),
        ..ExpenseQuery::default()
    };

    let matches = store.query(&query).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].owner, "user-2");
}

#[test]
fn query_sorts_by_each_column_in_both_directions() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    store.put(&record(300, "travel", 1)).unwrap();
    store.put(&record(100, "food", 2)).unwrap();
    store.put(&record(200, "rent", 3)).unwrap();

    let amounts = |query: &ExpenseQuery| -> Vec<i64> {
        store
            .query(query)
            .unwrap()
            .iter()
            .map(|rec| rec.amount.cents())
            .collect()
    };

    let amount_asc = ExpenseQuery {
        sort: ExpenseSort::Amount,
        direction: SortDirection::Ascending,
        ..ExpenseQuery::default()
    };
    assert_eq!(amounts(&amount_asc), vec![100, 200, 300]);

    let amount_desc = ExpenseQuery {
        sort: ExpenseSort::Amount,
        ..ExpenseQuery::default()
    };
    assert_eq!(amounts(&amount_desc), vec![300, 200, 100]);

    let category_asc = ExpenseQuery {
        sort: ExpenseSort::Category,
        direction: SortDirection::Ascending,
        ..ExpenseQuery::default()
    };
    assert_eq!(amounts(&category_asc), vec![100, 200, 300]);

    let date_asc = ExpenseQuery {
        sort: ExpenseSort::OccurredAt,
        direction: SortDirection::Ascending,
        ..ExpenseQuery::default()
    };
    assert_eq!(amounts(&date_asc), vec![300, 100, 200]);
}

#[test]
fn query_orders_newest_first_and_pages_without_gaps() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteExpenseStore::new(&conn);
    for day in 1..=5 {
        store.put(&record(i64::from(day) * 100, "food", day)).unwrap();
    }

    let first_page = store
        .query(&ExpenseQuery {
            limit: Some(2),
            ..ExpenseQuery::default()
        })
        .unwrap();
    let second_page = store
        .query(&ExpenseQuery {
            limit: Some(2),
            offset: 2,
            ..ExpenseQuery::default()
        })
        .unwrap();
    let rest = store
        .query(&ExpenseQuery {
            offset: 4,
            ..ExpenseQuery::default()
        })
        .unwrap();

    let mut seen: Vec<i64> = first_page
        .iter()
        .chain(&second_page)
        .chain(&rest)
        .map(|rec| rec.amount.cents())
        .collect();
    assert_eq!(seen, vec![500, 400, 300, 200, 100]);

    seen.dedup();
    assert_eq!(seen.len(), 5);
}
