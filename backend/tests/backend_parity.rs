//! Behavioral parity between the SQLite and in-memory backends.
//!
//! One scripted sequence of protocol operations runs against both
//! implementations; every externally observable result (returned lists,
//! ordering, error kinds, profile numbers) must match. This is the
//! substitutability contract that lets the in-memory backend stand in for
//! the durable one in tests and previews.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use uuid::Uuid;

use recovery_tracker_backend::errors::PersistenceError;
use recovery_tracker_backend::storage::{MemoryBackend, SqliteBackend, StorageBackend};
use shared::{Goal, GoalType, NewCraving, Transaction, TransactionCategory, USER_PROFILE_ID};

async fn sqlite_backend() -> Arc<dyn StorageBackend> {
    let url = format!("file:memdb_{}?mode=memory&cache=shared", Uuid::new_v4().simple());
    let backend = SqliteBackend::open(url, Duration::from_secs(5));
    backend.wait_for_load().await.expect("store should load");
    Arc::new(backend)
}

fn memory_backend() -> Arc<dyn StorageBackend> {
    Arc::new(MemoryBackend::new())
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn fixed_transaction(suffix: &str, amount: f64, minutes: i64) -> Transaction {
    Transaction {
        id: format!("transaction::{}", suffix),
        profile_id: USER_PROFILE_ID.to_string(),
        amount,
        category: TransactionCategory::Savings,
        date: base_time() + ChronoDuration::minutes(minutes),
        note: None,
    }
}

fn fixed_goal(suffix: &str, goal_type: GoalType, target: u32, day_offset: i64) -> Goal {
    let mut goal = Goal::new(
        &format!("Goal {}", suffix),
        Some("scripted"),
        goal_type,
        target,
        base_time() + ChronoDuration::days(day_offset),
    );
    goal.id = format!("goal::{}", suffix);
    goal
}

/// Everything a protocol consumer can observe after the scripted sequence.
#[derive(Debug, PartialEq)]
struct Observed {
    profile_name: String,
    profile_email: Option<String>,
    profile_daily_limit: f64,
    profile_streak: u32,
    total_savings: f64,
    transaction_ids: Vec<String>,
    craving_ids: Vec<String>,
    goal_ids: Vec<String>,
    completed_goal_ids: Vec<String>,
    missing_transaction_is_not_found: bool,
    missing_craving_is_not_found: bool,
    missing_goal_is_not_found: bool,
}

async fn run_script(backend: &Arc<dyn StorageBackend>) -> Observed {
    // Profile setup, twice: the second call must update, not duplicate
    backend
        .create_or_update_profile("Sam", None, 20.0)
        .await
        .unwrap();
    backend
        .create_or_update_profile("Samantha", Some("sam@example.com"), 35.0)
        .await
        .unwrap();

    // Transactions out of chronological order; listing must sort by date
    backend
        .add_transaction(fixed_transaction("b", 7.5, 20))
        .await
        .unwrap();
    backend
        .add_transaction(fixed_transaction("a", 12.5, 10))
        .await
        .unwrap();
    backend
        .add_transaction(fixed_transaction("c", 5.0, 30))
        .await
        .unwrap();
    backend.delete_transaction("transaction::a").await.unwrap();
    let missing_transaction = backend.delete_transaction("transaction::a").await;

    // Cravings, also out of order
    for (suffix, minutes) in [("x", 15i64), ("z", 45), ("y", 25)] {
        backend
            .create_craving(NewCraving {
                id: Some(format!("craving::{}", suffix)),
                intensity: 4,
                trigger: Some("stress".to_string()),
                timestamp: Some(base_time() + ChronoDuration::minutes(minutes)),
                ..Default::default()
            })
            .await
            .unwrap();
    }
    backend.delete_craving("craving::y").await.unwrap();
    let missing_craving = backend.delete_craving("craving::y").await;

    // Goals: one completed via upsert
    backend
        .save_goal(&fixed_goal("steady", GoalType::Weekly, 7, 0))
        .await
        .unwrap();
    let mut done = fixed_goal("first-day", GoalType::Daily, 1, 1);
    done.complete(base_time() + ChronoDuration::days(1));
    backend.save_goal(&done).await.unwrap();
    let missing_goal = backend.delete_goal("goal::nope").await;

    backend.update_streak().await.unwrap();

    let profile = backend.current_profile().await.unwrap().unwrap();
    let transactions = backend.all_transactions().await.unwrap();
    let cravings = backend.cravings().await.unwrap();
    let goals = backend.goals().await.unwrap();

    Observed {
        profile_name: profile.name,
        profile_email: profile.email,
        profile_daily_limit: profile.daily_limit,
        profile_streak: profile.streak,
        total_savings: profile.total_savings,
        transaction_ids: transactions.iter().map(|t| t.id.clone()).collect(),
        craving_ids: cravings.iter().map(|c| c.id.clone()).collect(),
        goal_ids: goals.iter().map(|g| g.id.clone()).collect(),
        completed_goal_ids: goals
            .iter()
            .filter(|g| g.is_completed)
            .map(|g| g.id.clone())
            .collect(),
        missing_transaction_is_not_found: matches!(
            missing_transaction,
            Err(PersistenceError::NotFound { kind: "transaction", .. })
        ),
        missing_craving_is_not_found: matches!(
            missing_craving,
            Err(PersistenceError::NotFound { kind: "craving", .. })
        ),
        missing_goal_is_not_found: matches!(
            missing_goal,
            Err(PersistenceError::NotFound { kind: "goal", .. })
        ),
    }
}

#[tokio::test]
async fn test_backends_observe_identically() {
    let sqlite = sqlite_backend().await;
    let memory = memory_backend();

    let from_sqlite = run_script(&sqlite).await;
    let from_memory = run_script(&memory).await;

    assert_eq!(from_sqlite, from_memory);

    // Spot-check the shared expectations rather than only each other
    assert_eq!(from_sqlite.profile_name, "Samantha");
    assert_eq!(from_sqlite.total_savings, 12.5);
    assert_eq!(from_sqlite.profile_streak, 1);
    assert_eq!(
        from_sqlite.transaction_ids,
        vec!["transaction::c".to_string(), "transaction::b".to_string()]
    );
    assert_eq!(
        from_sqlite.craving_ids,
        vec!["craving::z".to_string(), "craving::x".to_string()]
    );
    assert_eq!(
        from_sqlite.goal_ids,
        vec!["goal::first-day".to_string(), "goal::steady".to_string()]
    );
    assert_eq!(from_sqlite.completed_goal_ids, vec!["goal::first-day".to_string()]);
    assert!(from_sqlite.missing_transaction_is_not_found);
    assert!(from_sqlite.missing_craving_is_not_found);
    assert!(from_sqlite.missing_goal_is_not_found);
}

#[tokio::test]
async fn test_reset_completeness_on_both_backends() {
    for backend in [sqlite_backend().await, memory_backend()] {
        run_script(&backend).await;
        backend.reset().await.unwrap();

        assert!(backend.current_profile().await.unwrap().is_none());
        assert!(backend.all_transactions().await.unwrap().is_empty());
        assert!(backend.cravings().await.unwrap().is_empty());
        assert!(backend.goals().await.unwrap().is_empty());

        // The backend stays usable after reset
        backend
            .create_or_update_profile("Fresh", None, 10.0)
            .await
            .unwrap();
        assert!(backend.current_profile().await.unwrap().is_some());
    }
}
