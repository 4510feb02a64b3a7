//! Durable SQLite storage backend.
//!
//! Owns the on-disk store lifecycle: construction immediately starts a
//! single-shot asynchronous open (create database if missing, connect,
//! run the schema), and the resolved outcome is cached so every later
//! `wait_for_load` is cheap. CRUD calls made before the open resolves fail
//! fast with `NotReady`; an open failure is fatal to the instance until
//! `reset()` re-runs the loading transition.

mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use shared::{Craving, Goal, GoalType, NewCraving, Transaction, TransactionCategory, UserProfile, USER_PROFILE_ID};

use crate::domain::streak;
use crate::errors::{PersistenceError, Result};
use crate::storage::StorageBackend;

enum LoadState {
    Loading,
    Loaded(SqlitePool),
    Failed(PersistenceError),
}

/// Storage backend persisting to a SQLite database via `sqlx`.
pub struct SqliteBackend {
    url: String,
    state: Arc<RwLock<LoadState>>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    load_timeout: Duration,
}

impl SqliteBackend {
    /// Begin opening the store at `url`. Returns immediately; the open runs
    /// as a background task and callers observe it through
    /// [`StorageBackend::wait_for_load`].
    pub fn open(url: impl Into<String>, load_timeout: Duration) -> Self {
        let url = url.into();
        let state = Arc::new(RwLock::new(LoadState::Loading));
        let (ready_tx, ready_rx) = watch::channel(false);

        let task_state = state.clone();
        let task_ready = ready_tx.clone();
        let task_url = url.clone();
        tokio::spawn(async move {
            let outcome = open_store(&task_url).await;
            let mut guard = task_state.write().await;
            match outcome {
                Ok(pool) => {
                    info!("SQLite store loaded at {}", task_url);
                    *guard = LoadState::Loaded(pool);
                }
                Err(err) => {
                    error!("SQLite store failed to load at {}: {}", task_url, err);
                    *guard = LoadState::Failed(err);
                }
            }
            let _ = task_ready.send(true);
        });

        Self { url, state, ready_tx, ready_rx, load_timeout }
    }

    /// Fail-fast pool access: `NotReady` before the open resolves, the
    /// cached load failure afterwards.
    async fn pool(&self) -> Result<SqlitePool> {
        match &*self.state.read().await {
            LoadState::Loaded(pool) => Ok(pool.clone()),
            LoadState::Loading => Err(PersistenceError::NotReady),
            LoadState::Failed(err) => Err(err.clone()),
        }
    }
}

/// Open (creating if necessary) the database and run the schema.
async fn open_store(url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::create_database(url)
            .await
            .map_err(|e| PersistenceError::StoreLoadFailed(e.to_string()))?;
    }

    let pool = SqlitePool::connect(url)
        .await
        .map_err(|e| PersistenceError::StoreLoadFailed(e.to_string()))?;

    schema::create_tables(&pool)
        .await
        .map_err(|e| PersistenceError::SchemaFailed(e.to_string()))?;

    Ok(pool)
}

async fn fetch_profile(pool: &SqlitePool) -> Result<Option<UserProfile>> {
    let row = sqlx::query("SELECT * FROM user_profiles WHERE id = ?")
        .bind(USER_PROFILE_ID)
        .fetch_optional(pool)
        .await
        .map_err(PersistenceError::write)?;
    Ok(row.map(|r| profile_from_row(&r)))
}

fn profile_from_row(row: &SqliteRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        streak: row.get::<i64, _>("streak").max(0) as u32,
        total_savings: row.get("total_savings"),
        daily_limit: row.get("daily_limit"),
        last_check_in: row.get::<Option<DateTime<Utc>>, _>("last_check_in"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn transaction_from_row(row: &SqliteRow) -> Transaction {
    Transaction {
        id: row.get("id"),
        profile_id: row.get("profile_id"),
        amount: row.get("amount"),
        category: TransactionCategory::parse(row.get::<String, _>("category").as_str()),
        date: row.get("date"),
        note: row.get("note"),
    }
}

fn craving_from_row(row: &SqliteRow) -> Craving {
    Craving {
        id: row.get("id"),
        intensity: row.get::<i64, _>("intensity") as i32,
        trigger: row.get("trigger_label"),
        location: row.get("location"),
        note: row.get("note"),
        duration_secs: row.get("duration_secs"),
        timestamp: row.get("timestamp"),
    }
}

fn goal_from_row(row: &SqliteRow) -> Goal {
    let type_label: String = row.get("goal_type");
    let goal_type = match GoalType::parse(&type_label) {
        Ok(goal_type) => goal_type,
        Err(e) => {
            warn!("{}; falling back to daily", e);
            GoalType::Daily
        }
    };
    Goal {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        goal_type,
        target_value: row.get::<i64, _>("target_value").max(0) as u32,
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        is_completed: row.get("is_completed"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
    }
}

async fn write_profile(pool: &SqlitePool, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO user_profiles
            (id, name, email, streak, total_savings, daily_limit, last_check_in, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&profile.id)
    .bind(&profile.name)
    .bind(&profile.email)
    .bind(profile.streak as i64)
    .bind(profile.total_savings)
    .bind(profile.daily_limit)
    .bind(profile.last_check_in)
    .bind(profile.created_at)
    .bind(profile.updated_at)
    .execute(pool)
    .await
    .map_err(PersistenceError::write)?;
    Ok(())
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn wait_for_load(&self) -> Result<()> {
        let mut ready = self.ready_rx.clone();
        match tokio::time::timeout(self.load_timeout, ready.wait_for(|loaded| *loaded)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(PersistenceError::StoreLoadFailed("load task vanished".to_string())),
            Err(_) => return Err(PersistenceError::Timeout),
        }
        match &*self.state.read().await {
            LoadState::Loaded(_) => Ok(()),
            LoadState::Failed(err) => Err(err.clone()),
            LoadState::Loading => Err(PersistenceError::NotReady),
        }
    }

    async fn current_profile(&self) -> Result<Option<UserProfile>> {
        let pool = self.pool().await?;
        fetch_profile(&pool).await
    }

    async fn create_or_update_profile(
        &self,
        name: &str,
        email: Option<&str>,
        daily_limit: f64,
    ) -> Result<UserProfile> {
        let pool = self.pool().await?;
        let now = Utc::now();
        let profile = match fetch_profile(&pool).await? {
            Some(mut existing) => {
                existing.name = name.to_string();
                existing.email = email.map(str::to_string);
                existing.daily_limit = daily_limit;
                existing.updated_at = now;
                existing
            }
            None => UserProfile::new(name, email, daily_limit, now),
        };
        write_profile(&pool, &profile).await?;
        Ok(profile)
    }

    async fn update_streak(&self) -> Result<Option<UserProfile>> {
        let pool = self.pool().await?;
        let Some(mut profile) = fetch_profile(&pool).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if let Some(next) = streak::advance(profile.last_check_in, profile.streak, now) {
            profile.streak = next;
            profile.last_check_in = Some(now);
            profile.updated_at = now;
            write_profile(&pool, &profile).await?;
        }
        Ok(Some(profile))
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT * FROM transactions ORDER BY date DESC")
            .fetch_all(&pool)
            .await
            .map_err(PersistenceError::write)?;
        Ok(rows.iter().map(transaction_from_row).collect())
    }

    async fn add_transaction(&self, transaction: Transaction) -> Result<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(PersistenceError::write)?;

        sqlx::query(
            "INSERT INTO transactions (id, profile_id, amount, category, date, note) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.id)
        .bind(&transaction.profile_id)
        .bind(transaction.amount)
        .bind(transaction.category.as_str())
        .bind(transaction.date)
        .bind(&transaction.note)
        .execute(&mut *tx)
        .await
        .map_err(PersistenceError::write)?;

        sqlx::query("UPDATE user_profiles SET total_savings = total_savings + ?, updated_at = ? WHERE id = ?")
            .bind(transaction.amount)
            .bind(Utc::now())
            .bind(&transaction.profile_id)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::write)?;

        tx.commit().await.map_err(PersistenceError::write)
    }

    async fn delete_transaction(&self, id: &str) -> Result<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(PersistenceError::write)?;

        let row = sqlx::query("SELECT amount, profile_id FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(PersistenceError::write)?
            .ok_or_else(|| PersistenceError::not_found("transaction", id))?;
        let amount: f64 = row.get("amount");
        let profile_id: String = row.get("profile_id");

        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::write)?;

        sqlx::query("UPDATE user_profiles SET total_savings = total_savings - ?, updated_at = ? WHERE id = ?")
            .bind(amount)
            .bind(Utc::now())
            .bind(&profile_id)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::write)?;

        tx.commit().await.map_err(PersistenceError::write)
    }

    async fn create_craving(&self, args: NewCraving) -> Result<Craving> {
        let pool = self.pool().await?;
        let craving = args.into_craving();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cravings
                (id, intensity, trigger_label, location, note, duration_secs, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&craving.id)
        .bind(craving.intensity as i64)
        .bind(&craving.trigger)
        .bind(&craving.location)
        .bind(&craving.note)
        .bind(craving.duration_secs)
        .bind(craving.timestamp)
        .execute(&pool)
        .await
        .map_err(PersistenceError::write)?;
        Ok(craving)
    }

    async fn cravings(&self) -> Result<Vec<Craving>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT * FROM cravings ORDER BY timestamp DESC")
            .fetch_all(&pool)
            .await
            .map_err(PersistenceError::write)?;
        Ok(rows.iter().map(craving_from_row).collect())
    }

    async fn delete_craving(&self, id: &str) -> Result<()> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM cravings WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .map_err(PersistenceError::write)?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("craving", id));
        }
        Ok(())
    }

    async fn save_goal(&self, goal: &Goal) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO goals
                (id, title, description, goal_type, target_value, start_date, end_date, is_completed, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&goal.id)
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.goal_type.as_str())
        .bind(goal.target_value as i64)
        .bind(goal.start_date)
        .bind(goal.end_date)
        .bind(goal.is_completed)
        .bind(goal.completed_at)
        .execute(&pool)
        .await
        .map_err(PersistenceError::write)?;
        Ok(())
    }

    async fn goals(&self) -> Result<Vec<Goal>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT * FROM goals ORDER BY start_date DESC")
            .fetch_all(&pool)
            .await
            .map_err(PersistenceError::write)?;
        Ok(rows.iter().map(goal_from_row).collect())
    }

    async fn delete_goal(&self, id: &str) -> Result<()> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM goals WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .map_err(PersistenceError::write)?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("goal", id));
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        info!("Resetting SQLite store at {}", self.url);

        // Tear down: close the pool and re-enter the loading transition
        {
            let mut guard = self.state.write().await;
            if let LoadState::Loaded(pool) = &*guard {
                pool.close().await;
            }
            *guard = LoadState::Loading;
            let _ = self.ready_tx.send(false);
        }

        let outcome = match open_store(&self.url).await {
            Ok(pool) => schema::wipe_all(&pool)
                .await
                .map_err(|e| PersistenceError::StoreLoadFailed(e.to_string()))
                .map(|_| pool),
            Err(err) => Err(err),
        };

        let mut guard = self.state.write().await;
        let result = match outcome {
            Ok(pool) => {
                info!("SQLite store reloaded after reset");
                *guard = LoadState::Loaded(pool);
                Ok(())
            }
            Err(err) => {
                error!("SQLite store failed to reload after reset: {}", err);
                *guard = LoadState::Failed(err.clone());
                Err(err)
            }
        };
        let _ = self.ready_tx.send(true);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    /// Each test gets its own shared-cache in-memory database so state never
    /// leaks between tests.
    fn test_url() -> String {
        format!("file:memdb_{}?mode=memory&cache=shared", Uuid::new_v4().simple())
    }

    async fn loaded_backend() -> SqliteBackend {
        let backend = SqliteBackend::open(test_url(), Duration::from_secs(5));
        backend.wait_for_load().await.expect("store should load");
        backend
    }

    #[tokio::test]
    async fn test_wait_for_load_is_cheap_after_first_resolution() {
        let backend = loaded_backend().await;
        // Cached result: repeated waits resolve without re-opening
        backend.wait_for_load().await.unwrap();
        backend.wait_for_load().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_failure_propagates_to_waiters() {
        let backend = SqliteBackend::open(
            "sqlite:/nonexistent-dir/definitely/missing.db",
            Duration::from_secs(5),
        );
        let err = backend.wait_for_load().await.unwrap_err();
        assert!(matches!(err, PersistenceError::StoreLoadFailed(_)));

        // The failure is cached and fatal until reset
        let err = backend.current_profile().await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::StoreLoadFailed(_) | PersistenceError::NotReady
        ));
    }

    #[tokio::test]
    async fn test_profile_upsert_keeps_singleton() {
        let backend = loaded_backend().await;
        let first = backend
            .create_or_update_profile("Sam", None, 20.0)
            .await
            .unwrap();
        let second = backend
            .create_or_update_profile("Samantha", Some("sam@example.com"), 35.0)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Samantha");

        let stored = backend.current_profile().await.unwrap().unwrap();
        assert_eq!(stored.name, "Samantha");
        assert_eq!(stored.daily_limit, 35.0);
    }

    #[tokio::test]
    async fn test_savings_follow_transaction_adds_and_deletes() {
        let backend = loaded_backend().await;
        backend
            .create_or_update_profile("Sam", None, 20.0)
            .await
            .unwrap();

        let tx_a = Transaction::new(10.0, TransactionCategory::Savings, None);
        let tx_b = Transaction::new(2.5, TransactionCategory::Entertainment, None);
        backend.add_transaction(tx_a.clone()).await.unwrap();
        backend.add_transaction(tx_b.clone()).await.unwrap();

        let profile = backend.current_profile().await.unwrap().unwrap();
        assert_eq!(profile.total_savings, 12.5);

        backend.delete_transaction(&tx_b.id).await.unwrap();
        let profile = backend.current_profile().await.unwrap().unwrap();
        assert_eq!(profile.total_savings, 10.0);

        let err = backend.delete_transaction(&tx_b.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { kind: "transaction", .. }));
        // The second delete must not subtract again
        let profile = backend.current_profile().await.unwrap().unwrap();
        assert_eq!(profile.total_savings, 10.0);
    }

    #[tokio::test]
    async fn test_craving_round_trip_preserves_fields() {
        let backend = loaded_backend().await;
        let logged_at = Utc.with_ymd_and_hms(2024, 5, 2, 18, 30, 0).unwrap();
        let created = backend
            .create_craving(NewCraving {
                intensity: 7,
                trigger: Some("stress".to_string()),
                location: Some("office".to_string()),
                note: Some("deadline day".to_string()),
                duration_secs: 90,
                timestamp: Some(logged_at),
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = backend.cravings().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], created);
    }

    #[tokio::test]
    async fn test_goal_upsert_and_ordering() {
        let backend = loaded_backend().await;
        let base = Utc::now();
        let older = Goal::new("Week one", None, GoalType::Weekly, 7, base - chrono::Duration::days(10));
        let mut newer = Goal::new("Day one", None, GoalType::Daily, 3, base);
        backend.save_goal(&older).await.unwrap();
        backend.save_goal(&newer).await.unwrap();

        newer.complete(base);
        backend.save_goal(&newer).await.unwrap();

        let goals = backend.goals().await.unwrap();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].id, newer.id);
        assert!(goals[0].is_completed);
        assert_eq!(goals[1].id, older.id);
    }

    #[tokio::test]
    async fn test_reset_wipes_and_reloads() {
        let backend = loaded_backend().await;
        backend
            .create_or_update_profile("Sam", None, 20.0)
            .await
            .unwrap();
        backend
            .add_transaction(Transaction::new(5.0, TransactionCategory::Other, None))
            .await
            .unwrap();
        backend.create_craving(NewCraving::default()).await.unwrap();

        backend.reset().await.unwrap();

        // Back in Loaded: CRUD works immediately and everything is gone
        assert!(backend.current_profile().await.unwrap().is_none());
        assert!(backend.all_transactions().await.unwrap().is_empty());
        assert!(backend.cravings().await.unwrap().is_empty());
        assert!(backend.goals().await.unwrap().is_empty());
    }
}
