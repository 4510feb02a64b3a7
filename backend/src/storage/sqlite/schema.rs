//! Statically declared SQLite schema for the durable backend.
//!
//! Executed on every store open; all statements are idempotent. Identifiers
//! are stored as TEXT, timestamps as RFC 3339 TEXT through sqlx's chrono
//! bindings. The only relationship is the aggregation back-reference from
//! transactions to the profile row; cravings and goals are keyed
//! independently.

use sqlx::SqlitePool;

pub(crate) async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            streak INTEGER NOT NULL DEFAULT 0,
            total_savings REAL NOT NULL DEFAULT 0,
            daily_limit REAL NOT NULL DEFAULT 0,
            last_check_in TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            profile_id TEXT NOT NULL REFERENCES user_profiles(id),
            amount REAL NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            note TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cravings (
            id TEXT PRIMARY KEY,
            intensity INTEGER NOT NULL,
            trigger_label TEXT,
            location TEXT,
            note TEXT,
            duration_secs INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            goal_type TEXT NOT NULL,
            target_value INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete every row of every table. Used by `reset()` after the store has
/// been reopened.
pub(crate) async fn wipe_all(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in ["transactions", "cravings", "goals", "user_profiles"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}
