//! # Storage Backend Protocol
//!
//! This module defines the storage abstraction trait that allows different
//! storage backends to be used interchangeably by the domain layer.
//!
//! Both implementations (the durable SQLite backend and the in-memory test
//! backend) must satisfy identical externally observable behavior for every
//! operation: same ordering, same error kinds. Protocol-level tests are
//! written once and run against either backend.

use async_trait::async_trait;
use shared::{Craving, Goal, NewCraving, Transaction, UserProfile};

use crate::errors::Result;

/// Trait defining the interface for all persistence operations.
///
/// All mutation methods are expected to be called from a single in-process
/// writer; reads may come from anywhere. Errors are surfaced as
/// [`PersistenceError`](crate::errors::PersistenceError) kinds, never
/// swallowed.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Suspend until the backend has finished loading, propagating the
    /// cached load failure if the open failed. Resolves immediately once the
    /// backend has reached a terminal state.
    async fn wait_for_load(&self) -> Result<()>;

    /// Fetch the singleton profile, if one has been created yet.
    async fn current_profile(&self) -> Result<Option<UserProfile>>;

    /// Upsert the singleton profile. Keyed by a stable identifier, so
    /// repeated calls can never create duplicate profiles.
    async fn create_or_update_profile(
        &self,
        name: &str,
        email: Option<&str>,
        daily_limit: f64,
    ) -> Result<UserProfile>;

    /// Advance the stored profile's streak for a check-in happening now and
    /// stamp `last_check_in`. Returns `None` when no profile exists yet.
    ///
    /// The day arithmetic lives in [`crate::domain::streak`]; backends only
    /// apply its result, so the algorithm is never duplicated.
    async fn update_streak(&self) -> Result<Option<UserProfile>>;

    /// All stored transactions, ordered by date descending.
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;

    /// Store a transaction and atomically add its amount to the owning
    /// profile's `total_savings`.
    async fn add_transaction(&self, transaction: Transaction) -> Result<()>;

    /// Delete a transaction and atomically subtract its stored amount from
    /// the owning profile's `total_savings`, exactly once.
    async fn delete_transaction(&self, id: &str) -> Result<()>;

    /// Store a new craving. Unset id/timestamp are assigned; an explicit id
    /// upserts, which lets cache-created records be replayed durably.
    async fn create_craving(&self, args: NewCraving) -> Result<Craving>;

    /// All stored cravings, ordered by timestamp descending.
    async fn cravings(&self) -> Result<Vec<Craving>>;

    /// Delete a craving by id.
    async fn delete_craving(&self, id: &str) -> Result<()>;

    /// Upsert a goal by id.
    async fn save_goal(&self, goal: &Goal) -> Result<()>;

    /// All stored goals, ordered by start date descending.
    async fn goals(&self) -> Result<Vec<Goal>>;

    /// Delete a goal by id.
    async fn delete_goal(&self, id: &str) -> Result<()>;

    /// Delete all entities of every kind, returning the backend to a
    /// fresh-install state. The caller is responsible for serializing this
    /// against in-flight writes.
    async fn reset(&self) -> Result<()>;
}
