//! In-memory storage backend.
//!
//! Backs the protocol with plain process-memory collections. Used by tests
//! and previews; behaviorally equivalent to the SQLite backend (same
//! ordering, same error kinds, same `total_savings` side effects) so it is
//! a valid drop-in wherever the protocol is consumed.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use shared::{Craving, Goal, NewCraving, Transaction, UserProfile};

use crate::domain::streak;
use crate::errors::{PersistenceError, Result};
use crate::storage::StorageBackend;

#[derive(Default)]
struct MemoryStore {
    profile: Option<UserProfile>,
    transactions: Vec<Transaction>,
    cravings: Vec<Craving>,
    goals: Vec<Goal>,
}

/// Storage backend over in-process collections. Always immediately ready;
/// there is no asynchronous loading phase.
#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<MemoryStore>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn wait_for_load(&self) -> Result<()> {
        Ok(())
    }

    async fn current_profile(&self) -> Result<Option<UserProfile>> {
        Ok(self.store.lock().await.profile.clone())
    }

    async fn create_or_update_profile(
        &self,
        name: &str,
        email: Option<&str>,
        daily_limit: f64,
    ) -> Result<UserProfile> {
        let mut store = self.store.lock().await;
        let now = Utc::now();
        let profile = match store.profile.take() {
            Some(mut existing) => {
                existing.name = name.to_string();
                existing.email = email.map(str::to_string);
                existing.daily_limit = daily_limit;
                existing.updated_at = now;
                existing
            }
            None => UserProfile::new(name, email, daily_limit, now),
        };
        store.profile = Some(profile.clone());
        Ok(profile)
    }

    async fn update_streak(&self) -> Result<Option<UserProfile>> {
        let mut store = self.store.lock().await;
        let Some(profile) = store.profile.as_mut() else {
            return Ok(None);
        };
        let now = Utc::now();
        if let Some(next) = streak::advance(profile.last_check_in, profile.streak, now) {
            profile.streak = next;
            profile.last_check_in = Some(now);
            profile.updated_at = now;
        }
        Ok(Some(profile.clone()))
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let store = self.store.lock().await;
        let mut transactions = store.transactions.clone();
        transactions.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(transactions)
    }

    async fn add_transaction(&self, transaction: Transaction) -> Result<()> {
        let mut store = self.store.lock().await;
        if let Some(profile) = store.profile.as_mut() {
            profile.total_savings += transaction.amount;
            profile.updated_at = Utc::now();
        }
        store.transactions.push(transaction);
        Ok(())
    }

    async fn delete_transaction(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = store
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| PersistenceError::not_found("transaction", id))?;
        let removed = store.transactions.remove(index);
        if let Some(profile) = store.profile.as_mut() {
            profile.total_savings -= removed.amount;
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_craving(&self, args: NewCraving) -> Result<Craving> {
        let mut store = self.store.lock().await;
        let craving = args.into_craving();
        // Explicit ids upsert so replayed records never duplicate
        if let Some(existing) = store.cravings.iter_mut().find(|c| c.id == craving.id) {
            *existing = craving.clone();
        } else {
            store.cravings.push(craving.clone());
        }
        Ok(craving)
    }

    async fn cravings(&self) -> Result<Vec<Craving>> {
        let store = self.store.lock().await;
        let mut cravings = store.cravings.clone();
        cravings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(cravings)
    }

    async fn delete_craving(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = store
            .cravings
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| PersistenceError::not_found("craving", id))?;
        store.cravings.remove(index);
        Ok(())
    }

    async fn save_goal(&self, goal: &Goal) -> Result<()> {
        let mut store = self.store.lock().await;
        if let Some(existing) = store.goals.iter_mut().find(|g| g.id == goal.id) {
            *existing = goal.clone();
        } else {
            store.goals.push(goal.clone());
        }
        Ok(())
    }

    async fn goals(&self) -> Result<Vec<Goal>> {
        let store = self.store.lock().await;
        let mut goals = store.goals.clone();
        goals.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(goals)
    }

    async fn delete_goal(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = store
            .goals
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| PersistenceError::not_found("goal", id))?;
        store.goals.remove(index);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        debug!("Resetting in-memory store");
        *self.store.lock().await = MemoryStore::default();
        Ok(())
    }
}
