//! Recovery state service.
//!
//! The stateful domain service behind the tracking UI. It owns the live
//! caches of cravings, goals and streak counters, performs the derived
//! computations (streak advancement, goal progress, the goal-completion
//! sweep), and schedules debounced flushes to the storage backend.
//!
//! Ownership: the storage backend owns the durable records and is the
//! source of truth across restarts; the caches here are a
//! read-through/write-through projection refreshed by [`RecoveryService::load`].
//!
//! Mutations never write to the backend synchronously. Every mutation
//! cancels the pending flush task and schedules a new one after the
//! debounce interval, so a burst of interactions collapses into a single
//! write pass that replays all dirty state through the protocol.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared::{Craving, Goal, NewCraving};

use crate::domain::streak;
use crate::errors::{PersistenceError, Result};
use crate::storage::StorageBackend;

#[derive(Default)]
struct CachedState {
    streak_days: u32,
    urges_handled: u32,
    last_saved_date: Option<DateTime<Utc>>,
    cravings: Vec<Craving>,
    goals: Vec<Goal>,
    /// Cravings created since the last successful flush.
    pending_cravings: Vec<Craving>,
    /// Ids of goals changed since the last successful flush.
    dirty_goals: HashSet<String>,
    streak_dirty: bool,
}

/// Stateful domain service owning the in-memory projection of the tracked
/// recovery state.
pub struct RecoveryService {
    backend: Arc<dyn StorageBackend>,
    state: Arc<Mutex<CachedState>>,
    flush_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl RecoveryService {
    pub fn new(backend: Arc<dyn StorageBackend>, debounce: Duration) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(CachedState::default())),
            flush_task: std::sync::Mutex::new(None),
            debounce,
        }
    }

    /// Refresh the caches from the backend. Waits for the durable store to
    /// finish loading first.
    pub async fn load(&self) -> Result<()> {
        self.backend.wait_for_load().await?;
        let profile = self.backend.current_profile().await?;
        let cravings = self.backend.cravings().await?;
        let goals = self.backend.goals().await?;

        let mut state = self.state.lock().await;
        state.streak_days = profile.as_ref().map(|p| p.streak).unwrap_or(0);
        state.last_saved_date = profile.as_ref().and_then(|p| p.last_check_in);
        state.urges_handled = cravings.len() as u32;
        state.cravings = cravings;
        state.goals = goals;
        state.pending_cravings.clear();
        state.dirty_goals.clear();
        state.streak_dirty = false;
        info!(
            "Loaded recovery state: {} cravings, {} goals, streak {}",
            state.urges_handled,
            state.goals.len(),
            state.streak_days
        );
        Ok(())
    }

    /// Record a handled urge right now. Appends a craving, bumps the
    /// counters, advances the streak, sweeps goals for completion and
    /// schedules a flush.
    pub async fn record_urge(&self, note: Option<&str>, trigger: Option<&str>) -> Craving {
        self.record_craving(NewCraving {
            note: note.map(str::to_string),
            trigger: trigger.map(str::to_string),
            ..Default::default()
        })
        .await
    }

    /// Record a fully described craving. Same bookkeeping as
    /// [`RecoveryService::record_urge`].
    pub async fn record_craving(&self, args: NewCraving) -> Craving {
        self.record_craving_at(args, Utc::now()).await
    }

    async fn record_craving_at(&self, args: NewCraving, now: DateTime<Utc>) -> Craving {
        let craving = NewCraving {
            timestamp: args.timestamp.or(Some(now)),
            ..args
        }
        .into_craving();

        let mut state = self.state.lock().await;
        state.cravings.insert(0, craving.clone());
        state.pending_cravings.push(craving.clone());
        state.urges_handled += 1;

        // Streak first, against the prior check-in day; a future
        // last_saved_date (clock skew) leaves both fields untouched.
        if let Some(next) = streak::advance(state.last_saved_date, state.streak_days, now) {
            state.streak_days = next;
            state.last_saved_date = Some(now);
            state.streak_dirty = true;
        }

        sweep_goals(&mut state, now);
        drop(state);

        self.schedule_flush();
        craving
    }

    /// Remove a craving from the cache and the backend. A craving that was
    /// never flushed is simply dropped locally.
    pub async fn delete_craving(&self, id: &str) -> Result<()> {
        let was_pending = {
            let mut state = self.state.lock().await;
            let index = state
                .cravings
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| PersistenceError::not_found("craving", id))?;
            state.cravings.remove(index);
            state.urges_handled = state.urges_handled.saturating_sub(1);
            let before = state.pending_cravings.len();
            state.pending_cravings.retain(|c| c.id != id);
            state.pending_cravings.len() != before
        };
        if !was_pending {
            self.backend.delete_craving(id).await?;
        }
        Ok(())
    }

    /// Add a goal to the cache and schedule its persistence.
    pub async fn add_goal(&self, goal: Goal) {
        let mut state = self.state.lock().await;
        state.dirty_goals.insert(goal.id.clone());
        state.goals.insert(0, goal);
        drop(state);
        self.schedule_flush();
    }

    /// Manually complete a goal, independent of the sweep. Completion is
    /// not reversible; completing an already-completed goal is a no-op.
    pub async fn complete_goal(&self, id: &str) -> Result<Goal> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let goal = state
            .goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| PersistenceError::not_found("goal", id))?;
        let changed = goal.complete(now);
        let snapshot = goal.clone();
        if changed {
            state.dirty_goals.insert(snapshot.id.clone());
            drop(state);
            self.schedule_flush();
        }
        Ok(snapshot)
    }

    /// Fraction of the goal's target reached, always within `[0, 1]`.
    ///
    /// The count uses the same window as the completion sweep, bounded
    /// above by `completed_at` once the goal is done.
    pub async fn progress_for_goal(&self, goal: &Goal) -> f64 {
        self.progress_at(goal, Utc::now()).await
    }

    async fn progress_at(&self, goal: &Goal, now: DateTime<Utc>) -> f64 {
        let state = self.state.lock().await;
        // Prefer the cached copy: the sweep may have completed it since the
        // caller fetched this goal.
        let goal = state.goals.iter().find(|g| g.id == goal.id).unwrap_or(goal);
        if goal.target_value == 0 {
            return 1.0;
        }
        let upper = goal.completed_at.unwrap_or(now);
        let current = state
            .cravings
            .iter()
            .filter(|c| c.timestamp >= goal.start_date && c.timestamp <= upper)
            .count();
        (current as f64 / goal.target_value as f64).min(1.0)
    }

    /// Whole days until the goal's window closes, never negative.
    pub fn days_remaining_for_goal(&self, goal: &Goal) -> i64 {
        streak::days_remaining(Utc::now(), goal.end_date)
    }

    pub async fn active_goals(&self) -> Vec<Goal> {
        let state = self.state.lock().await;
        state.goals.iter().filter(|g| !g.is_completed).cloned().collect()
    }

    pub async fn completed_goals(&self) -> Vec<Goal> {
        let state = self.state.lock().await;
        state.goals.iter().filter(|g| g.is_completed).cloned().collect()
    }

    pub async fn cravings(&self) -> Vec<Craving> {
        self.state.lock().await.cravings.clone()
    }

    pub async fn streak_days(&self) -> u32 {
        self.state.lock().await.streak_days
    }

    pub async fn urges_handled(&self) -> u32 {
        self.state.lock().await.urges_handled
    }

    pub async fn last_saved_date(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_saved_date
    }

    /// Wipe all cached and persisted state. Cancels any pending flush first
    /// so a stale write cannot resurrect deleted data afterwards.
    pub async fn reset(&self) -> Result<()> {
        if let Ok(mut slot) = self.flush_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        *self.state.lock().await = CachedState::default();
        self.backend.reset().await
    }

    /// Cancel the pending flush, if any, and schedule a fresh one after the
    /// debounce interval. Only the last schedule in a burst runs.
    fn schedule_flush(&self) {
        let Ok(mut slot) = self.flush_task.lock() else {
            return;
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let backend = self.backend.clone();
        let state = self.state.clone();
        let debounce = self.debounce;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            flush(backend, state).await;
        }));
    }
}

/// Complete every goal whose window now holds enough cravings. Idempotent:
/// completed goals are skipped, so re-running never moves `completed_at`.
fn sweep_goals(state: &mut CachedState, now: DateTime<Utc>) {
    let mut completed = Vec::new();
    let cravings = &state.cravings;
    for goal in state.goals.iter_mut().filter(|g| !g.is_completed) {
        let count = cravings
            .iter()
            .filter(|c| c.timestamp >= goal.start_date && c.timestamp <= now)
            .count();
        if count as u32 >= goal.target_value && goal.complete(now) {
            info!("Goal \"{}\" completed with {} urges handled", goal.title, count);
            completed.push(goal.id.clone());
        }
    }
    for id in completed {
        state.dirty_goals.insert(id);
    }
}

fn replay_args(craving: &Craving) -> NewCraving {
    NewCraving {
        id: Some(craving.id.clone()),
        intensity: craving.intensity,
        trigger: craving.trigger.clone(),
        location: craving.location.clone(),
        note: craving.note.clone(),
        duration_secs: craving.duration_secs,
        timestamp: Some(craving.timestamp),
    }
}

/// Write all dirty state through the protocol. Failures leave the dirty
/// markers in place so the next flush retries; the cache itself is already
/// authoritative for the UI.
async fn flush(backend: Arc<dyn StorageBackend>, state: Arc<Mutex<CachedState>>) {
    let (pending, dirty_goals, streak_dirty) = {
        let state = state.lock().await;
        let dirty_goals: Vec<Goal> = state
            .goals
            .iter()
            .filter(|g| state.dirty_goals.contains(&g.id))
            .cloned()
            .collect();
        (state.pending_cravings.clone(), dirty_goals, state.streak_dirty)
    };
    if pending.is_empty() && dirty_goals.is_empty() && !streak_dirty {
        return;
    }
    debug!(
        "Flushing {} cravings, {} goals, streak_dirty={}",
        pending.len(),
        dirty_goals.len(),
        streak_dirty
    );

    let mut flushed_cravings = Vec::new();
    for craving in &pending {
        match backend.create_craving(replay_args(craving)).await {
            Ok(_) => flushed_cravings.push(craving.id.clone()),
            Err(e) => warn!("Failed to persist craving {}: {}", craving.id, e),
        }
    }

    let mut flushed_goals = Vec::new();
    for goal in &dirty_goals {
        match backend.save_goal(goal).await {
            Ok(_) => flushed_goals.push(goal.id.clone()),
            Err(e) => warn!("Failed to persist goal {}: {}", goal.id, e),
        }
    }

    let mut streak_flushed = false;
    if streak_dirty {
        match backend.update_streak().await {
            Ok(_) => streak_flushed = true,
            Err(e) => warn!("Failed to persist streak update: {}", e),
        }
    }

    let mut state = state.lock().await;
    state.pending_cravings.retain(|c| !flushed_cravings.contains(&c.id));
    for id in flushed_goals {
        state.dirty_goals.remove(&id);
    }
    if streak_flushed {
        state.streak_dirty = false;
    }
}
