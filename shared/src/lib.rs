//! Domain value types shared between the recovery-tracker core and its
//! embedding UI layers.
//!
//! These are plain data types: no storage concerns, no derived state. The
//! backend crate owns persistence and all derived computations (streaks,
//! goal progress).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of the single per-installation profile row.
///
/// Profile upserts are keyed by this constant, never by name, so repeated
/// setup calls can never create a second profile.
pub const USER_PROFILE_ID: &str = "user::primary";

/// The tracked user. At most one exists per installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    /// Consecutive-day count of recorded urge-handling activity.
    pub streak: u32,
    /// Running total of money kept by resisting urges. Maintained by the
    /// storage layer as transactions are added and deleted.
    pub total_savings: f64,
    pub daily_limit: f64,
    pub last_check_in: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(name: &str, email: Option<&str>, daily_limit: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: USER_PROFILE_ID.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            streak: 0,
            total_savings: 0.0,
            daily_limit,
            last_check_in: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Category of a savings transaction. Closed set; anything unrecognized
/// parses to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionCategory {
    Savings,
    Food,
    Entertainment,
    Bills,
    Shopping,
    Other,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Savings => "savings",
            TransactionCategory::Food => "food",
            TransactionCategory::Entertainment => "entertainment",
            TransactionCategory::Bills => "bills",
            TransactionCategory::Shopping => "shopping",
            TransactionCategory::Other => "other",
        }
    }

    /// Parse a stored label. Unknown labels map to `Other` so old data
    /// never fails to load.
    pub fn parse(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "savings" => TransactionCategory::Savings,
            "food" => TransactionCategory::Food,
            "entertainment" => TransactionCategory::Entertainment,
            "bills" => TransactionCategory::Bills,
            "shopping" => TransactionCategory::Shopping,
            _ => TransactionCategory::Other,
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single money movement counted toward the profile's `total_savings`.
///
/// `profile_id` is a plain back-reference used for aggregation only; the
/// storage backend owns the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub profile_id: String,
    pub amount: f64,
    pub category: TransactionCategory,
    pub date: DateTime<Utc>,
    pub note: Option<String>,
}

impl Transaction {
    pub fn generate_id() -> String {
        format!("transaction::{}", Uuid::new_v4())
    }

    pub fn new(amount: f64, category: TransactionCategory, note: Option<&str>) -> Self {
        Self {
            id: Self::generate_id(),
            profile_id: USER_PROFILE_ID.to_string(),
            amount,
            category,
            date: Utc::now(),
            note: note.map(str::to_string),
        }
    }
}

/// A logged urge event. Immutable once created except via delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Craving {
    pub id: String,
    /// Self-reported strength. Domain-bounded by the UI, not enforced here.
    pub intensity: i32,
    pub trigger: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    /// How long the urge lasted, in seconds.
    pub duration_secs: i64,
    pub timestamp: DateTime<Utc>,
}

impl Craving {
    pub fn generate_id() -> String {
        format!("craving::{}", Uuid::new_v4())
    }
}

/// Arguments for recording a craving. Leaving `id` or `timestamp` unset lets
/// the storage layer assign them; an explicit `id` upserts, which is how
/// cache-created records are replayed durably without duplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCraving {
    pub id: Option<String>,
    pub intensity: i32,
    pub trigger: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub duration_secs: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewCraving {
    pub fn into_craving(self) -> Craving {
        Craving {
            id: self.id.unwrap_or_else(Craving::generate_id),
            intensity: self.intensity,
            trigger: self.trigger,
            location: self.location,
            note: self.note,
            duration_secs: self.duration_secs.max(0),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// The calendar window a goal spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalType {
    Daily,
    Weekly,
    Monthly,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Daily => "daily",
            GoalType::Weekly => "weekly",
            GoalType::Monthly => "monthly",
        }
    }

    pub fn parse(label: &str) -> Result<Self, String> {
        match label.to_lowercase().as_str() {
            "daily" => Ok(GoalType::Daily),
            "weekly" => Ok(GoalType::Weekly),
            "monthly" => Ok(GoalType::Monthly),
            _ => Err(format!("Invalid goal type: {}", label)),
        }
    }

    /// Length of the goal window, used to derive `end_date` from
    /// `start_date`.
    pub fn window(&self) -> Duration {
        match self {
            GoalType::Daily => Duration::days(1),
            GoalType::Weekly => Duration::days(7),
            GoalType::Monthly => Duration::days(30),
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target count of urges to handle within a time window.
///
/// The live count is never stored; it is always derived by counting cravings
/// whose timestamp falls inside `[start_date, completed_at ?? now]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub goal_type: GoalType,
    /// Positive count of urges to handle before the goal completes.
    pub target_value: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn generate_id() -> String {
        format!("goal::{}", Uuid::new_v4())
    }

    pub fn new(
        title: &str,
        description: Option<&str>,
        goal_type: GoalType,
        target_value: u32,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            title: title.to_string(),
            description: description.map(str::to_string),
            goal_type,
            target_value,
            start_date,
            end_date: start_date + goal_type.window(),
            is_completed: false,
            completed_at: None,
        }
    }

    /// Mark the goal completed. Completion is monotonic: the first call sets
    /// `completed_at` and returns true, every later call is a no-op.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(at);
        true
    }
}
