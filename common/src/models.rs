use crate::errors::ConfigurationError;
use crate::schedule::FireTime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Member Models
// ============================================================================

/// Member represents a cooperative member with an upcoming payment obligation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub member_number: String,
    pub email: String,
    pub phone: String,
    /// Date the next payment is due
    pub due_date: NaiveDate,
    /// Only active members are selected for reminders
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// Delivery Models
// ============================================================================

/// DeliveryStatus represents the outcome of a reminder delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
    Pending,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Success => write!(f, "success"),
            DeliveryStatus::Failure => write!(f, "failure"),
            DeliveryStatus::Pending => write!(f, "pending"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeliveryStatus::Success),
            "failure" => Ok(DeliveryStatus::Failure),
            "pending" => Ok(DeliveryStatus::Pending),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

impl TryFrom<String> for DeliveryStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// DeliveryRecord is one entry in the append-only delivery ledger
///
/// The (member_id, reference_due_date) pair is the dedup key: at most one
/// record with Success status may exist per pair. The pair is checked by
/// query before every send rather than by a unique constraint, so batch
/// runs must be serialized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub sent_at: DateTime<Utc>,
    /// Destination phone number
    pub destination: String,
    /// Rendered message body
    pub message: String,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    /// Present iff status is Failure
    pub error: Option<String>,
    /// Gateway-assigned message id, present iff status is Success
    pub external_id: Option<String>,
    /// The due-date occurrence this reminder is for, distinct from sent_at
    pub reference_due_date: NaiveDate,
}

impl DeliveryRecord {
    /// Create a pending record for a reminder about to be sent
    pub fn pending(member: &Member, message: String, reference_due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id: member.id,
            sent_at: Utc::now(),
            destination: member.phone.clone(),
            message,
            status: DeliveryStatus::Pending,
            error: None,
            external_id: None,
            reference_due_date,
        }
    }

    /// Resolve the record to a successful delivery
    pub fn succeeded(mut self, external_id: String) -> Self {
        self.status = DeliveryStatus::Success;
        self.external_id = Some(external_id);
        self.error = None;
        self
    }

    /// Resolve the record to a failed delivery
    pub fn failed(mut self, error: String) -> Self {
        self.status = DeliveryStatus::Failure;
        self.error = Some(error);
        self.external_id = None;
        self
    }
}

// ============================================================================
// Scheduler Settings
// ============================================================================

/// SchedulerSettings is the single mutable record backing the daily trigger
///
/// Exactly one logical current row exists; lookups resolve to the latest row
/// or fall back to `system_default`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SchedulerSettings {
    pub id: Uuid,
    /// Whether the daily timer is armed
    pub enabled: bool,
    pub hour: i32,
    pub minute: i32,
    /// How many days before the due date the reminder goes out
    pub lead_days: i32,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
}

impl SchedulerSettings {
    pub const SYSTEM_USER: &'static str = "system";

    /// The hard-coded fallback used when no settings row exists or loading fails
    pub fn system_default() -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            hour: 9,
            minute: 0,
            lead_days: 1,
            last_modified: Utc::now(),
            modified_by: Self::SYSTEM_USER.to_string(),
        }
    }

    /// Validate the hour/minute/lead-days ranges
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        FireTime::new(self.hour, self.minute)?;
        if self.lead_days < 0 {
            return Err(ConfigurationError::InvalidLeadDays(self.lead_days));
        }
        Ok(())
    }

    /// The typed daily fire time derived from hour/minute
    pub fn fire_time(&self) -> Result<FireTime, ConfigurationError> {
        FireTime::new(self.hour, self.minute)
    }

    /// Human-readable fire time, e.g. "09:30"
    pub fn formatted_time(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

/// A validated settings change coming from the configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub hour: i32,
    pub minute: i32,
    pub enabled: bool,
    #[serde(default)]
    pub lead_days: Option<i32>,
    #[serde(default)]
    pub modified_by: Option<String>,
}

impl SettingsUpdate {
    /// Apply this update to existing settings, rejecting out-of-range values
    /// without touching the input
    pub fn apply_to(&self, current: &SchedulerSettings) -> Result<SchedulerSettings, ConfigurationError> {
        FireTime::new(self.hour, self.minute)?;
        let lead_days = self.lead_days.unwrap_or(current.lead_days);
        if lead_days < 0 {
            return Err(ConfigurationError::InvalidLeadDays(lead_days));
        }

        Ok(SchedulerSettings {
            id: current.id,
            enabled: self.enabled,
            hour: self.hour,
            minute: self.minute,
            lead_days,
            last_modified: Utc::now(),
            modified_by: self
                .modified_by
                .clone()
                .unwrap_or_else(|| "operator".to_string()),
        })
    }
}

// ============================================================================
// Batch Run Models
// ============================================================================

/// TriggerSource records how a batch run was started
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Scheduled => write!(f, "scheduled"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// RunSummary aggregates the per-member outcomes of one batch run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub source: TriggerSource,
    /// Members selected for this run
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Members skipped because a successful reminder already exists
    pub skipped: usize,
}

impl RunSummary {
    pub fn new(source: TriggerSource) -> Self {
        Self {
            source,
            total: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// SchedulerStatus is the operator-visible live status of the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub fire_time: String,
    pub cron_expression: String,
    pub lead_days: i32,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    /// How many members are due at the configured lead time right now
    pub members_due_at_lead: usize,
}
