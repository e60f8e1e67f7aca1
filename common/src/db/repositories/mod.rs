// Repository layer for database operations
//
// The scheduler engine depends only on the storage traits defined here;
// the sqlx-backed repositories are their production implementations.

pub mod delivery;
pub mod member;
pub mod settings;

pub use delivery::DeliveryRepository;
pub use member::MemberRepository;
pub use settings::SettingsRepository;

use crate::errors::DatabaseError;
use crate::models::{DeliveryRecord, Member, SchedulerSettings};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Query interface over members and their due dates
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Active members whose due date equals `date` exactly
    async fn find_due_on(&self, date: NaiveDate) -> Result<Vec<Member>, DatabaseError>;
}

/// Append-only record of every reminder delivery attempt
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Whether a successful delivery is already recorded for the
    /// (member, reference due-date) dedup key
    async fn success_exists(
        &self,
        member_id: Uuid,
        reference_due_date: NaiveDate,
    ) -> Result<bool, DatabaseError>;

    /// Append a resolved delivery record
    async fn append(&self, record: DeliveryRecord) -> Result<DeliveryRecord, DatabaseError>;
}

/// Persistence for the single current scheduler settings record
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The current settings, or None when no row exists yet
    async fn find_current(&self) -> Result<Option<SchedulerSettings>, DatabaseError>;

    /// Persist settings, inserting or updating the current row
    async fn save(&self, settings: SchedulerSettings) -> Result<SchedulerSettings, DatabaseError>;
}
