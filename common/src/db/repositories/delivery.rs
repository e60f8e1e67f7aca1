// Delivery ledger repository implementation

use super::DeliveryLedger;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::DeliveryRecord;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Repository for the append-only delivery ledger
pub struct DeliveryRepository {
    pool: DbPool,
}

/// Per-status delivery counts for a reporting window
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DeliveryStats {
    pub success: i64,
    pub failure: i64,
    pub pending: i64,
}

impl DeliveryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Delivery history for one member, newest first
    #[instrument(skip(self))]
    pub async fn find_for_member(
        &self,
        member_id: Uuid,
    ) -> Result<Vec<DeliveryRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT
                id, member_id, sent_at, destination, message, status,
                error, external_id, reference_due_date
            FROM delivery_records
            WHERE member_id = $1
            ORDER BY sent_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(records)
    }

    /// All records sent inside a time window
    #[instrument(skip(self))]
    pub async fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT
                id, member_id, sent_at, destination, message, status,
                error, external_id, reference_due_date
            FROM delivery_records
            WHERE sent_at BETWEEN $1 AND $2
            ORDER BY sent_at DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(records)
    }

    /// Per-status counts for a reporting window
    #[instrument(skip(self))]
    pub async fn count_by_status_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DeliveryStats, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM delivery_records
            WHERE sent_at BETWEEN $1 AND $2
            GROUP BY status
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await?;

        let mut stats = DeliveryStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(DatabaseError::from)?;
            let count: i64 = row.try_get("count").map_err(DatabaseError::from)?;
            match status.as_str() {
                "success" => stats.success = count,
                "failure" => stats.failure = count,
                "pending" => stats.pending = count,
                _ => {}
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl DeliveryLedger for DeliveryRepository {
    #[instrument(skip(self))]
    async fn success_exists(
        &self,
        member_id: Uuid,
        reference_due_date: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM delivery_records
                WHERE member_id = $1
                  AND reference_due_date = $2
                  AND status = 'success'
            ) AS found
            "#,
        )
        .bind(member_id)
        .bind(reference_due_date)
        .fetch_one(self.pool.pool())
        .await?;

        let found: bool = row.try_get("found").map_err(DatabaseError::from)?;
        Ok(found)
    }

    #[instrument(skip(self, record), fields(member_id = %record.member_id, status = %record.status))]
    async fn append(&self, record: DeliveryRecord) -> Result<DeliveryRecord, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_records (
                id, member_id, sent_at, destination, message, status,
                error, external_id, reference_due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.member_id)
        .bind(record.sent_at)
        .bind(&record.destination)
        .bind(&record.message)
        .bind(record.status.to_string())
        .bind(&record.error)
        .bind(&record.external_id)
        .bind(record.reference_due_date)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            record_id = %record.id,
            member_id = %record.member_id,
            status = %record.status,
            "Delivery record appended"
        );
        Ok(record)
    }
}
