// Scheduler settings repository implementation

use super::SettingsStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::SchedulerSettings;
use async_trait::async_trait;
use tracing::instrument;

/// Repository for the single current scheduler settings record
pub struct SettingsRepository {
    pool: DbPool,
}

impl SettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SettingsRepository {
    #[instrument(skip(self))]
    async fn find_current(&self) -> Result<Option<SchedulerSettings>, DatabaseError> {
        let settings = sqlx::query_as::<_, SchedulerSettings>(
            r#"
            SELECT id, enabled, hour, minute, lead_days, last_modified, modified_by
            FROM scheduler_settings
            ORDER BY last_modified DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(settings)
    }

    #[instrument(skip(self, settings), fields(enabled = settings.enabled, fire_time = %settings.formatted_time()))]
    async fn save(&self, settings: SchedulerSettings) -> Result<SchedulerSettings, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_settings (
                id, enabled, hour, minute, lead_days, last_modified, modified_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                hour = EXCLUDED.hour,
                minute = EXCLUDED.minute,
                lead_days = EXCLUDED.lead_days,
                last_modified = EXCLUDED.last_modified,
                modified_by = EXCLUDED.modified_by
            "#,
        )
        .bind(settings.id)
        .bind(settings.enabled)
        .bind(settings.hour)
        .bind(settings.minute)
        .bind(settings.lead_days)
        .bind(settings.last_modified)
        .bind(&settings.modified_by)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            settings_id = %settings.id,
            fire_time = %settings.formatted_time(),
            enabled = settings.enabled,
            "Scheduler settings saved"
        );
        Ok(settings)
    }
}
