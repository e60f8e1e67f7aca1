// Member repository implementation

use super::MemberStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Member;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::instrument;
use uuid::Uuid;

/// Repository for member-related database operations
pub struct MemberRepository {
    pool: DbPool,
}

impl MemberRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find a member by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>, DatabaseError> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, first_name, last_name, member_number, email, phone,
                due_date, active, created_at
            FROM members
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(member)
    }

    /// List members with due dates inside a window, active only
    #[instrument(skip(self))]
    pub async fn find_due_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Member>, DatabaseError> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, first_name, last_name, member_number, email, phone,
                due_date, active, created_at
            FROM members
            WHERE due_date BETWEEN $1 AND $2
              AND active = TRUE
            ORDER BY due_date, last_name
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(members)
    }
}

#[async_trait]
impl MemberStore for MemberRepository {
    #[instrument(skip(self))]
    async fn find_due_on(&self, date: NaiveDate) -> Result<Vec<Member>, DatabaseError> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, first_name, last_name, member_number, email, phone,
                due_date, active, created_at
            FROM members
            WHERE due_date = $1
              AND active = TRUE
            "#,
        )
        .bind(date)
        .fetch_all(self.pool.pool())
        .await?;

        tracing::debug!(date = %date, count = members.len(), "Members due on date");
        Ok(members)
    }
}
