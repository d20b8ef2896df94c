use chrono::{DateTime, Utc};
use sqlx::Row;

use claimlens_core::domain::claim::ClaimId;
use claimlens_core::domain::employee::EmployeeId;

use super::claim::format_timestamp;
use super::{ClaimViewRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClaimViewRepository {
    pool: DbPool,
}

impl SqlClaimViewRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClaimViewRepository for SqlClaimViewRepository {
    async fn mark_viewed(
        &self,
        claim_id: &ClaimId,
        viewer_id: &EmployeeId,
        viewed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO claim_view (claim_id, viewer_id, viewed_at)
             VALUES (?, ?, ?)
             ON CONFLICT(claim_id, viewer_id) DO UPDATE SET viewed_at = excluded.viewed_at",
        )
        .bind(&claim_id.0)
        .bind(&viewer_id.0)
        .bind(format_timestamp(&viewed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn viewers(&self, claim_id: &ClaimId) -> Result<Vec<EmployeeId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT viewer_id FROM claim_view WHERE claim_id = ? ORDER BY viewer_id ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("viewer_id")
                    .map(EmployeeId)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }
}
