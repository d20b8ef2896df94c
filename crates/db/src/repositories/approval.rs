use sqlx::Row;

use claimlens_core::domain::approval::{ApprovalAction, ApprovalEvent, ApprovalEventId};
use claimlens_core::domain::claim::ClaimId;
use claimlens_core::domain::employee::EmployeeId;

use super::claim::{format_timestamp, parse_timestamp};
use super::{ApprovalEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalEventRepository {
    pool: DbPool,
}

impl SqlApprovalEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalEvent, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let claim_id: String =
        row.try_get("claim_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor_id: String =
        row.try_get("actor_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_str: String =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let action = ApprovalAction::parse(&action_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval action `{action_str}`")))?;

    Ok(ApprovalEvent {
        id: ApprovalEventId(id),
        claim_id: ClaimId(claim_id),
        actor_id: EmployeeId(actor_id),
        action,
        comment,
        created_at: parse_timestamp("created_at", &created_at_str)?,
    })
}

#[async_trait::async_trait]
impl ApprovalEventRepository for SqlApprovalEventRepository {
    async fn list_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ApprovalEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, claim_id, actor_id, action, comment, created_at
             FROM approval_event WHERE claim_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect::<Result<Vec<_>, _>>()
    }

    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_event (id, claim_id, actor_id, action, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.claim_id.0)
        .bind(&event.actor_id.0)
        .bind(event.action.as_str())
        .bind(&event.comment)
        .bind(format_timestamp(&event.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
