use sqlx::Row;

use claimlens_core::domain::budget::DepartmentBudget;

use super::claim::parse_decimal;
use super::{BudgetRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBudgetRepository {
    pool: DbPool,
}

impl SqlBudgetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BudgetRepository for SqlBudgetRepository {
    async fn find_for_department(
        &self,
        department: &str,
    ) -> Result<Option<DepartmentBudget>, RepositoryError> {
        let row = sqlx::query(
            "SELECT department, monthly_budget FROM department_budget WHERE department = ?",
        )
        .bind(department)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let department: String =
            row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let budget_str: String =
            row.try_get("monthly_budget").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(DepartmentBudget {
            department,
            monthly_budget: parse_decimal("monthly_budget", &budget_str)?,
        }))
    }

    async fn save(&self, budget: DepartmentBudget) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO department_budget (department, monthly_budget)
             VALUES (?, ?)
             ON CONFLICT(department) DO UPDATE SET monthly_budget = excluded.monthly_budget",
        )
        .bind(&budget.department)
        .bind(budget.monthly_budget.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
