use sqlx::Row;

use claimlens_core::domain::employee::{Employee, EmployeeId};

use super::{EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Employee { id: EmployeeId(id), name, department, manager_id: manager_id.map(EmployeeId) })
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, department, manager_id FROM employee WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_employee(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_department(
        &self,
        department: &str,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, department, manager_id
             FROM employee WHERE department = ? ORDER BY id ASC",
        )
        .bind(department)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_employee).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, name, department, manager_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 department = excluded.department,
                 manager_id = excluded.manager_id",
        )
        .bind(&employee.id.0)
        .bind(&employee.name)
        .bind(&employee.department)
        .bind(employee.manager_id.as_ref().map(|id| id.0.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
