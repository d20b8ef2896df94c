use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "employee",
        "claim",
        "approval_event",
        "department_budget",
        "claim_view",
        "idx_employee_department",
        "idx_claim_category",
        "idx_claim_employee_expense_date",
        "idx_claim_department_expense_date",
        "idx_approval_event_claim_id",
    ];

    #[tokio::test]
    async fn migrations_create_every_managed_object_and_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        run_pending(&pool).await.expect("first migration run");
        run_pending(&pool).await.expect("second migration run is a no-op");

        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type IN ('table', 'index')")
            .fetch_all(&pool)
            .await
            .expect("list schema objects");
        let names: Vec<String> =
            rows.iter().map(|row| row.try_get::<String, _>("name").expect("name")).collect();

        for object in MANAGED_SCHEMA_OBJECTS {
            assert!(names.iter().any(|name| name == object), "missing schema object {object}");
        }

        pool.close().await;
    }
}
