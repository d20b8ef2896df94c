use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite};

use claimlens_core::analytics::query::{ClaimFilter, ClaimOrder, ClaimQuery};
use claimlens_core::domain::claim::{Claim, ClaimId, ClaimStatus};
use claimlens_core::domain::employee::EmployeeId;

use super::{ClaimRepository, RepositoryError};
use crate::DbPool;

const CLAIM_COLUMNS: &str = "id, employee_id, category, amount, submitted_at, expense_date, \
                             status, department, description, receipt_url";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so text order is time order.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim()).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_claim(row: &sqlx::sqlite::SqliteRow) -> Result<Claim, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: Option<String> =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitted_at_str: String =
        row.try_get("submitted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expense_date_str: String =
        row.try_get("expense_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let receipt_url: Option<String> =
        row.try_get("receipt_url").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let amount = amount_str.as_deref().map(|value| parse_decimal("amount", value)).transpose()?;
    let expense_date = NaiveDate::parse_from_str(&expense_date_str, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("expense_date: {e}")))?;
    let status = ClaimStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown claim status `{status_str}`")))?;

    Ok(Claim {
        id: ClaimId(id),
        employee_id: EmployeeId(employee_id),
        category,
        amount,
        submitted_at: parse_timestamp("submitted_at", &submitted_at_str)?,
        expense_date,
        status,
        department,
        description,
        receipt_url,
    })
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ClaimFilter) {
    match filter {
        ClaimFilter::Category { value } => {
            builder.push(" AND category = ").push_bind(value.clone());
        }
        ClaimFilter::AmountBetween { min, max } => {
            let (low, high) = widened_band(*min, *max);
            builder
                .push(" AND CAST(COALESCE(amount, '0') AS REAL) BETWEEN ")
                .push_bind(low)
                .push(" AND ")
                .push_bind(high);
        }
        ClaimFilter::Employee { id } => {
            builder.push(" AND employee_id = ").push_bind(id.0.clone());
        }
        ClaimFilter::Department { name } => {
            builder.push(" AND department = ").push_bind(name.clone());
        }
        ClaimFilter::ExpenseDateFrom { date } => {
            builder.push(" AND expense_date >= ").push_bind(date.to_string());
        }
        ClaimFilter::ExpenseDateTo { date } => {
            builder.push(" AND expense_date <= ").push_bind(date.to_string());
        }
    }
}

/// REAL comparison is only a prefilter for the decimal amount band, so the
/// bounds are widened enough that no in-band row is lost to rounding.
fn widened_band(min: Decimal, max: Decimal) -> (f64, f64) {
    let low = min.to_f64().unwrap_or(f64::MIN);
    let high = max.to_f64().unwrap_or(f64::MAX);
    let slack = |bound: f64| bound.abs() * 1e-9 + 1e-9;
    (low - slack(low), high + slack(high))
}

fn has_amount_band(query: &ClaimQuery) -> bool {
    query.filters.iter().any(|filter| matches!(filter, ClaimFilter::AmountBetween { .. }))
}

fn order_clause(order: ClaimOrder) -> &'static str {
    match order {
        ClaimOrder::Natural => " ORDER BY submitted_at ASC, id ASC",
        ClaimOrder::ExpenseDateDesc => " ORDER BY expense_date DESC, submitted_at DESC, id DESC",
        ClaimOrder::SubmittedAtDesc => " ORDER BY submitted_at DESC, id DESC",
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM claim WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_claim(r)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: &ClaimQuery) -> Result<Vec<Claim>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {CLAIM_COLUMNS} FROM claim WHERE 1 = 1"));
        for filter in &query.filters {
            push_filter(&mut builder, filter);
        }
        if let Some(excluded) = &query.exclude {
            builder.push(" AND id <> ").push_bind(excluded.0.clone());
        }
        builder.push(order_clause(query.order));
        // An amount band is settled in decimal below; a SQL LIMIT would cap
        // the prefiltered rows before edge rows are dropped.
        let amount_band = has_amount_band(query);
        if let (Some(limit), false) = (query.limit, amount_band) {
            builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let claims = rows.iter().map(row_to_claim).collect::<Result<Vec<_>, _>>()?;
        if amount_band {
            return Ok(query.apply(claims));
        }
        Ok(claims)
    }

    async fn save(&self, claim: Claim) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO claim (id, employee_id, category, amount, submitted_at, expense_date,
                                status, department, description, receipt_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 category = excluded.category,
                 amount = excluded.amount,
                 expense_date = excluded.expense_date,
                 status = excluded.status,
                 department = excluded.department,
                 description = excluded.description,
                 receipt_url = excluded.receipt_url",
        )
        .bind(&claim.id.0)
        .bind(&claim.employee_id.0)
        .bind(&claim.category)
        .bind(claim.amount.map(|amount| amount.to_string()))
        .bind(format_timestamp(&claim.submitted_at))
        .bind(claim.expense_date.to_string())
        .bind(claim.status.as_str())
        .bind(&claim.department)
        .bind(&claim.description)
        .bind(&claim.receipt_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
