use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use thiserror::Error;

use claimlens_core::analytics::rollup::MonthKey;
use claimlens_core::domain::approval::{ApprovalAction, ApprovalEvent, ApprovalEventId};
use claimlens_core::domain::budget::DepartmentBudget;
use claimlens_core::domain::claim::{Claim, ClaimId, ClaimStatus};
use claimlens_core::domain::employee::{Employee, EmployeeId};
use claimlens_core::errors::DomainError;

use crate::connection::DbPool;
use crate::repositories::{
    ApprovalEventRepository, BudgetRepository, ClaimRepository, EmployeeRepository,
    RepositoryError, SqlApprovalEventRepository, SqlBudgetRepository, SqlClaimRepository,
    SqlEmployeeRepository,
};

const SEED_BUDGETS: &[(&str, i64)] = &[("Engineering", 15_000), ("Sales", 20_000)];

/// Managers come first so `manager_id` references resolve on insert.
const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee { id: "MGR-ENG", name: "Priya Natarajan", department: "Engineering", manager: None },
    SeedEmployee { id: "MGR-SAL", name: "Daniel Okafor", department: "Sales", manager: None },
    SeedEmployee { id: "MGR-OPS", name: "Grace Liu", department: "Operations", manager: None },
    SeedEmployee {
        id: "EMP-ENG-1",
        name: "Marcus Chen",
        department: "Engineering",
        manager: Some("MGR-ENG"),
    },
    SeedEmployee {
        id: "EMP-ENG-2",
        name: "Sofia Alvarez",
        department: "Engineering",
        manager: Some("MGR-ENG"),
    },
    SeedEmployee {
        id: "EMP-SAL-1",
        name: "Hannah Becker",
        department: "Sales",
        manager: Some("MGR-SAL"),
    },
    SeedEmployee { id: "EMP-SAL-2", name: "Luis Romero", department: "Sales", manager: Some("MGR-SAL") },
    SeedEmployee {
        id: "EMP-OPS-1",
        name: "Tomas Silva",
        department: "Operations",
        manager: Some("MGR-OPS"),
    },
];

use ApprovalAction::{Approve, Reject, RequestInfo};

#[rustfmt::skip]
const SEED_CLAIMS: &[SeedClaim] = &[
    SeedClaim { id: "CLM-1000", employee: "EMP-ENG-1", category: "Travel", cents: Some(125_000), months_ago: 0, day: 3, actions: &[] },
    SeedClaim { id: "CLM-1001", employee: "EMP-ENG-1", category: "Travel", cents: Some(45_000), months_ago: 1, day: 12, actions: &[Approve] },
    SeedClaim { id: "CLM-1002", employee: "EMP-ENG-1", category: "Travel", cents: Some(52_000), months_ago: 1, day: 20, actions: &[Approve] },
    SeedClaim { id: "CLM-1003", employee: "EMP-ENG-1", category: "Meals", cents: Some(8_540), months_ago: 2, day: 5, actions: &[Approve] },
    SeedClaim { id: "CLM-1004", employee: "EMP-ENG-1", category: "Software", cents: Some(29_900), months_ago: 3, day: 8, actions: &[RequestInfo, Approve] },
    SeedClaim { id: "CLM-1010", employee: "EMP-ENG-2", category: "Travel", cents: Some(61_000), months_ago: 0, day: 2, actions: &[Reject] },
    SeedClaim { id: "CLM-1011", employee: "EMP-ENG-2", category: "Equipment", cents: Some(189_999), months_ago: 1, day: 15, actions: &[Approve] },
    SeedClaim { id: "CLM-1012", employee: "EMP-ENG-2", category: "Meals", cents: Some(4_210), months_ago: 4, day: 9, actions: &[Reject] },
    SeedClaim { id: "CLM-1013", employee: "EMP-ENG-2", category: "Travel", cents: None, months_ago: 2, day: 18, actions: &[RequestInfo] },
    SeedClaim { id: "CLM-2001", employee: "EMP-SAL-1", category: "Travel", cents: Some(98_000), months_ago: 0, day: 6, actions: &[Approve] },
    SeedClaim { id: "CLM-2002", employee: "EMP-SAL-1", category: "Entertainment", cents: Some(34_000), months_ago: 1, day: 11, actions: &[Reject] },
    SeedClaim { id: "CLM-2003", employee: "EMP-SAL-1", category: "Meals", cents: Some(12_000), months_ago: 2, day: 22, actions: &[Approve] },
    SeedClaim { id: "CLM-2004", employee: "EMP-SAL-1", category: "Travel", cents: Some(110_000), months_ago: 5, day: 4, actions: &[Approve] },
    SeedClaim { id: "CLM-2010", employee: "EMP-SAL-2", category: "Entertainment", cents: Some(56_000), months_ago: 0, day: 1, actions: &[] },
    SeedClaim { id: "CLM-2011", employee: "EMP-SAL-2", category: "Entertainment", cents: Some(41_000), months_ago: 2, day: 7, actions: &[Reject] },
    SeedClaim { id: "CLM-2012", employee: "EMP-SAL-2", category: "Entertainment", cents: Some(27_500), months_ago: 3, day: 14, actions: &[RequestInfo] },
    SeedClaim { id: "CLM-3001", employee: "EMP-OPS-1", category: "Supplies", cents: Some(21_075), months_ago: 0, day: 4, actions: &[Approve] },
    SeedClaim { id: "CLM-3002", employee: "EMP-OPS-1", category: "Supplies", cents: Some(9_500), months_ago: 1, day: 9, actions: &[Approve] },
    SeedClaim { id: "CLM-3003", employee: "EMP-OPS-1", category: "Travel", cents: Some(70_000), months_ago: 7, day: 10, actions: &[Approve] },
];

#[derive(Debug, Clone, Copy)]
struct SeedEmployee {
    id: &'static str,
    name: &'static str,
    department: &'static str,
    manager: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct SeedClaim {
    id: &'static str,
    employee: &'static str,
    category: &'static str,
    cents: Option<i64>,
    months_ago: u32,
    day: u32,
    actions: &'static [ApprovalAction],
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("seed data violates claim lifecycle: {0}")]
    Domain(#[from] DomainError),
}

/// Repositories a dataset is written through.
#[derive(Clone, Copy)]
pub struct SeedTargets<'a> {
    pub employees: &'a dyn EmployeeRepository,
    pub claims: &'a dyn ClaimRepository,
    pub events: &'a dyn ApprovalEventRepository,
    pub budgets: &'a dyn BudgetRepository,
}

/// Deterministic demo organisation: three departments, eight employees and a
/// spread of claims over the months leading up to `as_of`.
///
/// Claim statuses are derived by replaying each claim's approval actions, so
/// the stored status always agrees with its event history.
#[derive(Debug, Clone)]
pub struct DemoDataset {
    pub as_of: NaiveDate,
    pub budgets: Vec<DepartmentBudget>,
    pub employees: Vec<Employee>,
    pub claims: Vec<Claim>,
    pub events: Vec<ApprovalEvent>,
}

impl DemoDataset {
    /// Pending high-value travel claim with a consistent approval history behind it.
    pub const SUBJECT_CLAIM_ID: &'static str = "CLM-1000";
    pub const DEPARTMENTS: [&'static str; 3] = ["Engineering", "Sales", "Operations"];

    pub fn build(as_of: NaiveDate) -> Result<Self, DomainError> {
        let budgets = SEED_BUDGETS
            .iter()
            .map(|(department, amount)| DepartmentBudget {
                department: (*department).to_owned(),
                monthly_budget: Decimal::new(*amount, 0),
            })
            .collect();

        let employees = SEED_EMPLOYEES
            .iter()
            .map(|seed| Employee {
                id: EmployeeId(seed.id.to_owned()),
                name: seed.name.to_owned(),
                department: seed.department.to_owned(),
                manager_id: seed.manager.map(|id| EmployeeId(id.to_owned())),
            })
            .collect::<Vec<_>>();

        let mut claims = Vec::with_capacity(SEED_CLAIMS.len());
        let mut events = Vec::new();
        for seed in SEED_CLAIMS {
            let employee = SEED_EMPLOYEES
                .iter()
                .find(|candidate| candidate.id == seed.employee)
                .ok_or_else(|| {
                    DomainError::InvariantViolation(format!(
                        "claim {} references unknown employee {}",
                        seed.id, seed.employee
                    ))
                })?;
            let reviewer = employee.manager.unwrap_or(employee.id);

            let expense_date = seed_expense_date(as_of, seed.months_ago, seed.day);
            let submitted_at = (expense_date + Duration::days(1))
                .and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN))
                .and_utc();

            let mut claim = Claim {
                id: ClaimId(seed.id.to_owned()),
                employee_id: EmployeeId(seed.employee.to_owned()),
                category: seed.category.to_owned(),
                amount: seed.cents.map(|cents| Decimal::new(cents, 2)),
                submitted_at,
                expense_date,
                status: ClaimStatus::Submitted,
                department: employee.department.to_owned(),
                description: Some(format!("{} expense", seed.category)),
                receipt_url: seed.cents.map(|_| format!("https://receipts.example.com/{}", seed.id)),
            };

            for (index, action) in seed.actions.iter().enumerate() {
                claim.transition_to(action.resulting_status())?;
                events.push(ApprovalEvent {
                    id: ApprovalEventId(format!("EVT-{}-{}", seed.id, index + 1)),
                    claim_id: claim.id.clone(),
                    actor_id: EmployeeId(reviewer.to_owned()),
                    action: *action,
                    comment: (*action == RequestInfo).then(|| "Please attach an itemised receipt".to_owned()),
                    created_at: submitted_at + Duration::hours(6 * (index as i64 + 1)),
                });
            }
            claims.push(claim);
        }

        Ok(Self { as_of, budgets, employees, claims, events })
    }

    /// Writes the dataset through `targets`. Safe to repeat: rows are upserted
    /// and already-recorded approval events are skipped.
    pub async fn load_into(&self, targets: SeedTargets<'_>) -> Result<SeedResult, SeedError> {
        for budget in &self.budgets {
            targets.budgets.save(budget.clone()).await?;
        }
        for employee in &self.employees {
            targets.employees.save(employee.clone()).await?;
        }
        for claim in &self.claims {
            targets.claims.save(claim.clone()).await?;
        }

        let mut events_appended = 0;
        for claim in &self.claims {
            let recorded = targets.events.list_for_claim(&claim.id).await?;
            for event in self.events.iter().filter(|event| event.claim_id == claim.id) {
                if recorded.iter().any(|existing| existing.id == event.id) {
                    continue;
                }
                targets.events.append(event.clone()).await?;
                events_appended += 1;
            }
        }

        Ok(SeedResult {
            as_of: self.as_of,
            employees: self.employees.len(),
            claims: self.claims.len(),
            events: self.events.len(),
            events_appended,
            budgets: self.budgets.len(),
            subject_claim_id: Self::SUBJECT_CLAIM_ID,
        })
    }

    pub async fn load(&self, pool: &DbPool) -> Result<SeedResult, SeedError> {
        let employees = SqlEmployeeRepository::new(pool.clone());
        let claims = SqlClaimRepository::new(pool.clone());
        let events = SqlApprovalEventRepository::new(pool.clone());
        let budgets = SqlBudgetRepository::new(pool.clone());

        self.load_into(SeedTargets {
            employees: &employees,
            claims: &claims,
            events: &events,
            budgets: &budgets,
        })
        .await
    }

    /// Checks that every seeded row is present with the expected status.
    pub async fn verify(&self, pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for employee in &self.employees {
            let present: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employee WHERE id = ?1)")
                    .bind(&employee.id.0)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("employee:{}", employee.id.0), present == 1));
        }

        for claim in &self.claims {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM claim WHERE id = ?1 AND status = ?2)",
            )
            .bind(&claim.id.0)
            .bind(claim.status.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((format!("claim:{}", claim.id.0), present == 1));

            let expected_events =
                self.events.iter().filter(|event| event.claim_id == claim.id).count() as i64;
            let recorded_events: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM approval_event WHERE claim_id = ?1")
                    .bind(&claim.id.0)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("events:{}", claim.id.0), recorded_events == expected_events));
        }

        for budget in &self.budgets {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM department_budget WHERE department = ?1)",
            )
            .bind(&budget.department)
            .fetch_one(pool)
            .await?;
            checks.push((format!("budget:{}", budget.department), present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

/// Day `day` of the month `months_ago` before `as_of`, never later than `as_of`.
fn seed_expense_date(as_of: NaiveDate, months_ago: u32, day: u32) -> NaiveDate {
    let mut month = MonthKey::of(as_of);
    for _ in 0..months_ago {
        month = month.previous();
    }
    let date = month.first_day() + Duration::days(i64::from(day.clamp(1, 28)) - 1);
    date.min(as_of)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub as_of: NaiveDate,
    pub employees: usize,
    pub claims: usize,
    pub events: usize,
    pub events_appended: usize,
    pub budgets: usize,
    pub subject_claim_id: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use claimlens_core::domain::claim::ClaimStatus;

    use super::*;
    use crate::repositories::{
        InMemoryApprovalEventRepository, InMemoryBudgetRepository, InMemoryClaimRepository,
        InMemoryEmployeeRepository,
    };
    use crate::{connect_with_settings, migrations};

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
    }

    #[test]
    fn dataset_statuses_follow_replayed_actions() {
        let dataset = DemoDataset::build(as_of()).expect("build dataset");

        let status_of = |id: &str| {
            dataset.claims.iter().find(|claim| claim.id.0 == id).map(|claim| claim.status)
        };
        assert_eq!(status_of("CLM-1000"), Some(ClaimStatus::Submitted));
        assert_eq!(status_of("CLM-1004"), Some(ClaimStatus::Approved));
        assert_eq!(status_of("CLM-1013"), Some(ClaimStatus::InfoRequested));
        assert_eq!(status_of("CLM-2002"), Some(ClaimStatus::Rejected));
        assert!(dataset.claims.iter().all(|claim| claim.expense_date <= dataset.as_of));
    }

    #[test]
    fn expense_dates_clamp_to_as_of() {
        let early = NaiveDate::from_ymd_opt(2024, 6, 2).expect("date");
        assert_eq!(seed_expense_date(early, 0, 6), early);
        assert_eq!(
            seed_expense_date(early, 1, 31),
            NaiveDate::from_ymd_opt(2024, 5, 28).expect("date")
        );
        assert_eq!(
            seed_expense_date(early, 6, 10),
            NaiveDate::from_ymd_opt(2023, 12, 10).expect("date")
        );
    }

    #[tokio::test]
    async fn load_into_memory_is_idempotent() {
        let dataset = DemoDataset::build(as_of()).expect("build dataset");
        let employees = InMemoryEmployeeRepository::default();
        let claims = InMemoryClaimRepository::default();
        let events = InMemoryApprovalEventRepository::default();
        let budgets = InMemoryBudgetRepository::default();
        let targets = SeedTargets {
            employees: &employees,
            claims: &claims,
            events: &events,
            budgets: &budgets,
        };

        let first = dataset.load_into(targets).await.expect("first load");
        let second = dataset.load_into(targets).await.expect("second load");

        assert_eq!(first.events_appended, dataset.events.len());
        assert_eq!(second.events_appended, 0);
        assert_eq!(first.claims, second.claims);
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        let dataset = DemoDataset::build(as_of()).expect("build dataset");

        dataset.load(&pool).await.expect("load seed fixtures");
        let first = dataset.verify(&pool).await.expect("verify seed fixtures");
        assert!(first.all_present, "missing rows: {:?}", first.checks);

        dataset.load(&pool).await.expect("reload seed fixtures");
        let second = dataset.verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second.all_present);
        assert_eq!(first.checks, second.checks);
    }
}
