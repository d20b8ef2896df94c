use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use claimlens_core::analytics::query::ClaimQuery;
use claimlens_core::domain::approval::ApprovalEvent;
use claimlens_core::domain::budget::DepartmentBudget;
use claimlens_core::domain::claim::{Claim, ClaimId};
use claimlens_core::domain::employee::{Employee, EmployeeId};

pub mod approval;
pub mod budget;
pub mod claim;
pub mod employee;
pub mod memory;
pub mod view;

pub use approval::SqlApprovalEventRepository;
pub use budget::SqlBudgetRepository;
pub use claim::SqlClaimRepository;
pub use employee::SqlEmployeeRepository;
pub use memory::{
    InMemoryApprovalEventRepository, InMemoryBudgetRepository, InMemoryClaimRepository,
    InMemoryClaimViewRepository, InMemoryEmployeeRepository,
};
pub use view::SqlClaimViewRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError>;
    /// Evaluates `query` with the semantics of [`ClaimQuery::apply`].
    async fn query(&self, query: &ClaimQuery) -> Result<Vec<Claim>, RepositoryError>;
    async fn save(&self, claim: Claim) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn list_by_department(&self, department: &str)
        -> Result<Vec<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApprovalEventRepository: Send + Sync {
    /// Events for one claim, oldest first.
    async fn list_for_claim(&self, claim_id: &ClaimId)
        -> Result<Vec<ApprovalEvent>, RepositoryError>;
    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn find_for_department(
        &self,
        department: &str,
    ) -> Result<Option<DepartmentBudget>, RepositoryError>;
    async fn save(&self, budget: DepartmentBudget) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClaimViewRepository: Send + Sync {
    /// Idempotent: repeated calls for the same pair only refresh `viewed_at`.
    async fn mark_viewed(
        &self,
        claim_id: &ClaimId,
        viewer_id: &EmployeeId,
        viewed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn viewers(&self, claim_id: &ClaimId) -> Result<Vec<EmployeeId>, RepositoryError>;
}
