use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use claimlens_core::analytics::query::ClaimQuery;
use claimlens_core::domain::approval::ApprovalEvent;
use claimlens_core::domain::budget::DepartmentBudget;
use claimlens_core::domain::claim::{Claim, ClaimId};
use claimlens_core::domain::employee::{Employee, EmployeeId};

use super::{
    ApprovalEventRepository, BudgetRepository, ClaimRepository, ClaimViewRepository,
    EmployeeRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryClaimRepository {
    claims: RwLock<HashMap<String, Claim>>,
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims.get(&id.0).cloned())
    }

    async fn query(&self, query: &ClaimQuery) -> Result<Vec<Claim>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(query.apply(claims.values().cloned()))
    }

    async fn save(&self, claim: Claim) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        claims.insert(claim.id.0.clone(), claim);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<BTreeMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn list_by_department(
        &self,
        department: &str,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.values().filter(|employee| employee.department == department).cloned().collect())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalEventRepository {
    events: RwLock<Vec<ApprovalEvent>>,
}

#[async_trait::async_trait]
impl ApprovalEventRepository for InMemoryApprovalEventRepository {
    async fn list_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ApprovalEvent>, RepositoryError> {
        let events = self.events.read().await;
        let mut matching: Vec<ApprovalEvent> =
            events.iter().filter(|event| &event.claim_id == claim_id).cloned().collect();
        matching.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(matching)
    }

    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if events.iter().any(|existing| existing.id == event.id) {
            return Err(RepositoryError::Unavailable(format!(
                "approval event `{}` already recorded",
                event.id.0
            )));
        }
        events.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBudgetRepository {
    budgets: RwLock<HashMap<String, DepartmentBudget>>,
}

#[async_trait::async_trait]
impl BudgetRepository for InMemoryBudgetRepository {
    async fn find_for_department(
        &self,
        department: &str,
    ) -> Result<Option<DepartmentBudget>, RepositoryError> {
        let budgets = self.budgets.read().await;
        Ok(budgets.get(department).cloned())
    }

    async fn save(&self, budget: DepartmentBudget) -> Result<(), RepositoryError> {
        let mut budgets = self.budgets.write().await;
        budgets.insert(budget.department.clone(), budget);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClaimViewRepository {
    views: RwLock<BTreeMap<(String, String), DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl ClaimViewRepository for InMemoryClaimViewRepository {
    async fn mark_viewed(
        &self,
        claim_id: &ClaimId,
        viewer_id: &EmployeeId,
        viewed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut views = self.views.write().await;
        views.insert((claim_id.0.clone(), viewer_id.0.clone()), viewed_at);
        Ok(())
    }

    async fn viewers(&self, claim_id: &ClaimId) -> Result<Vec<EmployeeId>, RepositoryError> {
        let views = self.views.read().await;
        Ok(views
            .keys()
            .filter(|(claim, _)| claim == &claim_id.0)
            .map(|(_, viewer)| EmployeeId(viewer.clone()))
            .collect())
    }
}
