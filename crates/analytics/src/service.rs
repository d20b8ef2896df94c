use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use claimlens_core::analytics::patterns::{aggregate, PatternStatistics};
use claimlens_core::analytics::query::{ClaimFilter, ClaimQuery};
use claimlens_core::analytics::rollup::{
    monthly_trends, rollup_department, rollup_employee, DepartmentRollup, DepartmentSnapshot,
    EmployeeRollup, MonthKey, MonthlyTrend,
};
use claimlens_core::analytics::similarity::{SimilarityCandidateSet, SimilarityPlan};
use claimlens_core::analytics::{AnalyticsThresholds, InsightSynthesizer, MAX_TREND_MONTHS};
use claimlens_core::domain::approval::ClaimHistory;
use claimlens_core::domain::claim::{Claim, ClaimId};
use claimlens_core::domain::employee::{Employee, EmployeeId};
use claimlens_core::envelope::ResultEnvelope;
use claimlens_core::errors::{ApplicationError, DomainError, EntityKind};
use claimlens_db::repositories::{
    ApprovalEventRepository, BudgetRepository, ClaimRepository, ClaimViewRepository,
    EmployeeRepository, RepositoryError, SqlApprovalEventRepository, SqlBudgetRepository,
    SqlClaimRepository, SqlClaimViewRepository, SqlEmployeeRepository,
};
use claimlens_db::DbPool;

use crate::change::InsightCache;

/// Record accessors the engine reads through.
#[derive(Clone)]
pub struct AnalyticsRepositories {
    pub claims: Arc<dyn ClaimRepository>,
    pub employees: Arc<dyn EmployeeRepository>,
    pub events: Arc<dyn ApprovalEventRepository>,
    pub budgets: Arc<dyn BudgetRepository>,
    pub views: Arc<dyn ClaimViewRepository>,
}

impl AnalyticsRepositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            claims: Arc::new(SqlClaimRepository::new(pool.clone())),
            employees: Arc::new(SqlEmployeeRepository::new(pool.clone())),
            events: Arc::new(SqlApprovalEventRepository::new(pool.clone())),
            budgets: Arc::new(SqlBudgetRepository::new(pool.clone())),
            views: Arc::new(SqlClaimViewRepository::new(pool)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarClaimsAnalysis {
    pub claim_id: ClaimId,
    pub similar_by_amount: Vec<Claim>,
    pub similar_by_category: Vec<Claim>,
    pub employee_claims: Vec<Claim>,
    pub patterns: PatternStatistics,
}

/// One row of a department comparison; failures stay local to their row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepartmentComparison {
    pub department: String,
    #[serde(flatten)]
    pub outcome: ResultEnvelope<DepartmentRollup>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimViewReceipt {
    pub claim_id: ClaimId,
    pub viewer_id: EmployeeId,
    pub viewed_at: chrono::DateTime<Utc>,
}

/// Result of a single fan-out branch. A degraded branch carries its default.
struct Fetched<T> {
    value: T,
    degraded: bool,
}

fn degrade<T: Default>(
    result: Result<T, RepositoryError>,
    branch: &'static str,
    subject: &str,
) -> Fetched<T> {
    match result {
        Ok(value) => Fetched { value, degraded: false },
        Err(error) => {
            warn!(
                event_name = "analytics.fetch.degraded",
                branch,
                subject,
                error = %error,
                "secondary read failed; continuing without it"
            );
            Fetched { value: T::default(), degraded: true }
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

struct DepartmentFetch {
    employees: Vec<Employee>,
    claims: Vec<Claim>,
    configured_budget: Option<Decimal>,
}

/// Claim analytics and organisational insights over an injected accessor.
///
/// Every public `get_*` operation returns a [`ResultEnvelope`]; the
/// `Result`-returning variants are for callers that want the typed error.
#[derive(Clone)]
pub struct AnalyticsService {
    repos: AnalyticsRepositories,
    synthesizer: InsightSynthesizer,
    cache: Option<Arc<InsightCache>>,
    as_of: Option<NaiveDate>,
}

impl AnalyticsService {
    pub fn new(repos: AnalyticsRepositories, thresholds: AnalyticsThresholds) -> Self {
        Self { repos, synthesizer: InsightSynthesizer::new(thresholds), cache: None, as_of: None }
    }

    pub fn with_insight_cache(mut self, cache: Arc<InsightCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pins the reference date for rollup windows instead of today's date.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn thresholds(&self) -> &AnalyticsThresholds {
        self.synthesizer.thresholds()
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub async fn get_similar_claims_analysis(
        &self,
        claim_id: &str,
    ) -> ResultEnvelope<SimilarClaimsAnalysis> {
        ResultEnvelope::from_result(self.similar_claims(&ClaimId(claim_id.to_owned())).await)
    }

    pub async fn get_claim_insights(&self, claim_id: &str) -> ResultEnvelope<Vec<String>> {
        ResultEnvelope::from_result(self.claim_insights(&ClaimId(claim_id.to_owned())).await)
    }

    pub async fn get_department_data(&self, department: &str) -> ResultEnvelope<DepartmentRollup> {
        ResultEnvelope::from_result(self.department_rollup(department, None).await)
    }

    pub async fn get_department_trends(
        &self,
        department: &str,
        months: Option<u32>,
    ) -> ResultEnvelope<Vec<MonthlyTrend>> {
        ResultEnvelope::from_result(self.department_trends(department, months).await)
    }

    pub async fn get_employee_rollup(
        &self,
        employee_id: &str,
        months: Option<u32>,
    ) -> ResultEnvelope<EmployeeRollup> {
        ResultEnvelope::from_result(
            self.employee_rollup(&EmployeeId(employee_id.to_owned()), months).await,
        )
    }

    pub async fn compare_departments(
        &self,
        departments: &[String],
    ) -> ResultEnvelope<Vec<DepartmentComparison>> {
        ResultEnvelope::from_result(self.department_comparison(departments).await)
    }

    pub async fn get_claim_history(&self, claim_id: &str) -> ResultEnvelope<ClaimHistory> {
        ResultEnvelope::from_result(self.claim_history(&ClaimId(claim_id.to_owned())).await)
    }

    pub async fn mark_claim_viewed(
        &self,
        claim_id: &str,
        viewer_id: &str,
    ) -> ResultEnvelope<ClaimViewReceipt> {
        ResultEnvelope::from_result(
            self.record_view(&ClaimId(claim_id.to_owned()), &EmployeeId(viewer_id.to_owned()))
                .await,
        )
    }

    pub async fn similar_claims(
        &self,
        claim_id: &ClaimId,
    ) -> Result<SimilarClaimsAnalysis, ApplicationError> {
        let (_, candidates) = self.related(claim_id).await?;
        let patterns = aggregate(&candidates);

        debug!(
            event_name = "analytics.similar.completed",
            claim_id = %claim_id.0,
            by_amount = candidates.by_amount.len(),
            by_category = candidates.by_category.len(),
            by_employee = candidates.by_employee.len(),
            "similar claims analysed"
        );

        Ok(SimilarClaimsAnalysis {
            claim_id: claim_id.clone(),
            similar_by_amount: candidates.by_amount,
            similar_by_category: candidates.by_category,
            employee_claims: candidates.by_employee,
            patterns,
        })
    }

    pub async fn claim_insights(&self, claim_id: &ClaimId) -> Result<Vec<String>, ApplicationError> {
        let version = self.cache.as_ref().map(|cache| cache.version());
        if let Some(cache) = &self.cache {
            if let Some(messages) = cache.get(claim_id).await {
                debug!(event_name = "analytics.insights.cache_hit", claim_id = %claim_id.0);
                return Ok(messages);
            }
        }

        let (claim, candidates) = self.related(claim_id).await?;
        let messages = self.synthesizer.synthesize_messages(&claim, &aggregate(&candidates));

        if let (Some(cache), Some(version)) = (&self.cache, version) {
            cache.put(claim_id, version, messages.clone()).await;
        }
        debug!(
            event_name = "analytics.insights.completed",
            claim_id = %claim_id.0,
            insights = messages.len(),
            "claim insights synthesised"
        );
        Ok(messages)
    }

    pub async fn department_rollup(
        &self,
        department: &str,
        months: Option<u32>,
    ) -> Result<DepartmentRollup, ApplicationError> {
        let months = self.months(months)?;
        let as_of = self.as_of();
        let fetched = self.fetch_department(department, as_of, months).await?;

        let rollup = rollup_department(
            DepartmentSnapshot {
                department,
                employees: &fetched.employees,
                claims: &fetched.claims,
                configured_budget: fetched.configured_budget,
            },
            as_of,
            months,
            self.thresholds(),
        );
        debug!(
            event_name = "analytics.department.completed",
            department,
            claims = rollup.claim_count,
            "department rollup computed"
        );
        Ok(rollup)
    }

    pub async fn department_trends(
        &self,
        department: &str,
        months: Option<u32>,
    ) -> Result<Vec<MonthlyTrend>, ApplicationError> {
        let months = self.months(months)?;
        let as_of = self.as_of();
        let fetched = self.fetch_department(department, as_of, months).await?;
        Ok(monthly_trends(&fetched.claims, as_of, months))
    }

    pub async fn employee_rollup(
        &self,
        employee_id: &EmployeeId,
        months: Option<u32>,
    ) -> Result<EmployeeRollup, ApplicationError> {
        let months = self.months(months)?;
        let as_of = self.as_of();
        let query = ClaimQuery::new()
            .filter(ClaimFilter::Employee { id: employee_id.clone() })
            .filter(ClaimFilter::ExpenseDateFrom { date: window_start(as_of, months) });

        let (employee, claims) =
            tokio::join!(self.repos.employees.find_by_id(employee_id), self.repos.claims.query(&query));
        let employee = employee
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Employee, &employee_id.0))?;
        let claims = degrade(claims, "employee_claims", &employee_id.0);

        Ok(rollup_employee(&employee, &claims.value, as_of, months))
    }

    /// Rolls up each department in turn. An unknown or failing department only
    /// fails its own row.
    pub async fn department_comparison(
        &self,
        departments: &[String],
    ) -> Result<Vec<DepartmentComparison>, ApplicationError> {
        let names: Vec<&str> =
            departments.iter().map(|name| name.trim()).filter(|name| !name.is_empty()).collect();
        if names.is_empty() {
            return Err(DomainError::InvariantViolation(
                "at least one department is required for a comparison".to_owned(),
            )
            .into());
        }

        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            let outcome = ResultEnvelope::from_result(self.department_rollup(name, None).await);
            rows.push(DepartmentComparison { department: name.to_owned(), outcome });
        }
        Ok(rows)
    }

    pub async fn claim_history(&self, claim_id: &ClaimId) -> Result<ClaimHistory, ApplicationError> {
        self.require_claim(claim_id).await?;
        let events = self.repos.events.list_for_claim(claim_id).await.map_err(persistence)?;
        Ok(ClaimHistory::reconstruct(claim_id.clone(), events))
    }

    pub async fn record_view(
        &self,
        claim_id: &ClaimId,
        viewer_id: &EmployeeId,
    ) -> Result<ClaimViewReceipt, ApplicationError> {
        if viewer_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("viewer id must not be empty".to_owned())
                .into());
        }
        self.require_claim(claim_id).await?;

        let viewed_at = Utc::now();
        self.repos.views.mark_viewed(claim_id, viewer_id, viewed_at).await.map_err(persistence)?;
        Ok(ClaimViewReceipt { claim_id: claim_id.clone(), viewer_id: viewer_id.clone(), viewed_at })
    }

    /// Caller-supplied windows above `MAX_TREND_MONTHS` are rejected.
    fn months(&self, requested: Option<u32>) -> Result<u32, ApplicationError> {
        match requested {
            Some(months) if months > MAX_TREND_MONTHS => {
                Err(DomainError::InvariantViolation(format!(
                    "months must be at most {MAX_TREND_MONTHS}, got {months}"
                ))
                .into())
            }
            Some(months) => Ok(months.max(1)),
            None => Ok(self.thresholds().trend_months.clamp(1, MAX_TREND_MONTHS)),
        }
    }

    async fn require_claim(&self, claim_id: &ClaimId) -> Result<Claim, ApplicationError> {
        self.repos
            .claims
            .find_by_id(claim_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::not_found(EntityKind::Claim, &claim_id.0))
    }

    /// Loads the source claim (hard failure) and its three candidate lists
    /// concurrently (each degrades to empty on failure).
    async fn related(
        &self,
        claim_id: &ClaimId,
    ) -> Result<(Claim, SimilarityCandidateSet), ApplicationError> {
        let claim = self.require_claim(claim_id).await?;
        let plan = SimilarityPlan::for_claim(&claim, self.thresholds());

        let (by_amount, by_category, by_employee) = tokio::join!(
            self.repos.claims.query(&plan.by_amount),
            self.repos.claims.query(&plan.by_category),
            self.repos.claims.query(&plan.by_employee),
        );
        let candidates = SimilarityCandidateSet::bound(
            &plan,
            degrade(by_amount, "similar_by_amount", &claim_id.0).value,
            degrade(by_category, "similar_by_category", &claim_id.0).value,
            degrade(by_employee, "employee_claims", &claim_id.0).value,
        );
        Ok((claim, candidates))
    }

    async fn fetch_department(
        &self,
        department: &str,
        as_of: NaiveDate,
        months: u32,
    ) -> Result<DepartmentFetch, ApplicationError> {
        let claims_query = ClaimQuery::new()
            .filter(ClaimFilter::Department { name: department.to_owned() })
            .filter(ClaimFilter::ExpenseDateFrom { date: window_start(as_of, months) });

        let (employees, claims, budget) = tokio::join!(
            self.repos.employees.list_by_department(department),
            self.repos.claims.query(&claims_query),
            self.repos.budgets.find_for_department(department),
        );
        let employees = degrade(employees, "department_employees", department);
        let claims = degrade(claims, "department_claims", department);
        let budget = degrade(budget, "department_budget", department);

        if employees.value.is_empty() && claims.value.is_empty() && budget.value.is_none() {
            if employees.degraded || claims.degraded || budget.degraded {
                return Err(ApplicationError::Persistence(format!(
                    "department `{department}` could not be loaded"
                )));
            }
            if !self.department_has_any_claim(department).await? {
                return Err(ApplicationError::not_found(EntityKind::Department, department));
            }
        }

        Ok(DepartmentFetch {
            employees: employees.value,
            claims: claims.value,
            configured_budget: budget.value.map(|budget| budget.monthly_budget),
        })
    }

    /// Existence check for departments whose only claims fall outside the window.
    async fn department_has_any_claim(&self, department: &str) -> Result<bool, ApplicationError> {
        let any_claim = ClaimQuery::new()
            .filter(ClaimFilter::Department { name: department.to_owned() })
            .limit(1);
        let found = self.repos.claims.query(&any_claim).await.map_err(persistence)?;
        Ok(!found.is_empty())
    }
}

fn window_start(as_of: NaiveDate, months: u32) -> NaiveDate {
    MonthKey::window(as_of, months).first().map(|month| month.first_day()).unwrap_or(as_of)
}
