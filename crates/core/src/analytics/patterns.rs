use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::numeric::{mean, ratio_pct};
use crate::analytics::similarity::SimilarityCandidateSet;
use crate::domain::claim::Claim;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pub average_amount_for_category: Decimal,
    /// Percentage of same-category claims that were approved.
    pub category_approval_rate: f64,
    /// Percentage of the employee's recent claims that were approved.
    pub employee_approval_rate: f64,
    pub category_sample_size: usize,
    pub employee_sample_size: usize,
    /// The employee's other claims, most recent expense first.
    pub employee_recent_claims: Vec<RecentClaim>,
}

/// The slice of a prior claim the repeated-category rule looks at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentClaim {
    pub expense_date: NaiveDate,
    pub category: String,
}

impl RecentClaim {
    pub fn new(expense_date: NaiveDate, category: impl Into<String>) -> Self {
        Self { expense_date, category: category.into() }
    }
}

/// Derives pattern statistics from a candidate set. Empty lists produce zeros.
pub fn aggregate(candidates: &SimilarityCandidateSet) -> PatternStatistics {
    PatternStatistics {
        average_amount_for_category: mean(candidates.by_category.iter().map(Claim::amount_or_zero)),
        category_approval_rate: approval_rate(&candidates.by_category),
        employee_approval_rate: approval_rate(&candidates.by_employee),
        category_sample_size: candidates.by_category.len(),
        employee_sample_size: candidates.by_employee.len(),
        employee_recent_claims: candidates
            .by_employee
            .iter()
            .map(|claim| RecentClaim::new(claim.expense_date, claim.category.clone()))
            .collect(),
    }
}

pub fn approval_rate(claims: &[Claim]) -> f64 {
    let approved = claims.iter().filter(|claim| claim.is_approved()).count();
    ratio_pct(approved, claims.len())
}
