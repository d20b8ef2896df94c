use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::query::{ClaimFilter, ClaimOrder, ClaimQuery};
use crate::analytics::thresholds::AnalyticsThresholds;
use crate::domain::claim::{Claim, ClaimId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityCriterion {
    Amount,
    Category,
    Employee,
}

impl SimilarityCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Category => "category",
            Self::Employee => "employee",
        }
    }
}

/// The three independent queries that make up a related-claims lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimilarityPlan {
    pub source: ClaimId,
    pub by_amount: ClaimQuery,
    pub by_category: ClaimQuery,
    pub by_employee: ClaimQuery,
}

impl SimilarityPlan {
    /// Builds the queries for `claim`. A zero or missing amount collapses the
    /// amount band to `[0, 0]`.
    pub fn for_claim(claim: &Claim, thresholds: &AnalyticsThresholds) -> Self {
        let amount = claim.amount_or_zero();
        let min = amount * (Decimal::ONE - thresholds.amount_band_ratio);
        let max = amount * (Decimal::ONE + thresholds.amount_band_ratio);

        let by_amount = ClaimQuery::new()
            .filter(ClaimFilter::AmountBetween { min, max })
            .excluding(&claim.id)
            .limit(thresholds.similar_claims_limit);
        let by_category = ClaimQuery::new()
            .filter(ClaimFilter::Category { value: claim.category.clone() })
            .excluding(&claim.id)
            .limit(thresholds.similar_claims_limit);
        let by_employee = ClaimQuery::new()
            .filter(ClaimFilter::Employee { id: claim.employee_id.clone() })
            .excluding(&claim.id)
            .order_by(ClaimOrder::ExpenseDateDesc)
            .limit(thresholds.employee_history_limit);

        Self { source: claim.id.clone(), by_amount, by_category, by_employee }
    }

    pub fn query(&self, criterion: SimilarityCriterion) -> &ClaimQuery {
        match criterion {
            SimilarityCriterion::Amount => &self.by_amount,
            SimilarityCriterion::Category => &self.by_category,
            SimilarityCriterion::Employee => &self.by_employee,
        }
    }
}

/// Bounded sets of claims related to a source claim. Never contains the
/// source claim; list sizes never exceed the plan's limits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCandidateSet {
    pub by_amount: Vec<Claim>,
    pub by_category: Vec<Claim>,
    pub by_employee: Vec<Claim>,
}

impl SimilarityCandidateSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Re-applies each plan query to the rows an accessor returned, so that
    /// self-exclusion, predicates, ordering and caps hold regardless of how
    /// faithfully the accessor evaluated them. Surplus rows are dropped.
    pub fn bound(
        plan: &SimilarityPlan,
        by_amount: Vec<Claim>,
        by_category: Vec<Claim>,
        by_employee: Vec<Claim>,
    ) -> Self {
        Self {
            by_amount: plan.by_amount.apply(by_amount),
            by_category: plan.by_category.apply(by_category),
            by_employee: plan.by_employee.apply(by_employee),
        }
    }

    pub fn get(&self, criterion: SimilarityCriterion) -> &[Claim] {
        match criterion {
            SimilarityCriterion::Amount => &self.by_amount,
            SimilarityCriterion::Category => &self.by_category,
            SimilarityCriterion::Employee => &self.by_employee,
        }
    }

    pub fn contains(&self, id: &ClaimId) -> bool {
        self.by_amount
            .iter()
            .chain(&self.by_category)
            .chain(&self.by_employee)
            .any(|claim| claim.id == *id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_amount.is_empty() && self.by_category.is_empty() && self.by_employee.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::analytics::query::ClaimFilter;
    use crate::analytics::thresholds::AnalyticsThresholds;
    use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
    use crate::domain::employee::EmployeeId;

    use super::{SimilarityCandidateSet, SimilarityCriterion, SimilarityPlan};

    fn claim(id: &str, employee: &str, category: &str, amount: i64, day: u32) -> Claim {
        Claim {
            id: ClaimId(id.to_string()),
            employee_id: EmployeeId(employee.to_string()),
            category: category.to_string(),
            amount: Some(Decimal::new(amount, 0)),
            submitted_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).single().expect("time"),
            expense_date: NaiveDate::from_ymd_opt(2026, 2, day).expect("date"),
            status: ClaimStatus::Submitted,
            department: "Engineering".to_string(),
            description: None,
            receipt_url: None,
        }
    }

    #[test]
    fn amount_band_is_twenty_percent_either_side() {
        let source = claim("SRC", "EMP-1", "Travel", 1000, 1);
        let plan = SimilarityPlan::for_claim(&source, &AnalyticsThresholds::default());

        assert_eq!(
            plan.by_amount.filters,
            vec![ClaimFilter::AmountBetween {
                min: Decimal::new(800, 0),
                max: Decimal::new(1200, 0)
            }]
        );
        assert_eq!(plan.query(SimilarityCriterion::Employee).limit, Some(5));
    }

    #[test]
    fn zero_amount_collapses_band_to_zero() {
        let source = claim("SRC", "EMP-1", "Travel", 0, 1);
        let plan = SimilarityPlan::for_claim(&source, &AnalyticsThresholds::default());

        assert_eq!(
            plan.by_amount.filters,
            vec![ClaimFilter::AmountBetween { min: Decimal::ZERO, max: Decimal::ZERO }]
        );
    }

    #[test]
    fn bounding_excludes_source_and_enforces_caps() {
        let source = claim("SRC", "EMP-1", "Travel", 1000, 1);
        let plan = SimilarityPlan::for_claim(&source, &AnalyticsThresholds::default());

        let mut rows = vec![source.clone()];
        for day in 2..=20 {
            rows.push(claim(&format!("C-{day:02}"), "EMP-1", "Travel", 1000, day));
        }

        let set = SimilarityCandidateSet::bound(&plan, rows.clone(), rows.clone(), rows);

        assert!(!set.contains(&source.id));
        assert_eq!(set.by_amount.len(), 10);
        assert_eq!(set.by_category.len(), 10);
        assert_eq!(set.by_employee.len(), 5);
        assert_eq!(set.by_employee[0].id.0, "C-20", "employee history is newest first");
    }

    #[test]
    fn bounding_drops_rows_that_do_not_satisfy_the_criterion() {
        let source = claim("SRC", "EMP-1", "Travel", 1000, 1);
        let plan = SimilarityPlan::for_claim(&source, &AnalyticsThresholds::default());

        let set = SimilarityCandidateSet::bound(
            &plan,
            vec![claim("FAR", "EMP-2", "Meals", 5000, 2), claim("NEAR", "EMP-2", "Meals", 1190, 3)],
            vec![claim("CASE", "EMP-2", "travel", 1000, 4)],
            vec![claim("OTHER", "EMP-2", "Travel", 1000, 5)],
        );

        assert_eq!(set.get(SimilarityCriterion::Amount).len(), 1);
        assert_eq!(set.by_amount[0].id.0, "NEAR");
        assert!(set.by_category.is_empty(), "category match is case-sensitive");
        assert!(set.by_employee.is_empty());
    }
}
