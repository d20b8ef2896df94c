use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::{Claim, ClaimId};
use crate::domain::employee::EmployeeId;

/// Single predicate over a claim row. Filters in a [`ClaimQuery`] are ANDed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClaimFilter {
    /// Case-sensitive exact match.
    Category { value: String },
    /// Inclusive range; a missing amount compares as zero.
    AmountBetween { min: Decimal, max: Decimal },
    Employee { id: EmployeeId },
    Department { name: String },
    /// Inclusive lower bound on the expense date.
    ExpenseDateFrom { date: NaiveDate },
    /// Inclusive upper bound on the expense date.
    ExpenseDateTo { date: NaiveDate },
}

impl ClaimFilter {
    pub fn matches(&self, claim: &Claim) -> bool {
        match self {
            Self::Category { value } => claim.category == *value,
            Self::AmountBetween { min, max } => {
                let amount = claim.amount_or_zero();
                amount >= *min && amount <= *max
            }
            Self::Employee { id } => claim.employee_id == *id,
            Self::Department { name } => claim.department == *name,
            Self::ExpenseDateFrom { date } => claim.expense_date >= *date,
            Self::ExpenseDateTo { date } => claim.expense_date <= *date,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrder {
    /// Submission time ascending, then id.
    #[default]
    Natural,
    /// Expense date descending, then submission time descending.
    ExpenseDateDesc,
    /// Submission time descending, then id descending.
    SubmittedAtDesc,
}

/// Declarative claim query handed to a record accessor.
///
/// Accessors may translate it to SQL or evaluate it in memory with
/// [`ClaimQuery::apply`]; both must honour the same semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimQuery {
    pub filters: Vec<ClaimFilter>,
    pub exclude: Option<ClaimId>,
    pub order: ClaimOrder,
    pub limit: Option<usize>,
}

impl ClaimQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: ClaimFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn excluding(mut self, id: &ClaimId) -> Self {
        self.exclude = Some(id.clone());
        self
    }

    pub fn order_by(mut self, order: ClaimOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        if self.exclude.as_ref().is_some_and(|excluded| *excluded == claim.id) {
            return false;
        }
        self.filters.iter().all(|filter| filter.matches(claim))
    }

    /// Filters, orders and truncates `claims` in memory.
    pub fn apply(&self, claims: impl IntoIterator<Item = Claim>) -> Vec<Claim> {
        let mut selected: Vec<Claim> =
            claims.into_iter().filter(|claim| self.matches(claim)).collect();
        sort_claims(&mut selected, self.order);
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

pub fn sort_claims(claims: &mut [Claim], order: ClaimOrder) {
    match order {
        ClaimOrder::Natural => claims.sort_by(|left, right| {
            left.submitted_at.cmp(&right.submitted_at).then_with(|| left.id.cmp(&right.id))
        }),
        ClaimOrder::ExpenseDateDesc => claims.sort_by(|left, right| {
            right
                .expense_date
                .cmp(&left.expense_date)
                .then_with(|| right.submitted_at.cmp(&left.submitted_at))
                .then_with(|| right.id.cmp(&left.id))
        }),
        ClaimOrder::SubmittedAtDesc => claims.sort_by(|left, right| {
            right.submitted_at.cmp(&left.submitted_at).then_with(|| right.id.cmp(&left.id))
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
    use crate::domain::employee::EmployeeId;

    use super::{ClaimFilter, ClaimOrder, ClaimQuery};

    fn claim(id: &str, amount: Option<i64>, day: u32) -> Claim {
        Claim {
            id: ClaimId(id.to_string()),
            employee_id: EmployeeId("EMP-1".to_string()),
            category: "Travel".to_string(),
            amount: amount.map(|value| Decimal::new(value, 0)),
            submitted_at: Utc.with_ymd_and_hms(2026, 2, day, 12, 0, 0).single().expect("time"),
            expense_date: NaiveDate::from_ymd_opt(2026, 1, day).expect("date"),
            status: ClaimStatus::Submitted,
            department: "Sales".to_string(),
            description: None,
            receipt_url: None,
        }
    }

    #[test]
    fn amount_range_is_inclusive_and_missing_amount_is_zero() {
        let query = ClaimQuery::new()
            .filter(ClaimFilter::AmountBetween { min: Decimal::ZERO, max: Decimal::new(100, 0) });

        assert!(query.matches(&claim("A", Some(100), 1)));
        assert!(query.matches(&claim("B", None, 2)));
        assert!(!query.matches(&claim("C", Some(101), 3)));
    }

    #[test]
    fn excluded_claim_never_matches() {
        let query = ClaimQuery::new().excluding(&ClaimId("A".to_string()));
        assert!(!query.matches(&claim("A", Some(10), 1)));
        assert!(query.matches(&claim("B", Some(10), 1)));
    }

    #[test]
    fn apply_orders_by_expense_date_descending_then_truncates() {
        let query = ClaimQuery::new().order_by(ClaimOrder::ExpenseDateDesc).limit(2);
        let selected =
            query.apply(vec![claim("A", Some(1), 3), claim("B", Some(1), 9), claim("C", Some(1), 5)]);

        let ids: Vec<&str> = selected.iter().map(|claim| claim.id.0.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
    }
}
