use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::numeric::{mean, percentage, ratio_pct, round_half_up};
use crate::analytics::patterns::approval_rate;
use crate::analytics::query::{sort_claims, ClaimOrder};
use crate::analytics::thresholds::{AnalyticsThresholds, MAX_TREND_MONTHS};
use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
use crate::domain::employee::{Employee, EmployeeId};

/// Calendar month bucket, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The `months` calendar months ending with the month of `as_of`,
    /// oldest first. `months` is clamped to `1..=MAX_TREND_MONTHS`.
    pub fn window(as_of: NaiveDate, months: u32) -> Vec<Self> {
        let months = months.clamp(1, MAX_TREND_MONTHS);
        let mut keys = Vec::with_capacity(months as usize);
        let mut cursor = Self::of(as_of);
        for _ in 0..months {
            keys.push(cursor);
            cursor = cursor.previous();
        }
        keys.reverse();
        keys
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Claims whose expense date falls inside the trailing month window.
pub fn claims_in_window(claims: &[Claim], as_of: NaiveDate, months: u32) -> Vec<&Claim> {
    let window = MonthKey::window(as_of, months);
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };
    claims
        .iter()
        .filter(|claim| {
            let key = MonthKey::of(claim.expense_date);
            key >= first && key <= last
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub month: String,
    pub total_amount: Decimal,
    pub claim_count: usize,
    pub average_amount: Decimal,
    pub category_count: usize,
}

/// Buckets claims by the month of their expense date (not the submission
/// date). Every month of the window is present, oldest first; empty months
/// carry zeros.
pub fn monthly_trends(claims: &[Claim], as_of: NaiveDate, months: u32) -> Vec<MonthlyTrend> {
    let window = MonthKey::window(as_of, months);
    let mut buckets: BTreeMap<MonthKey, Vec<&Claim>> =
        window.iter().map(|key| (*key, Vec::new())).collect();

    for claim in claims {
        if let Some(bucket) = buckets.get_mut(&MonthKey::of(claim.expense_date)) {
            bucket.push(claim);
        }
    }

    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let amounts: Vec<Decimal> = bucket.iter().map(|claim| claim.amount_or_zero()).collect();
            let categories: BTreeSet<&str> =
                bucket.iter().map(|claim| claim.category.as_str()).collect();
            MonthlyTrend {
                month: key.to_string(),
                total_amount: amounts.iter().copied().sum(),
                claim_count: bucket.len(),
                average_amount: mean(amounts),
                category_count: categories.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub total_amount: Decimal,
    pub claim_count: usize,
    /// Share of the grand total, 0 when the grand total is 0.
    pub percentage: f64,
}

/// Groups by category, ranks by summed amount descending (ties by name) and
/// keeps the first `limit`.
pub fn rank_categories<'a>(
    claims: impl IntoIterator<Item = &'a Claim>,
    limit: usize,
) -> Vec<CategoryShare> {
    let mut totals: HashMap<&str, (Decimal, usize)> = HashMap::new();
    let mut grand_total = Decimal::ZERO;

    for claim in claims {
        let amount = claim.amount_or_zero();
        let entry = totals.entry(claim.category.as_str()).or_insert((Decimal::ZERO, 0));
        entry.0 += amount;
        entry.1 += 1;
        grand_total += amount;
    }

    let mut ranked: Vec<CategoryShare> = totals
        .into_iter()
        .map(|(category, (total_amount, claim_count))| CategoryShare {
            category: category.to_string(),
            total_amount,
            claim_count,
            percentage: percentage(total_amount, grand_total),
        })
        .collect();
    ranked.sort_by(|left, right| {
        right.total_amount.cmp(&left.total_amount).then_with(|| left.category.cmp(&right.category))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSource {
    Configured,
    /// No budget row exists; the budget is actual spend times the configured
    /// multiplier, which pins utilization at 1 / multiplier.
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetUtilization {
    pub monthly_budget: Decimal,
    pub source: BudgetSource,
    pub utilization_pct: f64,
}

impl BudgetUtilization {
    pub fn compute(
        total_expenses: Decimal,
        configured: Option<Decimal>,
        estimate_multiplier: Decimal,
    ) -> Self {
        let (monthly_budget, source) = match configured {
            Some(budget) => (budget, BudgetSource::Configured),
            None => (total_expenses * estimate_multiplier, BudgetSource::Estimated),
        };
        Self {
            monthly_budget,
            source,
            utilization_pct: percentage(total_expenses, monthly_budget),
        }
    }

    pub fn rounded_pct(&self) -> i64 {
        round_half_up(self.utilization_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub claim_id: ClaimId,
    pub employee_id: EmployeeId,
    pub employee_name: Option<String>,
    pub category: String,
    pub amount: Decimal,
    pub status: ClaimStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentRollup {
    pub department: String,
    pub as_of: NaiveDate,
    pub months: u32,
    pub employee_count: usize,
    pub claim_count: usize,
    pub total_expenses: Decimal,
    pub average_expense: Decimal,
    pub approval_rate: f64,
    pub budget: BudgetUtilization,
    pub top_categories: Vec<CategoryShare>,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Inputs of a department rollup, already fetched.
#[derive(Debug, Clone, Copy)]
pub struct DepartmentSnapshot<'a> {
    pub department: &'a str,
    pub employees: &'a [Employee],
    pub claims: &'a [Claim],
    pub configured_budget: Option<Decimal>,
}

pub fn rollup_department(
    snapshot: DepartmentSnapshot<'_>,
    as_of: NaiveDate,
    months: u32,
    thresholds: &AnalyticsThresholds,
) -> DepartmentRollup {
    let in_window: Vec<&Claim> = claims_in_window(snapshot.claims, as_of, months)
        .into_iter()
        .filter(|claim| claim.department == snapshot.department)
        .collect();

    let amounts: Vec<Decimal> = in_window.iter().map(|claim| claim.amount_or_zero()).collect();
    let total_expenses: Decimal = amounts.iter().copied().sum();
    let approved = in_window.iter().filter(|claim| claim.is_approved()).count();
    let budget = BudgetUtilization::compute(
        total_expenses,
        snapshot.configured_budget,
        thresholds.estimated_budget_multiplier,
    );

    let names: HashMap<&EmployeeId, &str> = snapshot
        .employees
        .iter()
        .map(|employee| (&employee.id, employee.name.as_str()))
        .collect();
    let mut recent: Vec<Claim> = in_window.iter().map(|claim| (*claim).clone()).collect();
    sort_claims(&mut recent, ClaimOrder::SubmittedAtDesc);
    let recent_activity = recent
        .into_iter()
        .take(thresholds.recent_activity_limit)
        .map(|claim| ActivityEntry {
            employee_name: names.get(&claim.employee_id).map(|name| name.to_string()),
            amount: claim.amount_or_zero(),
            claim_id: claim.id,
            employee_id: claim.employee_id,
            category: claim.category,
            status: claim.status,
            submitted_at: claim.submitted_at,
        })
        .collect();

    DepartmentRollup {
        department: snapshot.department.to_string(),
        as_of,
        months: months.max(1),
        employee_count: snapshot
            .employees
            .iter()
            .filter(|employee| employee.department == snapshot.department)
            .count(),
        claim_count: in_window.len(),
        total_expenses,
        average_expense: mean(amounts),
        approval_rate: ratio_pct(approved, in_window.len()),
        budget,
        top_categories: rank_categories(in_window.iter().copied(), thresholds.top_categories_limit),
        recent_activity,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRollup {
    pub employee_id: EmployeeId,
    pub name: String,
    pub department: String,
    pub claim_count: usize,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
    pub approval_rate: f64,
    pub approved_count: usize,
    pub category_count: usize,
    pub trends: Vec<MonthlyTrend>,
}

pub fn rollup_employee(
    employee: &Employee,
    claims: &[Claim],
    as_of: NaiveDate,
    months: u32,
) -> EmployeeRollup {
    let own: Vec<Claim> =
        claims.iter().filter(|claim| claim.employee_id == employee.id).cloned().collect();
    let in_window: Vec<Claim> =
        claims_in_window(&own, as_of, months).into_iter().cloned().collect();

    let amounts: Vec<Decimal> = in_window.iter().map(Claim::amount_or_zero).collect();
    let categories: BTreeSet<&str> = in_window.iter().map(|claim| claim.category.as_str()).collect();
    let approved_count = in_window.iter().filter(|claim| claim.is_approved()).count();

    EmployeeRollup {
        employee_id: employee.id.clone(),
        name: employee.name.clone(),
        department: employee.department.clone(),
        claim_count: in_window.len(),
        total_amount: amounts.iter().copied().sum(),
        average_amount: mean(amounts),
        approval_rate: approval_rate(&in_window),
        approved_count,
        category_count: categories.len(),
        trends: monthly_trends(&in_window, as_of, months),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::analytics::thresholds::{AnalyticsThresholds, MAX_TREND_MONTHS};
    use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
    use crate::domain::employee::{Employee, EmployeeId};

    use super::{
        claims_in_window, monthly_trends, rank_categories, rollup_department, rollup_employee,
        BudgetSource, BudgetUtilization, DepartmentSnapshot, MonthKey,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn claim(id: &str, category: &str, amount: i64, expense: NaiveDate) -> Claim {
        Claim {
            id: ClaimId(id.to_string()),
            employee_id: EmployeeId("EMP-1".to_string()),
            category: category.to_string(),
            amount: Some(Decimal::new(amount, 0)),
            submitted_at: Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("time"),
            expense_date: expense,
            status: ClaimStatus::Approved,
            department: "Engineering".to_string(),
            description: None,
            receipt_url: None,
        }
    }

    fn employee(id: &str, department: &str) -> Employee {
        Employee {
            id: EmployeeId(id.to_string()),
            name: format!("Employee {id}"),
            department: department.to_string(),
            manager_id: None,
        }
    }

    #[test]
    fn month_window_crosses_year_boundary() {
        let keys: Vec<String> =
            MonthKey::window(date(2026, 2, 14), 4).iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn month_window_is_clamped_to_the_supported_range() {
        let widest = MonthKey::window(date(2026, 1, 1), u32::MAX);
        assert_eq!(widest.len(), MAX_TREND_MONTHS as usize);
        assert_eq!(widest.last().map(ToString::to_string).as_deref(), Some("2026-01"));

        assert_eq!(MonthKey::window(date(2026, 1, 1), 0).len(), 1);
    }

    #[test]
    fn trends_bucket_by_expense_date_not_submission_date() {
        // Submitted in June, incurred in March and April.
        let claims = vec![
            claim("A", "Travel", 100, date(2026, 3, 30)),
            claim("B", "Meals", 50, date(2026, 3, 2)),
            claim("C", "Travel", 300, date(2026, 4, 10)),
        ];

        let trends = monthly_trends(&claims, date(2026, 6, 15), 4);
        let months: Vec<&str> = trends.iter().map(|trend| trend.month.as_str()).collect();
        assert_eq!(months, vec!["2026-03", "2026-04", "2026-05", "2026-06"]);

        assert_eq!(trends[0].total_amount, Decimal::new(150, 0));
        assert_eq!(trends[0].claim_count, 2);
        assert_eq!(trends[0].average_amount, Decimal::new(75, 0));
        assert_eq!(trends[0].category_count, 2);
        assert_eq!(trends[1].claim_count, 1);
        assert_eq!(trends[3].claim_count, 0, "submission month has no expenses");
        assert_eq!(trends[3].average_amount, Decimal::ZERO);
    }

    #[test]
    fn categories_rank_by_total_and_keep_top_five() {
        let claims: Vec<Claim> = [
            ("Travel", 500),
            ("Meals", 100),
            ("Office", 50),
            ("Software", 200),
            ("Training", 75),
            ("Travel", 500),
            ("Misc", 75),
        ]
        .iter()
        .enumerate()
        .map(|(index, (category, amount))| {
            claim(&format!("C{index}"), category, *amount, date(2026, 5, 1))
        })
        .collect();

        let ranked = rank_categories(&claims, 5);
        let names: Vec<&str> = ranked.iter().map(|share| share.category.as_str()).collect();
        assert_eq!(names, vec!["Travel", "Software", "Meals", "Misc", "Training"]);
        assert_eq!(ranked[0].claim_count, 2);
        assert!((ranked[0].percentage - 66.666).abs() < 0.01);
    }

    #[test]
    fn empty_department_without_budget_reports_zero_utilization() {
        let utilization = BudgetUtilization::compute(Decimal::ZERO, None, Decimal::new(12, 1));

        assert_eq!(utilization.source, BudgetSource::Estimated);
        assert_eq!(utilization.monthly_budget, Decimal::ZERO);
        assert_eq!(utilization.utilization_pct, 0.0);
        assert!(rank_categories(&Vec::<Claim>::new(), 5).is_empty());
    }

    #[test]
    fn missing_budget_is_estimated_at_one_point_two_times_spend() {
        let utilization =
            BudgetUtilization::compute(Decimal::new(10_000, 0), None, Decimal::new(12, 1));

        assert_eq!(utilization.monthly_budget, Decimal::new(12_000, 0));
        assert_eq!(utilization.rounded_pct(), 83);
        assert!((utilization.utilization_pct - 83.333).abs() < 0.001);
    }

    #[test]
    fn configured_budget_drives_utilization() {
        let utilization = BudgetUtilization::compute(
            Decimal::new(4_500, 0),
            Some(Decimal::new(6_000, 0)),
            Decimal::new(12, 1),
        );
        assert_eq!(utilization.source, BudgetSource::Configured);
        assert_eq!(utilization.utilization_pct, 75.0);

        let zero = BudgetUtilization::compute(Decimal::new(10, 0), Some(Decimal::ZERO), Decimal::ONE);
        assert_eq!(zero.utilization_pct, 0.0);
    }

    #[test]
    fn department_rollup_scopes_to_window_and_department() {
        let mut foreign = claim("X", "Travel", 9_999, date(2026, 5, 3));
        foreign.department = "Sales".to_string();
        let claims = vec![
            claim("A", "Travel", 6_000, date(2026, 5, 3)),
            claim("B", "Meals", 4_000, date(2026, 4, 20)),
            claim("OLD", "Travel", 1_000, date(2025, 1, 1)),
            foreign,
        ];
        let employees = vec![employee("EMP-1", "Engineering"), employee("EMP-2", "Engineering")];

        let rollup = rollup_department(
            DepartmentSnapshot {
                department: "Engineering",
                employees: &employees,
                claims: &claims,
                configured_budget: None,
            },
            date(2026, 5, 31),
            6,
            &AnalyticsThresholds::default(),
        );

        assert_eq!(rollup.employee_count, 2);
        assert_eq!(rollup.claim_count, 2);
        assert_eq!(rollup.total_expenses, Decimal::new(10_000, 0));
        assert_eq!(rollup.average_expense, Decimal::new(5_000, 0));
        assert_eq!(rollup.approval_rate, 100.0);
        assert_eq!(rollup.budget.monthly_budget, Decimal::new(12_000, 0));
        assert_eq!(rollup.budget.rounded_pct(), 83);
        assert_eq!(rollup.top_categories[0].category, "Travel");
        assert_eq!(rollup.top_categories[0].percentage, 60.0);
        assert_eq!(rollup.recent_activity.len(), 2);
        assert_eq!(rollup.recent_activity[0].employee_name.as_deref(), Some("Employee EMP-1"));
    }

    #[test]
    fn employee_rollup_covers_window_only() {
        let mut rejected = claim("R", "Meals", 200, date(2026, 5, 2));
        rejected.status = ClaimStatus::Rejected;
        let claims = vec![
            claim("A", "Travel", 400, date(2026, 5, 1)),
            rejected,
            claim("OLD", "Travel", 1_000, date(2024, 1, 1)),
        ];

        let rollup = rollup_employee(&employee("EMP-1", "Engineering"), &claims, date(2026, 5, 31), 3);

        assert_eq!(rollup.claim_count, 2);
        assert_eq!(rollup.total_amount, Decimal::new(600, 0));
        assert_eq!(rollup.approval_rate, 50.0);
        assert_eq!(rollup.category_count, 2);
        assert_eq!(rollup.trends.len(), 3);
        assert_eq!(claims_in_window(&claims, date(2026, 5, 31), 3).len(), 2);
    }
}
