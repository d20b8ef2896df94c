//! Claim analytics: related-claim selection, pattern aggregation, insight
//! synthesis and department/employee rollups.
//!
//! Everything here is a pure function over rows the caller already fetched.
//! Fetching, fan-out and degradation on failed reads live in
//! `claimlens-analytics`.

pub mod insights;
pub mod numeric;
pub mod patterns;
pub mod query;
pub mod rollup;
pub mod similarity;
pub mod thresholds;

pub use insights::{Insight, InsightSynthesizer};
pub use patterns::{aggregate, PatternStatistics, RecentClaim};
pub use query::{ClaimFilter, ClaimOrder, ClaimQuery};
pub use rollup::{
    monthly_trends, rank_categories, rollup_department, rollup_employee, ActivityEntry,
    BudgetSource, BudgetUtilization, CategoryShare, DepartmentRollup, DepartmentSnapshot,
    EmployeeRollup, MonthKey, MonthlyTrend,
};
pub use similarity::{SimilarityCandidateSet, SimilarityCriterion, SimilarityPlan};
pub use thresholds::{AnalyticsThresholds, RepeatWindow, MAX_TREND_MONTHS};
