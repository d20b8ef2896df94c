//! Async orchestration over the record accessor: fans out repository reads,
//! degrades failed secondary branches, and hands the results to the pure
//! analytics in `claimlens-core`.

pub mod change;
pub mod service;

pub use change::{ChangeFeed, DataChanged, InsightCache};
pub use service::{
    AnalyticsRepositories, AnalyticsService, ClaimViewReceipt, DepartmentComparison,
    SimilarClaimsAnalysis,
};
