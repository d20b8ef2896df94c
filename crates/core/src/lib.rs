pub mod analytics;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod errors;

pub use analytics::{
    AnalyticsThresholds, ClaimQuery, DepartmentRollup, EmployeeRollup, Insight,
    InsightSynthesizer, MonthlyTrend, PatternStatistics, RepeatWindow, SimilarityCandidateSet,
    SimilarityPlan,
};
pub use domain::approval::{ApprovalAction, ApprovalEvent, ApprovalEventId, ClaimHistory};
pub use domain::budget::DepartmentBudget;
pub use domain::claim::{Claim, ClaimId, ClaimStatus};
pub use domain::employee::{Employee, EmployeeId};
pub use envelope::ResultEnvelope;
pub use errors::{ApplicationError, DomainError, EntityKind, InterfaceError};
