use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::claim::{ClaimId, ClaimStatus};
use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalEventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    RequestInfo,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestInfo => "request_info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "request_info" => Some(Self::RequestInfo),
            _ => None,
        }
    }

    /// Claim status a claim lands in once this action is recorded.
    pub fn resulting_status(&self) -> ClaimStatus {
        match self {
            Self::Approve => ClaimStatus::Approved,
            Self::Reject => ClaimStatus::Rejected,
            Self::RequestInfo => ClaimStatus::InfoRequested,
        }
    }
}

/// Append-only record of a reviewer acting on a claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub id: ApprovalEventId,
    pub claim_id: ClaimId,
    pub actor_id: EmployeeId,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimHistory {
    pub claim_id: ClaimId,
    pub events: Vec<ApprovalEvent>,
    pub latest_decision: Option<ApprovalAction>,
    pub derived_status: ClaimStatus,
}

impl ClaimHistory {
    /// Orders events by timestamp ascending (ties by event id) and replays
    /// them on top of a freshly submitted claim.
    pub fn reconstruct(claim_id: ClaimId, mut events: Vec<ApprovalEvent>) -> Self {
        events.retain(|event| event.claim_id == claim_id);
        events.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });

        let latest_decision = events.last().map(|event| event.action);
        let derived_status =
            latest_decision.map(|action| action.resulting_status()).unwrap_or(ClaimStatus::Submitted);

        Self { claim_id, events, latest_decision, derived_status }
    }
}
