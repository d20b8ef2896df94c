use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Submitted,
    Approved,
    Rejected,
    InfoRequested,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InfoRequested => "info_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "info_requested" => Some(Self::InfoRequested),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub employee_id: EmployeeId,
    pub category: String,
    /// Missing amounts are legal on intake; every aggregation reads them as zero.
    pub amount: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
    pub expense_date: NaiveDate,
    pub status: ClaimStatus,
    /// Copy of the employee's department at submission time.
    pub department: String,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
}

impl Claim {
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }

    pub fn is_approved(&self) -> bool {
        self.status == ClaimStatus::Approved
    }

    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        matches!(
            (self.status, next),
            (ClaimStatus::Submitted, ClaimStatus::Approved)
                | (ClaimStatus::Submitted, ClaimStatus::Rejected)
                | (ClaimStatus::Submitted, ClaimStatus::InfoRequested)
                | (ClaimStatus::InfoRequested, ClaimStatus::Submitted)
                | (ClaimStatus::InfoRequested, ClaimStatus::Approved)
                | (ClaimStatus::InfoRequested, ClaimStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: ClaimStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidClaimTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }
}
