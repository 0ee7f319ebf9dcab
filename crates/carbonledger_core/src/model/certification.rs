//! Certification audit record and its state machine.
//!
//! # Responsibility
//! - Capture one submission's verdict, reward and terminal status.
//! - Enforce the single `pending -> accepted|rejected` transition.
//!
//! # Invariants
//! - Exactly one record exists per submission, including rejected ones.
//! - Fields other than `status` and `resolved_at` never change after insert.
//! - A rejected record always carries `RewardDelta::ZERO`.

use crate::model::activity::{ActivityKind, SubmissionId};
use crate::model::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one certification record.
pub type RecordId = Uuid;

/// Carbon and point credit for one accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardDelta {
    /// Non-negative, rounded to one decimal.
    pub carbon_reduction_kg: f64,
    pub points: u32,
}

impl RewardDelta {
    pub const ZERO: RewardDelta = RewardDelta {
        carbon_reduction_kg: 0.0,
        points: 0,
    };
}

/// Lifecycle state of a certification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    /// In flight; ledger not yet applied.
    Pending,
    /// Ledger applied. Terminal.
    Accepted,
    /// No ledger effect. Terminal.
    Rejected,
}

impl CertificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Validates one transition of the record state machine.
    pub fn transition(self, to: CertificationStatus) -> Result<Self, StatusTransitionError> {
        match (self, to) {
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Rejected) => Ok(to),
            (from, to) => Err(StatusTransitionError { from, to }),
        }
    }
}

/// Attempted transition outside `pending -> accepted|rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransitionError {
    pub from: CertificationStatus,
    pub to: CertificationStatus,
}

impl Display for StatusTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal certification transition {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl Error for StatusTransitionError {}

/// Immutable audit record of one certification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationRecord {
    pub id: RecordId,
    pub submission_id: SubmissionId,
    pub user_id: String,
    pub activity: ActivityKind,
    pub evidence_ref: String,
    pub verdict: Verdict,
    pub reward: RewardDelta,
    pub status: CertificationStatus,
    /// Raw classifier reply, kept for audit only.
    pub classifier_reply: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the terminal transition.
    pub resolved_at: Option<i64>,
}

impl CertificationRecord {
    /// Creates a pending record. Invalid verdicts force a zero reward.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        submission_id: SubmissionId,
        user_id: impl Into<String>,
        activity: ActivityKind,
        evidence_ref: impl Into<String>,
        verdict: Verdict,
        reward: RewardDelta,
        classifier_reply: Option<String>,
        created_at: i64,
    ) -> Self {
        let reward = if verdict.valid {
            reward
        } else {
            RewardDelta::ZERO
        };
        Self {
            id: Uuid::new_v4(),
            submission_id,
            user_id: user_id.into(),
            activity,
            evidence_ref: evidence_ref.into(),
            verdict,
            reward,
            status: CertificationStatus::Pending,
            classifier_reply,
            created_at,
            resolved_at: None,
        }
    }

    /// Status this record must end in once the ledger has run.
    pub fn target_status(&self) -> CertificationStatus {
        if self.verdict.valid {
            CertificationStatus::Accepted
        } else {
            CertificationStatus::Rejected
        }
    }
}
