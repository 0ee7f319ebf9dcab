//! Activity kinds and user submissions.
//!
//! # Responsibility
//! - Name every creditable activity with a stable wire id.
//! - Carry submission input (evidence and declared metadata) into the pipeline.
//!
//! # Invariants
//! - `ActivityKind::as_str` values are persisted and must never change.
//! - A submission with empty evidence bytes or an empty user id is invalid.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one user submission.
pub type SubmissionId = Uuid;

/// Creditable sustainability activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Drink served in a reusable tumbler.
    Tumbler,
    /// Take-out in a reusable container.
    Container,
    /// Electronic receipt instead of paper.
    Receipt,
    /// Mailbox cleanup; rewarded by number of deleted emails.
    Email,
    /// Refill station visit.
    Refill,
    /// Proper disposal of electronic waste.
    Recycle,
    /// Any other carbon-neutral action.
    Other,
    /// Volunteering; rewarded by declared duration.
    Volunteer,
    /// Contest, internship or supporter program; rewarded by declared duration.
    ExternalProgram,
    /// Secondhand goods listing; rewarded by category and wear.
    Secondhand,
}

impl ActivityKind {
    /// All kinds in catalog order.
    pub const ALL: [ActivityKind; 10] = [
        ActivityKind::Tumbler,
        ActivityKind::Container,
        ActivityKind::Receipt,
        ActivityKind::Email,
        ActivityKind::Refill,
        ActivityKind::Recycle,
        ActivityKind::Other,
        ActivityKind::Volunteer,
        ActivityKind::ExternalProgram,
        ActivityKind::Secondhand,
    ];

    /// Stable string id used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tumbler => "tumbler",
            Self::Container => "container",
            Self::Receipt => "receipt",
            Self::Email => "email",
            Self::Refill => "refill",
            Self::Recycle => "recycle",
            Self::Other => "other",
            Self::Volunteer => "volunteer",
            Self::ExternalProgram => "external_program",
            Self::Secondhand => "secondhand",
        }
    }

    /// Parses a stable string id. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
    }
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared submission metadata. Which fields are required depends on the
/// activity's catalog rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    /// First activity day, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Last activity day, `YYYY-MM-DD`. Must not precede `start_date`.
    pub end_date: Option<String>,
    /// Category (volunteer category, program field or goods category).
    pub category: Option<String>,
    /// Goods condition label for secondhand listings.
    pub condition: Option<String>,
    /// Counted quantity, e.g. deleted emails.
    pub quantity: Option<u32>,
}

impl SubmissionMetadata {
    /// Metadata for a dated activity.
    pub fn dated(
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            start_date: Some(start_date.into()),
            end_date: Some(end_date.into()),
            category: Some(category.into()),
            ..Self::default()
        }
    }

    /// Metadata for a secondhand goods listing.
    pub fn goods(category: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            condition: Some(condition.into()),
            ..Self::default()
        }
    }

    /// Metadata for a counted activity.
    pub fn counted(quantity: u32) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }
}

/// Photo evidence attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    /// Caller-side reference (upload key, path) kept for audit.
    pub reference: String,
    /// Raw image bytes forwarded to the classifier.
    pub bytes: Vec<u8>,
}

impl Evidence {
    pub fn new(reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            reference: reference.into(),
            bytes,
        }
    }
}

/// One user action asking for certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// Verified id supplied by the auth collaborator.
    pub user_id: String,
    pub activity: ActivityKind,
    pub evidence_ref: String,
    /// Unix epoch milliseconds.
    pub submitted_at: i64,
    pub metadata: SubmissionMetadata,
}

impl Submission {
    /// Creates a submission with a generated id.
    pub fn new(
        user_id: impl Into<String>,
        activity: ActivityKind,
        evidence_ref: impl Into<String>,
        submitted_at: i64,
        metadata: SubmissionMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            activity,
            evidence_ref: evidence_ref.into(),
            submitted_at,
            metadata,
        }
    }
}

/// Input rejected before any record is created.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyUserId,
    MissingEvidence,
    MissingMetadata {
        activity: ActivityKind,
        field: &'static str,
    },
    InvalidDate {
        field: &'static str,
        value: String,
    },
    ReversedDateRange {
        start_date: String,
        end_date: String,
    },
    UnknownCondition(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUserId => write!(f, "user id must not be empty"),
            Self::MissingEvidence => write!(f, "evidence image must not be empty"),
            Self::MissingMetadata { activity, field } => {
                write!(f, "`{field}` is required for {activity} submissions")
            }
            Self::InvalidDate { field, value } => {
                write!(f, "`{field}` must be a YYYY-MM-DD date, got `{value}`")
            }
            Self::ReversedDateRange {
                start_date,
                end_date,
            } => write!(f, "end date {end_date} is earlier than start date {start_date}"),
            Self::UnknownCondition(value) => write!(f, "unknown goods condition `{value}`"),
        }
    }
}

impl Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::{ActivityKind, SubmissionMetadata};

    #[test]
    fn activity_ids_round_trip_through_parse() {
        for kind in ActivityKind::ALL {
            assert_eq!(ActivityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(
            ActivityKind::parse(" external_program "),
            Some(ActivityKind::ExternalProgram)
        );
        assert_eq!(ActivityKind::parse("carpool"), None);
    }

    #[test]
    fn activity_serializes_as_snake_case_id() {
        let json = serde_json::to_value(ActivityKind::ExternalProgram).expect("serialize kind");
        assert_eq!(json, "external_program");
    }

    #[test]
    fn metadata_helpers_fill_only_their_fields() {
        let dated = SubmissionMetadata::dated("2023-06-10", "2023-06-12", "환경보호");
        assert_eq!(dated.start_date.as_deref(), Some("2023-06-10"));
        assert_eq!(dated.condition, None);

        let goods = SubmissionMetadata::goods("가전", "오래됨");
        assert_eq!(goods.category.as_deref(), Some("가전"));
        assert_eq!(goods.start_date, None);

        assert_eq!(SubmissionMetadata::counted(120).quantity, Some(120));
    }
}
