//! Classifier collaborator contract.

use crate::catalog::ActivityPolicy;
use crate::model::activity::ActivityKind;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Reply returned by the offline classifier when no model is configured.
pub const OFFLINE_REPLY: &str = "VALID: true
CONFIDENCE: 85
REASON: offline analysis accepted the photo
CARBON_REDUCTION: 0.3
POINTS: 15";

/// One classification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRequest {
    pub activity: ActivityKind,
    /// Type-specific prompt contract, see `build_prompt`.
    pub prompt: String,
    pub image: Vec<u8>,
}

/// Failure of one classification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// Classifier is not configured or refused service.
    Unavailable(String),
    /// Network or protocol failure.
    Transport(String),
    /// No reply within the verification bound.
    Timeout(Duration),
    /// Reply carried no text.
    EmptyReply,
}

impl ClassifierError {
    /// Stable short code for log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "classifier_unavailable",
            Self::Transport(_) => "classifier_transport",
            Self::Timeout(_) => "classifier_timeout",
            Self::EmptyReply => "classifier_empty_reply",
        }
    }
}

impl Display for ClassifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "classifier unavailable: {message}"),
            Self::Transport(message) => write!(f, "classifier transport failed: {message}"),
            Self::Timeout(bound) => {
                write!(f, "classifier did not reply within {} ms", bound.as_millis())
            }
            Self::EmptyReply => write!(f, "classifier returned an empty reply"),
        }
    }
}

impl Error for ClassifierError {}

/// External vision classification capability.
///
/// Implementations may block; the verifier bounds every call.
pub trait Classifier: Send + Sync {
    /// Stable id used in log events.
    fn classifier_id(&self) -> &str;
    /// Returns the raw structured-text reply.
    fn classify(&self, request: &ClassifierRequest) -> Result<String, ClassifierError>;
}

/// Classifier that always answers with the same reply.
///
/// Used when no model endpoint is configured and in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedReplyClassifier {
    reply: String,
}

impl CannedReplyClassifier {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    /// Offline stand-in that accepts every photo.
    pub fn offline() -> Self {
        Self::new(OFFLINE_REPLY)
    }
}

impl Classifier for CannedReplyClassifier {
    fn classifier_id(&self) -> &str {
        "canned"
    }

    fn classify(&self, _request: &ClassifierRequest) -> Result<String, ClassifierError> {
        if self.reply.trim().is_empty() {
            return Err(ClassifierError::EmptyReply);
        }
        Ok(self.reply.clone())
    }
}

/// Builds the type-specific prompt contract for one catalog row.
pub fn build_prompt(row: &ActivityPolicy) -> String {
    let mut prompt = format!(
        "Analyze this image and decide whether it is valid evidence of: {}.\n\nCriteria:\n",
        row.label
    );
    for (index, criterion) in row.criteria.iter().enumerate() {
        prompt.push_str(&format!("{}. {criterion}\n", index + 1));
    }
    prompt.push_str(&format!(
        "\nReply using exactly these lines:\n\
         VALID: true/false\n\
         CONFIDENCE: 0-100\n\
         REASON: short justification\n\
         CARBON_REDUCTION: {} (kg, fixed)\n\
         POINTS: {} (fixed)\n",
        row.base_carbon_reduction_kg, row.base_points
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, CannedReplyClassifier, Classifier, ClassifierError, ClassifierRequest};
    use crate::catalog::policy;
    use crate::model::activity::ActivityKind;

    fn request() -> ClassifierRequest {
        ClassifierRequest {
            activity: ActivityKind::Tumbler,
            prompt: build_prompt(policy(ActivityKind::Tumbler)),
            image: vec![0xFF, 0xD8],
        }
    }

    #[test]
    fn prompt_lists_criteria_and_reply_contract() {
        let prompt = build_prompt(policy(ActivityKind::Tumbler));
        assert!(prompt.contains("reusable tumbler"));
        assert!(prompt.contains("1. A tumbler or reusable cup is clearly visible."));
        assert!(prompt.contains("VALID: true/false"));
        assert!(prompt.contains("CONFIDENCE: 0-100"));
        assert!(prompt.contains("POINTS: 15"));
    }

    #[test]
    fn canned_classifier_returns_its_reply() {
        let classifier = CannedReplyClassifier::offline();
        let reply = classifier.classify(&request()).expect("canned reply");
        assert!(reply.starts_with("VALID: true"));
    }

    #[test]
    fn blank_canned_reply_is_an_error() {
        let classifier = CannedReplyClassifier::new("  ");
        assert_eq!(
            classifier.classify(&request()),
            Err(ClassifierError::EmptyReply)
        );
    }
}
