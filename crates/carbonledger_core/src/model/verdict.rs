//! Verification verdict produced once per submission.

use serde::{Deserialize, Serialize};

/// Upper bound of the confidence scale.
pub const MAX_CONFIDENCE: u8 = 100;

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Parsed from a classifier reply.
    Model,
    /// Substituted because the classifier was unavailable or unparseable.
    Fallback,
}

impl VerdictSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "model" => Some(Self::Model),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Structured outcome of evidence verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    /// Always within `0..=MAX_CONFIDENCE`.
    pub confidence: u8,
    pub reason: String,
    pub source: VerdictSource,
}

impl Verdict {
    /// Builds a model verdict, clamping confidence into range.
    pub fn from_model(valid: bool, confidence: i64, reason: impl Into<String>) -> Self {
        Self {
            valid,
            confidence: clamp_confidence(confidence),
            reason: reason.into(),
            source: VerdictSource::Model,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == VerdictSource::Fallback
    }
}

/// Clamps any integer into the confidence scale.
pub fn clamp_confidence(value: i64) -> u8 {
    // Bounded to 0..=100 before the cast.
    value.clamp(0, i64::from(MAX_CONFIDENCE)) as u8
}
