//! Time-bounded evidence verifier.
//!
//! # Responsibility
//! - Run one classifier call per submission within the configured bound.
//! - Map parse results and classifier failures onto a `Verdict`.
//!
//! # Invariants
//! - `verify` always returns; it never propagates classifier failures.
//! - A timed-out call is abandoned, its late reply is discarded.
//! - Logs carry metadata only; evidence bytes and reasons stay out of logs.

use crate::catalog::policy;
use crate::config::{FallbackPolicy, VerifierConfig};
use crate::model::activity::{ActivityKind, Evidence};
use crate::model::verdict::{clamp_confidence, Verdict, VerdictSource};
use crate::verify::classifier::{build_prompt, Classifier, ClassifierError, ClassifierRequest};
use crate::verify::parser::{parse_reply, ParseOutcome, ReplyFields};
use log::{info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Reason recorded on every fallback verdict.
pub const FALLBACK_REASON: &str = "fallback";

/// Result of verifying one piece of evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verdict: Verdict,
    /// Raw classifier reply, when one arrived. Kept on the record for audit.
    pub reply: Option<String>,
}

/// Evidence verifier over a shared classifier.
pub struct EvidenceVerifier {
    classifier: Arc<dyn Classifier>,
    config: VerifierConfig,
}

impl EvidenceVerifier {
    pub fn new(classifier: Arc<dyn Classifier>, config: VerifierConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// The verdict substituted when the classifier cannot answer.
    pub fn fallback_verdict(&self) -> Verdict {
        Verdict {
            valid: self.config.fallback_policy == FallbackPolicy::Credit,
            confidence: clamp_confidence(i64::from(self.config.fallback_confidence)),
            reason: FALLBACK_REASON.to_string(),
            source: VerdictSource::Fallback,
        }
    }

    /// Verifies `evidence` for `activity`. Never fails.
    pub fn verify(&self, activity: ActivityKind, evidence: &Evidence) -> Verification {
        let started_at = Instant::now();
        let row = policy(activity);
        let request = ClassifierRequest {
            activity,
            prompt: build_prompt(row),
            image: evidence.bytes.clone(),
        };

        let reply = match self.call_bounded(request) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    "event=verify module=verify status=fallback activity={} classifier={} duration_ms={} error_code={} error={}",
                    activity,
                    self.classifier.classifier_id(),
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                return Verification {
                    verdict: self.fallback_verdict(),
                    reply: None,
                };
            }
        };

        match parse_reply(&reply, ReplyFields::defaults_for(row)) {
            ParseOutcome::ParseOk { fields } => {
                info!(
                    "event=verify module=verify status=ok activity={} classifier={} duration_ms={} valid={} confidence={} hint_kg={} hint_points={}",
                    activity,
                    self.classifier.classifier_id(),
                    started_at.elapsed().as_millis(),
                    fields.valid,
                    fields.confidence,
                    fields.hint.carbon_reduction_kg,
                    fields.hint.points
                );
                Verification {
                    verdict: Verdict {
                        valid: fields.valid,
                        confidence: fields.confidence,
                        reason: fields.reason,
                        source: VerdictSource::Model,
                    },
                    reply: Some(reply),
                }
            }
            ParseOutcome::ParseFallback { .. } => {
                warn!(
                    "event=verify module=verify status=fallback activity={} classifier={} duration_ms={} error_code=reply_unparseable reply_len={}",
                    activity,
                    self.classifier.classifier_id(),
                    started_at.elapsed().as_millis(),
                    reply.len()
                );
                Verification {
                    verdict: self.fallback_verdict(),
                    reply: Some(reply),
                }
            }
        }
    }

    fn call_bounded(&self, request: ClassifierRequest) -> Result<String, ClassifierError> {
        let bound = self.config.timeout();
        let classifier = Arc::clone(&self.classifier);
        let (sender, receiver) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("classifier-call".to_string())
            .spawn(move || {
                // Receiver may be gone after a timeout.
                let _ = sender.send(classifier.classify(&request));
            })
            .map_err(|err| ClassifierError::Unavailable(format!("failed to spawn call: {err}")))?;

        match receiver.recv_timeout(bound) {
            Ok(Ok(reply)) if reply.trim().is_empty() => Err(ClassifierError::EmptyReply),
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ClassifierError::Timeout(bound)),
            Err(RecvTimeoutError::Disconnected) => Err(ClassifierError::Unavailable(
                "classifier call ended without a reply".to_string(),
            )),
        }
    }
}
