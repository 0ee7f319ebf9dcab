//! Certification use-case service.
//!
//! # Responsibility
//! - Run one submission through validation, verification, reward calculation
//!   and ledger application.
//! - Expose progress and history reads for callers.
//!
//! # Invariants
//! - Validation failures create no record.
//! - Every inserted record ends terminal, or stays `pending` only when the
//!   ledger step failed; `resume_pending` finishes those.
//! - The profile snapshot is secondary: its failure is logged, never returned.

use crate::catalog::policy;
use crate::model::activity::{
    ActivityKind, Evidence, Submission, SubmissionMetadata, ValidationError,
};
use crate::model::certification::{CertificationRecord, CertificationStatus, RecordId};
use crate::model::progress::UserProgress;
use crate::repo::record_repo::{RecordStore, RepoError, RepoResult};
use crate::reward::{gate, resolve_basis, reward_for_basis};
use crate::service::ledger::{self, LedgerEffect};
use crate::verify::verifier::EvidenceVerifier;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Failure of a certification use case.
#[derive(Debug)]
pub enum SubmitError {
    /// Input rejected; no record was created.
    Validation(ValidationError),
    /// Record insert or read failed; safe to retry.
    Persistence(RepoError),
    /// Ledger step failed; the record stays `pending`.
    LedgerApplication {
        record_id: RecordId,
        source: RepoError,
    },
    RecordNotFound(RecordId),
    NotPending {
        record_id: RecordId,
        status: CertificationStatus,
    },
}

impl SubmitError {
    /// Stable machine-readable code for logs and callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
            Self::LedgerApplication { .. } => "ledger_application",
            Self::RecordNotFound(_) => "record_not_found",
            Self::NotPending { .. } => "not_pending",
        }
    }
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid submission: {err}"),
            Self::Persistence(err) => write!(f, "record persistence failed: {err}"),
            Self::LedgerApplication { record_id, source } => {
                write!(f, "ledger application failed for record {record_id}: {source}")
            }
            Self::RecordNotFound(id) => write!(f, "certification record not found: {id}"),
            Self::NotPending { record_id, status } => write!(
                f,
                "certification record {record_id} is {}, not pending",
                status.as_str()
            ),
        }
    }
}

impl Error for SubmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::LedgerApplication { source, .. } => Some(source),
            Self::RecordNotFound(_) | Self::NotPending { .. } => None,
        }
    }
}

impl From<ValidationError> for SubmitError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for SubmitError {
    fn from(value: RepoError) -> Self {
        Self::Persistence(value)
    }
}

/// Use-case service for activity certification.
pub struct CertificationService<S: RecordStore> {
    store: S,
    verifier: EvidenceVerifier,
}

impl<S: RecordStore> CertificationService<S> {
    pub fn new(store: S, verifier: EvidenceVerifier) -> Self {
        Self { store, verifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Certifies one activity and returns its terminal record.
    ///
    /// # Contract
    /// - Metadata is validated before the classifier is called.
    /// - Classifier failures resolve to the fallback verdict.
    /// - Accepted records credit progress once; rejected ones credit nothing.
    ///
    /// # Errors
    /// - `Validation` for empty user id, empty evidence or unusable metadata.
    /// - `Persistence` when the pending record cannot be stored.
    /// - `LedgerApplication` when the terminal step fails.
    pub fn submit_activity(
        &mut self,
        user_id: &str,
        activity: ActivityKind,
        evidence: &Evidence,
        metadata: &SubmissionMetadata,
    ) -> Result<CertificationRecord, SubmitError> {
        let started_at = Instant::now();
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::EmptyUserId.into());
        }
        if evidence.bytes.is_empty() {
            return Err(ValidationError::MissingEvidence.into());
        }
        let basis = resolve_basis(activity, metadata)?;

        let submission = Submission::new(
            user_id,
            activity,
            evidence.reference.as_str(),
            now_epoch_ms(),
            metadata.clone(),
        );
        let verification = self.verifier.verify(activity, evidence);
        let reward = gate(
            reward_for_basis(policy(activity), basis),
            &verification.verdict,
        );

        let record = CertificationRecord::pending(
            submission.id,
            submission.user_id.as_str(),
            activity,
            submission.evidence_ref.as_str(),
            verification.verdict,
            reward,
            verification.reply,
            submission.submitted_at,
        );
        self.store.insert_record(&record)?;

        let resolved = self.finish(&record)?;
        info!(
            "event=submit_activity module=service status={} record_id={} activity={} source={} points={} duration_ms={}",
            resolved.status.as_str(),
            resolved.id,
            resolved.activity,
            resolved.verdict.source.as_str(),
            resolved.reward.points,
            started_at.elapsed().as_millis()
        );
        Ok(resolved)
    }

    /// Re-runs the ledger step for a record left `pending`.
    ///
    /// # Errors
    /// - `RecordNotFound` for unknown ids.
    /// - `NotPending` when the record is already terminal.
    /// - `LedgerApplication` when the ledger step fails again.
    pub fn resume_pending(
        &mut self,
        record_id: RecordId,
    ) -> Result<CertificationRecord, SubmitError> {
        let record = self
            .store
            .get_record(record_id)?
            .ok_or(SubmitError::RecordNotFound(record_id))?;
        if record.status.is_terminal() {
            return Err(SubmitError::NotPending {
                record_id,
                status: record.status,
            });
        }

        let resolved = self.finish(&record)?;
        info!(
            "event=resume_pending module=service status={} record_id={}",
            resolved.status.as_str(),
            resolved.id
        );
        Ok(resolved)
    }

    /// Current progress of `user_id`; empty for users never credited.
    pub fn progress(&self, user_id: &str) -> RepoResult<UserProgress> {
        self.store.get_progress(user_id)
    }

    /// Certification history of `user_id`, newest first.
    pub fn history(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<CertificationRecord>> {
        self.store.list_records_for_user(user_id, limit)
    }

    fn finish(
        &mut self,
        record: &CertificationRecord,
    ) -> Result<CertificationRecord, SubmitError> {
        let resolved_at = now_epoch_ms();
        let effect = ledger::resolve(&mut self.store, record, resolved_at).map_err(|source| {
            SubmitError::LedgerApplication {
                record_id: record.id,
                source,
            }
        })?;

        if let LedgerEffect::Credited(outcome) = &effect {
            self.sync_profile(outcome.progress(), resolved_at);
        }

        self.store
            .get_record(record.id)?
            .ok_or(SubmitError::RecordNotFound(record.id))
    }

    fn sync_profile(&mut self, progress: &UserProgress, synced_at: i64) {
        if let Err(err) = self.store.upsert_profile_snapshot(progress, synced_at) {
            warn!(
                "event=profile_sync module=service status=error level={} trees={} error={}",
                progress.level, progress.total_trees, err
            );
        }
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
