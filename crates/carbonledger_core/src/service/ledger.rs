//! Ledger applier.
//!
//! # Responsibility
//! - Drive a pending record to its terminal status through the record store.
//!
//! # Invariants
//! - Accepted records credit progress exactly once per record id.
//! - Rejected records never touch progress.

use crate::catalog::policy;
use crate::model::certification::{CertificationRecord, CertificationStatus};
use crate::repo::record_repo::{LedgerApplication, LedgerOutcome, RecordStore, RepoResult};
use log::{error, info};
use std::time::Instant;

/// Terminal effect of one ledger run.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEffect {
    Credited(LedgerOutcome),
    Rejected,
}

/// Builds the ledger application for an accepted record.
pub fn application_for(record: &CertificationRecord, applied_at: i64) -> LedgerApplication {
    LedgerApplication {
        record_id: record.id,
        user_id: record.user_id.clone(),
        reward: record.reward,
        trees: u32::from(policy(record.activity).grows_tree),
        applied_at,
    }
}

/// Resolves `record` according to its verdict.
///
/// # Errors
/// - `IllegalTransition` when `record` is already terminal; the store is
///   not touched.
pub fn resolve<S: RecordStore>(
    store: &mut S,
    record: &CertificationRecord,
    resolved_at: i64,
) -> RepoResult<LedgerEffect> {
    let started_at = Instant::now();
    let target = record.status.transition(record.target_status())?;
    let result = match target {
        CertificationStatus::Accepted => store
            .apply_accepted(&application_for(record, resolved_at))
            .map(LedgerEffect::Credited),
        _ => store
            .mark_rejected(record.id, resolved_at)
            .map(|()| LedgerEffect::Rejected),
    };

    match &result {
        Ok(effect) => info!(
            "event=ledger_apply module=ledger status=ok record_id={} activity={} outcome={} duration_ms={}",
            record.id,
            record.activity,
            effect_label(effect),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=ledger_apply module=ledger status=error record_id={} activity={} duration_ms={} error={}",
            record.id,
            record.activity,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn effect_label(effect: &LedgerEffect) -> &'static str {
    match effect {
        LedgerEffect::Credited(LedgerOutcome::Applied(_)) => "applied",
        LedgerEffect::Credited(LedgerOutcome::AlreadyApplied(_)) => "already_applied",
        LedgerEffect::Rejected => "rejected",
    }
}
