//! Core domain logic for activity certification and the carbon-credit ledger.
//! This crate owns every reward and progression invariant.

pub mod catalog;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod reward;
pub mod service;
pub mod verify;

pub use catalog::{policies, policy, ActivityPolicy, RewardRule};
pub use config::{ClassifierConfig, ConfigError, CoreConfig, FallbackPolicy, VerifierConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::activity::{ActivityKind, Evidence, SubmissionMetadata, ValidationError};
pub use model::certification::{CertificationRecord, CertificationStatus, RecordId, RewardDelta};
pub use model::progress::{level_for_trees, UserProgress};
pub use model::verdict::{Verdict, VerdictSource};
pub use repo::record_repo::{
    LedgerApplication, LedgerOutcome, RecordStore, RepoError, RepoResult, SqliteRecordStore,
};
pub use service::certification_service::{CertificationService, SubmitError};
pub use verify::classifier::{CannedReplyClassifier, Classifier, ClassifierError, ClassifierRequest};
pub use verify::openai::OpenAiVisionClassifier;
pub use verify::verifier::{EvidenceVerifier, Verification};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
