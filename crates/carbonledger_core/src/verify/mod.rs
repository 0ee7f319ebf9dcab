//! Evidence verification against an external vision classifier.
//!
//! # Responsibility
//! - Ask a classifier whether a photo proves the declared activity.
//! - Turn its free-text reply into a `Verdict`.
//!
//! # Invariants
//! - Verification never fails: classifier errors, timeouts and unparseable
//!   replies all resolve to the configured fallback verdict.
//! - Reward hints in replies are audit data and never credited.

pub mod classifier;
pub mod openai;
pub mod parser;
pub mod verifier;
