//! Domain model for activity certification and progression.
//!
//! # Responsibility
//! - Define the records exchanged between verifier, calculator and ledger.
//! - Keep state-machine rules next to the types they govern.
//!
//! # Invariants
//! - Every submission is identified by a stable `SubmissionId`.
//! - A `CertificationRecord` leaves `Pending` at most once.
//! - `UserProgress::level` is derived from trees only.

pub mod activity;
pub mod certification;
pub mod progress;
pub mod verdict;
