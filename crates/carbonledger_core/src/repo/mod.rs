//! Record store contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the append/upsert contract the certification pipeline relies on.
//! - Keep SQL details out of service orchestration.
//!
//! # Invariants
//! - Records are append-only; only `pending` rows change, and only once.
//! - Ledger application and the `accepted` transition commit together.

pub mod record_repo;
