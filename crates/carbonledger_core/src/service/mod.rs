//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate verification, reward calculation and record storage into
//!   use-case level APIs.
//! - Keep CLI and other callers decoupled from storage details.

pub mod certification_service;
pub mod ledger;
