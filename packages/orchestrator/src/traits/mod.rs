//! Core trait abstractions.
//!
//! The agent capability contract is the seam between the orchestration core
//! and the concrete extraction implementations.

pub mod agent;
