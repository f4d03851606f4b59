//! Data model for extraction jobs.
//!
//! `Source` and `ExtractionState` live for one job; configuration types are
//! constructed once and shared read-only across jobs.

pub mod config;
pub mod record;
pub mod source;
pub mod state;
