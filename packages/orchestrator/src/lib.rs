//! Graph-driven orchestration core for heterogeneous catalog-extraction
//! agents.
//!
//! A job is a batch of [`Source`]s (web pages, documents, API endpoints).
//! Each source walks a compiled [`ExecutionGraph`] -
//! validate, dispatch, extract (with bounded retries), normalize - under a
//! per-source state machine whose only writer is the [`Orchestrator`].
//! Extraction itself is pluggable: agents implement [`ExtractionAgent`] and
//! are resolved per source type through the [`AgentRegistry`].
//!
//! ```no_run
//! use catalog_orchestrator::{
//!     AgentRegistry, Orchestrator, Source, SourceType, WebScrapingAgent,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = AgentRegistry::new();
//! registry.register_primary(SourceType::Web, Arc::new(WebScrapingAgent::new()))?;
//!
//! let orchestrator = Orchestrator::new(registry)?;
//! let state = orchestrator
//!     .run(vec![Source::new(SourceType::Web, "https://shop.example.com/catalog")])
//!     .await?;
//!
//! println!("{:?}", state.summary());
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod error;
pub mod executor;
pub mod graph;
pub mod registry;
pub mod testing;
pub mod traits;
pub mod types;

pub use agents::{DocumentAgent, SiteExtractor, WebScrapingAgent};
pub use error::{GraphError, OrchestratorError, RegistryError, Result};
pub use executor::{JobHandle, JobUpdate, Orchestrator};
pub use graph::{ExecutionGraph, GraphBuilder, OutcomeKind, StepKind};
pub use registry::AgentRegistry;
pub use traits::agent::{AgentOutcome, ExtractionAgent};
pub use types::config::{BackoffStrategy, OrchestratorConfig};
pub use types::record::{CatalogItem, NormalizedRecord, RawExtract};
pub use types::source::{ErrorKind, Source, SourceError, SourceId, SourceStatus, SourceType};
pub use types::state::{ExtractionState, JobId, JobStatus, JobSummary};
