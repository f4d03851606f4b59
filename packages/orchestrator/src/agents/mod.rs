//! Built-in extraction agents.
//!
//! Both are structural scaffolding around the capability contract: the
//! interesting logic (which sites, which document layouts) lives behind the
//! sub-extractor seams and can be extended without touching the orchestrator.

pub mod document;
pub mod web;

pub use document::DocumentAgent;
pub use web::{GenericPageExtractor, ListingPageExtractor, SiteExtractor, WebScrapingAgent};
