//! Document extraction agent.
//!
//! Reads a local catalog document (plain-text price lists and PDFs with an
//! embedded text layer) and extracts name/price line items. Scanned PDFs with
//! no text layer produce no items and fail permanently; OCR is a separate
//! pipeline concern.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::traits::agent::{AgentOutcome, ExtractionAgent};
use crate::types::record::RawExtract;
use crate::types::source::{Source, SourceType};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Extraction agent for document sources.
pub struct DocumentAgent {
    line_item: Regex,
}

impl DocumentAgent {
    pub fn new() -> Self {
        Self {
            // A catalog line: product text followed by a trailing price.
            line_item: Regex::new(
                r"^\s*(?P<name>[^\d\s][^|;]{2,79}?)\s+(?:\$|MXN|USD)?\s*(?P<price>\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})?)\s*$",
            )
            .expect("static regex"),
        }
    }

    fn parse_line_items(&self, text: &str) -> Vec<IndexMap<String, Value>> {
        text.lines()
            .filter_map(|line| {
                let caps = self.line_item.captures(line)?;
                let name = caps["name"].trim().trim_end_matches(['.', '-', ':']).trim();
                if name.is_empty() {
                    return None;
                }
                let mut item: IndexMap<String, Value> = IndexMap::new();
                item.insert("name".to_string(), json!(name));
                item.insert("price".to_string(), json!(caps["price"].to_string()));
                Some(item)
            })
            .collect()
    }
}

impl Default for DocumentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionAgent for DocumentAgent {
    fn name(&self) -> &str {
        "document_processor"
    }

    fn supports(&self, source_type: SourceType) -> bool {
        source_type == SourceType::Document
    }

    async fn attempt(&self, source: &Source) -> AgentOutcome {
        let bytes = match tokio::fs::read(&source.locator).await {
            Ok(bytes) => bytes,
            Err(err) => return classify_io_error(&source.locator, &err),
        };

        let text = if bytes.starts_with(PDF_MAGIC) {
            extract_pdf_text(&bytes)
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let items = self.parse_line_items(&text);
        debug!(
            locator = %source.locator,
            items = items.len(),
            "document parsed"
        );

        if items.is_empty() {
            return AgentOutcome::permanent(format!(
                "no catalog line items recognized in `{}`",
                source.locator
            ));
        }

        let mut raw = RawExtract::new();
        for item in items {
            raw = raw.with_item(item);
        }
        AgentOutcome::Success(raw)
    }
}

fn classify_io_error(locator: &str, err: &std::io::Error) -> AgentOutcome {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
            AgentOutcome::permanent(format!("cannot read `{locator}`: {err}"))
        }
        _ => AgentOutcome::retryable(format!("read of `{locator}` failed: {err}")),
    }
}

/// Pull the printable-text runs out of a PDF's byte stream.
///
/// Good enough for PDFs with an uncompressed text layer; compressed or
/// scanned documents yield nothing, which surfaces as a permanent failure.
fn extract_pdf_text(bytes: &[u8]) -> String {
    let mut text = String::new();
    let mut run = String::new();

    for &b in bytes {
        if (b.is_ascii_graphic() || b == b' ') && b != b'(' && b != b')' {
            run.push(b as char);
        } else {
            if run.trim().len() >= 3 {
                text.push_str(run.trim());
                text.push('\n');
            }
            run.clear();
        }
    }
    if run.trim().len() >= 3 {
        text.push_str(run.trim());
        text.push('\n');
    }

    text
}
