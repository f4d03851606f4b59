//! Normalized result payloads.
//!
//! Agents return a `RawExtract` with whatever field names their extractors
//! produce. The normalize step reshapes that into a `NormalizedRecord`:
//! a fixed envelope (source identity, agent, timestamp, content hash) around
//! catalog items whose fields use canonical names. The envelope round-trips
//! through serde unchanged.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::source::SourceId;

/// Canonical field names for normalized catalog items.
///
/// Agent families may add fields beyond these; the ordered map keeps the
/// envelope stable without schema changes.
pub mod fields {
    pub const NAME: &str = "name";
    pub const PRICE: &str = "price";
    pub const CURRENCY: &str = "currency";
    pub const PAGE: &str = "page";
    pub const IMAGE: &str = "image";
}

/// Raw agent output before normalization.
///
/// Items carry agent-chosen field names; only the normalize step maps them
/// onto the canonical schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExtract {
    /// Extracted items, one field map per item.
    pub items: Vec<IndexMap<String, Value>>,
}

impl RawExtract {
    /// Create an empty extract.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item.
    pub fn with_item(mut self, item: IndexMap<String, Value>) -> Self {
        self.items.push(item);
        self
    }

    /// Number of extracted items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the extract carries no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One normalized catalog item: canonical field names mapped to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Ordered field map. Keys are canonical names (see [`fields`]).
    pub fields: IndexMap<String, Value>,
}

impl CatalogItem {
    /// Create an empty item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// The fixed result envelope attached to a succeeded source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Which source produced this record.
    pub source_id: SourceId,

    /// Name of the agent that performed the extraction.
    pub agent: String,

    /// When normalization happened.
    pub extracted_at: DateTime<Utc>,

    /// SHA-256 over the normalized items, hex-encoded. Stable identity for
    /// change detection across repeated extractions of the same source.
    pub content_hash: String,

    /// Normalized catalog items.
    pub items: Vec<CatalogItem>,
}

impl NormalizedRecord {
    /// Normalize a raw agent payload into the canonical envelope.
    ///
    /// Known field aliases are mapped onto canonical names, empty values are
    /// dropped, and unknown fields pass through unchanged.
    pub fn from_raw(source_id: SourceId, agent: impl Into<String>, raw: RawExtract) -> Self {
        let items: Vec<CatalogItem> = raw
            .items
            .into_iter()
            .map(normalize_item)
            .filter(|item| !item.fields.is_empty())
            .collect();

        let content_hash = hash_items(&items);

        Self {
            source_id,
            agent: agent.into(),
            extracted_at: Utc::now(),
            content_hash,
            items,
        }
    }

    /// Number of items in the record.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Map one raw item onto canonical field names.
fn normalize_item(raw: IndexMap<String, Value>) -> CatalogItem {
    let mut item = CatalogItem::new();

    for (key, value) in raw {
        if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty()) {
            continue;
        }
        let canonical = canonical_field(&key);
        // First writer wins when aliases collide.
        if !item.fields.contains_key(canonical) {
            item.fields.insert(canonical.to_string(), value);
        }
    }

    item
}

/// Resolve a raw field name to its canonical counterpart.
fn canonical_field(raw: &str) -> &str {
    match raw.to_ascii_lowercase().as_str() {
        "name" | "title" | "product" | "product_name" => fields::NAME,
        "price" | "cost" | "amount" | "price_text" => fields::PRICE,
        "currency" => fields::CURRENCY,
        "page" | "url" | "link" | "href" => fields::PAGE,
        "image" | "img" | "thumbnail" => fields::IMAGE,
        _ => raw,
    }
}

/// Hex-encoded SHA-256 over the serialized items.
fn hash_items(items: &[CatalogItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        // IndexMap keeps insertion order, so serialization is deterministic.
        if let Ok(bytes) = serde_json::to_vec(&item.fields) {
            hasher.update(&bytes);
        }
    }
    hex::encode(hasher.finalize())
}
