//! The agent registry - source type to capability associations.
//!
//! Holds no extraction logic. Registrations happen at process startup; the
//! registry is read-only during execution and requires no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult};
use crate::traits::agent::ExtractionAgent;
use crate::types::source::SourceType;

/// Priority of the primary handler for a source type.
pub const PRIMARY_PRIORITY: u32 = 0;

struct Registration {
    priority: u32,
    seq: usize,
    agent: Arc<dyn ExtractionAgent>,
}

/// Maps source types to the agents capable of handling them.
///
/// At most one agent holds the primary slot (priority 0) per type; fallback
/// agents carry higher priority values. Resolution order is deterministic:
/// ascending priority, ties broken by registration order.
#[derive(Default)]
pub struct AgentRegistry {
    entries: HashMap<SourceType, Vec<Registration>>,
    next_seq: usize,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` as a handler for `source_type`.
    ///
    /// Priority 0 is the primary slot; registering a second primary for the
    /// same type is rejected, as is registering an agent against a type it
    /// does not support.
    pub fn register(
        &mut self,
        source_type: SourceType,
        agent: Arc<dyn ExtractionAgent>,
        priority: u32,
    ) -> RegistryResult<()> {
        if !agent.supports(source_type) {
            return Err(RegistryError::UnsupportedType {
                agent: agent.name().to_string(),
                source_type: source_type.to_string(),
            });
        }

        let slot = self.entries.entry(source_type).or_default();
        if priority == PRIMARY_PRIORITY && slot.iter().any(|r| r.priority == PRIMARY_PRIORITY) {
            return Err(RegistryError::DuplicatePrimary {
                source_type: source_type.to_string(),
            });
        }

        slot.push(Registration {
            priority,
            seq: self.next_seq,
            agent,
        });
        slot.sort_by_key(|r| (r.priority, r.seq));
        self.next_seq += 1;
        Ok(())
    }

    /// Register `agent` as the primary handler for `source_type`.
    pub fn register_primary(
        &mut self,
        source_type: SourceType,
        agent: Arc<dyn ExtractionAgent>,
    ) -> RegistryResult<()> {
        self.register(source_type, agent, PRIMARY_PRIORITY)
    }

    /// Resolve the ordered list of agents for a source type.
    ///
    /// An unregistered type yields an empty list, not an error; the
    /// orchestrator interprets that as "no capable agent".
    pub fn resolve(&self, source_type: SourceType) -> Vec<Arc<dyn ExtractionAgent>> {
        self.entries
            .get(&source_type)
            .map(|slot| slot.iter().map(|r| Arc::clone(&r.agent)).collect())
            .unwrap_or_default()
    }

    /// The primary (or highest-priority) agent for a type, if any.
    pub fn primary(&self, source_type: SourceType) -> Option<Arc<dyn ExtractionAgent>> {
        self.entries
            .get(&source_type)
            .and_then(|slot| slot.first())
            .map(|r| Arc::clone(&r.agent))
    }

    /// Source types with at least one registered agent.
    pub fn registered_types(&self) -> Vec<SourceType> {
        self.entries.keys().copied().collect()
    }
}
