use std::sync::Arc;

use dashmap::DashMap;

use crate::flow::definition::Definition;

/// Resolves a flow definition from its URI. Only consulted when an
/// instance is rehydrated after deserialization.
pub trait FlowProvider: Send + Sync {
    fn get_flow(&self, uri: &str) -> Option<Arc<Definition>>;
}

// --- In-Memory Implementation ---

/// A provider backed by a concurrent map, for hosts that keep their flow
/// definitions resident.
#[derive(Default)]
pub struct InMemoryFlowProvider {
    flows: DashMap<String, Arc<Definition>>,
}

impl InMemoryFlowProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, uri: &str, flow: Arc<Definition>) {
        self.flows.insert(uri.to_string(), flow);
    }
}

impl FlowProvider for InMemoryFlowProvider {
    fn get_flow(&self, uri: &str) -> Option<Arc<Definition>> {
        self.flows.get(uri).map(|f| f.clone())
    }
}
