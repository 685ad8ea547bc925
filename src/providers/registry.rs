use crate::providers::ProviderAdapter;
use std::sync::Arc;

/// Closed set of adapters, looked up by provider name and iterated in
/// configured priority order.
#[derive(Clone)]
pub struct ProviderRegistry {
    ordered: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(ordered: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { ordered }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.ordered.iter().find(|p| p.name() == name).cloned()
    }

    pub fn in_priority_order(&self) -> impl Iterator<Item = &Arc<dyn ProviderAdapter>> {
        self.ordered.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|p| p.name().to_string()).collect()
    }
}
