//! Host-owned function registry.
//!
//! Maps function names to definitions and maintains the checksum the
//! orchestrator uses to notice that the deployed function set changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use fns_types::definition::ExternalConfig;

use crate::definition::FunctionDefinition;
use crate::service::hash::ContentHasher;

pub struct Registry {
    definitions: BTreeMap<String, Arc<FunctionDefinition>>,
    hasher: Arc<dyn ContentHasher>,
    checksum: String,
}

impl Registry {
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        let checksum = hasher.compute_hash("");
        Self {
            definitions: BTreeMap::new(),
            hasher,
            checksum,
        }
    }

    /// Add or replace a definition by name.
    pub fn register(&mut self, definition: FunctionDefinition) {
        self.insert(definition);
        self.recompute_checksum();
    }

    pub fn register_all(&mut self, definitions: impl IntoIterator<Item = FunctionDefinition>) {
        for definition in definitions {
            self.insert(definition);
        }
        self.recompute_checksum();
    }

    fn insert(&mut self, definition: FunctionDefinition) {
        let name = definition.name().to_string();
        if let Some(previous) = self.definitions.insert(name.clone(), Arc::new(definition)) {
            tracing::info!(function = %name, previous_version = previous.version(), "replacing function definition");
        }
    }

    fn recompute_checksum(&mut self) {
        let content = self
            .definitions
            .values()
            .map(|d| format!("{}:{}", d.name(), d.version()))
            .collect::<Vec<_>>()
            .join("\n");
        self.checksum = self.hasher.compute_hash(&content);
        tracing::debug!(functions = self.definitions.len(), checksum = %self.checksum, "registry updated");
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The `{checksum, definitions}` document served to the orchestrator.
    pub fn export(&self) -> ExternalConfig {
        ExternalConfig {
            checksum: self.checksum.clone(),
            definitions: self.definitions.values().map(|d| d.summary()).collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::definition::body;

    /// Reversible stand-in so tests can see exactly what was hashed.
    pub(crate) struct EchoHasher;

    impl ContentHasher for EchoHasher {
        fn compute_hash(&self, content: &str) -> String {
            content.replace('\n', "|")
        }
    }

    fn noop(name: &str, version: u32) -> FunctionDefinition {
        FunctionDefinition::new(name, version, |_| Ok(body(|_| async { anyhow::Ok(()) }))).unwrap()
    }

    #[test]
    fn test_checksum_is_order_independent() {
        let mut a = Registry::new(Arc::new(EchoHasher));
        a.register_all([noop("b", 1), noop("a", 2)]);
        let mut b = Registry::new(Arc::new(EchoHasher));
        b.register(noop("a", 2));
        b.register(noop("b", 1));
        assert_eq!(a.checksum(), "a:2|b:1");
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_reregistering_replaces_and_changes_checksum() {
        let mut registry = Registry::new(Arc::new(EchoHasher));
        registry.register(noop("a", 1));
        let before = registry.checksum().to_string();
        registry.register(noop("a", 2));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().version(), 2);
        assert_ne!(registry.checksum(), before);
    }

    #[test]
    fn test_export_lists_definitions_by_name() {
        let mut registry = Registry::new(Arc::new(EchoHasher));
        registry.register_all([noop("zeta", 1), noop("alpha", 1)]);
        let exported = registry.export();
        let names: Vec<_> = exported.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert!(registry.get("missing").is_none());
    }
}
