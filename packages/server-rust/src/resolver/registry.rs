//! Registry of workflows known to the bridge.
//!
//! Populated once at startup by whoever wires the bridge together. The
//! resolver only sees the [`WorkflowCatalog`] trait.

use std::sync::Arc;

use dashmap::DashMap;
use ledgerbridge_core::ConstructorSchema;
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A workflow's qualified name and its constructors in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub qualified_name: String,
    pub constructors: Vec<ConstructorSchema>,
}

impl WorkflowDefinition {
    #[must_use]
    pub fn new(qualified_name: impl Into<String>, constructors: Vec<ConstructorSchema>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            constructors,
        }
    }

    /// The package prefix including the trailing dot (`com.x.` for
    /// `com.x.SimpleFlow`), or `None` for an unpackaged name.
    #[must_use]
    pub fn package_prefix(&self) -> Option<&str> {
        self.qualified_name
            .rfind('.')
            .map(|idx| &self.qualified_name[..=idx])
    }
}

// ---------------------------------------------------------------------------
// WorkflowCatalog trait
// ---------------------------------------------------------------------------

/// Read-only view over the known workflows.
pub trait WorkflowCatalog: Send + Sync {
    /// Qualified names of every known workflow, in registration order.
    fn qualified_names(&self) -> Vec<String>;

    /// Looks up a workflow by its exact qualified name.
    fn lookup(&self, qualified_name: &str) -> Option<Arc<WorkflowDefinition>>;
}

// ---------------------------------------------------------------------------
// WorkflowRegistry
// ---------------------------------------------------------------------------

/// Concurrent [`WorkflowCatalog`] keyed by qualified name.
///
/// Registering a name twice replaces the definition but keeps its original
/// position in the registration order.
pub struct WorkflowRegistry {
    by_name: DashMap<String, Arc<WorkflowDefinition>>,
    order: RwLock<Vec<String>>,
}

impl WorkflowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, definition: WorkflowDefinition) {
        let name = definition.qualified_name.clone();
        let previous = self.by_name.insert(name.clone(), Arc::new(definition));
        if previous.is_none() {
            self.order.write().push(name);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowCatalog for WorkflowRegistry {
    fn qualified_names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    fn lookup(&self, qualified_name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.by_name
            .get(qualified_name)
            .map(|entry| Arc::clone(entry.value()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_exact_name() {
        let registry = WorkflowRegistry::new();
        registry.register(WorkflowDefinition::new(
            "com.x.SimpleFlow",
            vec![ConstructorSchema::empty()],
        ));

        assert!(registry.lookup("com.x.SimpleFlow").is_some());
        assert!(registry.lookup("SimpleFlow").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_follow_registration_order() {
        let registry = WorkflowRegistry::new();
        for name in ["b.Second", "a.First", "c.Third"] {
            registry.register(WorkflowDefinition::new(name, vec![]));
        }
        registry.register(WorkflowDefinition::new(
            "a.First",
            vec![ConstructorSchema::empty()],
        ));

        assert_eq!(
            registry.qualified_names(),
            vec!["b.Second", "a.First", "c.Third"]
        );
        assert_eq!(registry.lookup("a.First").unwrap().constructors.len(), 1);
    }

    #[test]
    fn package_prefix_includes_trailing_dot() {
        let def = WorkflowDefinition::new("com.x.SimpleFlow", vec![]);
        assert_eq!(def.package_prefix(), Some("com.x."));
        let bare = WorkflowDefinition::new("SimpleFlow", vec![]);
        assert_eq!(bare.package_prefix(), None);
    }
}
