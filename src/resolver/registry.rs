//! Resolver registry with priority-ordered lookup.

use tracing::debug;

use super::{LinkClass, Resolver};

/// A priority-ordered collection of resolvers.
///
/// Lookup returns the highest-priority resolver that accepts a link; within
/// the same priority level, registration order wins.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.name()))
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverRegistry {
    /// Creates an empty resolver registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Registers a resolver with the registry.
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        debug!(
            name = resolver.name(),
            priority = ?resolver.priority(),
            "Registering resolver"
        );
        self.resolvers.push(resolver);
    }

    /// Returns the resolver that should handle `class`, if any.
    #[must_use]
    pub fn find(&self, class: &LinkClass) -> Option<&dyn Resolver> {
        self.resolvers
            .iter()
            .filter(|r| r.can_handle(class))
            .min_by_key(|r| r.priority())
            .map(AsRef::as_ref)
    }
}
