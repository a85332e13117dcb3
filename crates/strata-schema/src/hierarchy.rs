use std::collections::HashSet;
use std::sync::Arc;

use crate::entry::RegistryEntry;
use crate::traits::SchemaRegistry;

/// Direction of a [`Hierarchy`] walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HierarchyOrder {
    /// Deepest extenders first, the base last.
    MostDerivedFirst,
    /// The base first, then extenders breadth by depth.
    LeastDerivedFirst,
}

/// Lazy walk over a base type and every type extending it, transitively.
///
/// Entries are fetched from the registry only as the walk reaches them.
/// Calling [`restart`](Hierarchy::restart) rewinds the walk to the base.
#[derive(Clone)]
pub struct Hierarchy<'a> {
    registry: &'a dyn SchemaRegistry,
    base: Option<Arc<RegistryEntry>>,
    order: HierarchyOrder,
    include_base: bool,
    stack: Vec<(Arc<RegistryEntry>, bool)>,
    seen: HashSet<String>,
}

impl<'a> Hierarchy<'a> {
    /// Walk the extenders of `base_pid`, the base itself included.
    pub fn new(registry: &'a dyn SchemaRegistry, base_pid: &str, order: HierarchyOrder) -> Self {
        let mut walk = Self {
            registry,
            base: registry.entry(base_pid),
            order,
            include_base: true,
            stack: Vec::new(),
            seen: HashSet::new(),
        };
        walk.restart();
        walk
    }

    /// Leave the base entry out of the walk.
    pub fn without_base(mut self) -> Self {
        self.include_base = false;
        self
    }

    /// Rewind to the start.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.seen.clear();
        if let Some(base) = &self.base {
            self.seen.insert(base.pid.clone());
            self.stack.push((base.clone(), false));
        }
    }

    fn is_base(&self, entry: &RegistryEntry) -> bool {
        self.base.as_ref().is_some_and(|b| b.pid == entry.pid)
    }

    fn push_extenders(&mut self, entry: &RegistryEntry) {
        let mut extenders = self.registry.extenders(&entry.pid);
        extenders.retain(|e| self.seen.insert(e.pid.clone()));
        // Reverse so the first extender is popped first.
        for e in extenders.into_iter().rev() {
            self.stack.push((e, false));
        }
    }
}

impl Iterator for Hierarchy<'_> {
    type Item = Arc<RegistryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (entry, expanded) = self.stack.pop()?;
            match self.order {
                HierarchyOrder::MostDerivedFirst => {
                    if expanded {
                        if self.is_base(&entry) && !self.include_base {
                            continue;
                        }
                        return Some(entry);
                    }
                    self.stack.push((entry.clone(), true));
                    self.push_extenders(&entry);
                }
                HierarchyOrder::LeastDerivedFirst => {
                    self.push_extenders(&entry);
                    if self.is_base(&entry) && !self.include_base {
                        continue;
                    }
                    return Some(entry);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySchemaRegistry;

    fn registry() -> InMemorySchemaRegistry {
        let registry = InMemorySchemaRegistry::new();
        registry.register(RegistryEntry::factory("base")).unwrap();
        registry
            .register(RegistryEntry::factory("mid").extending("base", Some("mid")))
            .unwrap();
        registry
            .register(RegistryEntry::factory("leaf").extending("mid", Some("leaf")))
            .unwrap();
        registry
            .register(RegistryEntry::factory("other").extending("base", Some("other")))
            .unwrap();
        registry
    }

    fn pids(walk: Hierarchy<'_>) -> Vec<String> {
        walk.map(|e| e.pid.clone()).collect()
    }

    #[test]
    fn most_derived_first_puts_base_last() {
        let registry = registry();
        let walk = Hierarchy::new(&registry, "base", HierarchyOrder::MostDerivedFirst);
        let order = pids(walk);
        assert_eq!(order.last().map(String::as_str), Some("base"));
        let leaf = order.iter().position(|p| p == "leaf").unwrap();
        let mid = order.iter().position(|p| p == "mid").unwrap();
        assert!(leaf < mid);
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn least_derived_first_puts_base_first() {
        let registry = registry();
        let order = pids(Hierarchy::new(&registry, "base", HierarchyOrder::LeastDerivedFirst));
        assert_eq!(order[0], "base");
        let leaf = order.iter().position(|p| p == "leaf").unwrap();
        let mid = order.iter().position(|p| p == "mid").unwrap();
        assert!(mid < leaf);
    }

    #[test]
    fn without_base_and_restart() {
        let registry = registry();
        let mut walk =
            Hierarchy::new(&registry, "base", HierarchyOrder::MostDerivedFirst).without_base();
        let first: Vec<_> = walk.by_ref().map(|e| e.pid.clone()).collect();
        assert!(!first.contains(&"base".to_string()));
        walk.restart();
        let second: Vec<_> = walk.map(|e| e.pid.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_base_is_empty() {
        let registry = registry();
        assert_eq!(
            Hierarchy::new(&registry, "nope", HierarchyOrder::MostDerivedFirst).count(),
            0
        );
    }
}
