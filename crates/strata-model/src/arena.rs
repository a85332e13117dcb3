use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::ConfigElement;
use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// Index of an element inside an [`ElementArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey(u32);

impl ElementKey {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementKey({})", self.0)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only element storage.
///
/// Elements are never removed; a snapshot that drops candidates simply stops
/// referring to their keys.
#[derive(Clone, Debug, Default)]
pub struct ElementArena {
    nodes: Vec<ConfigElement>,
}

impl ElementArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Store an element and return its key.
    pub fn insert(&mut self, element: ConfigElement) -> ElementKey {
        let key = ElementKey::from_index(self.nodes.len());
        self.nodes.push(element);
        key
    }

    pub fn get(&self, key: ElementKey) -> Option<&ConfigElement> {
        self.nodes.get(key.index())
    }

    pub fn get_mut(&mut self, key: ElementKey) -> Option<&mut ConfigElement> {
        self.nodes.get_mut(key.index())
    }

    /// Like [`get`](Self::get) but reports a dangling key as an error.
    pub fn resolve(&self, key: ElementKey) -> ModelResult<&ConfigElement> {
        self.get(key).ok_or(ModelError::DanglingKey(key))
    }

    /// Iterate all stored elements with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (ElementKey, &ConfigElement)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementKey::from_index(i), e))
    }

    /// Direct nested children of the element stored under `key`.
    pub fn children(&self, key: ElementKey) -> ModelResult<Vec<ElementKey>> {
        let element = self.resolve(key)?;
        Ok(element.nested_children().into_iter().map(|(_, k)| k).collect())
    }

    /// Copy the subtree rooted at `key` out of `other` into this arena,
    /// rewriting nested keys and parent links. Returns the new root key.
    pub fn import(&mut self, other: &ElementArena, key: ElementKey) -> ModelResult<ElementKey> {
        let mut remap: HashMap<ElementKey, ElementKey> = HashMap::new();

        // Pre-order walk so every parent is allocated before its children.
        let mut order = Vec::new();
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            order.push(current);
            let mut children = other.children(current)?;
            children.reverse();
            pending.extend(children);
        }

        for old_key in &order {
            let element = other.resolve(*old_key)?.clone();
            let new_key = self.insert(element);
            remap.insert(*old_key, new_key);
        }

        for old_key in &order {
            let new_key = remap[old_key];
            let node = self
                .get_mut(new_key)
                .ok_or(ModelError::DanglingKey(new_key))?;
            let parent = if *old_key == key {
                None
            } else {
                node.parent().and_then(|p| remap.get(&p).copied())
            };
            node.set_parent(parent);
            let mut attributes = node.attributes().clone();
            let names: Vec<String> = attributes.names().map(str::to_string).collect();
            for name in names {
                if let Some(attr) = attributes.get_attribute(&name) {
                    let rewritten = remap_value(&attr.value, &remap);
                    let op = attr.op;
                    attributes.insert_with_op(name, rewritten, op);
                }
            }
            node.set_attributes(attributes);
        }

        Ok(remap[&key])
    }
}

fn remap_value(value: &Value, remap: &HashMap<ElementKey, ElementKey>) -> Value {
    match value {
        Value::Nested(k) => Value::Nested(remap.get(k).copied().unwrap_or(*k)),
        Value::List(items) => Value::List(items.iter().map(|v| remap_value(v, remap)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(arena: &mut ElementArena) -> ElementKey {
        let parent = arena.insert(ConfigElement::new("parent").with_attribute("a", "1"));
        let mut child = ConfigElement::new("child").with_attribute("b", "2");
        child.set_parent(Some(parent));
        let child_key = arena.insert(child);
        arena
            .get_mut(parent)
            .unwrap()
            .attributes_mut()
            .push("child", Value::Nested(child_key));
        parent
    }

    #[test]
    fn insert_and_resolve() {
        let mut arena = ElementArena::new();
        let key = arena.insert(ConfigElement::new("a"));
        assert_eq!(arena.resolve(key).unwrap().node_name(), "a");
        assert_eq!(
            arena.resolve(ElementKey::from_index(9)),
            Err(ModelError::DanglingKey(ElementKey::from_index(9)))
        );
    }

    #[test]
    fn children_of_parent() {
        let mut arena = ElementArena::new();
        let root = tree(&mut arena);
        let children = arena.children(root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(arena.resolve(children[0]).unwrap().node_name(), "child");
    }

    #[test]
    fn import_remaps_keys() {
        let mut source = ElementArena::new();
        source.insert(ConfigElement::new("padding"));
        let root = tree(&mut source);

        let mut target = ElementArena::new();
        let new_root = target.import(&source, root).unwrap();
        assert_eq!(target.len(), 2);

        let children = target.children(new_root).unwrap();
        let child = target.resolve(children[0]).unwrap();
        assert_eq!(child.node_name(), "child");
        assert_eq!(child.parent(), Some(new_root));
        assert_eq!(target.resolve(new_root).unwrap().parent(), None);
    }
}
