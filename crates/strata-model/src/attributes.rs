use indexmap::IndexMap;
use strata_types::AttributeOp;

use crate::value::Value;

/// One attribute as written in a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name with its original casing.
    pub name: String,
    pub value: Value,
    /// Explicit override operation; `None` means the behavior default applies.
    pub op: Option<AttributeOp>,
}

/// Ordered attribute map with case-insensitive keys.
///
/// Insertion order is preserved for iteration. Equality ignores order, so two
/// elements with the same attributes written in a different order compare
/// equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: IndexMap<String, Attribute>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&key(name))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(&key(name)).map(|a| &a.value)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.entries.get(&key(name))
    }

    /// Insert or replace an attribute. A replaced attribute keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.insert_with_op(name, value, None);
    }

    pub fn insert_with_op(&mut self, name: impl Into<String>, value: Value, op: Option<AttributeOp>) {
        let name = name.into();
        self.entries.insert(key(&name), Attribute { name, value, op });
    }

    /// Append a value to the list stored under `name`, creating the list if needed.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.get_mut(&key(&name)) {
            Some(existing) => {
                existing.value = match std::mem::replace(&mut existing.value, Value::List(Vec::new())) {
                    Value::List(mut items) => {
                        items.push(value);
                        Value::List(items)
                    }
                    single => Value::List(vec![single, value]),
                };
            }
            None => {
                self.entries.insert(
                    key(&name),
                    Attribute {
                        name,
                        value: Value::List(vec![value]),
                        op: None,
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.entries.shift_remove(&key(name))
    }

    /// Set the explicit override operation of an existing attribute.
    pub fn set_op(&mut self, name: &str, op: AttributeOp) -> bool {
        match self.entries.get_mut(&key(name)) {
            Some(attr) => {
                attr.op = Some(op);
                true
            }
            None => false,
        }
    }

    /// Iterate attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.values()
    }

    /// Attribute names in insertion order, original casing.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|a| a.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut map = AttributeMap::new();
        map.insert("httpPort", Value::scalar("80"));
        assert_eq!(map.get("HTTPPORT"), Some(&Value::scalar("80")));
        assert!(map.contains("httpport"));
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["httpPort"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut map = AttributeMap::new();
        map.insert("a", Value::scalar("1"));
        map.insert("b", Value::scalar("2"));
        map.insert("A", Value::scalar("3"));
        let names: Vec<_> = map.names().collect();
        assert_eq!(names, vec!["A", "b"]);
        assert_eq!(map.get("a"), Some(&Value::scalar("3")));
    }

    #[test]
    fn push_builds_list() {
        let mut map = AttributeMap::new();
        map.push("child", Value::scalar("x"));
        map.push("child", Value::scalar("y"));
        assert_eq!(map.get("child"), Some(&Value::strings(["x", "y"])));
    }

    #[test]
    fn equality_ignores_order() {
        let mut a = AttributeMap::new();
        a.insert("x", Value::scalar("1"));
        a.insert("y", Value::scalar("2"));
        let mut b = AttributeMap::new();
        b.insert("y", Value::scalar("2"));
        b.insert("x", Value::scalar("1"));
        assert_eq!(a, b);
    }

    #[test]
    fn set_op_on_missing_attribute() {
        let mut map = AttributeMap::new();
        assert!(!map.set_op("nope", AttributeOp::Set));
        map.insert("list", Value::strings(["a"]));
        assert!(map.set_op("LIST", AttributeOp::Set));
        assert_eq!(map.get_attribute("list").unwrap().op, Some(AttributeOp::Set));
    }
}
