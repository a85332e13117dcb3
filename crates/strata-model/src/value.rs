use serde::{Deserialize, Serialize};
use strata_types::ConfigId;

use crate::arena::ElementKey;

/// A raw, unevaluated attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// A single string as written in the document.
    Scalar(String),
    /// An ordered list of values (repeated attributes and nested children).
    List(Vec<Value>),
    /// A nested element stored in the same arena.
    Nested(ElementKey),
    /// A reference to another configuration object by identity.
    Reference(ConfigId),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    /// A list of scalars.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::Scalar(s.into())).collect())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// All nested element keys reachable without entering other elements.
    pub fn nested_keys(&self) -> Vec<ElementKey> {
        let mut keys = Vec::new();
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Value::Nested(key) => keys.push(*key),
                Value::List(items) => pending.extend(items.iter().rev()),
                Value::Scalar(_) | Value::Reference(_) => {}
            }
        }
        keys
    }

    /// All scalar strings reachable without entering nested elements.
    pub fn scalars(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Value::Scalar(s) => out.push(s.as_str()),
                Value::List(items) => pending.extend(items.iter().rev()),
                Value::Nested(_) => {}
                Value::Reference(id) => {
                    if let Some(id) = id.id() {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Concatenate two values as lists; a non-list operand becomes a one-item list.
    pub fn concat(&self, other: &Value) -> Value {
        let mut items = match self {
            Value::List(v) => v.clone(),
            single => vec![single.clone()],
        };
        match other {
            Value::List(v) => items.extend(v.iter().cloned()),
            single => items.push(single.clone()),
        }
        Value::List(items)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}
