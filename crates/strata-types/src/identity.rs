use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Logical identity of one configuration object.
///
/// A `ConfigId` is the merge key: every candidate definition sharing the same
/// identity across documents is folded into one authoritative element. The
/// `id` is absent for singleton types. Nested elements additionally carry the
/// identity of their parent, so two children with the same type and id under
/// different parents never collide.
///
/// The textual form is `type` for singletons, `type[id]` for factory
/// instances, and `parent/child` for nested identities.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId {
    type_name: String,
    id: Option<String>,
    parent: Option<Box<ConfigId>>,
}

impl ConfigId {
    /// Identity of a singleton element.
    pub fn singleton(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            parent: None,
        }
    }

    /// Identity of a factory instance.
    pub fn factory(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: Some(id.into()),
            parent: None,
        }
    }

    /// Identity with an optional id.
    pub fn new(type_name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            parent: None,
        }
    }

    /// Identity of an element nested under `parent`.
    pub fn nested(parent: ConfigId, type_name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            parent: Some(Box::new(parent)),
        }
    }

    /// The element type name (pid or alias as written).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The instance id, `None` for singletons.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The identity of the enclosing element, if nested.
    pub fn parent(&self) -> Option<&ConfigId> {
        self.parent.as_deref()
    }

    /// Returns `true` if this identity has no id.
    pub fn is_singleton(&self) -> bool {
        self.id.is_none()
    }

    /// Returns `true` if this identity is nested under another.
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    /// The outermost ancestor of this identity (itself when top-level).
    pub fn root(&self) -> &ConfigId {
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            current = parent;
        }
        current
    }

    /// Same identity with the type name replaced (used after alias resolution).
    pub fn with_type_name(&self, type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: self.id.clone(),
            parent: self.parent.clone(),
        }
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let mut segments = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in s.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| TypeError::InvalidIdentity(s.to_string()))?;
                }
                '/' if depth == 0 => {
                    segments.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(TypeError::InvalidIdentity(s.to_string()));
        }
        segments.push(&s[start..]);

        let mut current: Option<ConfigId> = None;
        for segment in segments {
            let (type_name, id) = parse_segment(segment)
                .ok_or_else(|| TypeError::InvalidIdentity(s.to_string()))?;
            current = Some(match current {
                Some(parent) => ConfigId::nested(parent, type_name, id),
                None => ConfigId::new(type_name, id),
            });
        }
        current.ok_or_else(|| TypeError::InvalidIdentity(s.to_string()))
    }
}

fn parse_segment(segment: &str) -> Option<(String, Option<String>)> {
    match segment.find('[') {
        Some(open) => {
            let inner = segment[open + 1..].strip_suffix(']')?;
            let type_name = &segment[..open];
            if type_name.is_empty() {
                return None;
            }
            Some((type_name.to_string(), Some(inner.to_string())))
        }
        None if !segment.is_empty() => Some((segment.to_string(), None)),
        None => None,
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            Some(id) => write!(f, "{}[{}]", self.type_name, id),
            None => write!(f, "{}", self.type_name),
        }
    }
}

impl fmt::Debug for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigId({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_display() {
        let id = ConfigId::singleton("logging");
        assert_eq!(id.to_string(), "logging");
        assert!(id.is_singleton());
    }

    #[test]
    fn factory_display() {
        let id = ConfigId::factory("httpEndpoint", "default");
        assert_eq!(id.to_string(), "httpEndpoint[default]");
        assert_eq!(id.id(), Some("default"));
    }

    #[test]
    fn nested_display_and_root() {
        let parent = ConfigId::factory("dataSource", "ds1");
        let child = ConfigId::nested(parent.clone(), "properties", Some("default-0".into()));
        assert_eq!(child.to_string(), "dataSource[ds1]/properties[default-0]");
        assert_eq!(child.root(), &parent);
        assert!(child.is_nested());
    }

    #[test]
    fn parse_roundtrip_nested() {
        let parent = ConfigId::factory("a", "x/y");
        let child = ConfigId::nested(parent, "b", None);
        let parsed = ConfigId::parse(&child.to_string()).unwrap();
        assert_eq!(parsed, child);
    }

    #[test]
    fn parse_rejects_unbalanced() {
        assert!(ConfigId::parse("a[b").is_err());
        assert!(ConfigId::parse("a]").is_err());
        assert!(ConfigId::parse("").is_err());
        assert!(ConfigId::parse("[x]").is_err());
    }

    #[test]
    fn with_type_name_keeps_id() {
        let id = ConfigId::factory("endpoint", "e1").with_type_name("httpEndpoint");
        assert_eq!(id, ConfigId::factory("httpEndpoint", "e1"));
    }

    #[test]
    fn ordering_is_stable() {
        let mut ids = vec![
            ConfigId::factory("b", "1"),
            ConfigId::singleton("a"),
            ConfigId::factory("a", "2"),
        ];
        ids.sort();
        assert_eq!(ids[0], ConfigId::singleton("a"));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ConfigId::nested(ConfigId::singleton("p"), "c", Some("1".into()));
        let json = serde_json::to_string(&id).unwrap();
        let back: ConfigId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
