use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::definition::AttributeDefinition;

/// Attribute definitions keyed case-insensitively by id, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeDefinitions {
    entries: IndexMap<String, AttributeDefinition>,
}

impl AttributeDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AttributeDefinition> {
        self.entries.get(&id.to_ascii_lowercase())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&id.to_ascii_lowercase())
    }

    /// Insert or replace a definition; a replaced definition keeps its position.
    pub fn insert(&mut self, definition: AttributeDefinition) {
        self.entries
            .insert(definition.id.to_ascii_lowercase(), definition);
    }

    pub fn remove(&mut self, id: &str) -> Option<AttributeDefinition> {
        self.entries.shift_remove(&id.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.entries.values()
    }

    /// Definitions with `required` set.
    pub fn required(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.entries.values().filter(|d| d.required)
    }

    /// Returns `true` when every required attribute carries a default, so an
    /// element with no configured attributes still evaluates.
    pub fn has_all_required_defaults(&self) -> bool {
        self.required().all(|d| d.has_default() || d.variable.is_some())
    }
}

impl FromIterator<AttributeDefinition> for AttributeDefinitions {
    fn from_iter<T: IntoIterator<Item = AttributeDefinition>>(iter: T) -> Self {
        let mut defs = AttributeDefinitions::new();
        for d in iter {
            defs.insert(d);
        }
        defs
    }
}

impl Serialize for AttributeDefinitions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de> Deserialize<'de> for AttributeDefinitions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let defs = Vec::<AttributeDefinition>::deserialize(deserializer)?;
        Ok(defs.into_iter().collect())
    }
}

/// One configuration type known to the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub pid: String,
    /// Element name used in documents instead of the pid.
    #[serde(default)]
    pub alias: Option<String>,
    /// Element name used when nested directly under `parent_pid`.
    #[serde(default)]
    pub child_alias: Option<String>,
    #[serde(default)]
    pub parent_pid: Option<String>,
    /// Base type this entry extends.
    #[serde(default)]
    pub extends: Option<String>,
    /// Element name under which this extender appears where its base is expected.
    #[serde(default)]
    pub extends_alias: Option<String>,
    #[serde(default)]
    pub factory: bool,
    #[serde(default)]
    pub attributes: AttributeDefinitions,
    #[serde(default)]
    pub supports_extensions: bool,
    /// Nested elements without an attribute definition are silently skipped
    /// and child changes do not notify the parent.
    #[serde(default)]
    pub supports_hidden_extensions: bool,
    /// Services exposed by instances of this type.
    #[serde(default)]
    pub services: Vec<String>,
}

impl RegistryEntry {
    pub fn singleton(pid: impl Into<String>) -> Self {
        Self::new(pid, false)
    }

    pub fn factory(pid: impl Into<String>) -> Self {
        Self::new(pid, true)
    }

    fn new(pid: impl Into<String>, factory: bool) -> Self {
        Self {
            pid: pid.into(),
            alias: None,
            child_alias: None,
            parent_pid: None,
            extends: None,
            extends_alias: None,
            factory,
            attributes: AttributeDefinitions::new(),
            supports_extensions: false,
            supports_hidden_extensions: false,
            services: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, definition: AttributeDefinition) -> Self {
        self.attributes.insert(definition);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_child_alias(mut self, parent_pid: impl Into<String>, alias: impl Into<String>) -> Self {
        self.parent_pid = Some(parent_pid.into());
        self.child_alias = Some(alias.into());
        self
    }

    pub fn extending(mut self, base: impl Into<String>, alias: Option<&str>) -> Self {
        self.extends = Some(base.into());
        self.extends_alias = alias.map(str::to_string);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.push(service.into());
        self
    }

    pub fn hidden_extensions(mut self) -> Self {
        self.supports_hidden_extensions = true;
        self
    }

    pub fn is_singleton(&self) -> bool {
        !self.factory
    }

    /// Name used for this type in documents.
    pub fn element_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.pid)
    }

    /// Returns `true` if `name` is this entry's pid or alias.
    pub fn matches_name(&self, name: &str) -> bool {
        self.pid == name || self.alias.as_deref() == Some(name)
    }

    /// Element name under which this entry contributes to the inherited
    /// attribute `attribute`: the attribute that renames it, otherwise the
    /// extends alias.
    pub fn effective_name(&self, attribute: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|d| d.rename.as_deref() == Some(attribute))
            .map(|d| d.id.clone())
            .or_else(|| self.extends_alias.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AttributeType;

    #[test]
    fn definitions_are_case_insensitive() {
        let defs: AttributeDefinitions = vec![AttributeDefinition::new("maxPoolSize", AttributeType::Integer)]
            .into_iter()
            .collect();
        assert!(defs.contains("MAXPOOLSIZE"));
        assert_eq!(defs.get("maxpoolsize").unwrap().id, "maxPoolSize");
    }

    #[test]
    fn required_defaults() {
        let mut defs = AttributeDefinitions::new();
        defs.insert(AttributeDefinition::new("a", AttributeType::String).required().with_default(["x"]));
        assert!(defs.has_all_required_defaults());
        defs.insert(AttributeDefinition::new("b", AttributeType::String).required());
        assert!(!defs.has_all_required_defaults());
    }

    #[test]
    fn effective_name_prefers_rename() {
        let entry = RegistryEntry::factory("db2Props")
            .extending("props", Some("properties.db2"))
            .with_attribute(AttributeDefinition::new("db2Url", AttributeType::String).with_rename("url"));
        assert_eq!(entry.effective_name("url"), Some("db2Url".to_string()));
        assert_eq!(entry.effective_name("other"), Some("properties.db2".to_string()));
    }

    #[test]
    fn deserializes_attribute_list() {
        let entry: RegistryEntry = serde_json::from_str(
            r#"{"pid":"httpEndpoint","factory":true,"attributes":[{"id":"port","type":"integer"}]}"#,
        )
        .unwrap();
        assert!(entry.factory);
        assert_eq!(entry.attributes.len(), 1);
        assert_eq!(entry.element_name(), "httpEndpoint");
    }
}
