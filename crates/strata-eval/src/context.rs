//! Per-element evaluation state.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_merge::override_element;
use strata_model::{ConfigElement, Value};
use strata_schema::{AttributeDefinition, AttributeDefinitions, AttributeType, RegistryEntry, SchemaRegistry};
use strata_types::{AttributeOp, ConfigId, Properties, PropertyValue};
use strata_vars::{ResolutionCache, ResolutionScope, VariableRegistry};

use crate::convert;
use crate::result::EvaluationResult;

/// A nested element waiting for its own evaluation.
pub(crate) struct NestedInfo {
    pub identity: ConfigId,
    pub pid: String,
    pub element: ConfigElement,
    pub entry: Option<Arc<RegistryEntry>>,
}

pub(crate) struct Context {
    pub element: ConfigElement,
    pub entry: Option<Arc<RegistryEntry>>,
    pub definitions: AttributeDefinitions,
    pub parent_pid: Option<String>,
    /// Contributes to a flat attribute of its parent instead of standing alone.
    pub flat: bool,
    pub result: EvaluationResult,
    pub cache: ResolutionCache,
    /// Schema attributes evaluated ahead of their turn by a self-reference.
    pub demanded: RefCell<HashMap<String, String>>,
    processed: HashSet<String>,
    nested: Vec<NestedInfo>,
}

impl Context {
    pub fn new(
        registry: &dyn SchemaRegistry,
        element: ConfigElement,
        identity: ConfigId,
        pid: String,
        entry: Option<Arc<RegistryEntry>>,
        parent_pid: Option<String>,
    ) -> Self {
        let definitions = entry
            .as_ref()
            .and_then(|e| registry.attribute_map(&e.pid))
            .unwrap_or_default();
        Self {
            element,
            entry,
            definitions,
            parent_pid,
            flat: false,
            result: EvaluationResult::new(identity, pid),
            cache: ResolutionCache::new(),
            demanded: RefCell::new(HashMap::new()),
            processed: HashSet::new(),
            nested: Vec::new(),
        }
    }

    /// Record that `name` has been consumed by a definition.
    pub fn mark(&mut self, name: &str) {
        self.processed.insert(name.to_ascii_lowercase());
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(&name.to_ascii_lowercase())
    }

    pub fn warn(&mut self, message: String) {
        self.result.warnings.push(message);
    }

    /// Queue a nested element. An identity reached twice is evaluated once,
    /// with the later occurrence merged over the earlier.
    pub fn schedule(&mut self, info: NestedInfo) {
        match self.nested.iter_mut().find(|n| n.identity == info.identity) {
            Some(existing) => {
                existing.element = override_element(existing.element.clone(), &info.element, AttributeOp::Append);
            }
            None => self.nested.push(info),
        }
    }

    pub fn take_nested(&mut self) -> Vec<NestedInfo> {
        std::mem::take(&mut self.nested)
    }
}

/// Variables visible from inside one element: its evaluated properties,
/// then its schema attributes evaluated on demand, then its raw scalar
/// attributes.
pub(crate) struct ElementScope<'c> {
    pub element: &'c ConfigElement,
    pub properties: &'c Properties,
    pub pid: &'c str,
    pub definitions: &'c AttributeDefinitions,
    pub variables: &'c VariableRegistry,
    pub demanded: &'c RefCell<HashMap<String, String>>,
}

impl ElementScope<'_> {
    /// Value of a schema attribute that has not been evaluated yet.
    ///
    /// Text still holding tokens is handed back raw, so the resolver pushes
    /// it on its stack and a self-referencing attribute is reported as a
    /// cycle.
    fn on_demand(&self, def: &AttributeDefinition) -> Option<String> {
        if let Some(value) = self.demanded.borrow().get(&def.id.to_ascii_lowercase()) {
            return Some(value.clone());
        }
        let raw = self.raw_value(def)?;
        if raw.contains("${") || def.attr_type == AttributeType::Pid {
            return Some(raw);
        }
        let value = match convert::convert_value(def, &raw) {
            Ok(PropertyValue::Password(p)) => p.expose().to_string(),
            Ok(converted) => converted.to_string(),
            Err(_) => raw,
        };
        self.demanded
            .borrow_mut()
            .insert(def.id.to_ascii_lowercase(), value.clone());
        Some(value)
    }

    /// Configured text, then the variable extension, then the defaults.
    fn raw_value(&self, def: &AttributeDefinition) -> Option<String> {
        if let Some(configured) = self.element.attribute(&def.id) {
            let scalars = configured.scalars();
            if scalars.is_empty() {
                return None;
            }
            return Some(scalars.join(","));
        }
        if let Some(variable) = &def.variable {
            let trimmed = variable.trim();
            let name = trimmed
                .strip_prefix("list(")
                .and_then(|r| r.strip_suffix(')'))
                .map_or(trimmed, str::trim);
            let defined = self.variables.value(name).is_some()
                || self.variables.environment(name).is_some()
                || self.variables.default_value(name).is_some();
            if defined && def.resolve_variables {
                return Some(format!("${{{}}}", variable));
            }
        }
        def.default_values.as_ref().map(|values| values.join(","))
    }
}

impl ResolutionScope for ElementScope<'_> {
    fn attribute_value(&self, name: &str) -> Option<String> {
        match self.properties.get(name) {
            Some(PropertyValue::Password(p)) => return Some(p.expose().to_string()),
            Some(value) => return Some(value.to_string()),
            None => {}
        }
        if let Some(def) = self.definitions.get(name) {
            return self.on_demand(def);
        }
        self.element
            .attribute(name)
            .and_then(Value::as_scalar)
            .map(str::to_string)
    }

    fn service_pid(&self) -> Option<String> {
        Some(self.pid.to_string())
    }
}
