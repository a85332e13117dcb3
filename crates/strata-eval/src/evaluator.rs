use std::collections::HashSet;
use std::sync::Arc;

use strata_merge::{override_element, Snapshot};
use strata_model::{ConfigElement, Value};
use strata_schema::{AttributeDefinition, AttributeType, Hierarchy, HierarchyOrder, RegistryEntry, SchemaRegistry};
use strata_store::{PersistentStore, StoreFilter};
use strata_types::{AttributeOp, ConfigId, PropertyValue};
use strata_vars::{VariableRegistry, VariableResolver};
use tracing::{debug, warn};

use crate::context::{Context, ElementScope, NestedInfo};
use crate::convert;
use crate::error::{EvalError, EvalResult};
use crate::result::{EvaluationResult, UnresolvedReference};

/// Properties under this prefix are bookkeeping, never user attributes.
pub const CONFIG_PREFIX: &str = "config.";
pub const CONFIG_ID: &str = "config.id";
pub const CONFIG_DISPLAY_ID: &str = "config.displayId";
pub const CONFIG_PARENT_PID: &str = "config.parentPID";
pub const CONFIG_REFERENCE_TYPE: &str = "config.referenceType";

/// Suffix of the attribute naming referenced instances by id, as in `dataSourceRef`.
pub(crate) const REF_SUFFIX: &str = "Ref";

const REDACTED: &str = "*****";

/// Identity under which `element` is evaluated and stored.
///
/// Known types are keyed by their canonical pid; singletons never carry an id.
pub fn identity_for(element: &ConfigElement, entry: Option<&RegistryEntry>) -> ConfigId {
    match entry {
        Some(e) if e.is_singleton() => ConfigId::singleton(e.pid.clone()),
        Some(e) => ConfigId::new(e.pid.clone(), element.id().map(str::to_string)),
        None => element.identity(),
    }
}

// ---------------------------------------------------------------------------
// ConfigEvaluator
// ---------------------------------------------------------------------------

/// Turns merged elements into typed, validated property dictionaries.
///
/// The evaluator borrows every collaborator it needs and holds no state of
/// its own, so one instance can evaluate any number of elements of the same
/// snapshot.
pub struct ConfigEvaluator<'a> {
    pub(crate) registry: &'a dyn SchemaRegistry,
    pub(crate) store: &'a dyn PersistentStore,
    variables: &'a VariableRegistry,
    pub(crate) snapshot: &'a Snapshot,
}

impl<'a> ConfigEvaluator<'a> {
    pub fn new(
        registry: &'a dyn SchemaRegistry,
        store: &'a dyn PersistentStore,
        variables: &'a VariableRegistry,
        snapshot: &'a Snapshot,
    ) -> Self {
        Self {
            registry,
            store,
            variables,
            snapshot,
        }
    }

    /// Evaluate a merged top-level element and everything nested in it.
    ///
    /// A persistent id is created for the element if it has none yet.
    pub fn evaluate(&self, element: &ConfigElement, entry: Option<Arc<RegistryEntry>>) -> EvalResult<EvaluationResult> {
        let identity = identity_for(element, entry.as_deref());
        let pid = self.store.lookup_or_create(&identity)?;
        let mut ctx = Context::new(self.registry, element.clone(), identity, pid, entry, None);
        self.run(&mut ctx)?;
        debug!(
            identity = %ctx.result.identity,
            properties = ctx.result.properties.len(),
            nested = ctx.result.nested.len(),
            valid = ctx.result.valid,
            "evaluated element"
        );
        Ok(ctx.result)
    }

    pub(crate) fn run(&self, ctx: &mut Context) -> EvalResult<()> {
        let definitions: Vec<AttributeDefinition> = ctx.definitions.iter().cloned().collect();

        let required = definitions.iter().filter(|d| !d.is_final && d.required);
        let optional = definitions.iter().filter(|d| !d.is_final && !d.required);
        for def in required.chain(optional) {
            self.evaluate_attribute(ctx, def)?;
        }
        for def in definitions.iter().filter(|d| d.is_final) {
            self.evaluate_final(ctx, def)?;
        }

        let names: Vec<String> = ctx.element.attributes().names().map(str::to_string).collect();
        for name in names {
            if ctx.is_processed(&name) || name.starts_with(CONFIG_PREFIX) {
                continue;
            }
            self.evaluate_undefined(ctx, &name)?;
        }

        if !ctx.flat {
            self.identity_properties(ctx);
        }
        for def in definitions.iter().filter(|d| d.copy_of.is_some()) {
            copy_property(ctx, def);
        }
        check_required(ctx, &definitions);
        self.evaluate_nested(ctx)?;

        let consumed = ctx.cache.consumed().clone();
        ctx.result.variables.extend(consumed);
        Ok(())
    }

    // -- attributes -------------------------------------------------------

    fn evaluate_attribute(&self, ctx: &mut Context, def: &AttributeDefinition) -> EvalResult<()> {
        ctx.mark(&def.id);
        if def.flat && def.attr_type == AttributeType::Pid {
            return self.evaluate_flat(ctx, def);
        }

        let value = match self.configured_value(ctx, def) {
            Some(value) => Some(value),
            None if def.is_wildcard_reference() || def.is_wildcard_service() => {
                return self.evaluate_wildcard(ctx, def);
            }
            None => self.unconfigured_value(ctx, def)?,
        };
        let Some(value) = value else {
            return Ok(());
        };
        let value = if def.resolve_variables {
            self.expand_lists(ctx, value)?
        } else {
            value
        };
        if let Some(converted) = self.convert(ctx, def, &value)? {
            ctx.result.properties.insert(def.id.clone(), converted);
        }
        Ok(())
    }

    /// Final attributes always take their unconfigured value.
    fn evaluate_final(&self, ctx: &mut Context, def: &AttributeDefinition) -> EvalResult<()> {
        ctx.mark(&def.id);
        if def.is_wildcard_reference() || def.is_wildcard_service() {
            return self.evaluate_wildcard(ctx, def);
        }

        let configured: Option<Vec<String>> = ctx
            .element
            .attribute(&def.id)
            .map(|v| v.scalars().into_iter().map(str::to_string).collect());
        let value = self.unconfigured_value(ctx, def)?;
        let expected: Option<Vec<String>> = value
            .as_ref()
            .map(|v| v.scalars().into_iter().map(str::to_string).collect());

        if configured.is_some() && configured != expected {
            warn!(
                element = %ctx.result.identity,
                attribute = %def.id,
                "final attribute cannot be overridden, ignoring the configured value"
            );
            ctx.warn(format!("final attribute {} cannot be overridden", def.id));
            if def.id.eq_ignore_ascii_case("id") {
                ctx.result.valid = false;
            }
        }

        if let Some(value) = value {
            if let Some(converted) = self.convert(ctx, def, &value)? {
                ctx.result.properties.insert(def.id.clone(), converted);
            }
        }
        Ok(())
    }

    /// Raw value written for `def`: references merged across the hierarchy
    /// for `pid` attributes, the plain attribute otherwise.
    fn configured_value(&self, ctx: &mut Context, def: &AttributeDefinition) -> Option<Value> {
        if def.attr_type == AttributeType::Pid {
            if let Some(reference_pid) = def.reference_pid.as_deref() {
                let Some(target) = self.registry.entry_by_name(reference_pid) else {
                    debug!(
                        element = %ctx.result.identity,
                        attribute = %def.id,
                        reference_pid = %reference_pid,
                        "reference type not registered, using the attribute as written"
                    );
                    return ctx.element.attribute(&def.id).cloned();
                };
                let mut merged = None;
                for level in Hierarchy::new(self.registry, &target.pid, HierarchyOrder::MostDerivedFirst) {
                    if let Some(name) = level.effective_name(&def.id) {
                        if !name.eq_ignore_ascii_case(&def.id) {
                            merged = concat(merged, self.reference_attributes(ctx, def, &name));
                        }
                    }
                }
                return concat(merged, self.reference_attributes(ctx, def, &def.id));
            }
        }
        ctx.element.attribute(&def.id).cloned()
    }

    /// Combine `<name>Ref` ids with nested `<name>` elements. A nested
    /// element wins for single-valued attributes; otherwise both contribute
    /// and a nested element replaces a reference to the same id.
    fn reference_attributes(&self, ctx: &mut Context, def: &AttributeDefinition, name: &str) -> Option<Value> {
        let ref_name = format!("{}{}", name, REF_SUFFIX);
        ctx.mark(&ref_name);
        ctx.mark(name);
        let by_ref = ctx.element.attribute(&ref_name).cloned();
        let nested = ctx.element.attribute(name).cloned();
        match (by_ref, nested) {
            (None, nested) => nested,
            (by_ref, None) => by_ref,
            (Some(_), Some(nested)) if def.cardinality.is_single() => Some(nested),
            (Some(by_ref), Some(nested)) => Some(self.merge_reference_values(&by_ref, &nested)),
        }
    }

    fn merge_reference_values(&self, by_ref: &Value, nested: &Value) -> Value {
        let nested_ids: HashSet<&str> = nested
            .nested_keys()
            .into_iter()
            .filter_map(|k| self.snapshot.arena().get(k))
            .filter_map(ConfigElement::id)
            .collect();
        let mut items: Vec<Value> = by_ref
            .scalars()
            .into_iter()
            .flat_map(|s| s.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty() && !nested_ids.contains(id))
            .map(Value::scalar)
            .collect();
        match nested {
            Value::List(values) => items.extend(values.iter().cloned()),
            single => items.push(single.clone()),
        }
        Value::List(items)
    }

    /// Value used when nothing is configured: the variable extension, then
    /// the schema default.
    fn unconfigured_value(&self, ctx: &mut Context, def: &AttributeDefinition) -> EvalResult<Option<Value>> {
        if let Some(variable) = &def.variable {
            if !def.resolve_variables {
                return Ok(Some(Value::scalar(format!("${{{}}}", variable))));
            }
            let trimmed = variable.trim();
            let (name, list) = match trimmed.strip_prefix("list(").and_then(|r| r.strip_suffix(')')) {
                Some(inner) => (inner.trim(), true),
                None => (trimmed, false),
            };
            if let Some(value) = self.resolve_variable(ctx, name)? {
                return Ok(Some(if list {
                    Value::strings(convert::parse_value(&value))
                } else {
                    Value::Scalar(value)
                }));
            }
        }
        Ok(match def.default_values.as_deref() {
            None => None,
            Some([single]) => Some(Value::scalar(single.clone())),
            Some(values) => Some(Value::strings(values.iter().cloned())),
        })
    }

    /// Split `${list(name)}` values into one item per comma-separated entry.
    fn expand_lists(&self, ctx: &mut Context, value: Value) -> EvalResult<Value> {
        if !value.scalars().iter().any(|s| s.contains("${list(")) {
            return Ok(value);
        }
        let items = match value {
            Value::List(items) => items,
            single => vec![single],
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Scalar(s) if s.contains("${list(") => {
                    out.extend(self.resolve_list(ctx, &s)?.into_iter().map(Value::Scalar));
                }
                other => out.push(other),
            }
        }
        Ok(Value::List(out))
    }

    /// Attributes without a definition keep their resolved string values.
    fn evaluate_undefined(&self, ctx: &mut Context, name: &str) -> EvalResult<()> {
        let Some(value) = ctx.element.attribute(name).cloned() else {
            return Ok(());
        };
        if ctx.flat
            && name.eq_ignore_ascii_case("id")
            && value.as_scalar().is_some_and(|s| s.starts_with("default-"))
        {
            return Ok(());
        }
        let hidden = ctx.entry.as_ref().is_some_and(|e| e.supports_hidden_extensions);
        let was_list = value.is_list();
        let items = match value {
            Value::List(items) => items,
            single => vec![single],
        };

        let mut strings = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Scalar(s) => strings.push(self.resolve_text(ctx, &s)?),
                Value::Nested(key) => {
                    if hidden {
                        debug!(element = %ctx.result.identity, attribute = name, "skipping hidden extension");
                        continue;
                    }
                    let child = self.snapshot.arena().resolve(key)?.clone();
                    if let Some(pid) = self.evaluate_config_element(ctx, None, child, index)? {
                        strings.push(pid);
                    }
                }
                Value::Reference(target) => {
                    if let Some(pid) = self.plain_reference(ctx, name, &target)? {
                        strings.push(pid);
                    }
                }
                Value::List(_) => {}
            }
        }

        if strings.is_empty() {
            return Ok(());
        }
        let value = if was_list {
            PropertyValue::Vector(strings.into_iter().map(PropertyValue::String).collect())
        } else {
            match strings.pop() {
                Some(s) => PropertyValue::String(s),
                None => return Ok(()),
            }
        };
        ctx.result.properties.insert(name.to_string(), value);
        Ok(())
    }

    // -- conversion -------------------------------------------------------

    fn convert(&self, ctx: &mut Context, def: &AttributeDefinition, value: &Value) -> EvalResult<Option<PropertyValue>> {
        if def.cardinality.is_single() {
            return self.convert_single(ctx, def, value);
        }
        let items = self.collection_items(ctx, def, value)?;
        self.validate_cardinality(def, &items)?;
        let mut out = Vec::with_capacity(items.len());
        if def.cardinality.is_optional_collection() && items.len() > 1 {
            // At most one value: several nested elements merge into one,
            // anything else keeps the first value.
            out.extend(self.convert_single(ctx, def, &Value::List(items))?);
        } else {
            for (index, item) in items.iter().enumerate() {
                if let Some(converted) = self.convert_item(ctx, def, item, index)? {
                    out.push(converted);
                }
            }
        }
        Ok(Some(if def.cardinality.is_vector() {
            PropertyValue::Vector(out)
        } else {
            PropertyValue::Array(out)
        }))
    }

    fn convert_single(&self, ctx: &mut Context, def: &AttributeDefinition, value: &Value) -> EvalResult<Option<PropertyValue>> {
        let Value::List(items) = value else {
            return self.convert_item(ctx, def, value, 0);
        };
        let nested = value.nested_keys();
        if nested.len() > 1 {
            // Several occurrences of the one nested element.
            let mut merged: Option<ConfigElement> = None;
            for key in nested {
                let element = self.snapshot.arena().resolve(key)?;
                merged = Some(match merged {
                    None => element.clone(),
                    Some(base) => override_element(base, element, AttributeOp::Append),
                });
            }
            return match merged {
                Some(element) => Ok(self
                    .evaluate_config_element(ctx, Some(def), element, 0)?
                    .map(PropertyValue::String)),
                None => Ok(None),
            };
        }
        match items.first() {
            Some(first) => self.convert_item(ctx, def, first, 0),
            None => Ok(None),
        }
    }

    /// Flatten lists and split comma-separated scalars.
    fn collection_items(&self, ctx: &mut Context, def: &AttributeDefinition, value: &Value) -> EvalResult<Vec<Value>> {
        let mut out = Vec::new();
        let mut pending = vec![value];
        while let Some(value) = pending.pop() {
            match value {
                Value::List(items) => pending.extend(items.iter().rev()),
                Value::Scalar(s) => {
                    let text = if def.resolve_variables {
                        self.resolve_text(ctx, s)?
                    } else {
                        s.clone()
                    };
                    out.extend(convert::parse_value(&text).into_iter().map(Value::Scalar));
                }
                other => out.push(other.clone()),
            }
        }
        Ok(out)
    }

    /// Reference attributes count distinct ids (anonymous nested elements
    /// each count once); everything else counts raw values.
    fn validate_cardinality(&self, def: &AttributeDefinition, items: &[Value]) -> EvalResult<()> {
        if (-1..=1).contains(&def.cardinality.value()) {
            return Ok(());
        }
        let max = def.cardinality.max_values();
        let count = if def.attr_type == AttributeType::Pid {
            if def
                .reference_pid
                .as_deref()
                .is_some_and(|p| self.registry.is_singleton(p))
            {
                return Ok(());
            }
            let mut ids: HashSet<String> = HashSet::new();
            let mut anonymous = 0usize;
            for item in items {
                match item {
                    Value::Scalar(s) => {
                        ids.insert(s.clone());
                    }
                    Value::Reference(target) => {
                        ids.insert(target.id().unwrap_or_default().to_string());
                    }
                    Value::Nested(key) => match self.snapshot.arena().get(*key).and_then(ConfigElement::id) {
                        Some(id) => {
                            ids.insert(id.to_string());
                        }
                        None => anonymous += 1,
                    },
                    Value::List(_) => {}
                }
            }
            ids.len() + anonymous
        } else {
            items.len()
        };
        if count > max {
            return Err(EvalError::validation(
                &def.id,
                format!("Attribute {} exceeded maximum allowed size {}", def.id, max),
            ));
        }
        Ok(())
    }

    fn convert_item(
        &self,
        ctx: &mut Context,
        def: &AttributeDefinition,
        item: &Value,
        index: usize,
    ) -> EvalResult<Option<PropertyValue>> {
        match item {
            Value::Scalar(s) => self.convert_string(ctx, def, s),
            Value::Nested(key) => {
                let child = self.snapshot.arena().resolve(*key)?.clone();
                Ok(self
                    .evaluate_config_element(ctx, Some(def), child, index)?
                    .map(PropertyValue::String))
            }
            Value::Reference(target) => Ok(self.plain_reference(ctx, &def.id, target)?.map(PropertyValue::String)),
            Value::List(_) => self.convert_single(ctx, def, item),
        }
    }

    fn convert_string(&self, ctx: &mut Context, def: &AttributeDefinition, raw: &str) -> EvalResult<Option<PropertyValue>> {
        let text = if def.resolve_variables {
            self.resolve_text(ctx, raw)?
        } else {
            raw.to_string()
        };
        if def.attr_type == AttributeType::Pid {
            return Ok(self.evaluate_reference(ctx, def, text.trim())?.map(PropertyValue::String));
        }
        match convert::convert_value(def, &text) {
            Ok(value) => Ok(Some(value)),
            Err(reason) => self.conversion_fallback(ctx, def, &text, reason),
        }
    }

    /// Retry a failed conversion once with the unconfigured value.
    ///
    /// Attributes with options drop the value instead of failing when the
    /// default does not convert either.
    fn conversion_fallback(
        &self,
        ctx: &mut Context,
        def: &AttributeDefinition,
        text: &str,
        reason: String,
    ) -> EvalResult<Option<PropertyValue>> {
        let shown = match def.attr_type {
            AttributeType::Password | AttributeType::HashedPassword => REDACTED,
            _ => text,
        };
        warn!(
            element = %ctx.result.identity,
            attribute = %def.id,
            value = %shown,
            reason = %reason,
            "invalid attribute value"
        );
        ctx.warn(format!("{}: {}", def.id, reason));

        let fallback = match def.default_values.as_deref().and_then(<[String]>::first) {
            Some(default) if def.resolve_variables => Some(self.resolve_text(ctx, default)?),
            Some(default) => Some(default.clone()),
            None => None,
        };
        if def.options.is_empty() {
            match fallback {
                Some(default) if default != text => convert::convert_value(def, &default)
                    .map(Some)
                    .map_err(|r| EvalError::validation(&def.id, r)),
                _ => Err(EvalError::validation(&def.id, reason)),
            }
        } else {
            Ok(fallback.and_then(|d| convert::convert_value(def, &d).ok()))
        }
    }

    // -- references -------------------------------------------------------

    /// Persistent id of the instance `id` names, through the reference type
    /// or the service of `def`.
    fn evaluate_reference(&self, ctx: &mut Context, def: &AttributeDefinition, id: &str) -> EvalResult<Option<String>> {
        if let Some(reference_pid) = &def.reference_pid {
            let Some(target) = self.registry.entry_by_name(reference_pid) else {
                debug!(attribute = %def.id, reference_pid = %reference_pid, "reference type not registered");
                return Ok(None);
            };
            let identity = if target.is_singleton() {
                ConfigId::singleton(target.pid.clone())
            } else {
                ConfigId::factory(target.pid.clone(), id)
            };
            return self.lookup_reference(ctx, &def.id, identity);
        }

        if let Some(service) = &def.service {
            let mut matches = Vec::new();
            for exposer in self.registry.service_exposers(service) {
                let identity = if exposer.is_singleton() {
                    ConfigId::singleton(exposer.pid.clone())
                } else {
                    ConfigId::factory(exposer.pid.clone(), id)
                };
                if let Some(pid) = self.store.lookup(&identity)? {
                    matches.push((identity, pid));
                }
            }
            if matches.len() == 1 {
                let (identity, pid) = matches.remove(0);
                ctx.result.references.insert(identity);
                return Ok(Some(pid));
            }
            warn!(
                element = %ctx.result.identity,
                attribute = %def.id,
                service = %service,
                matches = matches.len(),
                "service reference does not name exactly one instance"
            );
            ctx.result.unresolved.push(UnresolvedReference::Service {
                attribute: def.id.clone(),
                service: service.clone(),
                count: matches.len(),
            });
            return Ok(None);
        }

        Err(EvalError::Reference {
            attribute: def.id.clone(),
            target: id.to_string(),
        })
    }

    /// A child written as `{ "ref": "<id>" }`.
    fn plain_reference(&self, ctx: &mut Context, attribute: &str, target: &ConfigId) -> EvalResult<Option<String>> {
        let id = match target.id() {
            Some(id) => Some(self.resolve_text(ctx, id)?),
            None => None,
        };
        let type_name = self.registry.resolve_pid(target.type_name());
        let identity = if self.registry.is_singleton(&type_name) {
            ConfigId::singleton(type_name)
        } else {
            ConfigId::new(type_name, id)
        };
        self.lookup_reference(ctx, attribute, identity)
    }

    fn lookup_reference(&self, ctx: &mut Context, attribute: &str, identity: ConfigId) -> EvalResult<Option<String>> {
        ctx.result.references.insert(identity.clone());
        match self.store.lookup(&identity)? {
            Some(pid) => Ok(Some(pid)),
            None => {
                warn!(
                    element = %ctx.result.identity,
                    attribute,
                    target = %identity,
                    "unresolved reference"
                );
                ctx.result.unresolved.push(UnresolvedReference::Reference {
                    attribute: attribute.to_string(),
                    target: identity,
                });
                Ok(None)
            }
        }
    }

    /// `*` stands for every known instance of the referenced type, or of
    /// every type exposing the referenced service.
    fn evaluate_wildcard(&self, ctx: &mut Context, def: &AttributeDefinition) -> EvalResult<()> {
        let targets: Vec<String> = match (&def.reference_pid, &def.service) {
            (Some(reference_pid), _) => vec![self.registry.resolve_pid(reference_pid)],
            (None, Some(service)) => self
                .registry
                .service_exposers(service)
                .into_iter()
                .map(|e| e.pid.clone())
                .collect(),
            (None, None) => Vec::new(),
        };

        let mut pids = Vec::new();
        for target in &targets {
            if self.registry.is_singleton(target) {
                if let Some(pid) = self.store.lookup(&ConfigId::singleton(target.clone()))? {
                    pids.push(pid);
                }
                continue;
            }
            for record in self.store.list_by_filter(&StoreFilter::factory(target.clone()))? {
                if !record.identity.is_nested() {
                    pids.push(record.pid);
                }
            }
        }
        debug!(element = %ctx.result.identity, attribute = %def.id, instances = pids.len(), "expanded wildcard");

        ctx.result.unresolved.push(UnresolvedReference::Wildcard {
            attribute: def.id.clone(),
            target: def
                .reference_pid
                .clone()
                .or_else(|| def.service.clone())
                .unwrap_or_default(),
        });
        let values = pids.into_iter().map(PropertyValue::String).collect();
        let value = if def.cardinality.value() > 0 {
            PropertyValue::Array(values)
        } else {
            PropertyValue::Vector(values)
        };
        ctx.result.properties.insert(def.id.clone(), value);
        Ok(())
    }

    // -- nested elements --------------------------------------------------

    /// Schedule a nested element and return its persistent id.
    pub(crate) fn evaluate_config_element(
        &self,
        ctx: &mut Context,
        def: Option<&AttributeDefinition>,
        child: ConfigElement,
        index: usize,
    ) -> EvalResult<Option<String>> {
        if !child.is_enabled() {
            debug!(parent = %ctx.result.identity, child = child.node_name(), "nested element disabled");
            return Ok(None);
        }
        let entry = match def.and_then(|d| d.reference_pid.as_deref().map(|p| (d, p))) {
            Some((def, reference_pid)) => match self.registry.entry_by_name(reference_pid) {
                Some(specified) => Some(self.hierarchy_entry(&specified, &def.id, child.node_name())),
                None => {
                    debug!(attribute = %def.id, reference_pid, "nested element of unregistered type");
                    return Ok(None);
                }
            },
            None => self.child_entry(ctx.entry.as_deref(), child.node_name()),
        };

        let singleton = entry.as_ref().is_some_and(|e| e.is_singleton());
        let id = (!singleton).then(|| {
            child
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("default-{}", index))
        });
        let type_name = entry
            .as_ref()
            .map(|e| e.pid.clone())
            .unwrap_or_else(|| child.node_name().to_string());
        let identity = ConfigId::nested(ctx.result.identity.clone(), type_name, id);
        let pid = self.store.lookup_or_create(&identity)?;
        ctx.result.references.insert(identity.clone());
        ctx.schedule(NestedInfo {
            identity,
            pid: pid.clone(),
            element: child,
            entry,
        });
        Ok(Some(pid))
    }

    /// The level of `specified`'s hierarchy a nested element named `node` belongs to.
    pub(crate) fn hierarchy_entry(&self, specified: &Arc<RegistryEntry>, attribute: &str, node: &str) -> Arc<RegistryEntry> {
        Hierarchy::new(self.registry, &specified.pid, HierarchyOrder::MostDerivedFirst)
            .find(|level| level.matches_name(node) || level.effective_name(attribute).as_deref() == Some(node))
            .unwrap_or_else(|| specified.clone())
    }

    /// Entry of a nested element without an attribute definition: a child
    /// alias of the parent or one of its bases, else any top-level name.
    fn child_entry(&self, parent: Option<&RegistryEntry>, node: &str) -> Option<Arc<RegistryEntry>> {
        let mut seen = HashSet::new();
        let mut pid = parent.map(|p| p.pid.clone());
        while let Some(current) = pid {
            if !seen.insert(current.clone()) {
                break;
            }
            if let Some(found) = self.registry.entry_by_child_alias(&current, node) {
                return Some(found);
            }
            pid = self.registry.extends_parent(&current).map(|e| e.pid.clone());
        }
        self.registry.entry_by_name(node)
    }

    fn evaluate_nested(&self, ctx: &mut Context) -> EvalResult<()> {
        for info in ctx.take_nested() {
            let mut child = Context::new(
                self.registry,
                info.element,
                info.identity,
                info.pid,
                info.entry,
                Some(ctx.result.pid.clone()),
            );
            self.run(&mut child)?;
            if child.result.valid {
                ctx.result.nested.insert(child.result.identity.clone(), child.result);
            } else {
                warn!(parent = %ctx.result.identity, child = %child.result.identity, "nested element is invalid");
                ctx.warn(format!("nested element {} is invalid", child.result.identity));
            }
        }
        Ok(())
    }

    fn identity_properties(&self, ctx: &mut Context) {
        let display = ctx.result.identity.to_string();
        let properties = &mut ctx.result.properties;
        if ctx.result.identity.id().is_some() {
            properties.insert(CONFIG_ID.to_string(), PropertyValue::String(display.clone()));
        }
        properties.insert(CONFIG_DISPLAY_ID.to_string(), PropertyValue::String(display));
        if let Some(parent) = &ctx.parent_pid {
            properties.insert(CONFIG_PARENT_PID.to_string(), PropertyValue::String(parent.clone()));
        }
    }

    // -- variables --------------------------------------------------------

    fn resolver(&self) -> VariableResolver<'a> {
        VariableResolver::new(self.variables)
    }

    pub(crate) fn resolve_text(&self, ctx: &mut Context, raw: &str) -> EvalResult<String> {
        let Context { element, definitions, result, cache, demanded, .. } = ctx;
        let scope = ElementScope {
            element,
            properties: &result.properties,
            pid: &result.pid,
            definitions,
            variables: self.variables,
            demanded,
        };
        Ok(self.resolver().resolve(raw, &scope, cache)?)
    }

    fn resolve_variable(&self, ctx: &mut Context, name: &str) -> EvalResult<Option<String>> {
        let Context { element, definitions, result, cache, demanded, .. } = ctx;
        let scope = ElementScope {
            element,
            properties: &result.properties,
            pid: &result.pid,
            definitions,
            variables: self.variables,
            demanded,
        };
        Ok(self.resolver().resolve_named(name, &scope, cache)?)
    }

    fn resolve_list(&self, ctx: &mut Context, raw: &str) -> EvalResult<Vec<String>> {
        let Context { element, definitions, result, cache, demanded, .. } = ctx;
        let scope = ElementScope {
            element,
            properties: &result.properties,
            pid: &result.pid,
            definitions,
            variables: self.variables,
            demanded,
        };
        Ok(self.resolver().resolve_list(raw, &scope, cache)?)
    }
}

fn concat(a: Option<Value>, b: Option<Value>) -> Option<Value> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.concat(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn copy_property(ctx: &mut Context, def: &AttributeDefinition) {
    let Some(source) = def.copy_of.as_deref() else {
        return;
    };
    let copied = ctx
        .result
        .properties
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(source))
        .map(|(_, value)| value.clone());
    if let Some(value) = copied {
        ctx.result.properties.insert(def.id.clone(), value);
    }
}

/// A required attribute without a value invalidates the element unless a
/// pending reference explains the gap.
fn check_required(ctx: &mut Context, definitions: &[AttributeDefinition]) {
    for def in definitions.iter().filter(|d| d.required) {
        let flat_prefix = format!("{}.", def.id);
        let present = ctx
            .result
            .properties
            .keys()
            .any(|k| k.eq_ignore_ascii_case(&def.id) || k.starts_with(&flat_prefix));
        let deferred = ctx
            .result
            .unresolved
            .iter()
            .any(|u| u.attribute().eq_ignore_ascii_case(&def.id));
        if !present && !deferred {
            warn!(element = %ctx.result.identity, attribute = %def.id, "required attribute has no value");
            ctx.warn(format!("required attribute {} has no value", def.id));
            ctx.result.valid = false;
        }
    }
}
