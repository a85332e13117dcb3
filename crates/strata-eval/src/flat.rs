//! Flat attributes.
//!
//! A flat attribute collects elements of the referenced type and of every
//! type extending it, written nested under the element or referenced by id
//! through `<attr>Ref`, and folds each contribution's properties into the
//! parent as `<attr>.<n>.<property>`.

use std::collections::HashSet;
use std::sync::Arc;

use strata_merge::override_element;
use strata_model::ConfigElement;
use strata_schema::{AttributeDefinition, Hierarchy, HierarchyOrder, RegistryEntry};
use strata_types::{AttributeOp, ConfigId, PropertyValue};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{ConfigEvaluator, CONFIG_PREFIX, CONFIG_REFERENCE_TYPE, REF_SUFFIX};

/// One element contributing to a flat attribute.
struct Contribution {
    entry: Arc<RegistryEntry>,
    element: ConfigElement,
    id: Option<String>,
    /// Referenced by id rather than written nested.
    top_level: bool,
}

impl Contribution {
    fn key(&self) -> (String, Option<String>) {
        let id = if self.entry.is_singleton() { None } else { self.id.clone() };
        (self.entry.pid.clone(), id)
    }
}

impl ConfigEvaluator<'_> {
    pub(crate) fn evaluate_flat(&self, ctx: &mut Context, def: &AttributeDefinition) -> EvalResult<()> {
        let Some(target) = def.reference_pid.as_deref().and_then(|p| self.registry.entry_by_name(p)) else {
            debug!(attribute = %def.id, "flat attribute without a registered reference type");
            return Ok(());
        };

        let mut contributions = self.referenced_contributions(ctx, def, &target)?;
        let extenders: Vec<Arc<RegistryEntry>> =
            Hierarchy::new(self.registry, &target.pid, HierarchyOrder::MostDerivedFirst)
                .without_base()
                .collect();
        for level in extenders {
            if let Some(name) = level.effective_name(&def.id) {
                ctx.mark(&name);
                self.nested_contributions(ctx, &level, &def.id, &name, &mut contributions)?;
            }
        }
        self.nested_contributions(ctx, &target, &def.id, &def.id, &mut contributions)?;

        let mut seen = HashSet::new();
        contributions.retain(|c| seen.insert(c.key()));

        let card = def.cardinality.value();
        if contributions.len() > 1 && (-1..=1).contains(&card) {
            let mut all = contributions.into_iter();
            contributions = match all.next() {
                Some(first) => vec![all.fold(first, |mut acc, next| {
                    acc.element = override_element(acc.element, &next.element, AttributeOp::Append);
                    acc
                })],
                None => Vec::new(),
            };
        }
        let max = def.cardinality.max_values();
        if contributions.len() > max {
            return Err(EvalError::validation(
                &def.id,
                format!("Attribute {} exceeded maximum allowed size {}", def.id, max),
            ));
        }

        let mut index = 0usize;
        for contribution in contributions {
            self.flatten(ctx, def, contribution, &mut index)?;
        }
        Ok(())
    }

    /// Top-level instances named by `<attr>Ref`, looked up at every level
    /// of the referenced type's hierarchy.
    fn referenced_contributions(
        &self,
        ctx: &mut Context,
        def: &AttributeDefinition,
        target: &Arc<RegistryEntry>,
    ) -> EvalResult<Vec<Contribution>> {
        let ref_name = format!("{}{}", def.id, REF_SUFFIX);
        ctx.mark(&ref_name);
        let raw_ids: Vec<String> = ctx
            .element
            .attribute(&ref_name)
            .map(|v| {
                v.scalars()
                    .into_iter()
                    .flat_map(|s| s.split(','))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut out = Vec::new();
        for raw in raw_ids {
            let id = self.resolve_text(ctx, &raw)?;
            let mut found = None;
            for level in Hierarchy::new(self.registry, &target.pid, HierarchyOrder::MostDerivedFirst) {
                let names: Vec<&str> = std::iter::once(level.pid.as_str())
                    .chain(level.alias.as_deref())
                    .collect();
                if let Some(element) = self.snapshot.merged_factory(&names, &id)? {
                    found = Some((level.clone(), element));
                    break;
                }
            }
            match found {
                Some((entry, element)) if element.is_enabled() => out.push(Contribution {
                    entry,
                    element,
                    id: Some(id),
                    top_level: true,
                }),
                Some(_) => debug!(attribute = %def.id, id = %id, "referenced instance disabled"),
                None => {
                    warn!(element = %ctx.result.identity, attribute = %def.id, id = %id, "flat reference names no instance");
                    ctx.warn(format!("{} names unknown instance {}", ref_name, id));
                }
            }
        }
        Ok(out)
    }

    fn nested_contributions(
        &self,
        ctx: &Context,
        entry: &Arc<RegistryEntry>,
        attribute: &str,
        name: &str,
        out: &mut Vec<Contribution>,
    ) -> EvalResult<()> {
        let Some(value) = ctx.element.attribute(name) else {
            return Ok(());
        };
        for (index, key) in value.nested_keys().into_iter().enumerate() {
            let element = self.snapshot.arena().resolve(key)?;
            if !element.is_enabled() {
                continue;
            }
            let entry = self.hierarchy_entry(entry, attribute, element.node_name());
            let id = (!entry.is_singleton()).then(|| {
                element
                    .id()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("default-{}", index))
            });
            out.push(Contribution {
                entry,
                element: element.clone(),
                id,
                top_level: false,
            });
        }
        Ok(())
    }

    /// Evaluate one contribution and copy its properties under `<attr>.<n>.`.
    /// Invalid contributions are dropped without taking an index.
    fn flatten(&self, ctx: &mut Context, def: &AttributeDefinition, contribution: Contribution, index: &mut usize) -> EvalResult<()> {
        let Contribution {
            entry,
            element,
            id,
            top_level,
        } = contribution;
        let identity = if top_level {
            ConfigId::new(entry.pid.clone(), id)
        } else {
            ConfigId::nested(ctx.result.identity.clone(), entry.pid.clone(), id)
        };
        let mut sub = Context::new(
            self.registry,
            element,
            identity,
            ctx.result.pid.clone(),
            Some(entry.clone()),
            ctx.parent_pid.clone(),
        );
        sub.flat = true;
        self.run(&mut sub)?;

        let result = sub.result;
        if !result.valid {
            warn!(element = %ctx.result.identity, attribute = %def.id, contribution = %result.identity, "dropping invalid flat contribution");
            ctx.warn(format!("{} contribution {} is invalid", def.id, result.identity));
            return Ok(());
        }

        let prefix = format!("{}.{}.", def.id, index);
        *index += 1;
        for (name, value) in result.properties {
            if !name.starts_with(CONFIG_PREFIX) {
                ctx.result.properties.insert(format!("{}{}", prefix, name), value);
            }
        }
        ctx.result.properties.insert(
            format!("{}{}", prefix, CONFIG_REFERENCE_TYPE),
            PropertyValue::String(entry.pid.clone()),
        );
        ctx.result.references.extend(result.references);
        ctx.result.unresolved.extend(result.unresolved);
        ctx.result.nested.extend(result.nested);
        ctx.result.variables.extend(result.variables);
        ctx.result.warnings.extend(result.warnings);
        Ok(())
    }
}
