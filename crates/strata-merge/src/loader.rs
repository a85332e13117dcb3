use strata_model::{ConfigElement, ElementKey, Provenance, Value};
use strata_types::{ConfigId, MergeBehavior, OnError};
use tracing::{debug, info, warn};

use crate::document::{DocumentEntry, DocumentParser, RawAttribute, RawElement, RawInclude, RawVariable};
use crate::error::{MergeError, MergeResult};
use crate::snapshot::{Snapshot, VARIABLE_TYPE};
use crate::source::DocumentSource;

/// A document supplied alongside the root, merged under its own behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultDocument {
    pub location: String,
    pub behavior: MergeBehavior,
}

impl DefaultDocument {
    pub fn new(location: impl Into<String>, behavior: MergeBehavior) -> Self {
        Self {
            location: location.into(),
            behavior,
        }
    }
}

/// Builds a [`Snapshot`] by traversing a root document and its includes.
///
/// Default documents are traversed first so that every primary definition
/// is newer than the defaults it overrides. A failure to read or parse the
/// root document is always fatal; failures in included or default documents
/// drop that document's contribution unless the policy is
/// [`OnError::Fail`]. Include cycles are dropped with a warning.
pub struct ConfigLoader<'a> {
    source: &'a dyn DocumentSource,
    parser: &'a dyn DocumentParser,
    on_error: OnError,
}

struct LoadState {
    snapshot: Snapshot,
    sequence: u64,
    documents: usize,
}

impl LoadState {
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }
}

/// Where a document sits in the traversal.
struct Origin<'p> {
    parent: Option<&'p Provenance>,
    behavior: MergeBehavior,
    default_config: bool,
    optional: bool,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(source: &'a dyn DocumentSource, parser: &'a dyn DocumentParser) -> Self {
        Self {
            source,
            parser,
            on_error: OnError::default(),
        }
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Load `root` and `defaults` into a fresh snapshot.
    pub fn load(&self, root: &str, defaults: &[DefaultDocument]) -> MergeResult<Snapshot> {
        let mut state = LoadState {
            snapshot: Snapshot::new(),
            sequence: 0,
            documents: 0,
        };

        for default in defaults {
            let origin = Origin {
                parent: None,
                behavior: default.behavior,
                default_config: true,
                optional: false,
            };
            if let Err(e) = self.load_location(&mut state, &default.location, None, origin) {
                self.tolerate(e)?;
            }
        }

        let origin = Origin {
            parent: None,
            behavior: MergeBehavior::Merge,
            default_config: false,
            optional: false,
        };
        self.load_location(&mut state, root, None, origin)?;

        info!(
            root,
            documents = state.documents,
            elements = state.sequence,
            "configuration documents loaded"
        );
        Ok(state.snapshot)
    }

    fn tolerate(&self, error: MergeError) -> MergeResult<()> {
        if error.is_structural() {
            warn!(error = %error, "dropping include");
            return Ok(());
        }
        match self.on_error {
            OnError::Fail => Err(error),
            OnError::Warn => {
                warn!(error = %error, "skipping document contribution");
                Ok(())
            }
            OnError::Ignore => {
                debug!(error = %error, "skipping document contribution");
                Ok(())
            }
        }
    }

    fn load_location(
        &self,
        state: &mut LoadState,
        location: &str,
        relative_to: Option<&str>,
        origin: Origin<'_>,
    ) -> MergeResult<()> {
        let resolved = match self.source.resolve(location, relative_to) {
            Ok(resolved) => resolved,
            Err(MergeError::NotFound(missing)) if origin.optional => {
                debug!(location = %missing, "optional include not found");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let directory = resolved.len() > 1;
        for document in resolved {
            let result = match origin.parent {
                Some(parent) if parent.contains(&document) => Err(MergeError::IncludeCycle {
                    location: document.clone(),
                    chain: parent.locations().join(" -> "),
                }),
                _ => self.load_document(state, &document, &origin),
            };
            match result {
                // One broken member of a directory does not hide its siblings.
                Err(e) if directory && origin.parent.is_some() => self.tolerate(e)?,
                other => other?,
            }
        }
        Ok(())
    }

    fn load_document(&self, state: &mut LoadState, location: &str, origin: &Origin<'_>) -> MergeResult<()> {
        let bytes = self.source.read(location)?;
        let document = self.parser.parse(location, &bytes)?;
        state.documents += 1;

        let provenance = match origin.parent {
            Some(parent) => parent.push(location, origin.behavior),
            None => Provenance::with_behavior(location, origin.behavior),
        };
        debug!(location, depth = provenance.depth(), entries = document.entries.len(), "processing document");

        for entry in &document.entries {
            match entry {
                DocumentEntry::Element(raw) => {
                    let element = self.build_element(state, raw, &provenance, origin.default_config, None);
                    let key = state.snapshot.add_candidate(element);
                    self.build_children(state, key, raw, &provenance, origin.default_config);
                }
                DocumentEntry::Include(include) => {
                    if let Err(e) = self.include(state, include, location, &provenance, origin.default_config) {
                        self.tolerate(e)?;
                    }
                }
                DocumentEntry::Variable(var) => {
                    let element = variable_element(var, &provenance, state.next_sequence(), origin.default_config);
                    state.snapshot.add_variable(element);
                }
            }
        }
        Ok(())
    }

    fn include(
        &self,
        state: &mut LoadState,
        include: &RawInclude,
        from: &str,
        provenance: &Provenance,
        default_config: bool,
    ) -> MergeResult<()> {
        let origin = Origin {
            parent: Some(provenance),
            behavior: include.on_conflict,
            default_config,
            optional: include.optional,
        };
        self.load_location(state, &include.location, Some(from), origin)
    }

    fn build_element(
        &self,
        state: &mut LoadState,
        raw: &RawElement,
        provenance: &Provenance,
        default_config: bool,
        parent: Option<ElementKey>,
    ) -> ConfigElement {
        let mut element = ConfigElement::new(raw.name.clone());
        for (name, value) in &raw.attributes {
            let value = match value {
                RawAttribute::List(items) => Value::strings(items.iter().cloned()),
                single => Value::Scalar(single.to_string()),
            };
            element.set_attribute(name, value);
        }
        for (name, op) in &raw.ops {
            element.attributes_mut().set_op(name, *op);
        }
        element.set_text(raw.text.clone());
        element.set_provenance(provenance.clone());
        element.set_sequence(state.next_sequence());
        element.set_default_config(default_config);
        element.set_parent(parent);
        element
    }

    /// Store the children of `raw` below the element at `key`, depth-first,
    /// preserving document order.
    fn build_children(
        &self,
        state: &mut LoadState,
        key: ElementKey,
        raw: &RawElement,
        provenance: &Provenance,
        default_config: bool,
    ) {
        let mut pending: Vec<(ElementKey, &RawElement)> = vec![(key, raw)];
        while let Some((parent_key, parent_raw)) = pending.pop() {
            let mut built = Vec::with_capacity(parent_raw.children.len());
            for child in &parent_raw.children {
                if let Some(target) = child.reference_target() {
                    built.push((child.name.clone(), Value::Reference(ConfigId::factory(child.name.clone(), target))));
                    continue;
                }
                let element = self.build_element(state, child, provenance, default_config, Some(parent_key));
                let child_key = state.snapshot.insert_nested(element);
                built.push((child.name.clone(), Value::Nested(child_key)));
                pending.push((child_key, child));
            }
            if let Some(parent) = state.snapshot.element_mut(parent_key) {
                for (name, value) in built {
                    parent.attributes_mut().push(name, value);
                }
            }
        }
    }
}

fn variable_element(var: &RawVariable, provenance: &Provenance, sequence: u64, default_config: bool) -> ConfigElement {
    let mut element = ConfigElement::new(VARIABLE_TYPE).with_attribute("name", var.name.as_str());
    if let Some(value) = &var.value {
        element.set_attribute("value", Value::scalar(value.clone()));
    }
    if let Some(default) = &var.default_value {
        element.set_attribute("defaultValue", Value::scalar(default.clone()));
    }
    element.set_provenance(provenance.clone());
    element.set_sequence(sequence);
    element.set_default_config(default_config);
    element
}
