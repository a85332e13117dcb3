use strata_types::{ConfigId, MergeBehavior};

use crate::arena::ElementKey;
use crate::attributes::AttributeMap;
use crate::value::Value;

/// Name of the identity attribute.
pub const ID_ATTRIBUTE: &str = "id";

/// Attributes that switch an element off when set to `false`.
pub const ENABLED_ATTRIBUTES: [&str; 2] = ["enabled", "configurationEnabled"];

/// Where an element came from: the chain of documents from the root down to
/// the innermost include, with the behavior each include edge carried.
///
/// `locations` and `behaviors` are parallel. The root document is recorded
/// with [`MergeBehavior::Merge`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    locations: Vec<String>,
    behaviors: Vec<MergeBehavior>,
}

impl Provenance {
    /// Provenance of an element parsed directly from a root document.
    pub fn root(location: impl Into<String>) -> Self {
        Self::with_behavior(location, MergeBehavior::Merge)
    }

    /// Provenance of an element from a top-level document with an explicit behavior.
    pub fn with_behavior(location: impl Into<String>, behavior: MergeBehavior) -> Self {
        Self {
            locations: vec![location.into()],
            behaviors: vec![behavior],
        }
    }

    /// Provenance one include deeper.
    pub fn push(&self, location: impl Into<String>, behavior: MergeBehavior) -> Self {
        let mut next = self.clone();
        next.locations.push(location.into());
        next.behaviors.push(behavior);
        next
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn behaviors(&self) -> &[MergeBehavior] {
        &self.behaviors
    }

    pub fn depth(&self) -> usize {
        self.locations.len()
    }

    /// The innermost document.
    pub fn document(&self) -> &str {
        self.locations.last().map(String::as_str).unwrap_or("")
    }

    /// Behavior of the innermost include edge.
    pub fn behavior(&self) -> MergeBehavior {
        self.behaviors.last().copied().unwrap_or_default()
    }

    /// Behavior recorded at `depth`.
    pub fn behavior_at(&self, depth: usize) -> Option<MergeBehavior> {
        self.behaviors.get(depth).copied()
    }

    /// Position of `location` among the enclosing documents, excluding the
    /// innermost one.
    pub fn ancestor_depth(&self, location: &str) -> Option<usize> {
        let enclosing = self.locations.len().saturating_sub(1);
        self.locations[..enclosing].iter().position(|l| l == location)
    }

    /// Returns `true` if `location` is already on the stack.
    pub fn contains(&self, location: &str) -> bool {
        self.locations.iter().any(|l| l == location)
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::root("")
    }
}

/// One configuration element.
///
/// Elements are created once when a document is parsed and are only changed
/// by the merge engine afterwards. Nested children are stored in the owning
/// [`ElementArena`](crate::ElementArena) and referenced through
/// [`Value::Nested`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigElement {
    node_name: String,
    id: Option<String>,
    attributes: AttributeMap,
    parent: Option<ElementKey>,
    provenance: Provenance,
    sequence: u64,
    text: Option<String>,
    default_config: bool,
}

impl ConfigElement {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            id: None,
            attributes: AttributeMap::new(),
            parent: None,
            provenance: Provenance::default(),
            sequence: 0,
            text: None,
            default_config: false,
        }
    }

    /// Builder-style attribute setter. Setting `id` also sets the identity.
    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_attribute(ID_ATTRIBUTE, Value::Scalar(id.into()));
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Top-level logical identity.
    pub fn identity(&self) -> ConfigId {
        ConfigId::new(self.node_name.clone(), self.id.clone())
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set an attribute, keeping the identity in sync with the `id` attribute.
    pub fn set_attribute(&mut self, name: &str, value: Value) {
        if name.eq_ignore_ascii_case(ID_ATTRIBUTE) {
            self.id = value.as_scalar().map(str::to_string);
        }
        self.attributes.insert(name, value);
    }

    /// Replace the whole attribute map, keeping the identity in sync.
    pub fn set_attributes(&mut self, attributes: AttributeMap) {
        self.id = attributes
            .get(ID_ATTRIBUTE)
            .and_then(Value::as_scalar)
            .map(str::to_string);
        self.attributes = attributes;
    }

    pub fn parent(&self) -> Option<ElementKey> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<ElementKey>) {
        self.parent = parent;
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn set_provenance(&mut self, provenance: Provenance) {
        self.provenance = provenance;
    }

    /// The document that contributed this element.
    pub fn document(&self) -> &str {
        self.provenance.document()
    }

    pub fn behavior(&self) -> MergeBehavior {
        self.provenance.behavior()
    }

    /// Global parse-order sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text;
    }

    /// Returns `true` if this element came from a default document.
    pub fn is_default_config(&self) -> bool {
        self.default_config
    }

    pub fn set_default_config(&mut self, default_config: bool) {
        self.default_config = default_config;
    }

    /// `false` when an enabled attribute is explicitly `false`.
    pub fn is_enabled(&self) -> bool {
        ENABLED_ATTRIBUTES.iter().all(|name| {
            !matches!(
                self.attributes.get(name),
                Some(Value::Scalar(s)) if s.trim().eq_ignore_ascii_case("false")
            )
        })
    }

    /// Keys of every nested child, grouped by attribute, in attribute order.
    pub fn nested_children(&self) -> Vec<(&str, ElementKey)> {
        self.attributes
            .iter()
            .flat_map(|attr| {
                attr.value
                    .nested_keys()
                    .into_iter()
                    .map(move |k| (attr.name.as_str(), k))
            })
            .collect()
    }

    /// Returns `true` if any attribute holds nested elements.
    pub fn has_nested(&self) -> bool {
        self.attributes
            .iter()
            .any(|attr| !attr.value.nested_keys().is_empty())
    }
}
