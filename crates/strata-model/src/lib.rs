//! Document tree model for Strata.
//!
//! Every parsed configuration element lives in an [`ElementArena`]. Nested
//! children and parent links are [`ElementKey`] indices into that arena, so
//! merging never aliases or re-parents a shared node.
//!
//! # Key Types
//!
//! - [`ConfigElement`] -- One parsed element: name, attributes, id, provenance, sequence
//! - [`Value`] -- Tagged attribute value: scalar, list, nested element, or reference
//! - [`AttributeMap`] -- Ordered attribute map with case-insensitive keys
//! - [`Provenance`] -- Stack of document locations and the merge behaviors that pulled them in
//! - [`ElementArena`] / [`ElementKey`] -- Indexed element storage

pub mod arena;
pub mod attributes;
pub mod element;
pub mod error;
pub mod value;

pub use arena::{ElementArena, ElementKey};
pub use attributes::{Attribute, AttributeMap};
pub use element::{ConfigElement, Provenance, ENABLED_ATTRIBUTES, ID_ATTRIBUTE};
pub use error::{ModelError, ModelResult};
pub use value::Value;
