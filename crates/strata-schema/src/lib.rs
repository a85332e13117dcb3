//! Schema registry for Strata.
//!
//! The registry describes, per configuration type, which attributes exist and
//! how their raw values are converted. The evaluation and delta engines only
//! read it; the composition root owns it and controls its lifecycle.
//!
//! # Key Types
//!
//! - [`AttributeDefinition`] -- Type, cardinality, defaults, and reference target of one attribute
//! - [`Cardinality`] -- Declared bound on the number of values an attribute may carry
//! - [`RegistryEntry`] -- One configuration type: pid, aliases, extends parent, attributes
//! - [`SchemaRegistry`] -- Read-only lookup interface consumed by the engines
//! - [`Hierarchy`] -- Lazy, restartable walk over the types extending a base type
//! - [`InMemorySchemaRegistry`] -- Registry with an explicit open/close lifecycle
//! - [`SchemaDocument`] -- Serde model of a schema file (JSON or TOML)

pub mod definition;
pub mod document;
pub mod entry;
pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod traits;

pub use definition::{AttributeDefinition, AttributeOption, AttributeType, Cardinality, TimeUnit};
pub use document::SchemaDocument;
pub use entry::{AttributeDefinitions, RegistryEntry};
pub use error::{SchemaError, SchemaResult};
pub use hierarchy::{Hierarchy, HierarchyOrder};
pub use memory::InMemorySchemaRegistry;
pub use traits::SchemaRegistry;
