//! Refresh pipeline for Strata.
//!
//! Ties the crates together: each refresh loads and merges documents,
//! computes the delta against the active snapshot, evaluates what changed,
//! persists the results and notifies listeners. Readers see either the old
//! or the new state, never a mix.
//!
//! # Key Types
//!
//! - [`ConfigRuntime`] -- Serialized refreshes behind an atomically swapped state
//! - [`RuntimeConfig`] -- On-error policy, notification timeout, documents and variables
//! - [`ActiveState`] -- Snapshot, variables and evaluation results of one generation
//! - [`RefreshReport`] -- What a refresh wrote, deleted and deferred

pub mod config;
pub mod error;
pub mod runtime;
pub mod state;

pub use config::{DefaultDocumentConfig, RuntimeConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::ConfigRuntime;
pub use state::{ActiveState, RefreshReport};

// Re-export the types embedders need to wire a runtime up
pub use strata_merge::{DocumentSource, FsDocumentSource, InMemoryDocumentSource};
pub use strata_schema::{InMemorySchemaRegistry, SchemaRegistry};
pub use strata_store::{ChannelNotifier, ConfigEvent, ConfigNotifier, InMemoryStore, PersistentStore};
pub use strata_types::{ConfigId, OnError, Properties, PropertyValue};
