//! Persistence and notification collaborators for Strata.
//!
//! The refresh pipeline writes every evaluated configuration object to a
//! [`PersistentStore`] and tells interested parties about the change through
//! a [`ConfigNotifier`]. Both are traits so hosts can plug in their own
//! backends; in-memory and channel-backed implementations are provided.
//!
//! # Key Types
//!
//! - [`PersistentStore`] -- Maps identities to persistent ids and holds their properties
//! - [`StoredConfig`] -- One persisted object: pid, identity, properties, references
//! - [`StoreFilter`] -- Selection by factory pid and/or instance id
//! - [`InMemoryStore`] -- Reference store for tests and embedded use
//! - [`ConfigNotifier`] -- Async receiver of [`ConfigEvent`]s
//! - [`NoOpNotifier`] / [`ChannelNotifier`] -- Discarding and channel-backed notifiers

pub mod error;
pub mod memory;
pub mod notify;
pub mod record;
pub mod traits;

pub use error::{NotifyError, NotifyResult, StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use notify::{ChannelNotifier, ConfigEvent, ConfigNotifier, EventKind, NoOpNotifier};
pub use record::{StoreFilter, StoredConfig};
pub use traits::PersistentStore;
