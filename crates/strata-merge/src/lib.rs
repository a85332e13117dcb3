//! Document loading and merging for Strata.
//!
//! Documents are traversed depth-first (an include is fully processed before
//! its including document continues) and every element becomes a raw
//! candidate in a [`Snapshot`]. Candidates sharing a logical identity are
//! merged lazily, in two phases, when a caller asks for the authoritative
//! element.
//!
//! # Key Types
//!
//! - [`DocumentSource`] -- Supplies document bytes by resolved location
//! - [`DocumentParser`] / [`JsonDocumentParser`] -- Turns bytes into document entries
//! - [`ConfigLoader`] -- Traverses a root document and its includes into a snapshot
//! - [`Snapshot`] -- Unmerged candidates per type name plus variable definitions
//! - [`merge`](merge::merge) -- Two-phase merge of candidates sharing one identity

pub mod document;
pub mod error;
pub mod loader;
pub mod merge;
pub mod snapshot;
pub mod source;

pub use document::{
    DocumentEntry, DocumentParser, JsonDocumentParser, RawAttribute, RawDocument, RawElement,
    RawInclude, RawVariable,
};
pub use error::{MergeError, MergeResult, ParseError};
pub use loader::{ConfigLoader, DefaultDocument};
pub use merge::{merge, override_element};
pub use snapshot::{MergedVariable, Snapshot, VARIABLE_TYPE};
pub use source::{DocumentSource, FsDocumentSource, InMemoryDocumentSource};
