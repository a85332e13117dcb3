//! Foundation types for Strata.
//!
//! This crate provides the identity, policy, and value types shared by every
//! other Strata crate: the merge engine, the evaluator, the delta engine and
//! the persistence collaborators all speak in terms of these types.
//!
//! # Key Types
//!
//! - [`ConfigId`] -- Logical identity of a configuration object: (type, id), optionally nested
//! - [`MergeBehavior`] -- Conflict policy attached to a document by the include that pulled it in
//! - [`AttributeOp`] -- Per-attribute override operation (APPEND or SET)
//! - [`OnError`] -- Global policy for tolerable errors during a refresh
//! - [`PropertyValue`] -- Typed, evaluated attribute value
//! - [`ProtectedString`] -- Password value that never prints its contents

pub mod behavior;
pub mod error;
pub mod identity;
pub mod property;

pub use behavior::{AttributeOp, MergeBehavior, OnError};
pub use error::TypeError;
pub use identity::ConfigId;
pub use property::{Properties, PropertyValue, ProtectedString};
