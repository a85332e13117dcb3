//! Delta engine for Strata.
//!
//! Compares two merged snapshots and reports what changed: variables by
//! their fully resolved value, configuration objects as a tree of deltas
//! following the nesting of elements. The refresh pipeline evaluates only
//! what this delta reports.
//!
//! # Key Types
//!
//! - [`compute_delta`] -- Variable delta plus element delta tree for two snapshots
//! - [`SnapshotDelta`] -- Changed variables and top-level element deltas
//! - [`ConfigDelta`] / [`DeltaKind`] / [`DeltaReason`] -- One changed object and why
//! - [`diff_variables`] -- Variable delta on its own

pub mod delta;
pub mod engine;
pub mod error;
pub mod variables;

pub use delta::{ConfigDelta, DeltaKind, DeltaReason, SnapshotDelta};
pub use engine::compute_delta;
pub use error::{DiffError, DiffResult};
pub use variables::{diff_variables, resolved_variables};
