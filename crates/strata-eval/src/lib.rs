//! Evaluation engine for Strata.
//!
//! Evaluation turns one merged configuration element into the typed property
//! dictionary that is persisted and handed to consumers. Attribute values are
//! resolved against the schema, variables are substituted, references are
//! mapped to persistent ids and nested elements are evaluated recursively
//! under their own identity.
//!
//! # Key Types
//!
//! - [`ConfigEvaluator`] -- Evaluates merged elements against a schema, store and variables
//! - [`EvaluationResult`] -- Properties, references and nested results of one element
//! - [`UnresolvedReference`] -- A reference that could not be satisfied yet
//! - [`EvalError`] -- Failures that abort evaluation of an element
//! - [`convert_value`] / [`parse_value`] / [`parse_duration`] -- Typed conversion of raw strings

mod context;
pub mod convert;
pub mod error;
pub mod evaluator;
mod flat;
pub mod result;

pub use convert::{convert_value, normalize_location, parse_duration, parse_value};
pub use error::{EvalError, EvalResult};
pub use evaluator::{
    identity_for, ConfigEvaluator, CONFIG_DISPLAY_ID, CONFIG_ID, CONFIG_PARENT_PID, CONFIG_PREFIX,
    CONFIG_REFERENCE_TYPE,
};
pub use result::{EvaluationResult, UnresolvedReference};
