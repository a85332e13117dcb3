//! Variable substitution for Strata.
//!
//! Attribute values may contain `${name}` tokens. The [`VariableResolver`]
//! replaces them from a [`VariableRegistry`] (explicit values, file-level
//! values, environment, declared defaults) and from the attributes of the
//! element being evaluated. Resolution uses an explicit stack, so a chain of
//! variables is bounded only by memory and a repeated name is reported as a
//! [`CycleError`] carrying the whole chain.
//!
//! # Key Types
//!
//! - [`VariableRegistry`] -- Layered name to value store
//! - [`EnvironmentSource`] -- Process environment, or a fixed map for tests
//! - [`ResolutionScope`] -- Attributes of the element under evaluation
//! - [`ResolutionCache`] -- Memoized values and consumed variable names for one evaluation
//! - [`VariableResolver`] -- Token substitution with arithmetic fallback

pub mod error;
pub mod expr;
pub mod registry;
pub mod resolver;
pub mod token;

pub use error::{CycleError, VariableError, VariableResult};
pub use registry::{EnvironmentSource, MapEnvironment, ProcessEnvironment, VariableRegistry};
pub use resolver::{NoScope, ResolutionCache, ResolutionScope, VariableResolver, SERVICE_PID};
pub use token::{contains_token, referenced_variables, Token};
