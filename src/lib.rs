//! Resgraph — declarative cloud resource graphs with deferred attribute references.
//!
//! Resources are declared per project, wired together by references to each
//! other's attributes, validated, and emitted as a deterministic apply plan.

pub mod cli;
pub mod core;
pub mod resources;

pub use crate::core::error::{GraphError, Result};
pub use crate::core::registry::Registry;
pub use crate::core::resolver::DependencyGraph;
pub use crate::core::value::{reference, AttributeReference, Value};
