//! Constraint graph construction and resolution.
//!
//! Sizing expressions on committed instances form a dependency DAG over
//! `(instance, property)` nodes. The graph builder detects cycles and
//! ambiguous references and produces a deterministic evaluation order; the
//! resolver evaluates nodes topologically with bounded caching.

pub mod graph;
pub mod resolver;

pub use graph::{ConstraintGraph, ConstraintProperty, NodeKey, build_constraint_graph};
pub use resolver::{
    ResolveCache, ResolveOptions, ResolveOutput, ResolvedValues, resolve_constraints,
};

/// Errors from constraint graph construction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    /// The dependency graph contains a cycle.
    #[error("circular constraint: {}", path.join(" -> "))]
    Circular {
        /// The cycle as node names, first node repeated at the end.
        path: Vec<String>,
    },

    /// A `#id` reference has no target.
    #[error("invalid reference: no widget with id '#{id}'")]
    UndefinedRef {
        /// The unresolved id.
        id: String,
    },

    /// A `#id` reference matches more than one widget.
    #[error("invalid reference: {count} widgets share id '#{id}'")]
    AmbiguousRef {
        /// The duplicated id.
        id: String,
        /// How many widgets share it.
        count: usize,
    },
}
