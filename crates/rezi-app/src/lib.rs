//! rezi-app: the retained-mode runtime for rezi.
//!
//! Drives the core pipeline (commit, constraint resolution, layout,
//! rendering) against a terminal backend: frame scheduling with an fps cap,
//! resize coalescing, output backpressure, event routing with focus and
//! keybindings, and repro capture.

pub mod config;
pub mod model;
pub mod router;
pub mod runtime;

pub use config::RuntimeConfig;
pub use model::{Model, Update};
pub use router::{KeyBinding, Router};
pub use runtime::{Runtime, RuntimeError};
