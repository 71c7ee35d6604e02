//! rezi-core: a retained-mode terminal UI framework core.
//!
//! This crate provides the framework pipeline: virtual widget trees are
//! committed into runtime instance trees, sizing expressions are resolved
//! over a constraint graph, a layout engine assigns rectangles, and a
//! renderer emits a versioned binary drawlist executed by a terminal
//! backend. A streaming decoder normalizes terminal input into a tagged
//! event stream, and repro bundles capture sessions for deterministic
//! replay.

pub mod commit;
pub mod constraint;
pub mod drawlist;
pub mod error;
pub mod event;
pub mod expr;
pub mod focus;
pub mod geometry;
mod hash;
pub mod input;
pub mod layout;
pub mod render;
pub mod repro;
pub mod terminal;
pub mod vnode;

pub use commit::{CommitOptions, CommitResult, Committer, Instance, InstanceId};
pub use commit::signature::layout_signatures;
pub use constraint::{
    ConstraintError, ConstraintGraph, ConstraintProperty, NodeKey, ResolveCache, ResolveOptions,
    ResolveOutput, ResolvedValues, build_constraint_graph, resolve_constraints,
};
pub use constraint::resolver::ViewportSize;
pub use drawlist::{
    DrawCommand, Drawlist, DrawlistBuilder, DrawlistError, DrawlistLimits, PackedStyle,
    TextRunSegment, pack_rgb, parse_drawlist, parse_text_run,
};
pub use error::{Result, ReziCoreError};
pub use event::{Event, KeyAction, KeyCode, KeyEvent, Modifiers, MouseEvent, MouseKind};
pub use expr::{Expr, ParsedExpr, Ref, RefProp, RefScope, SyntaxError, parse_expression};
pub use focus::{FocusManager, FocusState};
pub use geometry::{Position, Rect, Size};
pub use input::{EventParseError, InputLimits, InputParser, ParseErrorCode, parse_event_batch};
pub use layout::{Axis, LayoutEngine, LayoutNode, LayoutTree, ScrollMeta, measure_intrinsic};
pub use render::Renderer;
pub use repro::{
    ReproBundle, ReproError, parse_repro_bundle, serialize_repro_bundle, validate_repro_bundle,
};
pub use terminal::{Backend, ColorMode, CrosstermBackend, PolledBytes, TerminalCaps, TestBackend};
pub use vnode::{NodeKind, PropValue, Props, VNode};
