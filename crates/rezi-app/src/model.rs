//! The application model driven by the runtime.

use std::rc::Rc;

use rezi_core::event::Event;
use rezi_core::vnode::VNode;

/// What an update pass changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// Nothing changed; the frame may be skipped.
    Unchanged,
    /// State changed; commit and render a new frame.
    Changed,
    /// The application asked to quit.
    Quit,
}

/// An application driven by the runtime.
///
/// `update` receives every routed event; `view` produces the VNode tree
/// for the next commit. Returning the same `Rc` from `view` lets the
/// runtime reuse the previous constraint graph and retained subtrees.
pub trait Model {
    /// Handle an event, reporting whether state changed.
    fn update(&mut self, event: &Event) -> Update;

    /// Produce the current UI description.
    fn view(&self) -> Rc<VNode>;
}
