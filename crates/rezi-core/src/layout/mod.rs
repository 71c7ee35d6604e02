//! Layout: assigning rectangles to committed instances.
//!
//! The engine walks the instance tree, combining resolved constraint values,
//! literal props, and intrinsic measurement into a [`LayoutTree`] parallel to
//! the instance tree. The layout tree owns its rects and scroll metadata and
//! references VNodes by handle; it lives for one frame.

pub mod engine;
pub mod scroll;

pub use engine::{LayoutEngine, measure_intrinsic};
pub use scroll::ScrollMeta;

use std::rc::Rc;

use crate::commit::InstanceId;
use crate::geometry::Rect;
use crate::vnode::VNode;

/// Main axis of a flow container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    /// Children advance along x.
    Horizontal,
    /// Children advance along y.
    #[default]
    Vertical,
}

/// One node of the layout tree.
#[derive(Clone, Debug)]
pub struct LayoutNode {
    /// The instance this node lays out.
    pub instance: InstanceId,
    /// Handle to the instance's VNode (never mutated by layout).
    pub vnode: Rc<VNode>,
    /// Assigned rectangle in screen coordinates.
    pub rect: Rect,
    /// Scroll metadata, present on `overflow: "scroll"` containers.
    pub meta: Option<ScrollMeta>,
    /// Child layout nodes.
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Find the layout node for an instance id.
    pub fn find(&self, instance: InstanceId) -> Option<&LayoutNode> {
        if self.instance == instance {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(instance))
    }

    /// Depth-first hit test: the deepest node containing the position wins.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<&LayoutNode> {
        if !self.rect.contains(crate::geometry::Position::new(x, y)) {
            return None;
        }
        // Later children draw on top, so test them in reverse order.
        for child in self.children.iter().rev() {
            if let Some(hit) = child.hit_test(x, y) {
                return Some(hit);
            }
        }
        Some(self)
    }

    /// Total number of layout nodes in the subtree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(LayoutNode::count).sum::<usize>()
    }
}

/// The per-frame layout tree.
#[derive(Clone, Debug)]
pub struct LayoutTree {
    /// Root layout node.
    pub root: LayoutNode,
}
