//! Layout-stability signatures.
//!
//! A per-instance 32-bit hash over layout-relevant props and child
//! structure. Style-only props (colors, text attributes) are excluded, so
//! a style-only update keeps signatures stable and lets the runtime skip
//! layout. Adding, removing, or reordering children changes the parent's
//! signature.

use std::collections::HashMap;
use std::rc::Rc;

use crate::commit::{Instance, InstanceId};
use crate::hash::Fnv32;
use crate::vnode::{NodeKind, PropValue, VNode};

/// Props that participate in layout and therefore in the signature.
const LAYOUT_PROPS: &[&str] = &[
    // dimensions
    "width",
    "height",
    "minWidth",
    "maxWidth",
    "minHeight",
    "maxHeight",
    "flexBasis",
    "display",
    // flex
    "flex",
    // position
    "position",
    "top",
    "left",
    "right",
    "bottom",
    // margin
    "margin",
    "mt",
    "mr",
    "mb",
    "ml",
    // padding
    "padding",
    "pt",
    "pr",
    "pb",
    "pl",
    // gap and alignment
    "gap",
    "align",
    "justify",
    "alignSelf",
    // border sides
    "border",
    "borderTop",
    "borderRight",
    "borderBottom",
    "borderLeft",
    // grid
    "columns",
    "colSpan",
    "rowSpan",
    // text
    "content",
    "wrap",
    // button
    "label",
    // overflow participation (scroll offsets are tracked separately)
    "overflow",
];

/// Style-only props, excluded by construction. Kept as documentation of the
/// boundary; anything not in [`LAYOUT_PROPS`] is already ignored.
#[allow(dead_code)]
const STYLE_PROPS: &[&str] = &["fg", "bg", "bold", "dim", "italic", "underline", "inverse"];

fn kind_supported(kind: NodeKind) -> bool {
    match kind {
        NodeKind::Text
        | NodeKind::Box
        | NodeKind::Row
        | NodeKind::Column
        | NodeKind::Grid
        | NodeKind::Button
        | NodeKind::Input
        | NodeKind::Spacer
        | NodeKind::Modal
        | NodeKind::Dropdown
        | NodeKind::SplitPane
        | NodeKind::VirtualList
        | NodeKind::Table
        | NodeKind::Tree => true,
        // NodeKind is non_exhaustive; a kind this pass does not understand
        // invalidates the whole map so the frame relayouts.
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn hash_prop(hasher: &mut Fnv32, name: &str, value: &PropValue) {
    hasher.write(name.as_bytes());
    hasher.write(b"=");
    match value {
        PropValue::Str(s) => {
            hasher.write(b"s");
            hasher.write(s.as_bytes());
        }
        PropValue::Number(n) => {
            hasher.write(b"n");
            hasher.write_u64(n.to_bits());
        }
        PropValue::Bool(b) => {
            hasher.write(if *b { b"b1" } else { b"b0" });
        }
        PropValue::Expr(e) => {
            hasher.write(b"e");
            hasher.write(e.to_string().as_bytes());
        }
    }
    hasher.write(b";");
}

fn node_signature(vnode: &VNode, child_sigs: &[u32]) -> u32 {
    let mut hasher = Fnv32::new();
    hasher.write(vnode.kind().as_str().as_bytes());
    hasher.write(b"|");
    // Props iterate in BTreeMap order, so the hash is order-independent of
    // insertion.
    for (name, value) in vnode.props() {
        if LAYOUT_PROPS.contains(&name.as_str()) {
            hash_prop(&mut hasher, name, value);
        }
    }
    hasher.write(b"|");
    for sig in child_sigs {
        hasher.write_u32(*sig);
    }
    hasher.finish()
}

/// Compute layout-stability signatures for every instance in the tree.
///
/// Returns `None` when an unsupported kind is encountered: the caller must
/// treat the whole tree as layout-dirty.
pub fn layout_signatures(root: &Rc<Instance>) -> Option<HashMap<InstanceId, u32>> {
    let mut map = HashMap::new();
    let root_sig = signature_of(root, &mut map)?;
    map.insert(root.id(), root_sig);
    Some(map)
}

fn signature_of(
    instance: &Rc<Instance>,
    map: &mut HashMap<InstanceId, u32>,
) -> Option<u32> {
    if !kind_supported(instance.vnode().kind()) {
        return None;
    }
    let mut child_sigs = Vec::with_capacity(instance.children().len());
    for child in instance.children() {
        let sig = signature_of(child, map)?;
        map.insert(child.id(), sig);
        child_sigs.push(sig);
    }
    Some(node_signature(instance.vnode(), &child_sigs))
}
