//! Event routing: keybindings, focus traversal, and press/activate pairing.

use std::collections::HashSet;
use std::rc::Rc;

use rezi_core::commit::{Instance, InstanceId};
use rezi_core::event::{Event, KeyCode, Modifiers, MouseKind};
use rezi_core::focus::FocusManager;
use rezi_core::layout::{LayoutNode, LayoutTree};

/// A key bound to a named action.
#[derive(Clone, Debug)]
pub struct KeyBinding {
    /// Bound key.
    pub code: KeyCode,
    /// Required modifiers.
    pub modifiers: Modifiers,
    /// Action name fired on match.
    pub action: String,
}

/// Routing outcome for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Deliver the event to the model unchanged.
    Forward,
    /// A bound action fired.
    Action(String),
    /// A pressable widget was activated (press and release on the same
    /// target).
    Activate(InstanceId),
    /// Focus moved; a re-render is needed.
    FocusChanged,
}

/// Routes events against the committed tree and layout.
#[derive(Debug, Default)]
pub struct Router {
    focus: FocusManager,
    bindings: Vec<KeyBinding>,
    pressed: Option<InstanceId>,
    pressable_ids: Option<HashSet<String>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a key to a named action.
    pub fn bind_key(&mut self, code: KeyCode, modifiers: Modifiers, action: impl Into<String>) {
        self.bindings.push(KeyBinding {
            code,
            modifiers,
            action: action.into(),
        });
    }

    /// Restrict activation to widgets whose `id` prop is in the list.
    /// `None` allows every pressable widget.
    pub fn set_pressable_ids(&mut self, ids: Option<Vec<String>>) {
        self.pressable_ids = ids.map(|v| v.into_iter().collect());
    }

    /// The focused instance, if any.
    pub fn focused(&self) -> Option<InstanceId> {
        self.focus.focused()
    }

    /// Focus a widget directly.
    pub fn set_focus(&mut self, id: InstanceId) {
        self.focus.set_focus(id);
    }

    /// Rebuild the focus order from the committed tree: focusable,
    /// non-disabled instances in preorder.
    pub fn sync_focus_order(&mut self, root: &Rc<Instance>) {
        let mut order = Vec::new();
        root.walk_preorder(&mut |instance| {
            let vnode = instance.vnode();
            let focusable = vnode.kind().is_focusable()
                || vnode.get_bool("focusable").unwrap_or(false);
            let disabled = vnode.get_bool("disabled").unwrap_or(false);
            if focusable && !disabled {
                order.push(instance.id());
            }
        });
        self.focus.set_order(order);
    }

    /// Route one event.
    pub fn route(&mut self, event: &Event, layout: Option<&LayoutTree>) -> Routed {
        match event {
            Event::Key(key) if key.action == rezi_core::event::KeyAction::Down => {
                if key.code == KeyCode::Tab && key.modifiers.is_empty() {
                    self.focus.focus_next();
                    return Routed::FocusChanged;
                }
                if key.code == KeyCode::Tab && key.modifiers.contains(Modifiers::SHIFT) {
                    self.focus.focus_previous();
                    return Routed::FocusChanged;
                }
                for binding in &self.bindings {
                    if binding.code == key.code && binding.modifiers == key.modifiers {
                        return Routed::Action(binding.action.clone());
                    }
                }
                Routed::Forward
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseKind::Down => {
                    let target = layout.and_then(|l| pressable_at(l, mouse.x, mouse.y));
                    match target {
                        Some(node) => {
                            self.pressed = Some(node.instance);
                            self.focus.set_focus(node.instance);
                            Routed::FocusChanged
                        }
                        None => {
                            self.pressed = None;
                            Routed::Forward
                        }
                    }
                }
                MouseKind::Up => {
                    let pressed = self.pressed.take();
                    let target = layout.and_then(|l| pressable_at(l, mouse.x, mouse.y));
                    match (pressed, target) {
                        // Press and release must land on the same widget.
                        (Some(was), Some(node)) if was == node.instance => {
                            if self.allows(&node.vnode) {
                                Routed::Activate(node.instance)
                            } else {
                                Routed::Forward
                            }
                        }
                        _ => Routed::Forward,
                    }
                }
                _ => Routed::Forward,
            },
            _ => Routed::Forward,
        }
    }

    fn allows(&self, vnode: &rezi_core::vnode::VNode) -> bool {
        match &self.pressable_ids {
            None => true,
            Some(ids) => vnode.widget_id().is_some_and(|id| ids.contains(id)),
        }
    }
}

/// Deepest pressable (focusable, non-disabled) node containing the point.
fn pressable_at(layout: &LayoutTree, x: i32, y: i32) -> Option<&LayoutNode> {
    let mut path = Vec::new();
    hit_path(&layout.root, x, y, &mut path);
    path.into_iter().rev().find(|node| {
        let vnode = &node.vnode;
        let focusable =
            vnode.kind().is_focusable() || vnode.get_bool("focusable").unwrap_or(false);
        focusable && !vnode.get_bool("disabled").unwrap_or(false)
    })
}

/// Collect the root-to-leaf chain of nodes containing the point.
fn hit_path<'a>(node: &'a LayoutNode, x: i32, y: i32, out: &mut Vec<&'a LayoutNode>) {
    if !node.rect.contains(rezi_core::geometry::Position::new(x, y)) {
        return;
    }
    out.push(node);
    for child in node.children.iter().rev() {
        let before = out.len();
        hit_path(child, x, y, out);
        if out.len() > before {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rezi_core::commit::{CommitOptions, Committer};
    use rezi_core::constraint::resolver::ResolvedMap;
    use rezi_core::event::{KeyEvent, MouseEvent};
    use rezi_core::layout::{Axis, LayoutEngine};
    use rezi_core::vnode::VNode;

    fn fixture() -> (Rc<Instance>, LayoutTree) {
        let tree = VNode::row()
            .prop("width", 30)
            .prop("height", 1)
            .child(VNode::button("ok").prop("id", "ok"))
            .child(VNode::button("cancel").prop("id", "cancel").prop("disabled", true))
            .child(VNode::button("apply").prop("id", "apply"));
        let root = Committer::new()
            .commit(None, &Rc::new(tree), CommitOptions::default())
            .root;
        let layout = LayoutEngine::new()
            .layout(&root, 0, 0, 80, 24, Axis::Vertical, &ResolvedMap::new())
            .unwrap();
        (root, layout)
    }

    #[test]
    fn tab_traverses_skipping_disabled() {
        let (root, _) = fixture();
        let mut router = Router::new();
        router.sync_focus_order(&root);
        let ok = root.children()[0].id();
        let apply = root.children()[2].id();
        assert_eq!(router.focused(), Some(ok));
        router.route(
            &Event::Key(KeyEvent::plain(KeyCode::Tab)),
            None,
        );
        assert_eq!(router.focused(), Some(apply));
        // Wraps around past the end.
        router.route(&Event::Key(KeyEvent::plain(KeyCode::Tab)), None);
        assert_eq!(router.focused(), Some(ok));
    }

    #[test]
    fn shift_tab_goes_backward() {
        let (root, _) = fixture();
        let mut router = Router::new();
        router.sync_focus_order(&root);
        let apply = root.children()[2].id();
        router.route(
            &Event::Key(KeyEvent::new(KeyCode::Tab, Modifiers::SHIFT)),
            None,
        );
        assert_eq!(router.focused(), Some(apply));
    }

    #[test]
    fn press_and_release_on_same_target_activates() {
        let (root, layout) = fixture();
        let mut router = Router::new();
        router.sync_focus_order(&root);
        let ok = root.children()[0].id();

        let down = Event::Mouse(MouseEvent::down(1, 0, 1));
        assert_eq!(router.route(&down, Some(&layout)), Routed::FocusChanged);

        let up = Event::Mouse(MouseEvent::up(2, 0, 1));
        assert_eq!(router.route(&up, Some(&layout)), Routed::Activate(ok));
    }

    #[test]
    fn release_elsewhere_does_not_activate() {
        let (root, layout) = fixture();
        let mut router = Router::new();
        router.sync_focus_order(&root);
        drop(root);

        let down = Event::Mouse(MouseEvent::down(1, 0, 1));
        router.route(&down, Some(&layout));
        // "apply" starts at x=16 in this fixture.
        let up = Event::Mouse(MouseEvent::up(17, 0, 1));
        assert_eq!(router.route(&up, Some(&layout)), Routed::Forward);
    }

    #[test]
    fn disabled_target_never_activates() {
        let (_, layout) = fixture();
        let mut router = Router::new();
        // "cancel" occupies x=6..16; a disabled widget is not pressable, so
        // the press falls through to the row.
        let down = Event::Mouse(MouseEvent::down(8, 0, 1));
        assert_eq!(router.route(&down, Some(&layout)), Routed::Forward);
        let up = Event::Mouse(MouseEvent::up(8, 0, 1));
        assert_eq!(router.route(&up, Some(&layout)), Routed::Forward);
    }

    #[test]
    fn pressable_allowlist_gates_activation() {
        let (root, layout) = fixture();
        let mut router = Router::new();
        router.sync_focus_order(&root);
        router.set_pressable_ids(Some(vec!["cancel".into()]));

        let down = Event::Mouse(MouseEvent::down(1, 0, 1));
        router.route(&down, Some(&layout));
        let up = Event::Mouse(MouseEvent::up(1, 0, 1));
        assert_eq!(router.route(&up, Some(&layout)), Routed::Forward);
    }

    #[test]
    fn bound_key_fires_action() {
        let mut router = Router::new();
        router.bind_key(KeyCode::Char('q'), Modifiers::CTRL, "quit");
        let routed = router.route(
            &Event::Key(KeyEvent::new(KeyCode::Char('q'), Modifiers::CTRL)),
            None,
        );
        assert_eq!(routed, Routed::Action("quit".into()));
    }

    #[test]
    fn unbound_key_forwards() {
        let mut router = Router::new();
        let routed = router.route(&Event::Key(KeyEvent::plain(KeyCode::Enter)), None);
        assert_eq!(routed, Routed::Forward);
    }
}
