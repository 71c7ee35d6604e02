//! Focus management for widget navigation.

use crate::commit::InstanceId;

/// Whether a widget currently has focus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusState {
    /// The widget has focus.
    Focused,
    /// The widget does not have focus.
    Unfocused,
}

/// Manages focus among a set of widgets.
///
/// Supports Tab / Shift-Tab navigation with wraparound. Order of
/// registration determines tab order; disabled widgets are never
/// registered.
#[derive(Clone, Debug, Default)]
pub struct FocusManager {
    /// Ordered list of focusable instance ids.
    order: Vec<InstanceId>,
    /// Index of the currently focused widget, or None if nothing is focused.
    current: Option<usize>,
}

impl FocusManager {
    /// Create a new focus manager with no widgets.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            current: None,
        }
    }

    /// Replace the focus order wholesale, keeping the focused widget when it
    /// survives.
    pub fn set_order(&mut self, order: Vec<InstanceId>) {
        let focused = self.focused();
        self.order = order;
        self.current = focused.and_then(|id| self.order.iter().position(|&w| w == id));
        if self.current.is_none() && !self.order.is_empty() {
            self.current = Some(0);
        }
    }

    /// Register a widget as focusable.
    pub fn register(&mut self, id: InstanceId) {
        if !self.order.contains(&id) {
            self.order.push(id);
            if self.current.is_none() {
                self.current = Some(0);
            }
        }
    }

    /// Unregister a widget.
    pub fn unregister(&mut self, id: InstanceId) {
        if let Some(pos) = self.order.iter().position(|&w| w == id) {
            self.order.remove(pos);
            if self.order.is_empty() {
                self.current = None;
            } else if let Some(current) = self.current {
                if current >= self.order.len() {
                    self.current = Some(self.order.len() - 1);
                } else if current > pos {
                    self.current = Some(current - 1);
                }
            }
        }
    }

    /// Get the currently focused instance id.
    pub fn focused(&self) -> Option<InstanceId> {
        self.current.and_then(|i| self.order.get(i).copied())
    }

    /// Check if a specific widget has focus.
    pub fn focus_state(&self, id: InstanceId) -> FocusState {
        if self.focused() == Some(id) {
            FocusState::Focused
        } else {
            FocusState::Unfocused
        }
    }

    /// Move focus to the next widget (Tab).
    pub fn focus_next(&mut self) {
        if self.order.is_empty() {
            return;
        }
        match self.current {
            Some(i) => self.current = Some((i + 1) % self.order.len()),
            None => self.current = Some(0),
        }
    }

    /// Move focus to the previous widget (Shift-Tab).
    pub fn focus_previous(&mut self) {
        if self.order.is_empty() {
            return;
        }
        match self.current {
            Some(0) | None => self.current = Some(self.order.len() - 1),
            Some(i) => self.current = Some(i - 1),
        }
    }

    /// Set focus directly to a specific widget.
    pub fn set_focus(&mut self, id: InstanceId) {
        if let Some(pos) = self.order.iter().position(|&w| w == id) {
            self.current = Some(pos);
        }
    }

    /// Get the number of registered focusable widgets.
    pub fn count(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_gets_focus() {
        let mut focus = FocusManager::new();
        focus.register(10);
        focus.register(20);
        assert_eq!(focus.focused(), Some(10));
    }

    #[test]
    fn tab_wraps_around() {
        let mut focus = FocusManager::new();
        focus.register(1);
        focus.register(2);
        focus.register(3);
        focus.focus_next();
        focus.focus_next();
        assert_eq!(focus.focused(), Some(3));
        focus.focus_next();
        assert_eq!(focus.focused(), Some(1));
    }

    #[test]
    fn shift_tab_wraps_backward() {
        let mut focus = FocusManager::new();
        focus.register(1);
        focus.register(2);
        focus.focus_previous();
        assert_eq!(focus.focused(), Some(2));
    }

    #[test]
    fn unregister_adjusts_current() {
        let mut focus = FocusManager::new();
        focus.register(1);
        focus.register(2);
        focus.register(3);
        focus.focus_next();
        focus.unregister(2);
        assert_eq!(focus.focused(), Some(3));
        focus.unregister(3);
        focus.unregister(1);
        assert_eq!(focus.focused(), None);
    }

    #[test]
    fn set_order_preserves_focus() {
        let mut focus = FocusManager::new();
        focus.set_order(vec![1, 2, 3]);
        focus.set_focus(2);
        focus.set_order(vec![2, 3]);
        assert_eq!(focus.focused(), Some(2));
        focus.set_order(vec![7, 8]);
        assert_eq!(focus.focused(), Some(7));
    }

    #[test]
    fn focus_state_reports() {
        let mut focus = FocusManager::new();
        focus.register(5);
        assert_eq!(focus.focus_state(5), FocusState::Focused);
        assert_eq!(focus.focus_state(6), FocusState::Unfocused);
    }
}
