//! Virtual widget descriptions.
//!
//! A [`VNode`] is an immutable description of a widget: a kind, a
//! string-keyed prop map, and an ordered children list. The reconciler
//! commits VNode trees into runtime instance trees; a `key` prop identifies
//! a child across commits.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::expr::ParsedExpr;

/// Widget kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NodeKind {
    /// A run of text.
    Text,
    /// A single-child area with border and padding.
    Box,
    /// Horizontal container (main axis = x).
    Row,
    /// Vertical container (main axis = y).
    Column,
    /// Grid container with fixed columns or a track spec.
    Grid,
    /// A pressable button.
    Button,
    /// A single-line text input.
    Input,
    /// Flexible empty space.
    Spacer,
    /// Overlay centered against its anchor.
    Modal,
    /// Overlay anchored below its anchor.
    Dropdown,
    /// Two panes split along an axis.
    SplitPane,
    /// Windowed list rendering only visible rows.
    VirtualList,
    /// Tabular data.
    Table,
    /// Hierarchical rows with indentation.
    Tree,
}

impl NodeKind {
    /// Source-level name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Box => "box",
            NodeKind::Row => "row",
            NodeKind::Column => "column",
            NodeKind::Grid => "grid",
            NodeKind::Button => "button",
            NodeKind::Input => "input",
            NodeKind::Spacer => "spacer",
            NodeKind::Modal => "modal",
            NodeKind::Dropdown => "dropdown",
            NodeKind::SplitPane => "splitPane",
            NodeKind::VirtualList => "virtualList",
            NodeKind::Table => "table",
            NodeKind::Tree => "tree",
        }
    }

    /// Whether this kind lays out children of its own.
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Box
                | NodeKind::Row
                | NodeKind::Column
                | NodeKind::Grid
                | NodeKind::Modal
                | NodeKind::Dropdown
                | NodeKind::SplitPane
                | NodeKind::VirtualList
                | NodeKind::Table
                | NodeKind::Tree
        )
    }

    /// Whether this kind participates in focus traversal.
    pub const fn is_focusable(self) -> bool {
        matches!(self, NodeKind::Button | NodeKind::Input | NodeKind::Dropdown)
    }
}

/// A prop value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// String value.
    Str(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// A parsed sizing expression.
    Expr(ParsedExpr),
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Number(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Number(f64::from(v))
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<ParsedExpr> for PropValue {
    fn from(v: ParsedExpr) -> Self {
        PropValue::Expr(v)
    }
}

/// String-keyed attribute map. Ordered for deterministic iteration.
pub type Props = BTreeMap<String, PropValue>;

/// An immutable description of a widget and its children.
#[derive(Clone, Debug, PartialEq)]
pub struct VNode {
    kind: NodeKind,
    props: Props,
    children: Vec<Rc<VNode>>,
}

impl VNode {
    /// Create a node of the given kind with no props or children.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            props: Props::new(),
            children: Vec::new(),
        }
    }

    /// Create a text node with the given content.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Text).prop("content", content.into())
    }

    /// Create a row container.
    pub fn row() -> Self {
        Self::new(NodeKind::Row)
    }

    /// Create a column container.
    pub fn column() -> Self {
        Self::new(NodeKind::Column)
    }

    /// Create a box container.
    pub fn boxed() -> Self {
        Self::new(NodeKind::Box)
    }

    /// Create a button with the given label.
    pub fn button(label: impl Into<String>) -> Self {
        Self::new(NodeKind::Button).prop("label", label.into())
    }

    /// Set a prop (builder style).
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Set the distinguished `key` prop.
    pub fn key(self, key: impl Into<String>) -> Self {
        self.prop("key", key.into())
    }

    /// Append a child (builder style).
    pub fn child(mut self, child: impl Into<Rc<VNode>>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children (builder style).
    pub fn children(mut self, children: impl IntoIterator<Item = Rc<VNode>>) -> Self {
        self.children.extend(children);
        self
    }

    /// The widget kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The prop map.
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// The ordered children list.
    pub fn child_nodes(&self) -> &[Rc<VNode>] {
        &self.children
    }

    /// The `key` prop, if declared.
    pub fn node_key(&self) -> Option<&str> {
        self.get_str("key")
    }

    /// Read a string prop.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.props.get(name) {
            Some(PropValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Read a numeric prop.
    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.props.get(name) {
            Some(PropValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Read a boolean prop.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.props.get(name) {
            Some(PropValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Read an expression prop.
    pub fn get_expr(&self, name: &str) -> Option<&ParsedExpr> {
        match self.props.get(name) {
            Some(PropValue::Expr(e)) => Some(e),
            _ => None,
        }
    }

    /// The widget id (`id` prop), if declared.
    pub fn widget_id(&self) -> Option<&str> {
        self.get_str("id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    #[test]
    fn builder_sets_props_and_children() {
        let node = VNode::row()
            .key("main")
            .prop("gap", 1)
            .child(VNode::text("hello"))
            .child(VNode::button("ok"));
        assert_eq!(node.kind(), NodeKind::Row);
        assert_eq!(node.node_key(), Some("main"));
        assert_eq!(node.get_number("gap"), Some(1.0));
        assert_eq!(node.child_nodes().len(), 2);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn expression_prop_roundtrips() {
        let expr = parse_expression("parent.w - 4").unwrap();
        let node = VNode::column().prop("width", expr);
        assert!(node.get_expr("width").is_some());
    }

    #[test]
    fn kind_classification() {
        assert!(NodeKind::Row.is_container());
        assert!(!NodeKind::Text.is_container());
        assert!(NodeKind::Button.is_focusable());
        assert!(!NodeKind::Spacer.is_focusable());
    }

    #[test]
    fn widget_id_reads_id_prop() {
        let node = VNode::column().prop("id", "sidebar");
        assert_eq!(node.widget_id(), Some("sidebar"));
    }
}
