//! Constraint dependency graph.
//!
//! Each constrainable property whose prop value is an expression becomes a
//! node keyed by `(instance, property)`. Edges point from a consumer to the
//! producers it reads: direct `#id.prop` references, the target's `display`
//! node when one exists, and every same-id instance for sibling
//! aggregations. `viewport`, `parent`, and `intrinsic` are global inputs
//! and produce no edges.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::commit::{Instance, InstanceId};
use crate::constraint::ConstraintError;
use crate::expr::{Expr, Func, ParsedExpr, Ref, RefProp, RefScope};
use crate::hash::Fnv64;

/// A constrainable property.
///
/// The declaration order is the deterministic tie-break order used when
/// several nodes are ready at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintProperty {
    /// `width`
    Width,
    /// `height`
    Height,
    /// `minWidth`
    MinWidth,
    /// `maxWidth`
    MaxWidth,
    /// `minHeight`
    MinHeight,
    /// `maxHeight`
    MaxHeight,
    /// `flexBasis`
    FlexBasis,
    /// `display`
    Display,
}

impl ConstraintProperty {
    /// All properties in tie-break order.
    pub const ALL: [ConstraintProperty; 8] = [
        ConstraintProperty::Width,
        ConstraintProperty::Height,
        ConstraintProperty::MinWidth,
        ConstraintProperty::MaxWidth,
        ConstraintProperty::MinHeight,
        ConstraintProperty::MaxHeight,
        ConstraintProperty::FlexBasis,
        ConstraintProperty::Display,
    ];

    /// The prop name carrying this property's expression.
    pub const fn prop_name(self) -> &'static str {
        match self {
            ConstraintProperty::Width => "width",
            ConstraintProperty::Height => "height",
            ConstraintProperty::MinWidth => "minWidth",
            ConstraintProperty::MaxWidth => "maxWidth",
            ConstraintProperty::MinHeight => "minHeight",
            ConstraintProperty::MaxHeight => "maxHeight",
            ConstraintProperty::FlexBasis => "flexBasis",
            ConstraintProperty::Display => "display",
        }
    }

    /// The property a reference property reads on its target.
    pub const fn from_ref_prop(prop: RefProp) -> ConstraintProperty {
        match prop {
            RefProp::Width => ConstraintProperty::Width,
            RefProp::Height => ConstraintProperty::Height,
            RefProp::MinWidth => ConstraintProperty::MinWidth,
            RefProp::MinHeight => ConstraintProperty::MinHeight,
        }
    }
}

/// Key of a graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    /// Owning instance.
    pub instance: InstanceId,
    /// Constrained property.
    pub property: ConstraintProperty,
}

/// A reference from a node to a single target instance.
#[derive(Clone, Debug)]
pub struct DirectRef {
    /// Referenced widget id.
    pub id: String,
    /// Target instance.
    pub target: InstanceId,
    /// Property read on the target.
    pub property: ConstraintProperty,
}

/// A sibling aggregation over every instance sharing an id.
#[derive(Clone, Debug)]
pub struct AggregationRef {
    /// Referenced widget id.
    pub id: String,
    /// Property read on each target.
    pub property: ConstraintProperty,
}

/// A node of the constraint graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
    /// Node key.
    pub key: NodeKey,
    /// The expression to evaluate.
    pub expr: ParsedExpr,
    /// Preorder index of the owning instance.
    pub preorder: usize,
    /// Producers this node reads (graph edges).
    pub deps: Vec<NodeKey>,
    /// Resolved direct references.
    pub direct_refs: Vec<DirectRef>,
    /// Sibling aggregations.
    pub aggregation_refs: Vec<AggregationRef>,
}

/// The constraint dependency graph for one committed tree.
#[derive(Debug)]
pub struct ConstraintGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeKey, usize>,
    fingerprint: u64,
    requires_commit_relayout: bool,
    intrinsic_instances: BTreeSet<InstanceId>,
    instances_by_widget_id: HashMap<String, Vec<InstanceId>>,
    parents: HashMap<InstanceId, InstanceId>,
}

impl ConstraintGraph {
    /// Nodes in deterministic topological order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Whether a `(instance, property)` pair is expression-driven.
    pub fn has_node(&self, key: NodeKey) -> bool {
        self.index.contains_key(&key)
    }

    /// Stable, order-independent fingerprint over node keys and expression
    /// sources. Equal graphs across frames hash equal.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// True when resolution depends on intrinsic sizes or on referenced
    /// properties that are not expression-driven, so values must be refreshed
    /// after each commit.
    pub fn requires_commit_relayout(&self) -> bool {
        self.requires_commit_relayout
    }

    /// Instances whose intrinsic size is consulted.
    pub fn intrinsic_instances(&self) -> &BTreeSet<InstanceId> {
        &self.intrinsic_instances
    }

    /// All instances sharing a widget id (used by sibling aggregation).
    pub fn instances_with_id(&self, id: &str) -> &[InstanceId] {
        self.instances_by_widget_id
            .get(id)
            .map_or(&[], Vec::as_slice)
    }

    /// The parent of an instance, if any.
    pub fn parent_of(&self, instance: InstanceId) -> Option<InstanceId> {
        self.parents.get(&instance).copied()
    }
}

struct WalkedInstance {
    id: InstanceId,
    preorder: usize,
    name: String,
}

/// Build the constraint graph for a committed instance tree.
pub fn build_constraint_graph(root: &Rc<Instance>) -> Result<ConstraintGraph, ConstraintError> {
    // Index instances in preorder, tracking ids and parent links.
    let mut walked: Vec<(Rc<Instance>, WalkedInstance)> = Vec::new();
    let mut by_widget_id: HashMap<String, Vec<InstanceId>> = HashMap::new();
    let mut parents: HashMap<InstanceId, InstanceId> = HashMap::new();
    index_instances(root, None, &mut walked, &mut by_widget_id, &mut parents);

    // Create nodes for every expression-driven property.
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut index: HashMap<NodeKey, usize> = HashMap::new();
    for (instance, meta) in &walked {
        for property in ConstraintProperty::ALL {
            if let Some(expr) = instance.vnode().get_expr(property.prop_name()) {
                let key = NodeKey {
                    instance: meta.id,
                    property,
                };
                index.insert(key, nodes.len());
                nodes.push(GraphNode {
                    key,
                    expr: expr.clone(),
                    preorder: meta.preorder,
                    deps: Vec::new(),
                    direct_refs: Vec::new(),
                    aggregation_refs: Vec::new(),
                });
            }
        }
    }

    let names: HashMap<InstanceId, String> = walked
        .iter()
        .map(|(_, m)| (m.id, m.name.clone()))
        .collect();

    // Wire edges.
    let mut requires_commit_relayout = false;
    let mut intrinsic_instances = BTreeSet::new();
    for node_idx in 0..nodes.len() {
        let expr = nodes[node_idx].expr.clone();
        if expr.has_intrinsic() {
            intrinsic_instances.insert(nodes[node_idx].key.instance);
            requires_commit_relayout = true;
        }

        let mut refs = RefCollector::default();
        refs.walk(expr.root());

        let mut deps: Vec<NodeKey> = Vec::new();
        let mut direct_refs = Vec::new();
        let mut aggregation_refs = Vec::new();

        for (id, prop) in refs.direct {
            let targets = by_widget_id.get(&id).map_or(&[][..], Vec::as_slice);
            let target = match targets {
                [one] => *one,
                [] => return Err(ConstraintError::UndefinedRef { id }),
                many => {
                    return Err(ConstraintError::AmbiguousRef {
                        id,
                        count: many.len(),
                    });
                }
            };
            let property = ConstraintProperty::from_ref_prop(prop);
            let value_key = NodeKey {
                instance: target,
                property,
            };
            if index.contains_key(&value_key) {
                deps.push(value_key);
            } else {
                // The target's value is not expression-driven; it comes from
                // committed base values, so it must be refreshed per commit.
                requires_commit_relayout = true;
            }
            let display_key = NodeKey {
                instance: target,
                property: ConstraintProperty::Display,
            };
            if index.contains_key(&display_key) {
                deps.push(display_key);
            }
            direct_refs.push(DirectRef {
                id,
                target,
                property,
            });
        }

        for (id, prop) in refs.aggregated {
            let property = ConstraintProperty::from_ref_prop(prop);
            let targets = by_widget_id.get(&id).cloned().unwrap_or_default();
            for target in &targets {
                let value_key = NodeKey {
                    instance: *target,
                    property,
                };
                if index.contains_key(&value_key) {
                    deps.push(value_key);
                } else {
                    requires_commit_relayout = true;
                }
                let display_key = NodeKey {
                    instance: *target,
                    property: ConstraintProperty::Display,
                };
                if index.contains_key(&display_key) {
                    deps.push(display_key);
                }
            }
            aggregation_refs.push(AggregationRef { id, property });
        }

        // A node must not depend on itself through its own key.
        deps.retain(|d| *d != nodes[node_idx].key);
        deps.sort_unstable();
        deps.dedup();
        nodes[node_idx].deps = deps;
        nodes[node_idx].direct_refs = direct_refs;
        nodes[node_idx].aggregation_refs = aggregation_refs;
    }

    detect_cycle(&nodes, &index, &names)?;

    let ordered = topo_order(&nodes, &index);

    // Fingerprint is an XOR fold, so it is independent of node order.
    let mut fingerprint = 0u64;
    for node in &ordered {
        let mut h = Fnv64::new();
        h.write_u64(node.key.instance as u64);
        h.write(node.key.property.prop_name().as_bytes());
        h.write(b":");
        h.write(node.expr.source().as_bytes());
        fingerprint ^= h.finish();
    }

    let index = ordered
        .iter()
        .enumerate()
        .map(|(i, n)| (n.key, i))
        .collect();

    Ok(ConstraintGraph {
        nodes: ordered,
        index,
        fingerprint,
        requires_commit_relayout,
        intrinsic_instances,
        instances_by_widget_id: by_widget_id,
        parents,
    })
}

fn index_instances(
    instance: &Rc<Instance>,
    parent: Option<InstanceId>,
    walked: &mut Vec<(Rc<Instance>, WalkedInstance)>,
    by_widget_id: &mut HashMap<String, Vec<InstanceId>>,
    parents: &mut HashMap<InstanceId, InstanceId>,
) {
    let preorder = walked.len();
    let widget_id = instance.vnode().widget_id().map(str::to_owned);
    if let Some(id) = &widget_id {
        by_widget_id.entry(id.clone()).or_default().push(instance.id());
    }
    if let Some(parent_id) = parent {
        parents.insert(instance.id(), parent_id);
    }
    let name = widget_id
        .map_or_else(|| format!("instance:{}", instance.id()), |id| format!("#{id}"));
    walked.push((
        Rc::clone(instance),
        WalkedInstance {
            id: instance.id(),
            preorder,
            name,
        },
    ));
    for child in instance.children() {
        index_instances(child, Some(instance.id()), walked, by_widget_id, parents);
    }
}

#[derive(Default)]
struct RefCollector {
    direct: Vec<(String, RefProp)>,
    aggregated: Vec<(String, RefProp)>,
}

impl RefCollector {
    fn walk(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(_) => {}
            Expr::Ref(Ref {
                scope: RefScope::Widget(id),
                prop,
            }) => self.direct.push((id.clone(), *prop)),
            Expr::Ref(_) => {}
            Expr::Unary { expr, .. } => self.walk(expr),
            Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                self.walk(lhs);
                self.walk(rhs);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.walk(cond);
                self.walk(then);
                self.walk(otherwise);
            }
            Expr::Call { func, args } => {
                if matches!(func, Func::MaxSibling | Func::SumSibling) {
                    if let Some(Expr::Ref(Ref {
                        scope: RefScope::Widget(id),
                        prop,
                    })) = args.first()
                    {
                        self.aggregated.push((id.clone(), *prop));
                    }
                    for arg in args.iter().skip(1) {
                        self.walk(arg);
                    }
                } else {
                    for arg in args {
                        self.walk(arg);
                    }
                }
            }
        }
    }
}

fn node_name(key: NodeKey, names: &HashMap<InstanceId, String>) -> String {
    let owner = names
        .get(&key.instance)
        .cloned()
        .unwrap_or_else(|| format!("instance:{}", key.instance));
    format!("{owner}.{}", key.property.prop_name())
}

/// Depth-first cycle detection reporting the cycle path.
fn detect_cycle(
    nodes: &[GraphNode],
    index: &HashMap<NodeKey, usize>,
    names: &HashMap<InstanceId, String>,
) -> Result<(), ConstraintError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }
    let mut marks = vec![Mark::White; nodes.len()];
    let mut stack: Vec<usize> = Vec::new();

    fn visit(
        at: usize,
        nodes: &[GraphNode],
        index: &HashMap<NodeKey, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        names: &HashMap<InstanceId, String>,
    ) -> Result<(), ConstraintError> {
        marks[at] = Mark::Grey;
        stack.push(at);
        for dep in &nodes[at].deps {
            let Some(&dep_idx) = index.get(dep) else {
                continue;
            };
            match marks[dep_idx] {
                Mark::Black => {}
                Mark::White => visit(dep_idx, nodes, index, marks, stack, names)?,
                Mark::Grey => {
                    let start = stack
                        .iter()
                        .position(|&i| i == dep_idx)
                        .unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|&i| node_name(nodes[i].key, names))
                        .collect();
                    path.push(node_name(nodes[dep_idx].key, names));
                    return Err(ConstraintError::Circular { path });
                }
            }
        }
        stack.pop();
        marks[at] = Mark::Black;
        Ok(())
    }

    for i in 0..nodes.len() {
        if marks[i] == Mark::White {
            visit(i, nodes, index, &mut marks, &mut stack, names)?;
        }
    }
    Ok(())
}

/// Kahn's algorithm with a deterministic ready-set order:
/// (instance preorder, property order).
fn topo_order(nodes: &[GraphNode], index: &HashMap<NodeKey, usize>) -> Vec<GraphNode> {
    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|n| n.deps.iter().filter(|d| index.contains_key(d)).count())
        .collect();

    // producer index -> consumer indices
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.deps {
            if let Some(&p) = index.get(dep) {
                consumers[p].push(i);
            }
        }
    }

    let mut ready: BTreeSet<(usize, ConstraintProperty, usize)> = BTreeSet::new();
    for (i, node) in nodes.iter().enumerate() {
        if in_degree[i] == 0 {
            ready.insert((node.preorder, node.key.property, i));
        }
    }

    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(&entry) = ready.iter().next() {
        ready.remove(&entry);
        let (_, _, i) = entry;
        ordered.push(nodes[i].clone());
        for &c in &consumers[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                ready.insert((nodes[c].preorder, nodes[c].key.property, c));
            }
        }
    }
    // Cycles were rejected beforehand, so everything is emitted.
    debug_assert_eq!(ordered.len(), nodes.len());
    ordered
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commit::{CommitOptions, Committer};
    use crate::expr::parse_expression;
    use crate::vnode::VNode;

    fn expr(src: &str) -> ParsedExpr {
        parse_expression(src).unwrap()
    }

    fn commit(tree: VNode) -> Rc<Instance> {
        Committer::new()
            .commit(None, &Rc::new(tree), CommitOptions::default())
            .root
    }

    #[test]
    fn mutual_width_refs_report_cycle() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "a").prop("width", expr("#b.w")))
                .child(VNode::column().prop("id", "b").prop("width", expr("#a.w"))),
        );
        let err = build_constraint_graph(&root).unwrap_err();
        match err {
            ConstraintError::Circular { path } => {
                assert_eq!(path, vec!["#a.width", "#b.width", "#a.width"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn undefined_ref_rejected() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("#ghost.w"))),
        );
        let err = build_constraint_graph(&root).unwrap_err();
        assert!(matches!(err, ConstraintError::UndefinedRef { id } if id == "ghost"));
    }

    #[test]
    fn duplicate_id_direct_ref_rejected() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "dup"))
                .child(VNode::column().prop("id", "dup"))
                .child(VNode::column().prop("width", expr("#dup.w"))),
        );
        let err = build_constraint_graph(&root).unwrap_err();
        assert!(matches!(err, ConstraintError::AmbiguousRef { count: 2, .. }));
    }

    #[test]
    fn duplicate_id_allowed_for_aggregation() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "col").prop("width", expr("10")))
                .child(VNode::column().prop("id", "col").prop("width", expr("20")))
                .child(VNode::column().prop("width", expr("max_sibling(#col.w)"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        assert_eq!(graph.instances_with_id("col").len(), 2);
    }

    #[test]
    fn order_is_preorder_then_property() {
        let root = commit(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("display", expr("1"))
                        .prop("height", expr("5"))
                        .prop("width", expr("10")),
                )
                .child(VNode::column().prop("width", expr("4"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let keys: Vec<(InstanceId, ConstraintProperty)> = graph
            .nodes()
            .iter()
            .map(|n| (n.key.instance, n.key.property))
            .collect();
        let first_child = root.children()[0].id();
        let second_child = root.children()[1].id();
        assert_eq!(
            keys,
            vec![
                (first_child, ConstraintProperty::Width),
                (first_child, ConstraintProperty::Height),
                (first_child, ConstraintProperty::Display),
                (second_child, ConstraintProperty::Width),
            ]
        );
    }

    #[test]
    fn dependency_orders_producer_first() {
        let root = commit(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("id", "editor")
                        .prop("width", expr("parent.w - #sidebar.w")),
                )
                .child(VNode::column().prop("id", "sidebar").prop("width", expr("20"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let order: Vec<&str> = graph
            .nodes()
            .iter()
            .map(|n| if n.deps.is_empty() { "producer" } else { "consumer" })
            .collect();
        assert_eq!(order, vec!["producer", "consumer"]);
    }

    #[test]
    fn display_expression_adds_edge() {
        let root = commit(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("id", "side")
                        .prop("width", expr("20"))
                        .prop("display", expr("0")),
                )
                .child(VNode::column().prop("width", expr("parent.w - #side.w"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let consumer = graph
            .nodes()
            .iter()
            .find(|n| !n.direct_refs.is_empty())
            .unwrap();
        let side = root.children()[0].id();
        assert!(consumer.deps.contains(&NodeKey {
            instance: side,
            property: ConstraintProperty::Display,
        }));
    }

    #[test]
    fn fingerprint_stable_across_rebuilds() {
        let tree = VNode::row()
            .child(VNode::column().prop("id", "a").prop("width", expr("20")))
            .child(VNode::column().prop("width", expr("parent.w - #a.w")));
        let root = commit(tree.clone());
        let g1 = build_constraint_graph(&root).unwrap();
        let g2 = build_constraint_graph(&root).unwrap();
        assert_eq!(g1.fingerprint(), g2.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_expression_source() {
        let a = commit(VNode::row().child(VNode::column().prop("width", expr("20"))));
        let b = commit(VNode::row().child(VNode::column().prop("width", expr("21"))));
        let ga = build_constraint_graph(&a).unwrap();
        let gb = build_constraint_graph(&b).unwrap();
        assert_ne!(ga.fingerprint(), gb.fingerprint());
    }

    #[test]
    fn intrinsic_usage_requires_commit_relayout() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("intrinsic.w + 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        assert!(graph.requires_commit_relayout());
        assert_eq!(graph.intrinsic_instances().len(), 1);
    }

    #[test]
    fn ref_to_plain_value_requires_commit_relayout() {
        // sidebar's width is a plain number prop, not an expression.
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "sidebar").prop("width", 20))
                .child(VNode::column().prop("width", expr("parent.w - #sidebar.w"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        assert!(graph.requires_commit_relayout());
    }

    #[test]
    fn expression_only_graph_does_not_require_commit_relayout() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "sidebar").prop("width", expr("20")))
                .child(VNode::column().prop("width", expr("parent.w - #sidebar.w"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        assert!(!graph.requires_commit_relayout());
    }

    #[test]
    fn self_cycle_reported() {
        let root = commit(
            VNode::row().child(VNode::column().prop("id", "x").prop("width", expr("#x.h")).prop("height", expr("#x.w"))),
        );
        let err = build_constraint_graph(&root).unwrap_err();
        assert!(matches!(err, ConstraintError::Circular { .. }));
    }
}
