//! Topological evaluation of the constraint graph.
//!
//! Nodes are processed in the graph's deterministic order, so every
//! dependency is resolved before its consumers read it. Arithmetic is
//! float; non-finite results (division by zero, NaN, infinities) coerce to
//! zero. A target whose `display` resolved to zero reads as zero through
//! every reference.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::commit::InstanceId;
use crate::constraint::graph::{ConstraintGraph, ConstraintProperty, NodeKey};
use crate::expr::{BinaryOp, CompareOp, Expr, Func, Ref, RefProp, RefScope, UnaryOp};
use crate::hash::Fnv64;

/// Viewport dimensions fed into resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportSize {
    /// Width in cells.
    pub width: f64,
    /// Height in rows.
    pub height: f64,
}

impl ViewportSize {
    /// Create a viewport size.
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Resolved values for one instance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolvedValues {
    /// Resolved `width`, if expression-driven.
    pub width: Option<f64>,
    /// Resolved `height`, if expression-driven.
    pub height: Option<f64>,
    /// Resolved `minWidth`, if expression-driven.
    pub min_width: Option<f64>,
    /// Resolved `maxWidth`, if expression-driven.
    pub max_width: Option<f64>,
    /// Resolved `minHeight`, if expression-driven.
    pub min_height: Option<f64>,
    /// Resolved `maxHeight`, if expression-driven.
    pub max_height: Option<f64>,
    /// Resolved `flexBasis`, if expression-driven.
    pub flex_basis: Option<f64>,
    /// Resolved `display`, if expression-driven.
    pub display: Option<f64>,
}

impl ResolvedValues {
    /// Read a property.
    pub fn get(&self, property: ConstraintProperty) -> Option<f64> {
        match property {
            ConstraintProperty::Width => self.width,
            ConstraintProperty::Height => self.height,
            ConstraintProperty::MinWidth => self.min_width,
            ConstraintProperty::MaxWidth => self.max_width,
            ConstraintProperty::MinHeight => self.min_height,
            ConstraintProperty::MaxHeight => self.max_height,
            ConstraintProperty::FlexBasis => self.flex_basis,
            ConstraintProperty::Display => self.display,
        }
    }

    fn set(&mut self, property: ConstraintProperty, value: f64) {
        let slot = match property {
            ConstraintProperty::Width => &mut self.width,
            ConstraintProperty::Height => &mut self.height,
            ConstraintProperty::MinWidth => &mut self.min_width,
            ConstraintProperty::MaxWidth => &mut self.max_width,
            ConstraintProperty::MinHeight => &mut self.min_height,
            ConstraintProperty::MaxHeight => &mut self.max_height,
            ConstraintProperty::FlexBasis => &mut self.flex_basis,
            ConstraintProperty::Display => &mut self.display,
        };
        *slot = Some(value);
    }
}

/// Map from instance to its resolved values.
pub type ResolvedMap = HashMap<InstanceId, ResolvedValues>;

/// Inputs to resolution beyond the graph itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions<'a> {
    /// Per-instance parent content sizes (`parent.w` / `parent.h`).
    /// Instances without an entry fall back to the viewport.
    pub parent_values: Option<&'a HashMap<InstanceId, (f64, f64)>>,
    /// Measured intrinsic sizes (`intrinsic.w` / `intrinsic.h`).
    pub intrinsic_values: Option<&'a HashMap<InstanceId, (f64, f64)>>,
    /// Committed plain values for referenced properties that are not
    /// expression-driven (shared-id siblings with literal sizes).
    pub base_values: Option<&'a HashMap<(InstanceId, ConstraintProperty), f64>>,
    /// Extra cache-key discriminator.
    pub cache_key: Option<&'a str>,
}

/// Result of a resolution.
#[derive(Clone, Debug)]
pub struct ResolveOutput {
    /// Resolved values per instance. Shared with the cache: a cache hit
    /// returns the same frozen map reference.
    pub values: Rc<ResolvedMap>,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
}

/// Bounded LRU cache over resolution results.
#[derive(Debug)]
pub struct ResolveCache {
    entries: VecDeque<(u64, Rc<ResolvedMap>)>,
    capacity: usize,
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ResolveCache {
    /// Default number of retained results.
    pub const DEFAULT_CAPACITY: usize = 4;

    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: u64) -> Option<Rc<ResolvedMap>> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(pos)?;
        let value = Rc::clone(&entry.1);
        self.entries.push_front(entry);
        Some(value)
    }

    fn insert(&mut self, key: u64, value: Rc<ResolvedMap>) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((key, value));
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve every node of the graph against the viewport and inputs.
pub fn resolve_constraints(
    graph: &ConstraintGraph,
    viewport: ViewportSize,
    options: ResolveOptions<'_>,
    mut cache: Option<&mut ResolveCache>,
) -> ResolveOutput {
    let key = cache_key(graph, viewport, &options);
    if let Some(cache) = cache.as_deref_mut() {
        if let Some(values) = cache.get(key) {
            return ResolveOutput {
                values,
                cache_hit: true,
            };
        }
    }

    let mut values: ResolvedMap = HashMap::new();
    for node in graph.nodes() {
        let ctx = EvalContext {
            graph,
            viewport,
            options: &options,
            values: &values,
            instance: node.key.instance,
        };
        let value = sanitize(ctx.eval(node.expr.root()));
        values
            .entry(node.key.instance)
            .or_default()
            .set(node.key.property, value);
    }

    let values = Rc::new(values);
    if let Some(cache) = cache {
        cache.insert(key, Rc::clone(&values));
    }
    ResolveOutput {
        values,
        cache_hit: false,
    }
}

fn cache_key(graph: &ConstraintGraph, viewport: ViewportSize, options: &ResolveOptions<'_>) -> u64 {
    let mut h = Fnv64::new();
    h.write_u64(graph.fingerprint());
    h.write_u64(viewport.width.to_bits());
    h.write_u64(viewport.height.to_bits());
    h.write_u64(digest_pairs(options.parent_values));
    h.write_u64(digest_pairs(options.intrinsic_values));
    h.write_u64(digest_base(options.base_values));
    if let Some(key) = options.cache_key {
        h.write(key.as_bytes());
    }
    h.finish()
}

fn digest_pairs(map: Option<&HashMap<InstanceId, (f64, f64)>>) -> u64 {
    let Some(map) = map else { return 0 };
    // XOR fold keeps the digest independent of iteration order.
    let mut acc = 0u64;
    for (id, (w, hgt)) in map {
        let mut h = Fnv64::new();
        h.write_u64(*id as u64);
        h.write_u64(w.to_bits());
        h.write_u64(hgt.to_bits());
        acc ^= h.finish();
    }
    acc ^ 0x9e37_79b9_7f4a_7c15
}

fn digest_base(map: Option<&HashMap<(InstanceId, ConstraintProperty), f64>>) -> u64 {
    let Some(map) = map else { return 0 };
    let mut acc = 0u64;
    for ((id, property), value) in map {
        let mut h = Fnv64::new();
        h.write_u64(*id as u64);
        h.write(property.prop_name().as_bytes());
        h.write_u64(value.to_bits());
        acc ^= h.finish();
    }
    acc ^ 0x517c_c1b7_2722_0a95
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

struct EvalContext<'a> {
    graph: &'a ConstraintGraph,
    viewport: ViewportSize,
    options: &'a ResolveOptions<'a>,
    values: &'a ResolvedMap,
    instance: InstanceId,
}

impl EvalContext<'_> {
    fn eval(&self, expr: &Expr) -> f64 {
        match expr {
            Expr::Number(n) => *n,
            Expr::Ref(r) => self.eval_ref(r),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => -self.eval(expr),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                let v = match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return 0.0;
                        }
                        l / r
                    }
                    BinaryOp::Rem => {
                        if r == 0.0 {
                            return 0.0;
                        }
                        l % r
                    }
                };
                sanitize(v)
            }
            Expr::Compare { op, lhs, rhs } => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                let truth = match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Le => l <= r,
                    CompareOp::Gt => l > r,
                    CompareOp::Ge => l >= r,
                    CompareOp::Eq => l == r,
                    CompareOp::Ne => l != r,
                };
                if truth { 1.0 } else { 0.0 }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond) != 0.0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { func, args } => self.eval_call(*func, args),
        }
    }

    fn eval_ref(&self, r: &Ref) -> f64 {
        match &r.scope {
            RefScope::Viewport => match r.prop {
                RefProp::Width => self.viewport.width,
                RefProp::Height => self.viewport.height,
                RefProp::MinWidth | RefProp::MinHeight => 0.0,
            },
            RefScope::Parent => {
                let (w, h) = self
                    .options
                    .parent_values
                    .and_then(|m| m.get(&self.instance))
                    .copied()
                    .unwrap_or((self.viewport.width, self.viewport.height));
                match r.prop {
                    RefProp::Width => w,
                    RefProp::Height => h,
                    RefProp::MinWidth | RefProp::MinHeight => 0.0,
                }
            }
            RefScope::Intrinsic => {
                let (w, h) = self
                    .options
                    .intrinsic_values
                    .and_then(|m| m.get(&self.instance))
                    .copied()
                    .unwrap_or((0.0, 0.0));
                match r.prop {
                    RefProp::Width => w,
                    RefProp::Height => h,
                    RefProp::MinWidth | RefProp::MinHeight => 0.0,
                }
            }
            RefScope::Widget(id) => {
                let targets = self.graph.instances_with_id(id);
                // Graph construction guarantees exactly one target.
                let Some(&target) = targets.first() else {
                    return 0.0;
                };
                self.read_target(target, ConstraintProperty::from_ref_prop(r.prop))
            }
        }
    }

    /// Read a property on a target instance, masking to zero when the
    /// target's `display` resolved to zero.
    fn read_target(&self, target: InstanceId, property: ConstraintProperty) -> f64 {
        if self.display_of(target) == 0.0 {
            return 0.0;
        }
        let resolved = self.values.get(&target).and_then(|v| v.get(property));
        if let Some(value) = resolved {
            return value;
        }
        self.options
            .base_values
            .and_then(|m| m.get(&(target, property)))
            .copied()
            .unwrap_or(0.0)
    }

    fn display_of(&self, target: InstanceId) -> f64 {
        let key = NodeKey {
            instance: target,
            property: ConstraintProperty::Display,
        };
        if self.graph.has_node(key) {
            return self
                .values
                .get(&target)
                .and_then(|v| v.display)
                .unwrap_or(1.0);
        }
        self.options
            .base_values
            .and_then(|m| m.get(&(target, ConstraintProperty::Display)))
            .copied()
            .unwrap_or(1.0)
    }

    fn eval_call(&self, func: Func, args: &[Expr]) -> f64 {
        match func {
            Func::Clamp => {
                let x = self.eval(&args[0]);
                let lo = self.eval(&args[1]);
                let hi = self.eval(&args[2]);
                x.max(lo).min(hi)
            }
            Func::Max => args
                .iter()
                .map(|a| self.eval(a))
                .fold(f64::NEG_INFINITY, f64::max),
            Func::Min => args
                .iter()
                .map(|a| self.eval(a))
                .fold(f64::INFINITY, f64::min),
            Func::Floor => self.eval(&args[0]).floor(),
            Func::Ceil => self.eval(&args[0]).ceil(),
            Func::Abs => self.eval(&args[0]).abs(),
            Func::MaxSibling | Func::SumSibling => {
                let Some(Expr::Ref(Ref {
                    scope: RefScope::Widget(id),
                    prop,
                })) = args.first()
                else {
                    return 0.0;
                };
                let property = ConstraintProperty::from_ref_prop(*prop);
                let entries = self
                    .graph
                    .instances_with_id(id)
                    .iter()
                    .map(|&target| self.read_target(target, property));
                match func {
                    Func::MaxSibling => entries.fold(0.0, f64::max),
                    _ => entries.sum(),
                }
            }
            Func::Steps => {
                let x = self.eval(&args[0]);
                let mut best: Option<(f64, f64)> = None;
                let mut last_value = 0.0;
                for pair in args[1..].chunks_exact(2) {
                    let threshold = self.eval(&pair[0]);
                    let value = self.eval(&pair[1]);
                    last_value = value;
                    if x < threshold && best.is_none_or(|(t, _)| threshold < t) {
                        best = Some((threshold, value));
                    }
                }
                best.map_or(last_value, |(_, v)| v)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commit::{CommitOptions, Committer, Instance};
    use crate::constraint::graph::build_constraint_graph;
    use crate::expr::parse_expression;
    use crate::vnode::VNode;

    fn expr(src: &str) -> crate::expr::ParsedExpr {
        parse_expression(src).unwrap()
    }

    fn commit(tree: VNode) -> Rc<Instance> {
        Committer::new()
            .commit(None, &Rc::new(tree), CommitOptions::default())
            .root
    }

    fn resolve(root: &Rc<Instance>, viewport: (f64, f64)) -> Rc<ResolvedMap> {
        let graph = build_constraint_graph(root).unwrap();
        resolve_constraints(
            &graph,
            ViewportSize::new(viewport.0, viewport.1),
            ResolveOptions::default(),
            None,
        )
        .values
    }

    #[test]
    fn sibling_reference_resolves() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "sidebar").prop("width", expr("20")))
                .child(
                    VNode::column()
                        .prop("id", "editor")
                        .prop("width", expr("parent.w - #sidebar.w")),
                ),
        );
        let values = resolve(&root, (80.0, 20.0));
        let sidebar = root.children()[0].id();
        let editor = root.children()[1].id();
        assert_eq!(values[&sidebar].width, Some(20.0));
        assert_eq!(values[&editor].width, Some(60.0));
    }

    #[test]
    fn display_zero_masks_target_dimensions() {
        let root = commit(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("id", "sidebar")
                        .prop("width", expr("20"))
                        .prop("display", expr("0")),
                )
                .child(
                    VNode::column()
                        .prop("id", "editor")
                        .prop("width", expr("parent.w - #sidebar.w")),
                ),
        );
        let values = resolve(&root, (80.0, 20.0));
        let editor = root.children()[1].id();
        assert_eq!(values[&editor].width, Some(80.0));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let root = commit(VNode::row().child(VNode::column().prop("width", expr("10 / 0"))));
        let values = resolve(&root, (80.0, 20.0));
        let child = root.children()[0].id();
        assert_eq!(values[&child].width, Some(0.0));
    }

    #[test]
    fn non_finite_coerces_to_zero() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("(10 / 0) + viewport.w"))),
        );
        let values = resolve(&root, (80.0, 20.0));
        let child = root.children()[0].id();
        // Inner division is zero, so the sum is the viewport width.
        assert_eq!(values[&child].width, Some(80.0));
    }

    #[test]
    fn clamp_with_inverted_bounds_returns_hi() {
        let root = commit(VNode::row().child(VNode::column().prop("width", expr("clamp(50, 40, 10)"))));
        let values = resolve(&root, (80.0, 20.0));
        let child = root.children()[0].id();
        assert_eq!(values[&child].width, Some(10.0));
    }

    #[test]
    fn steps_selects_smallest_exceeding_threshold() {
        let root = commit(VNode::row().child(
            VNode::column().prop("width", expr("steps(viewport.w, 120: 30, 80: 20)")),
        ));
        // viewport.w = 60 < 80 < 120, so the 80 threshold wins.
        let values = resolve(&root, (60.0, 20.0));
        let child = root.children()[0].id();
        assert_eq!(values[&child].width, Some(20.0));
    }

    #[test]
    fn steps_falls_through_to_last_value() {
        let root = commit(VNode::row().child(
            VNode::column().prop("width", expr("steps(viewport.w, 80: 20, 120: 30)")),
        ));
        let values = resolve(&root, (200.0, 20.0));
        let child = root.children()[0].id();
        assert_eq!(values[&child].width, Some(30.0));
    }

    #[test]
    fn ternary_and_comparison() {
        let root = commit(VNode::row().child(
            VNode::column().prop("width", expr("viewport.w < 100 ? 20 : 40")),
        ));
        let values = resolve(&root, (80.0, 20.0));
        let child = root.children()[0].id();
        assert_eq!(values[&child].width, Some(20.0));
        let values = resolve(&root, (120.0, 20.0));
        assert_eq!(values[&child].width, Some(40.0));
    }

    #[test]
    fn aggregation_uses_resolved_and_base_values() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "col").prop("width", expr("15")))
                .child(VNode::column().prop("id", "col").prop("width", 25))
                .child(VNode::column().prop("width", expr("sum_sibling(#col.w)"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let plain = root.children()[1].id();
        let mut base = HashMap::new();
        base.insert((plain, ConstraintProperty::Width), 25.0);
        let out = resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions {
                base_values: Some(&base),
                ..Default::default()
            },
            None,
        );
        let agg = root.children()[2].id();
        assert_eq!(out.values[&agg].width, Some(40.0));
    }

    #[test]
    fn max_sibling_skips_hidden_targets() {
        let root = commit(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("id", "col")
                        .prop("width", expr("50"))
                        .prop("display", expr("0")),
                )
                .child(VNode::column().prop("id", "col").prop("width", expr("30")))
                .child(VNode::column().prop("width", expr("max_sibling(#col.w)"))),
        );
        let values = resolve(&root, (80.0, 20.0));
        let agg = root.children()[2].id();
        assert_eq!(values[&agg].width, Some(30.0));
    }

    #[test]
    fn cache_hit_returns_same_reference() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("viewport.w / 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let mut cache = ResolveCache::default();
        let first = resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions::default(),
            Some(&mut cache),
        );
        assert!(!first.cache_hit);
        let second = resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions::default(),
            Some(&mut cache),
        );
        assert!(second.cache_hit);
        assert!(Rc::ptr_eq(&first.values, &second.values));
    }

    #[test]
    fn viewport_change_misses_cache() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("viewport.w / 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let mut cache = ResolveCache::default();
        resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions::default(),
            Some(&mut cache),
        );
        let out = resolve_constraints(
            &graph,
            ViewportSize::new(100.0, 20.0),
            ResolveOptions::default(),
            Some(&mut cache),
        );
        assert!(!out.cache_hit);
    }

    #[test]
    fn cache_evicts_least_recent() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("viewport.w / 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let mut cache = ResolveCache::new(2);
        for w in [10.0, 20.0, 30.0] {
            resolve_constraints(
                &graph,
                ViewportSize::new(w, 20.0),
                ResolveOptions::default(),
                Some(&mut cache),
            );
        }
        assert_eq!(cache.len(), 2);
        // The oldest (w=10) was evicted.
        let out = resolve_constraints(
            &graph,
            ViewportSize::new(10.0, 20.0),
            ResolveOptions::default(),
            Some(&mut cache),
        );
        assert!(!out.cache_hit);
    }

    #[test]
    fn cache_key_override_discriminates() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("viewport.w / 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let mut cache = ResolveCache::default();
        resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions {
                cache_key: Some("pass-a"),
                ..Default::default()
            },
            Some(&mut cache),
        );
        let out = resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions {
                cache_key: Some("pass-b"),
                ..Default::default()
            },
            Some(&mut cache),
        );
        assert!(!out.cache_hit);
    }

    #[test]
    fn intrinsic_values_feed_references() {
        let root = commit(
            VNode::row().child(VNode::column().prop("width", expr("intrinsic.w + 2"))),
        );
        let graph = build_constraint_graph(&root).unwrap();
        let child = root.children()[0].id();
        let mut intrinsic = HashMap::new();
        intrinsic.insert(child, (9.0, 1.0));
        let out = resolve_constraints(
            &graph,
            ViewportSize::new(80.0, 20.0),
            ResolveOptions {
                intrinsic_values: Some(&intrinsic),
                ..Default::default()
            },
            None,
        );
        assert_eq!(out.values[&child].width, Some(11.0));
    }

    #[test]
    fn every_node_resolved_exactly_once() {
        let root = commit(
            VNode::row()
                .child(VNode::column().prop("id", "a").prop("width", expr("20")))
                .child(VNode::column().prop("id", "b").prop("width", expr("#a.w + 1")))
                .child(VNode::column().prop("id", "c").prop("width", expr("#b.w + 1"))),
        );
        let values = resolve(&root, (80.0, 20.0));
        assert_eq!(values.len(), 3);
        let c = root.children()[2].id();
        assert_eq!(values[&c].width, Some(22.0));
    }
}
