//! The layout engine.
//!
//! Sizes come from three places, in precedence order: resolved constraint
//! values, literal numeric props, and intrinsic measurement. Containers lay
//! children along their main axis with gap, margins, flex distribution, and
//! alignment; `overflow: "scroll"` containers clamp scroll offsets and
//! translate children. Overlay kinds (modal, dropdown) are taken out of the
//! flow and positioned against their anchor.

use std::rc::Rc;

use unicode_width::UnicodeWidthStr;

use crate::commit::{Instance, InstanceId};
use crate::constraint::{ConstraintProperty, ResolvedValues};
use crate::constraint::resolver::ResolvedMap;
use crate::error::{Result, ReziCoreError};
use crate::geometry::Rect;
use crate::layout::scroll::ScrollMeta;
use crate::layout::{Axis, LayoutNode, LayoutTree};
use crate::vnode::{NodeKind, PropValue, VNode};

/// Dimension props that must never be percentage strings.
const DIMENSION_PROPS: &[(&str, ConstraintProperty)] = &[
    ("width", ConstraintProperty::Width),
    ("height", ConstraintProperty::Height),
    ("minWidth", ConstraintProperty::MinWidth),
    ("maxWidth", ConstraintProperty::MaxWidth),
    ("minHeight", ConstraintProperty::MinHeight),
    ("maxHeight", ConstraintProperty::MaxHeight),
    ("flexBasis", ConstraintProperty::FlexBasis),
];

/// Stateless layout engine.
#[derive(Debug, Default)]
pub struct LayoutEngine;

impl LayoutEngine {
    /// Create a layout engine.
    pub fn new() -> Self {
        Self
    }

    /// Lay out a committed tree into the given box.
    ///
    /// `axis` is the flow direction used for kinds without an inherent one.
    /// Fatal prop errors abort the frame.
    pub fn layout(
        &self,
        root: &Rc<Instance>,
        x: i32,
        y: i32,
        max_w: i32,
        max_h: i32,
        axis: Axis,
        resolved: &ResolvedMap,
    ) -> Result<LayoutTree> {
        let ctx = Ctx { resolved };
        let (w, h) = node_size(root, &ctx)?;
        let rect = Rect::new(x, y, w.min(max_w), h.min(max_h));
        let root_node = place(root, rect, axis, &ctx)?;
        Ok(LayoutTree { root: root_node })
    }
}

/// Measure the intrinsic (content-driven) size of an instance subtree.
///
/// Intrinsic measurement ignores constraint expressions; it reports the
/// natural size of the widget's own content.
pub fn measure_intrinsic(instance: &Rc<Instance>) -> (i32, i32) {
    let vnode = instance.vnode();
    match vnode.kind() {
        NodeKind::Text => measure_text(vnode),
        NodeKind::Button => {
            let label = vnode.get_str("label").unwrap_or_default();
            (label.width() as i32 + 4, 1)
        }
        NodeKind::Input => {
            let value = vnode.get_str("value").unwrap_or_default();
            let placeholder = vnode.get_str("placeholder").unwrap_or_default();
            let w = (value.width().max(placeholder.width()) as i32 + 1).max(1);
            (w, 1)
        }
        NodeKind::Spacer => (0, 0),
        kind => {
            let axis = flow_axis(kind);
            let gap = prop_f64(vnode, "gap").unwrap_or(0.0).max(0.0) as i32;
            let mut main = 0i32;
            let mut cross = 0i32;
            let mut counted = 0;
            for child in instance.children() {
                if is_overlay(child.vnode().kind()) || hidden_by_prop(child.vnode()) {
                    continue;
                }
                let (cw, ch) = measure_outer(child);
                let (cm, cc) = match axis {
                    Axis::Horizontal => (cw, ch),
                    Axis::Vertical => (ch, cw),
                };
                main += cm;
                cross = cross.max(cc);
                counted += 1;
            }
            if counted > 1 {
                main += gap * (counted - 1);
            }
            let (pl, pt, pr, pb) = padding_of(vnode);
            let (bl, bt, br, bb) = border_of(vnode);
            let (w, h) = match axis {
                Axis::Horizontal => (main, cross),
                Axis::Vertical => (cross, main),
            };
            (w + pl + pr + bl + br, h + pt + pb + bt + bb)
        }
    }
}

/// Intrinsic size plus horizontal/vertical margins.
fn measure_outer(instance: &Rc<Instance>) -> (i32, i32) {
    let (w, h) = measure_intrinsic(instance);
    let (ml, mt, mr, mb) = margins_of(instance.vnode());
    (w + ml + mr, h + mt + mb)
}

fn measure_text(vnode: &VNode) -> (i32, i32) {
    let content = vnode.get_str("content").unwrap_or_default();
    let wrap = vnode.get_bool("wrap").unwrap_or(false);
    let max_width = prop_f64(vnode, "maxWidth").map(|v| v.max(1.0) as i32);
    if wrap {
        if let Some(limit) = max_width {
            let lines = wrap_text(content, limit);
            let widest = lines.iter().map(|l| l.width() as i32).max().unwrap_or(0);
            return (widest.min(limit), lines.len().max(1) as i32);
        }
    }
    let w = content.width() as i32;
    let w = max_width.map_or(w, |limit| w.min(limit));
    (w, 1)
}

/// Greedy word wrap by display width.
pub(crate) fn wrap_text(content: &str, max_width: i32) -> Vec<String> {
    let max_width = max_width.max(1) as usize;
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for word in content.split_whitespace() {
        let word_width = word.width();
        if current_width == 0 {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

struct Ctx<'a> {
    resolved: &'a ResolvedMap,
}

impl Ctx<'_> {
    fn resolved_of(&self, instance: InstanceId) -> Option<&ResolvedValues> {
        self.resolved.get(&instance)
    }
}

fn flow_axis(kind: NodeKind) -> Axis {
    match kind {
        NodeKind::Row => Axis::Horizontal,
        _ => Axis::Vertical,
    }
}

fn is_overlay(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Modal | NodeKind::Dropdown)
}

fn prop_f64(vnode: &VNode, name: &str) -> Option<f64> {
    vnode.get_number(name)
}

/// Numeric dimension with percentage-string rejection.
fn dimension(
    instance: InstanceId,
    vnode: &VNode,
    name: &str,
    property: ConstraintProperty,
    ctx: &Ctx<'_>,
) -> Result<Option<i32>> {
    if let Some(values) = ctx.resolved_of(instance) {
        if let Some(value) = values.get(property) {
            return Ok(Some(value.round() as i32));
        }
    }
    match vnode.props().get(name) {
        Some(PropValue::Number(n)) => Ok(Some(n.round() as i32)),
        Some(PropValue::Str(s)) => Err(ReziCoreError::InvalidProps(format!(
            "{name}: percentage and string sizes are not supported (got {s:?}); use a sizing expression"
        ))),
        Some(PropValue::Expr(_)) | Some(PropValue::Bool(_)) | None => Ok(None),
    }
}

fn hidden(instance: &Rc<Instance>, ctx: &Ctx<'_>) -> bool {
    if let Some(values) = ctx.resolved_of(instance.id()) {
        if let Some(display) = values.display {
            return display == 0.0;
        }
    }
    hidden_by_prop(instance.vnode())
}

fn hidden_by_prop(vnode: &VNode) -> bool {
    vnode.get_number("display") == Some(0.0)
}

fn margins_of(vnode: &VNode) -> (i32, i32, i32, i32) {
    let all = prop_f64(vnode, "margin").unwrap_or(0.0) as i32;
    let ml = prop_f64(vnode, "ml").map_or(all, |v| v as i32);
    let mt = prop_f64(vnode, "mt").map_or(all, |v| v as i32);
    let mr = prop_f64(vnode, "mr").map_or(all, |v| v as i32);
    let mb = prop_f64(vnode, "mb").map_or(all, |v| v as i32);
    (ml, mt, mr, mb)
}

fn padding_of(vnode: &VNode) -> (i32, i32, i32, i32) {
    let all = prop_f64(vnode, "padding").unwrap_or(0.0).max(0.0) as i32;
    let pl = prop_f64(vnode, "pl").map_or(all, |v| v.max(0.0) as i32);
    let pt = prop_f64(vnode, "pt").map_or(all, |v| v.max(0.0) as i32);
    let pr = prop_f64(vnode, "pr").map_or(all, |v| v.max(0.0) as i32);
    let pb = prop_f64(vnode, "pb").map_or(all, |v| v.max(0.0) as i32);
    (pl, pt, pr, pb)
}

/// Border reservation per side: 1 cell for `single`/`double`, 0 for `none`.
fn border_of(vnode: &VNode) -> (i32, i32, i32, i32) {
    let style = vnode.get_str("border").unwrap_or("none");
    let base = i32::from(style != "none");
    let side = |name: &str| -> i32 {
        match vnode.props().get(name) {
            Some(PropValue::Bool(b)) => i32::from(*b),
            Some(PropValue::Str(s)) => i32::from(s != "none"),
            _ => base,
        }
    };
    (
        side("borderLeft"),
        side("borderTop"),
        side("borderRight"),
        side("borderBottom"),
    )
}

/// Decide a node's outer size.
///
/// Precedence per axis: resolved constraint value, literal numeric prop,
/// intrinsic measurement. Flow parents may still stretch the cross axis of
/// unsized containers afterwards.
fn node_size(instance: &Rc<Instance>, ctx: &Ctx<'_>) -> Result<(i32, i32)> {
    let vnode = instance.vnode();
    check_string_dimensions(vnode)?;

    let width = dimension(instance.id(), vnode, "width", ConstraintProperty::Width, ctx)?;
    let height = dimension(instance.id(), vnode, "height", ConstraintProperty::Height, ctx)?;

    let (iw, ih) = if width.is_none() || height.is_none() {
        measure_intrinsic(instance)
    } else {
        (0, 0)
    };

    let mut w = width.unwrap_or(iw);
    let mut h = height.unwrap_or(ih);

    // min/max clamps. Inverted bounds on props are rejected outright; only
    // the clamp() expression keeps its hi-wins arithmetic.
    let min_w = dimension(instance.id(), vnode, "minWidth", ConstraintProperty::MinWidth, ctx)?;
    let max_w = dimension(instance.id(), vnode, "maxWidth", ConstraintProperty::MaxWidth, ctx)?;
    let min_h = dimension(instance.id(), vnode, "minHeight", ConstraintProperty::MinHeight, ctx)?;
    let max_h = dimension(instance.id(), vnode, "maxHeight", ConstraintProperty::MaxHeight, ctx)?;
    if let (Some(min), Some(max)) = (min_w, max_w) {
        if min > max {
            return Err(ReziCoreError::InvalidProps(format!(
                "minWidth {min} exceeds maxWidth {max}"
            )));
        }
    }
    if let (Some(min), Some(max)) = (min_h, max_h) {
        if min > max {
            return Err(ReziCoreError::InvalidProps(format!(
                "minHeight {min} exceeds maxHeight {max}"
            )));
        }
    }
    if let Some(min) = min_w {
        w = w.max(min);
    }
    if let Some(max) = max_w {
        w = w.min(max);
    }
    if let Some(min) = min_h {
        h = h.max(min);
    }
    if let Some(max) = max_h {
        h = h.min(max);
    }

    Ok((w.max(0), h.max(0)))
}

fn check_string_dimensions(vnode: &VNode) -> Result<()> {
    for (name, _) in DIMENSION_PROPS {
        if let Some(PropValue::Str(s)) = vnode.props().get(*name) {
            return Err(ReziCoreError::InvalidProps(format!(
                "{name}: percentage and string sizes are not supported (got {s:?}); use a sizing expression"
            )));
        }
    }
    Ok(())
}

/// Lay out `instance` into the already-decided `rect`.
fn place(instance: &Rc<Instance>, rect: Rect, axis_hint: Axis, ctx: &Ctx<'_>) -> Result<LayoutNode> {
    let vnode = instance.vnode();
    let kind = vnode.kind();

    let overflow = vnode.get_str("overflow");
    if overflow == Some("scroll") && !kind.is_container() {
        return Err(ReziCoreError::InvalidProps(format!(
            "overflow: \"scroll\" is only valid on containers, not {}",
            kind.as_str()
        )));
    }

    let mut node = LayoutNode {
        instance: instance.id(),
        vnode: Rc::clone(vnode),
        rect,
        meta: None,
        children: Vec::new(),
    };

    if !kind.is_container() {
        return Ok(node);
    }

    let (pl, pt, pr, pb) = padding_of(vnode);
    let (bl, bt, br, bb) = border_of(vnode);
    let inner = rect.inset(pl + bl, pt + bt, pr + br, pb + bb);

    match kind {
        NodeKind::Grid => {
            node.children = layout_grid(instance, inner, ctx)?;
        }
        NodeKind::SplitPane => {
            node.children = layout_split_pane(instance, inner, ctx)?;
        }
        _ => {
            let axis = match kind {
                NodeKind::Row => Axis::Horizontal,
                NodeKind::Column
                | NodeKind::Table
                | NodeKind::Tree
                | NodeKind::VirtualList
                | NodeKind::Modal
                | NodeKind::Dropdown => Axis::Vertical,
                NodeKind::Box => axis_hint,
                _ => axis_hint,
            };
            let scroll = overflow == Some("scroll") || kind == NodeKind::VirtualList;
            let flow = layout_flow(instance, inner, axis, scroll, ctx)?;
            node.children = flow.children;
            node.meta = flow.meta;
        }
    }

    // Overlay children anchor against this node's rect.
    for child in instance.children() {
        if !is_overlay(child.vnode().kind()) || hidden(child, ctx) {
            continue;
        }
        node.children.push(layout_overlay(child, rect, ctx)?);
    }

    Ok(node)
}

struct FlowResult {
    children: Vec<LayoutNode>,
    meta: Option<ScrollMeta>,
}

/// Row/column flow with gap, margins, flex, alignment, and optional scroll.
fn layout_flow(
    instance: &Rc<Instance>,
    inner: Rect,
    axis: Axis,
    scroll: bool,
    ctx: &Ctx<'_>,
) -> Result<FlowResult> {
    let vnode = instance.vnode();
    let gap = prop_f64(vnode, "gap").unwrap_or(0.0).max(0.0) as i32;
    let justify = vnode.get_str("justify").unwrap_or("start");
    let align = vnode.get_str("align").unwrap_or("start");
    let is_tree = vnode.kind() == NodeKind::Tree;

    let (avail_main, avail_cross) = match axis {
        Axis::Horizontal => (inner.width, inner.height),
        Axis::Vertical => (inner.height, inner.width),
    };

    struct Slot {
        child: Rc<Instance>,
        main: i32,
        cross: i32,
        margins: (i32, i32, i32, i32),
        flex: f64,
        min_main: Option<i32>,
        max_main: Option<i32>,
    }

    let mut slots: Vec<Slot> = Vec::new();
    for child in instance.children() {
        let child_vnode = child.vnode();
        if is_overlay(child_vnode.kind()) || hidden(child, ctx) {
            continue;
        }
        let (w, h) = node_size(child, ctx)?;
        let (main, cross) = match axis {
            Axis::Horizontal => (w, h),
            Axis::Vertical => (h, w),
        };
        let margins = margins_of(child_vnode);
        let flex = prop_f64(child_vnode, "flex")
            .unwrap_or(if child_vnode.kind() == NodeKind::Spacer { 1.0 } else { 0.0 })
            .max(0.0);
        let basis = dimension(
            child.id(),
            child_vnode,
            "flexBasis",
            ConstraintProperty::FlexBasis,
            ctx,
        )?;
        let main = basis.unwrap_or(main);
        let (min_main, max_main) = match axis {
            Axis::Horizontal => (
                dimension(child.id(), child_vnode, "minWidth", ConstraintProperty::MinWidth, ctx)?,
                dimension(child.id(), child_vnode, "maxWidth", ConstraintProperty::MaxWidth, ctx)?,
            ),
            Axis::Vertical => (
                dimension(child.id(), child_vnode, "minHeight", ConstraintProperty::MinHeight, ctx)?,
                dimension(child.id(), child_vnode, "maxHeight", ConstraintProperty::MaxHeight, ctx)?,
            ),
        };
        slots.push(Slot {
            child: Rc::clone(child),
            main,
            cross,
            margins,
            flex,
            min_main,
            max_main,
        });
    }

    // Main-axis margins count toward consumed space.
    let consumed: i32 = slots
        .iter()
        .map(|s| {
            let (ml, mt, mr, mb) = s.margins;
            let (lead, trail) = match axis {
                Axis::Horizontal => (ml, mr),
                Axis::Vertical => (mt, mb),
            };
            s.main + lead + trail
        })
        .sum::<i32>()
        + gap * slots.len().saturating_sub(1) as i32;

    // Flex distribution when there is room left.
    let leftover = avail_main - consumed;
    let total_flex: f64 = slots.iter().map(|s| s.flex).sum();
    if leftover > 0 && total_flex > 0.0 {
        let mut remaining = leftover;
        let flexible: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.flex > 0.0)
            .map(|(i, _)| i)
            .collect();
        for (rank, &i) in flexible.iter().enumerate() {
            let share = if rank + 1 == flexible.len() {
                remaining
            } else {
                ((f64::from(leftover) * slots[i].flex / total_flex).floor() as i32).min(remaining)
            };
            let mut grown = slots[i].main + share;
            if let Some(max) = slots[i].max_main {
                grown = grown.min(max);
            }
            if let Some(min) = slots[i].min_main {
                grown = grown.max(min);
            }
            remaining -= grown - slots[i].main;
            slots[i].main = grown;
        }
    }

    // Justify offsets the whole run when space remains and nothing flexed.
    let used: i32 = slots
        .iter()
        .map(|s| {
            let (ml, mt, mr, mb) = s.margins;
            let (lead, trail) = match axis {
                Axis::Horizontal => (ml, mr),
                Axis::Vertical => (mt, mb),
            };
            s.main + lead + trail
        })
        .sum::<i32>()
        + gap * slots.len().saturating_sub(1) as i32;
    let free = (avail_main - used).max(0);
    let mut cursor = match justify {
        "center" => free / 2,
        "end" => free,
        _ => 0,
    };

    // First pass in content coordinates (origin at the content box).
    struct Placed {
        child: Rc<Instance>,
        main_offset: i32,
        cross_offset: i32,
        main: i32,
        cross: i32,
    }
    let mut placed: Vec<Placed> = Vec::new();
    let mut content_main = 0i32;
    let mut content_cross = 0i32;
    for (i, slot) in slots.iter().enumerate() {
        let (ml, mt, mr, mb) = slot.margins;
        let (lead, trail, cross_lead) = match axis {
            Axis::Horizontal => (ml, mr, mt),
            Axis::Vertical => (mt, mb, ml),
        };
        let mut cross = slot.cross;
        let self_align = slot.child.vnode().get_str("alignSelf").unwrap_or(align);
        if self_align == "stretch" || slot.child.vnode().kind().is_container() {
            // Containers stretch to the cross size unless explicitly sized.
            let cross_prop = match axis {
                Axis::Horizontal => "height",
                Axis::Vertical => "width",
            };
            let explicit = match axis {
                Axis::Horizontal => dimension(
                    slot.child.id(),
                    slot.child.vnode(),
                    cross_prop,
                    ConstraintProperty::Height,
                    ctx,
                )?,
                Axis::Vertical => dimension(
                    slot.child.id(),
                    slot.child.vnode(),
                    cross_prop,
                    ConstraintProperty::Width,
                    ctx,
                )?,
            };
            if explicit.is_none() && avail_cross > 0 {
                cross = avail_cross;
            }
        }
        // Children never exceed the container's cross size.
        if avail_cross > 0 {
            cross = cross.min(avail_cross);
        }
        let cross_free = (avail_cross - cross).max(0);
        let mut cross_offset = match self_align {
            "center" => cross_free / 2,
            "end" => cross_free,
            _ => 0,
        } + cross_lead;
        if is_tree && slot.child.vnode().kind() == NodeKind::Tree {
            // Nested trees indent under their parent.
            cross_offset += 2;
        }
        let main_offset = cursor + lead;
        content_main = content_main.max(main_offset + slot.main);
        content_cross = content_cross.max(cross_offset + cross);
        placed.push(Placed {
            child: Rc::clone(&slot.child),
            main_offset,
            cross_offset,
            main: slot.main,
            cross,
        });
        cursor = main_offset + slot.main + trail;
        if i + 1 < slots.len() {
            cursor += gap;
        }
    }

    // Scroll clamping happens in content coordinates.
    let mut meta = None;
    let (shift_x, shift_y) = if scroll {
        let (content_w, content_h) = match axis {
            Axis::Horizontal => (content_main, content_cross),
            Axis::Vertical => (content_cross, content_main),
        };
        let requested_x = prop_f64(vnode, "scrollX").unwrap_or(0.0);
        let requested_y = prop_f64(vnode, "scrollY").unwrap_or(0.0);
        let m = ScrollMeta::clamped(
            requested_x,
            requested_y,
            content_w,
            content_h,
            inner.width,
            inner.height,
        );
        let shift = (-m.scroll_x, -m.scroll_y);
        meta = Some(m);
        shift
    } else {
        (0, 0)
    };

    let mut children = Vec::with_capacity(placed.len());
    for p in placed {
        let (cx, cy, cw, chh) = match axis {
            Axis::Horizontal => (p.main_offset, p.cross_offset, p.main, p.cross),
            Axis::Vertical => (p.cross_offset, p.main_offset, p.cross, p.main),
        };
        let child_rect = Rect::new(inner.x + cx + shift_x, inner.y + cy + shift_y, cw, chh);
        // Windowed containers drop children fully outside the viewport.
        if scroll && instance.vnode().kind() == NodeKind::VirtualList {
            let viewport = inner;
            if !child_rect.intersects(&viewport) {
                continue;
            }
        }
        children.push(place(&p.child, child_rect, axis, ctx)?);
    }

    Ok(FlowResult { children, meta })
}

/// Grid track sizing.
enum Track {
    Fixed(i32),
    Fraction(f64),
}

fn parse_tracks(spec: &str) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for token in spec.split_whitespace() {
        if let Some(fr) = token.strip_suffix("fr") {
            let value: f64 = fr.parse().map_err(|_| {
                ReziCoreError::InvalidProps(format!("grid columns: bad track {token:?}"))
            })?;
            if value <= 0.0 {
                return Err(ReziCoreError::InvalidProps(format!(
                    "grid columns: track {token:?} must be positive"
                )));
            }
            tracks.push(Track::Fraction(value));
        } else {
            let value: i32 = token.parse().map_err(|_| {
                ReziCoreError::InvalidProps(format!("grid columns: bad track {token:?}"))
            })?;
            if value < 0 {
                return Err(ReziCoreError::InvalidProps(format!(
                    "grid columns: track {token:?} must not be negative"
                )));
            }
            tracks.push(Track::Fixed(value));
        }
    }
    if tracks.is_empty() {
        return Err(ReziCoreError::InvalidProps(
            "grid columns: track spec must not be empty".into(),
        ));
    }
    Ok(tracks)
}

fn grid_tracks(vnode: &VNode) -> Result<Vec<Track>> {
    match vnode.props().get("columns") {
        None => Ok(vec![Track::Fraction(1.0)]),
        Some(PropValue::Number(n)) => {
            if *n < 1.0 || n.fract() != 0.0 {
                return Err(ReziCoreError::InvalidProps(format!(
                    "grid columns must be a positive integer (got {n})"
                )));
            }
            Ok((0..*n as usize).map(|_| Track::Fraction(1.0)).collect())
        }
        Some(PropValue::Str(spec)) => parse_tracks(spec),
        Some(PropValue::Expr(_)) => Err(ReziCoreError::InvalidProps(
            "grid columns must be a positive integer or track spec, not an expression".into(),
        )),
        Some(PropValue::Bool(_)) => Err(ReziCoreError::InvalidProps(
            "grid columns must be a positive integer or track spec".into(),
        )),
    }
}

fn layout_grid(instance: &Rc<Instance>, inner: Rect, ctx: &Ctx<'_>) -> Result<Vec<LayoutNode>> {
    let vnode = instance.vnode();
    let tracks = grid_tracks(vnode)?;
    let gap = prop_f64(vnode, "gap").unwrap_or(0.0).max(0.0) as i32;

    let cols = tracks.len() as i32;
    let fixed: i32 = tracks
        .iter()
        .map(|t| match t {
            Track::Fixed(w) => *w,
            Track::Fraction(_) => 0,
        })
        .sum();
    let total_fr: f64 = tracks
        .iter()
        .map(|t| match t {
            Track::Fraction(f) => *f,
            Track::Fixed(_) => 0.0,
        })
        .sum();
    let flexible_space = (inner.width - fixed - gap * (cols - 1)).max(0);

    let mut widths = Vec::with_capacity(tracks.len());
    let mut fr_used = 0i32;
    let fr_count = tracks
        .iter()
        .filter(|t| matches!(t, Track::Fraction(_)))
        .count();
    let mut fr_seen = 0usize;
    for track in &tracks {
        match track {
            Track::Fixed(w) => widths.push(*w),
            Track::Fraction(f) => {
                fr_seen += 1;
                let w = if fr_seen == fr_count {
                    flexible_space - fr_used
                } else {
                    (f64::from(flexible_space) * f / total_fr).floor() as i32
                };
                fr_used += w;
                widths.push(w.max(0));
            }
        }
    }

    let visible: Vec<&Rc<Instance>> = instance
        .children()
        .iter()
        .filter(|c| !is_overlay(c.vnode().kind()) && !hidden(c, ctx))
        .collect();

    let mut children = Vec::with_capacity(visible.len());
    let mut y = inner.y;
    for row in visible.chunks(tracks.len()) {
        let mut row_height = 0i32;
        let mut sized = Vec::with_capacity(row.len());
        for (col, child) in row.iter().enumerate() {
            let col_w = widths[col];
            let (_, h) = node_size(child, ctx)?;
            row_height = row_height.max(h);
            sized.push((child, col_w, h));
        }
        let mut x = inner.x;
        for (col, (child, col_w, _)) in sized.into_iter().enumerate() {
            let rect = Rect::new(x, y, col_w, row_height);
            children.push(place(child, rect, Axis::Vertical, ctx)?);
            x += col_w;
            if col + 1 < tracks.len() {
                x += gap;
            }
        }
        y += row_height + gap;
    }
    Ok(children)
}

fn layout_split_pane(
    instance: &Rc<Instance>,
    inner: Rect,
    ctx: &Ctx<'_>,
) -> Result<Vec<LayoutNode>> {
    let vnode = instance.vnode();
    let visible: Vec<&Rc<Instance>> = instance
        .children()
        .iter()
        .filter(|c| !is_overlay(c.vnode().kind()) && !hidden(c, ctx))
        .collect();
    if visible.len() > 2 {
        return Err(ReziCoreError::InvalidProps(format!(
            "splitPane expects at most two children, got {}",
            visible.len()
        )));
    }
    let ratio = prop_f64(vnode, "split").unwrap_or(0.5).clamp(0.0, 1.0);
    let horizontal = vnode.get_str("direction").unwrap_or("horizontal") != "vertical";

    let mut children = Vec::with_capacity(visible.len());
    if horizontal {
        let first_w = (f64::from(inner.width) * ratio).floor() as i32;
        let rects = [
            Rect::new(inner.x, inner.y, first_w, inner.height),
            Rect::new(inner.x + first_w, inner.y, inner.width - first_w, inner.height),
        ];
        for (child, rect) in visible.iter().zip(rects) {
            children.push(place(child, rect, Axis::Vertical, ctx)?);
        }
    } else {
        let first_h = (f64::from(inner.height) * ratio).floor() as i32;
        let rects = [
            Rect::new(inner.x, inner.y, inner.width, first_h),
            Rect::new(inner.x, inner.y + first_h, inner.width, inner.height - first_h),
        ];
        for (child, rect) in visible.iter().zip(rects) {
            children.push(place(child, rect, Axis::Vertical, ctx)?);
        }
    }
    Ok(children)
}

/// Overlays anchor against the rect of the widget that declared them:
/// modals center on it, dropdowns open below its near edge.
fn layout_overlay(instance: &Rc<Instance>, anchor: Rect, ctx: &Ctx<'_>) -> Result<LayoutNode> {
    let (w, h) = node_size(instance, ctx)?;
    let rect = match instance.vnode().kind() {
        NodeKind::Modal => {
            let w = w.min(anchor.width);
            let h = h.min(anchor.height);
            Rect::new(
                anchor.x + (anchor.width - w) / 2,
                anchor.y + (anchor.height - h) / 2,
                w,
                h,
            )
        }
        _ => Rect::new(anchor.x, anchor.bottom(), w, h),
    };
    place(instance, rect, Axis::Vertical, ctx)
}
