//! Rendering: layout tree to drawlist.
//!
//! A depth-first walk over the layout tree. Containers push a clip over
//! their inner rect, fill their background, draw children, draw border
//! glyphs, then pop the clip. Scrollable containers clip to their viewport;
//! layout has already translated the children. Mixed-style text (an input's
//! value plus its cursor cell) is emitted as a text-run blob.

use unicode_width::UnicodeWidthStr;

use crate::drawlist::{DrawlistBuilder, PackedStyle, attrs, pack_rgb};
use crate::geometry::Rect;
use crate::layout::engine::wrap_text;
use crate::layout::{LayoutNode, LayoutTree};
use crate::vnode::{NodeKind, VNode};

/// Stateless drawlist renderer.
#[derive(Debug, Default)]
pub struct Renderer;

impl Renderer {
    /// Create a renderer.
    pub fn new() -> Self {
        Self
    }

    /// Render a layout tree into the builder, starting from a clear surface.
    ///
    /// Errors latch inside the builder; the caller inspects it after.
    pub fn render(&self, tree: &LayoutTree, builder: &mut DrawlistBuilder) {
        builder.clear();
        render_node(&tree.root, builder);
    }
}

fn render_node(node: &LayoutNode, builder: &mut DrawlistBuilder) {
    if node.rect.is_empty() {
        return;
    }
    let vnode = &node.vnode;
    let style = style_of(vnode);

    match vnode.kind() {
        NodeKind::Text => {
            fill_background(node, style, builder);
            render_text(node, style, builder);
            return;
        }
        NodeKind::Button => {
            fill_background(node, style, builder);
            let label = vnode.get_str("label").unwrap_or_default();
            let style = if vnode.get_bool("focused").unwrap_or(false) {
                style.with_attrs(style.attrs | attrs::INVERSE)
            } else {
                style
            };
            builder.draw_text(node.rect.x, node.rect.y, &format!("[ {label} ]"), style);
            return;
        }
        NodeKind::Input => {
            fill_background(node, style, builder);
            render_input(node, style, builder);
            return;
        }
        NodeKind::Spacer => return,
        _ => {}
    }

    // Containers emit PushClip over the inner rect, then background,
    // children, border glyphs, PopClip. Scroll viewports use the
    // already-translated child rects from layout.
    let (bl, bt, br, bb) = border_sides(vnode);
    let has_border = bl + bt + br + bb > 0;
    let inner = node.rect.inset(bl, bt, br, bb);
    let scrolled = node.meta.is_some();
    let clip = has_border || scrolled;
    if clip {
        builder.push_clip(inner.x, inner.y, inner.width, inner.height);
    }
    fill_background(node, style, builder);
    for child in &node.children {
        render_node(child, builder);
    }
    if has_border {
        render_border(node.rect, vnode, style, builder);
    }
    if clip {
        builder.pop_clip();
    }
}

fn fill_background(node: &LayoutNode, style: PackedStyle, builder: &mut DrawlistBuilder) {
    if node.vnode.get_str("bg").is_some() {
        builder.fill_rect(
            node.rect.x,
            node.rect.y,
            node.rect.width,
            node.rect.height,
            style,
        );
    }
}

fn render_text(node: &LayoutNode, style: PackedStyle, builder: &mut DrawlistBuilder) {
    let vnode = &node.vnode;
    let content = vnode.get_str("content").unwrap_or_default();
    if content.is_empty() {
        return;
    }
    if vnode.get_bool("wrap").unwrap_or(false) && node.rect.width > 0 {
        let lines = wrap_text(content, node.rect.width);
        for (i, line) in lines.iter().enumerate() {
            if i as i32 >= node.rect.height {
                break;
            }
            builder.draw_text(node.rect.x, node.rect.y + i as i32, line, style);
        }
        return;
    }
    builder.draw_text(node.rect.x, node.rect.y, content, style);
}

/// An input renders its value plus an inverse cursor cell as one run.
fn render_input(node: &LayoutNode, style: PackedStyle, builder: &mut DrawlistBuilder) {
    let vnode = &node.vnode;
    let value = vnode.get_str("value").unwrap_or_default();
    let focused = vnode.get_bool("focused").unwrap_or(false);

    if value.is_empty() && !focused {
        let placeholder = vnode.get_str("placeholder").unwrap_or_default();
        if !placeholder.is_empty() {
            builder.draw_text(
                node.rect.x,
                node.rect.y,
                placeholder,
                style.with_attrs(style.attrs | attrs::DIM),
            );
        }
        return;
    }

    if focused {
        let cursor_style = style.with_attrs(style.attrs | attrs::INVERSE);
        let mut segments: Vec<(PackedStyle, &str)> = Vec::new();
        if !value.is_empty() {
            segments.push((style, value));
        }
        segments.push((cursor_style, " "));
        if let Some(blob) = builder.add_text_run_blob(&segments) {
            builder.draw_text_run(node.rect.x, node.rect.y, blob);
        }
        return;
    }
    builder.draw_text(node.rect.x, node.rect.y, value, style);
}

fn render_border(rect: Rect, vnode: &VNode, style: PackedStyle, builder: &mut DrawlistBuilder) {
    let double = vnode.get_str("border") == Some("double");
    let (h, v, tl, tr, bl_c, br_c) = if double {
        ('═', '║', '╔', '╗', '╚', '╝')
    } else {
        ('─', '│', '┌', '┐', '└', '┘')
    };
    let (left, top, right, bottom) = border_sides(vnode);
    let w = rect.width as usize;
    if w == 0 || rect.height == 0 {
        return;
    }

    if top > 0 {
        let mut line = String::with_capacity(w * 3);
        line.push(if left > 0 { tl } else { h });
        for _ in 0..w.saturating_sub(2) {
            line.push(h);
        }
        if w > 1 {
            line.push(if right > 0 { tr } else { h });
        }
        builder.draw_text(rect.x, rect.y, &line, style);
    }
    if bottom > 0 && rect.height > 1 {
        let mut line = String::with_capacity(w * 3);
        line.push(if left > 0 { bl_c } else { h });
        for _ in 0..w.saturating_sub(2) {
            line.push(h);
        }
        if w > 1 {
            line.push(if right > 0 { br_c } else { h });
        }
        builder.draw_text(rect.x, rect.bottom() - 1, &line, style);
    }
    let body_top = rect.y + i32::from(top > 0);
    let body_bottom = rect.bottom() - i32::from(bottom > 0);
    for y in body_top..body_bottom {
        if left > 0 {
            builder.draw_text(rect.x, y, &v.to_string(), style);
        }
        if right > 0 && rect.width > 1 {
            builder.draw_text(rect.right() - 1, y, &v.to_string(), style);
        }
    }
}

fn border_sides(vnode: &VNode) -> (i32, i32, i32, i32) {
    let style = vnode.get_str("border").unwrap_or("none");
    let base = i32::from(style != "none");
    let side = |name: &str| -> i32 {
        match vnode.props().get(name) {
            Some(crate::vnode::PropValue::Bool(b)) => i32::from(*b),
            Some(crate::vnode::PropValue::Str(s)) => i32::from(s != "none"),
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

/// Read the style props of a VNode into a packed style.
fn style_of(vnode: &VNode) -> PackedStyle {
    let fg = vnode
        .get_str("fg")
        .and_then(parse_color)
        .unwrap_or(0x00ff_ffff);
    let bg = vnode.get_str("bg").and_then(parse_color).unwrap_or(0);
    let mut bits = 0u32;
    let mut flag = |name: &str, bit: u32| {
        if vnode.get_bool(name).unwrap_or(false) {
            bits |= bit;
        }
    };
    flag("bold", attrs::BOLD);
    flag("italic", attrs::ITALIC);
    flag("underline", attrs::UNDERLINE);
    flag("inverse", attrs::INVERSE);
    flag("dim", attrs::DIM);
    flag("strikethrough", attrs::STRIKETHROUGH);
    flag("overline", attrs::OVERLINE);
    flag("blink", attrs::BLINK);
    PackedStyle { fg, bg, attrs: bits }
}

/// Parse `#rgb`, `#rrggbb`, or a small set of named colors.
fn parse_color(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix('#') {
        return match hex.len() {
            3 => {
                let value = u32::from_str_radix(hex, 16).ok()?;
                let r = (value >> 8) & 0xf;
                let g = (value >> 4) & 0xf;
                let b = value & 0xf;
                Some(((r * 17) << 16) | ((g * 17) << 8) | (b * 17))
            }
            6 => u32::from_str_radix(hex, 16).ok(),
            _ => None,
        };
    }
    let named = match text {
        "black" => pack_rgb(0, 0, 0),
        "red" => pack_rgb(0xcd, 0, 0),
        "green" => pack_rgb(0, 0xcd, 0),
        "yellow" => pack_rgb(0xcd, 0xcd, 0),
        "blue" => pack_rgb(0, 0, 0xee),
        "magenta" => pack_rgb(0xcd, 0, 0xcd),
        "cyan" => pack_rgb(0, 0xcd, 0xcd),
        "white" => pack_rgb(0xe5, 0xe5, 0xe5),
        _ => return None,
    };
    Some(named)
}

/// Display width helper used by renderer consumers.
pub fn display_width(text: &str) -> i32 {
    text.width() as i32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::commit::{CommitOptions, Committer};
    use crate::constraint::{build_constraint_graph, resolve_constraints};
    use crate::constraint::resolver::{ResolveOptions, ViewportSize};
    use crate::drawlist::{DrawCommand, parse_drawlist};
    use crate::layout::{Axis, LayoutEngine};
    use crate::vnode::VNode;

    fn render_tree(tree: VNode, w: i32, h: i32) -> crate::drawlist::Drawlist {
        let root = Committer::new()
            .commit(None, &Rc::new(tree), CommitOptions::default())
            .root;
        let graph = build_constraint_graph(&root).unwrap();
        let resolved = resolve_constraints(
            &graph,
            ViewportSize::new(f64::from(w), f64::from(h)),
            ResolveOptions::default(),
            None,
        );
        let layout = LayoutEngine::new()
            .layout(&root, 0, 0, w, h, Axis::Vertical, &resolved.values)
            .unwrap();
        let mut builder = DrawlistBuilder::new();
        Renderer::new().render(&layout, &mut builder);
        parse_drawlist(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn starts_with_clear() {
        let parsed = render_tree(VNode::text("hi"), 80, 24);
        assert_eq!(parsed.commands[0], DrawCommand::Clear);
    }

    #[test]
    fn text_emits_draw_text() {
        let parsed = render_tree(VNode::text("hello"), 80, 24);
        assert!(parsed.strings.contains(&"hello".to_owned()));
    }

    #[test]
    fn background_fills_rect() {
        let parsed = render_tree(
            VNode::row().prop("width", 10).prop("height", 2).prop("bg", "#102030"),
            80,
            24,
        );
        assert!(parsed.commands.iter().any(|c| matches!(
            c,
            DrawCommand::FillRect {
                w: 10,
                h: 2,
                style,
                ..
            } if style.bg == 0x0010_2030
        )));
    }

    #[test]
    fn bordered_container_clips_and_draws_border() {
        let parsed = render_tree(
            VNode::boxed()
                .prop("width", 6)
                .prop("height", 3)
                .prop("border", "single")
                .prop("bg", "#000000")
                .child(VNode::text("x")),
            80,
            24,
        );
        let pushes = parsed
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::PushClip { .. }))
            .count();
        let pops = parsed
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::PopClip))
            .count();
        assert_eq!(pushes, 1);
        assert_eq!(pushes, pops);
        // Top border line.
        assert!(parsed.strings.iter().any(|s| s.starts_with('┌')));

        // Command order: PushClip, background, children, border, PopClip.
        let pos = |pred: &dyn Fn(&DrawCommand) -> bool| {
            parsed.commands.iter().position(|c| pred(c)).unwrap()
        };
        let push = pos(&|c| matches!(c, DrawCommand::PushClip { .. }));
        let fill = pos(&|c| matches!(c, DrawCommand::FillRect { .. }));
        let top_border_index = parsed
            .strings
            .iter()
            .position(|s| s.starts_with('┌'))
            .unwrap() as u32;
        let border = pos(&|c| {
            matches!(c, DrawCommand::DrawText { string_index, .. } if *string_index == top_border_index)
        });
        let child_index = parsed.strings.iter().position(|s| s == "x").unwrap() as u32;
        let child = pos(&|c| {
            matches!(c, DrawCommand::DrawText { string_index, .. } if *string_index == child_index)
        });
        let pop = pos(&|c| matches!(c, DrawCommand::PopClip));
        assert!(push < fill);
        assert!(fill < child);
        assert!(child < border);
        assert!(border < pop);
    }

    #[test]
    fn scroll_container_clips_to_viewport() {
        let parsed = render_tree(
            VNode::row()
                .prop("width", 5)
                .prop("overflow", "scroll")
                .prop("scrollX", 2)
                .child(VNode::text("123456789")),
            80,
            24,
        );
        let clip = parsed.commands.iter().find_map(|c| match c {
            DrawCommand::PushClip { x, y, w, h } => Some((*x, *y, *w, *h)),
            _ => None,
        });
        assert_eq!(clip, Some((0, 0, 5, 1)));
        // The text is translated left by the scroll offset.
        assert!(parsed.commands.iter().any(|c| matches!(
            c,
            DrawCommand::DrawText { x: -2, .. }
        )));
    }

    #[test]
    fn focused_input_emits_text_run() {
        let parsed = render_tree(
            VNode::new(crate::vnode::NodeKind::Input)
                .prop("value", "abc")
                .prop("focused", true),
            80,
            24,
        );
        let run = parsed.commands.iter().find_map(|c| match c {
            DrawCommand::DrawTextRun { blob_index, .. } => Some(*blob_index),
            _ => None,
        });
        let blob_index = run.unwrap();
        let segments = crate::drawlist::parse_text_run(&parsed.blobs[blob_index as usize]).unwrap();
        assert_eq!(segments.len(), 2);
        assert_ne!(segments[0].style.attrs & attrs::INVERSE, attrs::INVERSE);
        assert_eq!(segments[1].style.attrs & attrs::INVERSE, attrs::INVERSE);
    }

    #[test]
    fn style_attrs_pack_bits() {
        let vnode = VNode::text("x")
            .prop("bold", true)
            .prop("underline", true)
            .prop("dim", true);
        let style = style_of(&vnode);
        assert_eq!(
            style.attrs,
            attrs::BOLD | attrs::UNDERLINE | attrs::DIM
        );
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_color("#ff0000"), Some(0x00ff_0000));
        assert_eq!(parse_color("#f00"), Some(0x00ff_0000));
        assert_eq!(parse_color("red"), Some(pack_rgb(0xcd, 0, 0)));
        assert_eq!(parse_color("#nope"), None);
    }

    #[test]
    fn hidden_subtree_not_rendered() {
        let parsed = render_tree(
            VNode::column()
                .prop("width", 10)
                .prop("height", 2)
                .child(VNode::text("shown"))
                .child(VNode::text("hidden").prop("display", 0)),
            80,
            24,
        );
        assert!(parsed.strings.contains(&"shown".to_owned()));
        assert!(!parsed.strings.contains(&"hidden".to_owned()));
    }
}
