//! Pipeline benchmarks — commit, constraint resolution, layout, drawlist.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::rc::Rc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use rezi_core::commit::{CommitOptions, Committer};
use rezi_core::constraint::resolver::{ResolveOptions, ViewportSize};
use rezi_core::constraint::{ResolveCache, build_constraint_graph, resolve_constraints};
use rezi_core::drawlist::{DrawlistBuilder, PackedStyle};
use rezi_core::expr::parse_expression;
use rezi_core::layout::{Axis, LayoutEngine};
use rezi_core::render::Renderer;
use rezi_core::vnode::VNode;

fn wide_tree(rows: usize, cols: usize) -> Rc<VNode> {
    let mut root = VNode::column().prop("width", 200).prop("height", 60);
    for r in 0..rows {
        let mut row = VNode::row().key(format!("r{r}")).prop("gap", 1);
        for c in 0..cols {
            row = row.child(VNode::text(format!("cell {r}:{c}")));
        }
        root = root.child(row);
    }
    Rc::new(root)
}

/// Benchmark a full commit of a 10x10 tree.
fn benchmark_commit(c: &mut Criterion) {
    c.bench_function("commit_100_nodes", |b| {
        let tree = wide_tree(10, 10);
        b.iter(|| {
            let mut committer = Committer::new();
            black_box(committer.commit(None, &tree, CommitOptions::default()))
        })
    });
}

/// Benchmark constraint resolution with a warm cache.
fn benchmark_resolve_cached(c: &mut Criterion) {
    c.bench_function("resolve_cached", |b| {
        let tree = Rc::new(
            VNode::row()
                .child(
                    VNode::column()
                        .prop("id", "sidebar")
                        .prop("width", parse_expression("clamp(viewport.w / 4, 20, 60)").unwrap()),
                )
                .child(
                    VNode::column()
                        .prop("id", "editor")
                        .prop("width", parse_expression("parent.w - #sidebar.w").unwrap()),
                ),
        );
        let root = Committer::new()
            .commit(None, &tree, CommitOptions::default())
            .root;
        let graph = build_constraint_graph(&root).unwrap();
        let mut cache = ResolveCache::default();
        b.iter(|| {
            black_box(resolve_constraints(
                &graph,
                ViewportSize::new(200.0, 60.0),
                ResolveOptions::default(),
                Some(&mut cache),
            ))
        })
    });
}

/// Benchmark layout plus drawlist emission for a 10x10 tree.
fn benchmark_layout_and_render(c: &mut Criterion) {
    c.bench_function("layout_render_100_nodes", |b| {
        let tree = wide_tree(10, 10);
        let root = Committer::new()
            .commit(None, &tree, CommitOptions::default())
            .root;
        let resolved = std::collections::HashMap::new();
        let engine = LayoutEngine::new();
        let renderer = Renderer::new();
        b.iter(|| {
            let layout = engine
                .layout(&root, 0, 0, 200, 60, Axis::Vertical, &resolved)
                .unwrap();
            let mut builder = DrawlistBuilder::new();
            renderer.render(&layout, &mut builder);
            black_box(builder.build().unwrap())
        })
    });
}

/// Benchmark raw drawlist building.
fn benchmark_drawlist(c: &mut Criterion) {
    c.bench_function("drawlist_500_commands", |b| {
        b.iter(|| {
            let mut builder = DrawlistBuilder::new();
            builder.clear();
            for i in 0..250 {
                builder.fill_rect(0, i, 80, 1, PackedStyle::default());
                builder.draw_text(0, i, "the quick brown fox", PackedStyle::default());
            }
            black_box(builder.build().unwrap())
        })
    });
}

criterion_group!(
    benches,
    benchmark_commit,
    benchmark_resolve_cached,
    benchmark_layout_and_render,
    benchmark_drawlist
);
criterion_main!(benches);
