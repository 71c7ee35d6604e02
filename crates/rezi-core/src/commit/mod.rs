//! Reconciliation: committing VNode trees into runtime instance trees.
//!
//! The committer diffs the previous instance tree against a new VNode tree.
//! Children are paired by `key` when either side declares one, positionally
//! otherwise. Matching instances keep their `instanceId` across commits;
//! a key-preserving kind swap unmounts and remounts. Mounts are reported in
//! new-tree preorder, unmounts in old-tree preorder.

pub mod signature;

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::vnode::VNode;

/// Unique, monotonic instance identifier (int63).
pub type InstanceId = i64;

/// An identity-bearing mirror of a committed VNode.
#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    vnode: Rc<VNode>,
    children: Vec<Rc<Instance>>,
    dirty: Cell<bool>,
    self_dirty: Cell<bool>,
}

impl Instance {
    /// The stable instance id.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The VNode this instance currently mirrors.
    pub fn vnode(&self) -> &Rc<VNode> {
        &self.vnode
    }

    /// Ordered child instances.
    pub fn children(&self) -> &[Rc<Instance>] {
        &self.children
    }

    /// Whether this instance or any descendant changed in the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Whether this instance's own VNode changed in the last commit.
    pub fn is_self_dirty(&self) -> bool {
        self.self_dirty.get()
    }

    /// Clear damage flags on this instance and all descendants.
    pub fn clear_dirty(&self) {
        self.dirty.set(false);
        self.self_dirty.set(false);
        for child in &self.children {
            child.clear_dirty();
        }
    }

    /// Visit this instance and all descendants in preorder.
    pub fn walk_preorder<'a>(self: &'a Rc<Self>, visit: &mut impl FnMut(&'a Rc<Instance>)) {
        visit(self);
        for child in &self.children {
            child.walk_preorder(visit);
        }
    }

    /// Total number of instances in this subtree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(|c| c.count()).sum::<usize>()
    }

    fn collect_preorder(self: &Rc<Self>, out: &mut Vec<InstanceId>) {
        out.push(self.id);
        for child in &self.children {
            child.collect_preorder(out);
        }
    }
}

/// Options controlling a commit.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommitOptions {
    /// Collect mount/unmount id lists. Skipped when false.
    pub collect_lifecycle: bool,
}

/// Result of a commit.
#[derive(Debug)]
pub struct CommitResult {
    /// The new immutable root instance.
    pub root: Rc<Instance>,
    /// Instance ids mounted this commit, in new-tree preorder.
    pub mounted: Vec<InstanceId>,
    /// Instance ids unmounted this commit, in old-tree preorder.
    pub unmounted: Vec<InstanceId>,
}

/// Allocates instance ids and performs commits.
///
/// Ids are monotonic for the lifetime of the committer; an id is never
/// reused, even after its instance unmounts.
#[derive(Debug)]
pub struct Committer {
    next_id: InstanceId,
}

impl Default for Committer {
    fn default() -> Self {
        Self::new()
    }
}

impl Committer {
    /// Create a committer with a fresh id space.
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    fn alloc(&mut self) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Commit a VNode tree against the previous instance tree.
    pub fn commit(
        &mut self,
        prev: Option<&Rc<Instance>>,
        next: &Rc<VNode>,
        options: CommitOptions,
    ) -> CommitResult {
        let mut mounted = Vec::new();
        let (root, unmounted) = match prev {
            Some(prev_root) if prev_root.vnode.kind() == next.kind() => {
                self.reuse(prev_root, next, &mut mounted, options)
            }
            Some(prev_root) => {
                let mut unmounted = Vec::new();
                if options.collect_lifecycle {
                    prev_root.collect_preorder(&mut unmounted);
                }
                (self.mount(next, &mut mounted, options), unmounted)
            }
            None => (self.mount(next, &mut mounted, options), Vec::new()),
        };
        CommitResult {
            root,
            mounted,
            unmounted,
        }
    }

    fn mount(
        &mut self,
        vnode: &Rc<VNode>,
        mounted: &mut Vec<InstanceId>,
        options: CommitOptions,
    ) -> Rc<Instance> {
        let id = self.alloc();
        if options.collect_lifecycle {
            mounted.push(id);
        }
        let children = vnode
            .child_nodes()
            .iter()
            .map(|child| self.mount(child, mounted, options))
            .collect();
        Rc::new(Instance {
            id,
            vnode: Rc::clone(vnode),
            children,
            dirty: Cell::new(true),
            self_dirty: Cell::new(true),
        })
    }

    /// Reuse `prev` for `next` (kinds already match). Returns the new
    /// instance and the unmount ids discovered in this subtree, in old-tree
    /// preorder.
    fn reuse(
        &mut self,
        prev: &Rc<Instance>,
        next: &Rc<VNode>,
        mounted: &mut Vec<InstanceId>,
        options: CommitOptions,
    ) -> (Rc<Instance>, Vec<InstanceId>) {
        // An identical VNode reference means the whole subtree is unchanged.
        if Rc::ptr_eq(&prev.vnode, next) {
            return (Rc::clone(prev), Vec::new());
        }

        let pairing = pair_children(prev.children(), next.child_nodes());

        // New-tree walk: build children and append mounts in preorder.
        // Nested unmounts are kept per prev-child for the second pass.
        let mut new_children = Vec::with_capacity(next.child_nodes().len());
        let mut nested_unmounts: HashMap<usize, Vec<InstanceId>> = HashMap::new();
        for (new_idx, new_child) in next.child_nodes().iter().enumerate() {
            match pairing.matches[new_idx] {
                Some(prev_idx) => {
                    let prev_child = &prev.children[prev_idx];
                    let (inst, unmounts) = self.reuse(prev_child, new_child, mounted, options);
                    new_children.push(inst);
                    if !unmounts.is_empty() {
                        nested_unmounts.insert(prev_idx, unmounts);
                    }
                }
                None => {
                    new_children.push(self.mount(new_child, mounted, options));
                }
            }
        }

        // Old-tree pass: assemble unmounts in prev-children order.
        let mut unmounted = Vec::new();
        if options.collect_lifecycle {
            for (prev_idx, prev_child) in prev.children.iter().enumerate() {
                if pairing.consumed[prev_idx] {
                    if let Some(nested) = nested_unmounts.remove(&prev_idx) {
                        unmounted.extend(nested);
                    }
                } else {
                    prev_child.collect_preorder(&mut unmounted);
                }
            }
        }

        let self_dirty = !Rc::ptr_eq(&prev.vnode, next)
            && (prev.vnode.props() != next.props() || prev.vnode.kind() != next.kind());
        let children_dirty = new_children.iter().any(|c| c.is_dirty())
            || prev.children.len() != new_children.len();
        let structure_changed = prev.children.len() != new_children.len()
            || prev
                .children
                .iter()
                .zip(new_children.iter())
                .any(|(a, b)| a.id != b.id);

        (
            Rc::new(Instance {
                id: prev.id,
                vnode: Rc::clone(next),
                children: new_children,
                dirty: Cell::new(self_dirty || children_dirty || structure_changed),
                self_dirty: Cell::new(self_dirty),
            }),
            unmounted,
        )
    }
}

struct Pairing {
    /// For each new child index, the matched prev child index.
    matches: Vec<Option<usize>>,
    /// Whether each prev child was matched by some new child.
    consumed: Vec<bool>,
}

/// Pair a parent's children for reuse.
///
/// Keyed children pair by key; unkeyed children pair positionally among the
/// unkeyed. A key match with a different kind is rejected so the child
/// remounts.
fn pair_children(prev: &[Rc<Instance>], next: &[Rc<VNode>]) -> Pairing {
    let mut consumed = vec![false; prev.len()];
    let mut matches = vec![None; next.len()];

    let mut prev_by_key: HashMap<&str, usize> = HashMap::new();
    let mut prev_unkeyed: Vec<usize> = Vec::new();
    for (idx, child) in prev.iter().enumerate() {
        match child.vnode.node_key() {
            Some(key) => {
                // First occurrence wins; duplicate keys never pair twice.
                prev_by_key.entry(key).or_insert(idx);
            }
            None => prev_unkeyed.push(idx),
        }
    }

    let mut unkeyed_cursor = 0usize;
    for (new_idx, new_child) in next.iter().enumerate() {
        let candidate = match new_child.node_key() {
            Some(key) => prev_by_key.get(key).copied(),
            None => {
                let idx = prev_unkeyed.get(unkeyed_cursor).copied();
                unkeyed_cursor += 1;
                idx
            }
        };
        if let Some(prev_idx) = candidate {
            if !consumed[prev_idx] && prev[prev_idx].vnode.kind() == new_child.kind() {
                consumed[prev_idx] = true;
                matches[new_idx] = Some(prev_idx);
            }
        }
    }

    Pairing { matches, consumed }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vnode::NodeKind;

    fn lifecycle() -> CommitOptions {
        CommitOptions {
            collect_lifecycle: true,
        }
    }

    #[test]
    fn initial_commit_mounts_preorder() {
        let mut committer = Committer::new();
        let tree: Rc<VNode> = VNode::row()
            .child(VNode::column().child(VNode::text("a")))
            .child(VNode::text("b"))
            .into();
        let result = committer.commit(None, &tree, lifecycle());
        assert_eq!(result.mounted, vec![1, 2, 3, 4]);
        assert!(result.unmounted.is_empty());
        assert_eq!(result.root.count(), 4);
    }

    #[test]
    fn identical_vnode_reference_retains_subtree() {
        let mut committer = Committer::new();
        let shared: Rc<VNode> = VNode::column().child(VNode::text("kept")).into();
        let first: Rc<VNode> = VNode::row().child(Rc::clone(&shared)).into();
        let second: Rc<VNode> = VNode::row().prop("gap", 1).child(Rc::clone(&shared)).into();

        let r1 = committer.commit(None, &first, lifecycle());
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());

        assert!(r2.mounted.is_empty());
        assert!(r2.unmounted.is_empty());
        // The shared child subtree is the same allocation.
        assert!(Rc::ptr_eq(&r1.root.children()[0], &r2.root.children()[0]));
    }

    #[test]
    fn keyed_children_keep_ids_across_reorder() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row()
            .child(VNode::text("a").key("a"))
            .child(VNode::text("b").key("b"))
            .into();
        let second: Rc<VNode> = VNode::row()
            .child(VNode::text("b").key("b"))
            .child(VNode::text("a").key("a"))
            .into();

        let r1 = committer.commit(None, &first, lifecycle());
        let ids: Vec<_> = r1.root.children().iter().map(|c| c.id()).collect();

        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        let reordered: Vec<_> = r2.root.children().iter().map(|c| c.id()).collect();

        assert_eq!(reordered, vec![ids[1], ids[0]]);
        assert!(r2.mounted.is_empty());
        assert!(r2.unmounted.is_empty());
    }

    #[test]
    fn kind_swap_with_same_key_remounts() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row().child(VNode::text("x").key("k")).into();
        let second: Rc<VNode> = VNode::row().child(VNode::button("x").key("k")).into();

        let r1 = committer.commit(None, &first, lifecycle());
        let old_child = r1.root.children()[0].id();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());

        assert_eq!(r2.unmounted, vec![old_child]);
        assert_eq!(r2.mounted.len(), 1);
        assert_ne!(r2.root.children()[0].id(), old_child);
    }

    #[test]
    fn unkeyed_children_match_positionally() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row()
            .child(VNode::text("a"))
            .child(VNode::text("b"))
            .into();
        let second: Rc<VNode> = VNode::row()
            .child(VNode::text("a2"))
            .child(VNode::text("b2"))
            .into();

        let r1 = committer.commit(None, &first, lifecycle());
        let ids: Vec<_> = r1.root.children().iter().map(|c| c.id()).collect();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        let new_ids: Vec<_> = r2.root.children().iter().map(|c| c.id()).collect();

        assert_eq!(ids, new_ids);
    }

    #[test]
    fn unmounts_in_old_tree_preorder() {
        let mut committer = Committer::new();
        // Old tree: row [ colA(keyA) [ t1 ], colB(keyB) [ t2, t3 ] ]
        let first: Rc<VNode> = VNode::row()
            .child(VNode::column().key("a").child(VNode::text("t1")))
            .child(
                VNode::column()
                    .key("b")
                    .child(VNode::text("t2"))
                    .child(VNode::text("t3")),
            )
            .into();
        // New tree drops colA entirely and t3 inside colB.
        let second: Rc<VNode> = VNode::row()
            .child(VNode::column().key("b").child(VNode::text("t2")))
            .into();

        let r1 = committer.commit(None, &first, lifecycle());
        let col_a = r1.root.children()[0].id();
        let t1 = r1.root.children()[0].children()[0].id();
        let t3 = r1.root.children()[1].children()[1].id();

        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        // colA subtree (preorder) precedes the nested removal inside colB.
        assert_eq!(r2.unmounted, vec![col_a, t1, t3]);
    }

    #[test]
    fn mounted_and_unmounted_disjoint_and_counted() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row()
            .child(VNode::text("a").key("a"))
            .child(VNode::text("b").key("b"))
            .into();
        let second: Rc<VNode> = VNode::row()
            .child(VNode::text("b").key("b"))
            .child(VNode::text("c").key("c"))
            .into();

        let r1 = committer.commit(None, &first, lifecycle());
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());

        for id in &r2.mounted {
            assert!(!r2.unmounted.contains(id));
        }
        let retained = r2.root.count() - r2.mounted.len();
        assert_eq!(retained + r2.mounted.len(), r2.root.count());
        assert_eq!(retained, 2); // row + keyed "b"
    }

    #[test]
    fn lifecycle_lists_skipped_when_not_requested() {
        let mut committer = Committer::new();
        let tree: Rc<VNode> = VNode::row().child(VNode::text("a")).into();
        let result = committer.commit(None, &tree, CommitOptions::default());
        assert!(result.mounted.is_empty());
        assert!(result.unmounted.is_empty());
        assert_eq!(result.root.count(), 2);
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row().child(VNode::text("a").key("a")).into();
        let r1 = committer.commit(None, &first, lifecycle());
        let first_child = r1.root.children()[0].id();

        // Remove then re-add the same key: a fresh id must be allocated.
        let second: Rc<VNode> = VNode::row().into();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        let third: Rc<VNode> = VNode::row().child(VNode::text("a").key("a")).into();
        let r3 = committer.commit(Some(&r2.root), &third, lifecycle());

        assert!(r3.root.children()[0].id() > first_child);
    }

    #[test]
    fn dirty_flags_track_changes() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row().child(VNode::text("a")).into();
        let r1 = committer.commit(None, &first, lifecycle());
        r1.root.clear_dirty();
        assert!(!r1.root.is_dirty());

        let second: Rc<VNode> = VNode::row().child(VNode::text("b")).into();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        assert!(r2.root.is_dirty());
        assert!(!r2.root.is_self_dirty());
        assert!(r2.root.children()[0].is_self_dirty());
    }

    #[test]
    fn root_kind_change_replaces_tree() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row().child(VNode::text("a")).into();
        let r1 = committer.commit(None, &first, lifecycle());
        let old_ids: Vec<_> = {
            let mut ids = Vec::new();
            r1.root.collect_preorder(&mut ids);
            ids
        };

        let second: Rc<VNode> = VNode::column().child(VNode::text("a")).into();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        assert_eq!(r2.unmounted, old_ids);
        assert_eq!(r2.mounted.len(), 2);
    }

    #[test]
    fn duplicate_keys_pair_first_occurrence_only() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row()
            .child(VNode::text("x").key("dup"))
            .child(VNode::text("y").key("dup"))
            .into();
        let r1 = committer.commit(None, &first, lifecycle());

        let second: Rc<VNode> = VNode::row().child(VNode::text("z").key("dup")).into();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());

        // One of the duplicates is reused, the other unmounts.
        assert_eq!(r2.root.children().len(), 1);
        assert_eq!(r2.unmounted.len(), 1);
        assert!(r2.mounted.is_empty());
    }

    #[test]
    fn reorder_marks_parent_dirty() {
        let mut committer = Committer::new();
        let first: Rc<VNode> = VNode::row()
            .child(VNode::text("a").key("a"))
            .child(VNode::text("b").key("b"))
            .into();
        let r1 = committer.commit(None, &first, lifecycle());
        r1.root.clear_dirty();

        let second: Rc<VNode> = VNode::row()
            .child(VNode::text("b").key("b"))
            .child(VNode::text("a").key("a"))
            .into();
        let r2 = committer.commit(Some(&r1.root), &second, lifecycle());
        assert!(r2.root.is_dirty());
    }

    #[test]
    fn kind_accessor() {
        let mut committer = Committer::new();
        let tree: Rc<VNode> = VNode::button("ok").into();
        let result = committer.commit(None, &tree, CommitOptions::default());
        assert_eq!(result.root.vnode().kind(), NodeKind::Button);
    }
}
