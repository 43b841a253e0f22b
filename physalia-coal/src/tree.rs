//! The coalescent tree: an arena of time-mapped nodes.
//!
//! Nodes live in a slot vector and are addressed by stable [`NodeId`]
//! indices; traversals are derived from the arena on demand, so structural
//! mutation (wrap, erase, reparent) never leaves a dangling iterator.
//! Erasing a node invalidates its `NodeId`; only the node `number`
//! survives as an identity until the tree is renumbered.

use std::collections::BTreeSet;

use physalia_core::{PhysaliaError, Result, Summarizable};

use crate::node::{Label, Node, NodeId};

/// A rooted, ordered, time-scaled coalescent tree.
///
/// Invariants: exactly one root; every non-root node has exactly one
/// parent; `time` is monotone non-decreasing along root-to-leaf paths and
/// equals the parent's time plus the node's `length` once finalized
/// (excluded stub branches set `length` to 0 instead).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalescentTree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    label_set: BTreeSet<Label>,
}

impl CoalescentTree {
    /// Create a tree with a single root node numbered 0.
    pub fn new() -> Self {
        let mut root = Node::new(0);
        root.id = 0;
        CoalescentTree {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: 0,
            label_set: BTreeSet::new(),
        }
    }

    /// Parse an annotated Newick string into a tree.
    ///
    /// See [`crate::newick::parse`] for the grammar.
    pub fn from_newick(input: &str) -> Result<Self> {
        crate::newick::parse(input)
    }

    /// Serialize the tree to a parenthetical Newick string.
    pub fn to_newick(&self) -> String {
        crate::newick::write(self)
    }

    // ── Access ───────────────────────────────────────────────────────

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Access a node by id, if it is alive.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    /// Mutable access to a node by id, if it is alive.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    pub(crate) fn n(&self, id: NodeId) -> &Node {
        self.slots[id].as_ref().unwrap()
    }

    pub(crate) fn n_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id].as_mut().unwrap()
    }

    /// True if `id` refers to a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Parent of a node, if any.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a node, in order.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.n(id).children
    }

    /// Total number of live nodes.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of nodes carrying the sampled-tip flag.
    pub fn leaf_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|n| n.leaf)
            .count()
    }

    // ── Traversal ────────────────────────────────────────────────────

    /// Pre-order (parent before children) node ids, as a snapshot.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.n(id).children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Post-order (children before parent) node ids, as a snapshot.
    pub fn postorder(&self) -> Vec<NodeId> {
        // Reverse of a right-first preorder.
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in &self.n(id).children {
                stack.push(child);
            }
        }
        out.reverse();
        out
    }

    /// Ids of all structurally childless nodes, in pre-order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).is_childless())
            .collect()
    }

    /// All node ids in the subtree rooted at `id` (including `id`).
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend_from_slice(&self.n(cur).children);
        }
        out
    }

    /// Number of nodes in the subtree rooted at `id`.
    pub fn subtree_size(&self, id: NodeId) -> usize {
        self.subtree_ids(id).len()
    }

    /// Number of sampled tips descended from `id` (including `id` itself).
    pub fn descendant_tip_count(&self, id: NodeId) -> usize {
        self.subtree_ids(id)
            .into_iter()
            .filter(|&d| self.n(d).leaf)
            .count()
    }

    /// Path from `id` to the root, inclusive of both ends.
    pub fn ancestors_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            out.push(c);
            cur = self.n(c).parent;
        }
        out
    }

    /// Most recent common ancestor of two live nodes.
    ///
    /// Walks one path to the root into a set, then walks the other until
    /// it meets a member.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        if !self.is_alive(a) || !self.is_alive(b) {
            return Err(PhysaliaError::InvalidInput(
                "common_ancestor: stale node id".into(),
            ));
        }
        let path: BTreeSet<NodeId> = self.ancestors_of(a).into_iter().collect();
        let mut cur = b;
        loop {
            if path.contains(&cur) {
                return Ok(cur);
            }
            match self.n(cur).parent {
                Some(p) => cur = p,
                None => return Ok(self.root),
            }
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Find a node by its stable number (first match in pre-order).
    pub fn find_by_number(&self, number: usize) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|&id| self.n(id).number == number)
    }

    /// Find a node by tip name (first match in pre-order).
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|&id| self.n(id).name.as_deref() == Some(name))
    }

    /// Largest stable number present in the tree.
    pub fn max_number(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|n| n.number)
            .max()
            .unwrap_or(0)
    }

    /// Reassign stable numbers in pre-order starting from `start`.
    ///
    /// Returns the next unused number. `renumber(0)` gives the root
    /// number 0, the canonical final relabeling.
    pub fn renumber(&mut self, start: usize) -> usize {
        let mut next = start;
        for id in self.preorder() {
            self.n_mut(id).number = next;
            next += 1;
        }
        next
    }

    // ── Labels ───────────────────────────────────────────────────────

    /// The set of deme labels observed so far. Grows monotonically except
    /// on [`collapse_labels`](Self::collapse_labels).
    pub fn label_set(&self) -> &BTreeSet<Label> {
        &self.label_set
    }

    pub(crate) fn register_label(&mut self, label: Label) {
        self.label_set.insert(label);
    }

    /// Reset every node label to `"1"` and shrink the label set to match.
    pub fn collapse_labels(&mut self) {
        self.label_set.clear();
        self.label_set.insert(Label::new("1"));
        for slot in self.slots.iter_mut().flatten() {
            slot.label = Label::new("1");
        }
    }

    // ── Mutation primitives ──────────────────────────────────────────

    fn insert_node(&mut self, mut node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                node.id = id;
                self.slots[id] = Some(node);
                id
            }
            None => {
                let id = self.slots.len();
                node.id = id;
                self.slots.push(Some(node));
                id
            }
        }
    }

    /// Append a fresh node (with stable number `number`) as the last child
    /// of `parent`.
    pub fn add_child(&mut self, parent: NodeId, number: usize) -> Result<NodeId> {
        if !self.is_alive(parent) {
            return Err(PhysaliaError::InvalidInput(
                "add_child: stale parent id".into(),
            ));
        }
        let mut node = Node::new(number);
        node.parent = Some(parent);
        let id = self.insert_node(node);
        self.n_mut(parent).children.push(id);
        Ok(id)
    }

    /// Insert a fresh node as the sibling immediately after `id`.
    pub fn insert_sibling_after(&mut self, id: NodeId, number: usize) -> Result<NodeId> {
        let parent = self.parent_of(id).ok_or_else(|| {
            PhysaliaError::InvalidInput("insert_sibling_after: node has no parent".into())
        })?;
        let mut node = Node::new(number);
        node.parent = Some(parent);
        let new = self.insert_node(node);
        let pos = self.child_position(parent, id);
        self.n_mut(parent).children.insert(pos + 1, new);
        Ok(new)
    }

    /// Insert a fresh node on the edge between `id` and its parent.
    ///
    /// The new node takes `id`'s position in the parent's child list and
    /// adopts `id` as its only child. Returns the new node's id.
    pub fn wrap(&mut self, id: NodeId, number: usize) -> Result<NodeId> {
        let parent = self
            .parent_of(id)
            .ok_or_else(|| PhysaliaError::InvalidInput("wrap: cannot wrap the root".into()))?;
        let mut node = Node::new(number);
        node.parent = Some(parent);
        node.children = vec![id];
        let new = self.insert_node(node);
        let pos = self.child_position(parent, id);
        self.n_mut(parent).children[pos] = new;
        self.n_mut(id).parent = Some(new);
        Ok(new)
    }

    fn child_position(&self, parent: NodeId, child: NodeId) -> usize {
        self.n(parent)
            .children
            .iter()
            .position(|&c| c == child)
            .unwrap()
    }

    fn free_subtree(&mut self, id: NodeId) {
        for sub in self.subtree_ids(id) {
            self.slots[sub] = None;
            self.free.push(sub);
        }
    }

    /// Erase the subtree rooted at `id`. The root cannot be erased.
    pub fn erase_subtree(&mut self, id: NodeId) -> Result<()> {
        if !self.is_alive(id) {
            return Err(PhysaliaError::InvalidInput(
                "erase_subtree: stale node id".into(),
            ));
        }
        let parent = self.n(id).parent.ok_or_else(|| {
            PhysaliaError::InvalidInput("erase_subtree: cannot erase the root".into())
        })?;
        self.n_mut(parent).children.retain(|&c| c != id);
        self.free_subtree(id);
        Ok(())
    }

    /// Erase every child subtree of `id`, turning it into a childless node.
    pub fn erase_children(&mut self, id: NodeId) {
        for child in self.n(id).children.clone() {
            self.free_subtree(child);
        }
        self.n_mut(id).children.clear();
    }

    /// Remove a single-child node, folding its branch length into the
    /// child, which takes the node's position under the node's parent.
    pub(crate) fn merge_into_child(&mut self, id: NodeId) -> Result<()> {
        let parent = self.parent_of(id).ok_or_else(|| {
            PhysaliaError::InvalidInput("merge_into_child: node has no parent".into())
        })?;
        if self.n(id).children.len() != 1 {
            return Err(PhysaliaError::InvalidInput(
                "merge_into_child: node must have exactly one child".into(),
            ));
        }
        let child = self.n(id).children[0];
        let length = self.n(id).length;
        self.n_mut(child).length += length;
        self.n_mut(child).parent = Some(parent);
        let pos = self.child_position(parent, id);
        self.n_mut(parent).children[pos] = child;
        self.slots[id] = None;
        self.free.push(id);
        Ok(())
    }

    /// Detach the subtree at `id` from its parent and reattach it as the
    /// last child of the root.
    pub fn detach_to_root(&mut self, id: NodeId) -> Result<()> {
        let parent = self.parent_of(id).ok_or_else(|| {
            PhysaliaError::InvalidInput("detach_to_root: node has no parent".into())
        })?;
        if parent == self.root {
            return Ok(());
        }
        self.n_mut(parent).children.retain(|&c| c != id);
        let root = self.root;
        self.n_mut(root).children.push(id);
        self.n_mut(id).parent = Some(root);
        Ok(())
    }

    /// Promote the root's only child to be the new root with zero length.
    pub(crate) fn promote_single_child_root(&mut self) {
        if self.n(self.root).children.len() != 1 {
            return;
        }
        let old = self.root;
        let child = self.n(old).children[0];
        self.n_mut(child).parent = None;
        self.n_mut(child).length = 0.0;
        self.slots[old] = None;
        self.free.push(old);
        self.root = child;
    }

    /// Replace the child order of `parent`. `order` must be a permutation
    /// of the current children.
    pub fn reorder_children(&mut self, parent: NodeId, order: Vec<NodeId>) -> Result<()> {
        let current: BTreeSet<NodeId> = self.n(parent).children.iter().copied().collect();
        let proposed: BTreeSet<NodeId> = order.iter().copied().collect();
        if current != proposed || order.len() != self.n(parent).children.len() {
            return Err(PhysaliaError::InvalidInput(
                "reorder_children: order is not a permutation of the children".into(),
            ));
        }
        self.n_mut(parent).children = order;
        Ok(())
    }

    fn copy_subtree_from(&mut self, other: &CoalescentTree, src: NodeId, parent: NodeId) {
        let mut node = other.n(src).clone();
        let kids = std::mem::take(&mut node.children);
        node.parent = Some(parent);
        let id = self.insert_node(node);
        self.n_mut(parent).children.push(id);
        for k in kids {
            self.copy_subtree_from(other, k, id);
        }
    }

    /// Graft copies of every top-level child of `other` under this tree's
    /// root, merging label sets. Stable numbers are copied as-is; renumber
    /// the source first if uniqueness matters.
    pub fn graft_children_from(&mut self, other: &CoalescentTree) {
        for &child in other.n(other.root()).children.iter() {
            self.copy_subtree_from(other, child, self.root);
        }
        for label in other.label_set() {
            self.label_set.insert(label.clone());
        }
    }

    // ── Time and length maintenance ──────────────────────────────────

    /// Set every non-root node's time to its parent's time plus its own
    /// length, in pre-order. The root keeps its current time.
    pub fn recompute_times(&mut self) {
        for id in self.preorder() {
            if let Some(p) = self.n(id).parent {
                self.n_mut(id).time = self.n(p).time + self.n(id).length;
            }
        }
    }

    /// Set every non-root node's length to its own time minus its
    /// parent's time.
    pub fn recompute_lengths(&mut self) {
        for id in self.preorder() {
            if let Some(p) = self.n(id).parent {
                self.n_mut(id).length = self.n(id).time - self.n(p).time;
            }
        }
    }

    /// Shift all times so the most recent node sits at `end`.
    pub fn push_times_back(&mut self, end: f64) {
        let diff = end - self.present_time();
        for slot in self.slots.iter_mut().flatten() {
            slot.time += diff;
        }
    }

    /// Stretch the tree so the oldest sampled tip sits at `start` and the
    /// most recent at `end`, then shift to match.
    ///
    /// Fails on contemporaneous samples (zero tip-time spread).
    pub fn push_times_back_range(&mut self, start: f64, end: f64) -> Result<()> {
        if start < end {
            let present = self.present_time();
            let oldest = self
                .leaves()
                .into_iter()
                .map(|id| self.n(id).time)
                .fold(present, f64::min);
            if present - oldest <= 0.0 {
                return Err(PhysaliaError::InvalidInput(
                    "push_times_back_range: samples are contemporaneous".into(),
                ));
            }
            let mp = (end - start) / (present - oldest);
            for slot in self.slots.iter_mut().flatten() {
                slot.length *= mp;
            }
            self.recompute_times();
        }
        self.push_times_back(end);
        Ok(())
    }

    /// Add a new root `setback` time units before the current root,
    /// carrying the old root's label and trait coordinates.
    pub fn add_tail(&mut self, setback: f64) {
        let old = self.root;
        let number = self.max_number() + 1;
        let mut node = Node::new(number);
        {
            let r = self.n(old);
            node.label = r.label.clone();
            node.time = r.time - setback;
            node.x = r.x;
            node.y = r.y;
            node.x_coord = r.x_coord;
            node.y_coord = r.y_coord;
        }
        node.trunk = true;
        node.children = vec![old];
        let new = self.insert_node(node);
        self.n_mut(old).parent = Some(new);
        self.n_mut(old).length = setback;
        self.root = new;
    }

    // ── Continuous trait helpers ─────────────────────────────────────

    /// Rotate every node's `(x, y)` trait location around the origin.
    pub fn rotate_locations(&mut self, radians: f64) {
        let (sin, cos) = radians.sin_cos();
        for slot in self.slots.iter_mut().flatten() {
            let (x, y) = (slot.x, slot.y);
            slot.x = x * cos - y * sin;
            slot.y = x * sin + y * cos;
        }
    }

    /// Replace per-branch trait increments with totals accumulated from
    /// the root.
    pub fn accumulate_locations(&mut self) {
        for id in self.preorder() {
            if let Some(p) = self.n(id).parent {
                let (px, py) = (self.n(p).x, self.n(p).y);
                let node = self.n_mut(id);
                node.x += px;
                node.y += py;
            }
        }
    }

    // ── Export queries ───────────────────────────────────────────────

    /// Numbers of all nodes carrying the sampled-tip flag, in pre-order.
    pub fn leaf_numbers(&self) -> Vec<usize> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).leaf)
            .map(|id| self.n(id).number)
            .collect()
    }

    /// Numbers of all trunk nodes, in pre-order.
    pub fn trunk_numbers(&self) -> Vec<usize> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).trunk)
            .map(|id| self.n(id).number)
            .collect()
    }

    /// `(child number, parent number)` pairs for every edge, in pre-order.
    pub fn edge_numbers(&self) -> Vec<(usize, usize)> {
        self.preorder()
            .into_iter()
            .filter_map(|id| {
                self.n(id)
                    .parent
                    .map(|p| (self.n(id).number, self.n(p).number))
            })
            .collect()
    }

    /// `(number, label)` for every node, in pre-order.
    pub fn label_map(&self) -> Vec<(usize, Label)> {
        self.preorder()
            .into_iter()
            .map(|id| (self.n(id).number, self.n(id).label.clone()))
            .collect()
    }

    /// `(number, (x_coord, y_coord))` layout coordinates, in pre-order.
    pub fn coord_map(&self) -> Vec<(usize, (f64, f64))> {
        self.preorder()
            .into_iter()
            .map(|id| (self.n(id).number, (self.n(id).x_coord, self.n(id).y_coord)))
            .collect()
    }

    /// `(number, (x, y))` trait locations, in pre-order.
    pub fn location_map(&self) -> Vec<(usize, (f64, f64))> {
        self.preorder()
            .into_iter()
            .map(|id| (self.n(id).number, (self.n(id).x, self.n(id).y)))
            .collect()
    }

    /// `(number, name)` for every named node, in pre-order.
    pub fn name_map(&self) -> Vec<(usize, String)> {
        self.preorder()
            .into_iter()
            .filter_map(|id| {
                self.n(id)
                    .name
                    .clone()
                    .map(|name| (self.n(id).number, name))
            })
            .collect()
    }

    /// Names of all structural tips, in pre-order.
    pub fn tip_names(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.n(id).name.clone())
            .collect()
    }
}

impl Default for CoalescentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Summarizable for CoalescentTree {
    fn summary(&self) -> String {
        format!(
            "CoalescentTree: {} nodes ({} tips, {} labels, span {:.4})",
            self.node_count(),
            self.leaf_count(),
            self.label_set.len(),
            self.present_time() - self.root_time(),
        )
    }
}
