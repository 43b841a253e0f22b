//! Time-window surgery: trimming, slicing, sectioning, and padding.

use std::collections::BTreeSet;

use physalia_core::{PhysaliaError, Result};

use crate::node::NodeId;
use crate::rng::Xorshift64;
use crate::tree::CoalescentTree;

impl CoalescentTree {
    /// Clip the tree to the time band `[start, stop]`.
    ///
    /// Nodes straddling `stop` are truncated in place and become tips;
    /// parents of nodes straddling `start` are pulled forward to `start`,
    /// marked excluded, and hung directly from the root; everything still
    /// older than `start` is then dropped and lengths are recomputed from
    /// the adjusted times.
    pub fn trim_ends(&mut self, start: f64, stop: f64) -> Result<()> {
        if start >= stop {
            return Err(PhysaliaError::InvalidInput(format!(
                "trim_ends: empty window [{}, {}]",
                start, stop
            )));
        }
        'outer: loop {
            for id in self.preorder() {
                let Some(p) = self.n(id).parent else { continue };
                let t = self.n(id).time;
                let pt = self.n(p).time;
                if t > stop && pt < stop {
                    let node = self.n_mut(id);
                    node.time = stop;
                    node.length = stop - pt;
                    node.leaf = true;
                    self.erase_children(id);
                    continue 'outer;
                } else if t > start && pt < start {
                    let parent = self.n_mut(p);
                    parent.time = start;
                    parent.length = 0.0;
                    parent.include = false;
                    if p != self.root() {
                        self.detach_to_root(p)?;
                    }
                    continue 'outer;
                }
            }
            break;
        }

        // Second pass: drop whatever still lies before the window.
        for id in self.preorder() {
            if id == self.root() || !self.is_alive(id) {
                continue;
            }
            if self.n(id).time < start {
                self.erase_subtree(id).unwrap();
            }
        }
        let root = self.root();
        if self.n(root).time < start {
            self.n_mut(root).time = start;
            self.n_mut(root).include = false;
        }

        self.recompute_lengths();
        self.reduce();
        Ok(())
    }

    /// Reduce the tree to the lineages crossing `instant` and their
    /// ancestors.
    ///
    /// Each crossing node is truncated to `instant` with its trait and
    /// layout coordinates linearly interpolated along the original
    /// branch, becomes a tip, and keeps its ancestor path; everything
    /// else is swept away.
    pub fn time_slice(&mut self, instant: f64) -> Result<()> {
        let mut keep: BTreeSet<NodeId> = BTreeSet::new();
        'outer: loop {
            for id in self.preorder() {
                let Some(p) = self.n(id).parent else { continue };
                let t = self.n(id).time;
                let pt = self.n(p).time;
                if t > instant && pt <= instant {
                    let dt = t - pt;
                    let (px, py) = (self.n(p).x, self.n(p).y);
                    let (pxc, pyc) = (self.n(p).x_coord, self.n(p).y_coord);
                    let x_rate = (self.n(id).x - px) / dt;
                    let y_rate = (self.n(id).y - py) / dt;
                    let xc_rate = (self.n(id).x_coord - pxc) / dt;
                    let yc_rate = (self.n(id).y_coord - pyc) / dt;

                    let node = self.n_mut(id);
                    node.time = instant;
                    node.length = instant - pt;
                    node.x = px + node.length * x_rate;
                    node.y = py + node.length * y_rate;
                    node.x_coord = pxc + node.length * xc_rate;
                    node.y_coord = pyc + node.length * yc_rate;
                    node.leaf = true;
                    self.erase_children(id);

                    for anc in self.ancestors_of(id) {
                        keep.insert(anc);
                    }
                    continue 'outer;
                }
            }
            break;
        }
        self.sweep_keep(&keep);
        self.peel_back();
        self.reduce();
        Ok(())
    }

    /// Truncate trunk lineages crossing `instant`, leaving the rest of
    /// the tree untouched.
    pub fn trunk_slice(&mut self, instant: f64) {
        'outer: loop {
            for id in self.preorder() {
                let Some(p) = self.n(id).parent else { continue };
                let t = self.n(id).time;
                let pt = self.n(p).time;
                if t > instant && pt <= instant && self.n(id).trunk && self.n(p).trunk {
                    let node = self.n_mut(id);
                    node.time = instant;
                    node.length = instant - pt;
                    node.leaf = true;
                    self.erase_children(id);
                    continue 'outer;
                }
            }
            break;
        }
    }

    /// Reduce the tree to tips sampled in `(start, stop]` and their
    /// ancestors.
    pub fn leaf_slice(&mut self, start: f64, stop: f64) {
        let seeds: Vec<NodeId> = self
            .preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                n.leaf && n.time > start && n.time <= stop
            })
            .collect();
        let keep = self.ancestor_closure(seeds);
        self.sweep_keep(&keep);
        self.peel_back();
        self.reduce();
    }

    /// Rebuild the tree as a sequence of trimmed sections.
    ///
    /// For each sliding window `[t, t + window]` (advancing by `step`
    /// from `start` until the present), a trimmed copy of the original
    /// tree is derived and its top-level lineages are grafted under one
    /// composite root. Sections are renumbered so node numbers stay
    /// unique across the whole composite.
    pub fn section_tree(&mut self, start: f64, window: f64, step: f64) -> Result<()> {
        if window <= 0.0 || step <= 0.0 {
            return Err(PhysaliaError::InvalidInput(
                "section_tree: window and step must be positive".into(),
            ));
        }
        let hold = self.clone();
        let root_time = self.root_time();
        let present = self.present_time();

        let mut out = CoalescentTree::new();
        {
            let root = out.root();
            let node = out.n_mut(root);
            node.time = start;
            node.include = false;
            node.label = hold.n(hold.root()).label.clone();
        }

        let mut current = 1usize;
        let mut t = start;
        while t < present {
            if t > root_time {
                let mut section = hold.clone();
                section.trim_ends(t, t + window)?;
                current = section.renumber(current);
                out.graft_children_from(&section);
            }
            t += step;
        }
        *self = out;
        Ok(())
    }

    /// Ensure every root-to-node path has a node at every coalescent time
    /// value it spans, wrapping in synthetic same-label nodes where a
    /// branch crosses event times without one.
    pub fn pad_tree(&mut self) {
        let mut times: Vec<f64> = self
            .preorder()
            .into_iter()
            .map(|id| self.n(id).time)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        times.dedup();

        let mut next = self.max_number() + 1;
        for id in self.preorder() {
            let Some(p) = self.n(id).parent else { continue };
            let t = self.n(id).time;
            let pt = self.n(p).time;
            let label = self.n(id).label.clone();
            // Event times the branch crosses without a node, deepest first
            // so each wrap lands just above the previous one.
            let mut target = id;
            for &mid in times.iter().filter(|&&v| v > pt && v < t).rev() {
                let wrapped = self.wrap(target, next).unwrap();
                next += 1;
                let node = self.n_mut(wrapped);
                node.label = label.clone();
                node.time = mid;
                target = wrapped;
            }
        }
        self.recompute_lengths();
    }

    /// Approximate Markov-jump migration events: wherever a child's label
    /// differs from its parent's across a true bifurcation, wrap in a
    /// node carrying the parent's label at a uniformly random point along
    /// the branch.
    pub fn pad_migration_events(&mut self, rng: &mut Xorshift64) {
        let mut next = self.max_number() + 1;
        for id in self.preorder() {
            let Some(p) = self.n(id).parent else { continue };
            if self.n(id).label == self.n(p).label || self.n(p).children.len() != 2 {
                continue;
            }
            let total = self.n(id).length;
            let first = rng.uniform(0.0, total);
            let second = total - first;
            let parent_label = self.n(p).label.clone();
            let t = self.n(id).time;

            self.n_mut(id).length = second;
            let wrapped = self.wrap(id, next).unwrap();
            next += 1;
            let node = self.n_mut(wrapped);
            node.label = parent_label;
            node.length = first;
            node.time = t - second;
        }
    }
}
