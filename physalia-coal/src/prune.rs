//! Pruning: reducing the tree to the ancestor closure of a tip subset.
//!
//! Every variant follows the same shape: collect a keep-set by walking
//! each matching node up to the root, then sweep away every subtree whose
//! head is outside the set. Keep-sets are ancestor-closed, so a node
//! outside the set has no descendant inside it and whole-subtree erasure
//! is safe.

use std::collections::BTreeSet;

use physalia_core::{PhysaliaError, Result};

use crate::node::{Label, NodeId};
use crate::rng::Xorshift64;
use crate::tree::CoalescentTree;

impl CoalescentTree {
    pub(crate) fn ancestor_closure(
        &self,
        seeds: impl IntoIterator<Item = NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut keep = BTreeSet::new();
        for seed in seeds {
            let mut cur = Some(seed);
            while let Some(c) = cur {
                if !keep.insert(c) {
                    break;
                }
                cur = self.n(c).parent;
            }
        }
        keep
    }

    /// Erase every node outside `keep`. The root always survives, so a
    /// keep-set that matched nothing degenerates to a lone root.
    pub(crate) fn sweep_keep(&mut self, keep: &BTreeSet<NodeId>) {
        for id in self.preorder() {
            if id == self.root() || !self.is_alive(id) {
                continue;
            }
            if !keep.contains(&id) {
                self.erase_subtree(id).unwrap();
            }
        }
    }

    /// Reduce the tree to tips carrying `label` and their ancestors.
    pub fn prune_to_label(&mut self, label: &Label) {
        let seeds: Vec<NodeId> = self
            .preorder()
            .into_iter()
            .filter(|&id| self.n(id).leaf && &self.n(id).label == label)
            .collect();
        let keep = self.ancestor_closure(seeds);
        self.sweep_keep(&keep);
        self.reduce();
    }

    /// Reduce the tree to the named tips and their ancestors.
    pub fn prune_to_tips(&mut self, names: &[&str]) -> Result<()> {
        let mut seeds = Vec::with_capacity(names.len());
        for name in names {
            let id = self.find_by_name(name).ok_or_else(|| {
                PhysaliaError::InvalidInput(format!("prune_to_tips: no tip named '{}'", name))
            })?;
            seeds.push(id);
        }
        let keep = self.ancestor_closure(seeds);
        self.sweep_keep(&keep);
        self.reduce();
        Ok(())
    }

    /// Erase the named tips from the tree.
    pub fn remove_tips(&mut self, names: &[&str]) -> Result<()> {
        let mut doomed = Vec::with_capacity(names.len());
        for name in names {
            let id = self.find_by_name(name).ok_or_else(|| {
                PhysaliaError::InvalidInput(format!("remove_tips: no tip named '{}'", name))
            })?;
            doomed.push(id);
        }
        for id in doomed {
            self.erase_subtree(id)?;
        }
        self.reduce();
        Ok(())
    }

    /// Reduce the tree to the ancestors of a single named node.
    pub fn prune_to_name(&mut self, name: &str) -> Result<()> {
        let id = self.find_by_name(name).ok_or_else(|| {
            PhysaliaError::InvalidInput(format!("prune_to_name: no node named '{}'", name))
        })?;
        let keep = self.ancestor_closure([id]);
        self.sweep_keep(&keep);
        Ok(())
    }

    /// Reduce the tree to tips sampled strictly within `(start, stop)`
    /// and their ancestors.
    pub fn prune_to_time(&mut self, start: f64, stop: f64) {
        let seeds: Vec<NodeId> = self
            .preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                n.leaf && n.time > start && n.time < stop
            })
            .collect();
        let keep = self.ancestor_closure(seeds);
        self.sweep_keep(&keep);
        self.reduce();
    }

    /// Keep each sampled tip with independent probability `proportion`,
    /// then reduce the tree to the survivors and their ancestors.
    pub fn reduce_tips(&mut self, proportion: f64, rng: &mut Xorshift64) -> Result<()> {
        if !(0.0..=1.0).contains(&proportion) {
            return Err(PhysaliaError::InvalidInput(format!(
                "reduce_tips: proportion {} outside [0, 1]",
                proportion
            )));
        }
        let seeds: Vec<NodeId> = self
            .preorder()
            .into_iter()
            .filter(|&id| self.n(id).leaf && rng.next_f64() < proportion)
            .collect();
        let keep = self.ancestor_closure(seeds);
        self.sweep_keep(&keep);
        self.peel_back();
        self.reduce();
        Ok(())
    }

    /// Reduce the tree to its trunk.
    pub fn prune_to_trunk(&mut self) {
        let keep: BTreeSet<NodeId> = self
            .preorder()
            .into_iter()
            .filter(|&id| self.n(id).trunk)
            .collect();
        self.sweep_keep(&keep);
        self.reduce();
    }

    /// Collapse nodes that carry no information: an internal node with a
    /// single child and the same label marks neither a coalescence nor a
    /// migration, so its branch folds into the child's. Runs to a fixed
    /// point and is idempotent.
    pub fn reduce(&mut self) {
        'outer: loop {
            for id in self.preorder() {
                if id == self.root() {
                    continue;
                }
                if self.n(id).children.len() == 1 {
                    let child = self.n(id).children[0];
                    if self.n(child).label == self.n(id).label {
                        self.merge_into_child(id).unwrap();
                        continue 'outer;
                    }
                }
            }
            break;
        }
    }

    /// Collapse the single-child chain running from the root to the first
    /// bifurcation, then promote a single-child root so the tree starts
    /// at a real node.
    pub fn peel_back(&mut self) {
        loop {
            let mut cur = self.root();
            let mut merged = false;
            loop {
                let children = self.n(cur).children.clone();
                if children.len() != 1 {
                    break;
                }
                if cur == self.root() {
                    cur = children[0];
                    continue;
                }
                self.merge_into_child(cur).unwrap();
                merged = true;
                break;
            }
            if !merged {
                break;
            }
        }
        self.promote_single_child_root();
    }

    /// Build an independently owned tree from the ancestor closure of the
    /// given nodes. Numbers, times, labels, and flags are copied; the new
    /// tree shares nothing with the source.
    pub fn extract_subtree(&self, seeds: &[NodeId]) -> Result<CoalescentTree> {
        if seeds.is_empty() {
            return Err(PhysaliaError::InvalidInput(
                "extract_subtree: empty seed set".into(),
            ));
        }
        for &s in seeds {
            if !self.is_alive(s) {
                return Err(PhysaliaError::InvalidInput(
                    "extract_subtree: stale node id".into(),
                ));
            }
        }
        let keep = self.ancestor_closure(seeds.iter().copied());

        let mut out = CoalescentTree::new();
        {
            let mut root = self.n(self.root()).clone();
            root.id = 0;
            root.parent = None;
            root.children = Vec::new();
            *out.n_mut(0) = root;
        }
        for label in self.label_set() {
            out.register_label(label.clone());
        }

        let mut stack: Vec<(NodeId, NodeId)> = vec![(self.root(), out.root())];
        while let Some((src, dst)) = stack.pop() {
            for &child in self.n(src).children.iter() {
                if !keep.contains(&child) {
                    continue;
                }
                let copied = out.add_child(dst, 0)?;
                let mut node = self.n(child).clone();
                node.id = copied;
                node.parent = Some(dst);
                node.children = Vec::new();
                *out.n_mut(copied) = node;
                stack.push((child, copied));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_tree() -> CoalescentTree {
        // Tips A and C share state 1, B carries state 2.
        CoalescentTree::from_newick(
            "((A:1[&states=1],B:1[&states=2]):1,C:2[&states=1]);",
        )
        .unwrap()
    }

    fn ancestor_closure_holds(t: &CoalescentTree) -> bool {
        t.leaves().into_iter().all(|id| {
            t.ancestors_of(id)
                .into_iter()
                .all(|anc| t.is_alive(anc))
        })
    }

    #[test]
    fn prune_to_label_keeps_matching_tips() {
        let mut t = labeled_tree();
        t.prune_to_label(&Label::new("1"));
        let names = t.tip_names();
        assert!(names.contains(&"A".to_string()));
        assert!(names.contains(&"C".to_string()));
        assert!(!names.contains(&"B".to_string()));
        assert!(ancestor_closure_holds(&t));
    }

    #[test]
    fn prune_to_tips_by_name() {
        let mut t = labeled_tree();
        t.prune_to_tips(&["A", "B"]).unwrap();
        assert_eq!(t.leaf_count(), 2);
        assert!(t.find_by_name("C").is_none());
        assert!(ancestor_closure_holds(&t));
    }

    #[test]
    fn prune_to_tips_unknown_name_fails() {
        let mut t = labeled_tree();
        assert!(t.prune_to_tips(&["A", "Z"]).is_err());
    }

    #[test]
    fn remove_tips_erases_named_tips() {
        let mut t = labeled_tree();
        t.remove_tips(&["B"]).unwrap();
        assert!(t.find_by_name("B").is_none());
        assert_eq!(t.leaf_count(), 2);
    }

    #[test]
    fn remove_tips_folds_spare_internal_nodes() {
        let mut t = CoalescentTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        t.remove_tips(&["B"]).unwrap();
        // The internal node above A is now single-child and same-label,
        // so reduce folds it away; A hangs from the root at full length.
        let a = t.find_by_name("A").unwrap();
        assert_eq!(t.parent_of(a), Some(t.root()));
        assert!((t.node(a).unwrap().length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn prune_to_time_keeps_window_tips() {
        // A at -0.5, B at -1.5, C at 0 after parsing.
        let mut t = CoalescentTree::from_newick("((A:1.5,B:0.5):1,C:2);").unwrap();
        t.prune_to_time(-1.0, 0.5);
        let names = t.tip_names();
        assert!(names.contains(&"A".to_string()));
        assert!(names.contains(&"C".to_string()));
        assert!(!names.contains(&"B".to_string()));
    }

    #[test]
    fn prune_to_name_keeps_single_path() {
        let mut t = labeled_tree();
        t.prune_to_name("A").unwrap();
        // A plus its two ancestors.
        assert_eq!(t.node_count(), 3);
        assert!(t.find_by_name("B").is_none());
    }

    #[test]
    fn prune_to_trunk_keeps_flagged_nodes() {
        let mut t = CoalescentTree::from_newick("((A:0.5,B:0.5):1,C:2);").unwrap();
        t.renew_trunk(0.25);
        t.prune_to_trunk();
        // Only the path to C survives; reduce folds the root-to-C chain.
        let names = t.tip_names();
        assert_eq!(names, vec!["C".to_string()]);
    }

    #[test]
    fn reduce_is_idempotent() {
        let mut t = labeled_tree();
        t.remove_tips(&["B"]).unwrap();
        let once = t.to_newick();
        t.reduce();
        assert_eq!(once, t.to_newick());
    }

    #[test]
    fn reduce_preserves_migration_nodes() {
        // The wrapped migration node is single-child but differently
        // labeled, so reduce must keep it.
        let mut t = CoalescentTree::from_newick("(A:1.0[&M 0 1:0.5],B:1.0);").unwrap();
        let before = t.node_count();
        t.reduce();
        assert_eq!(t.node_count(), before);
    }

    #[test]
    fn reduce_tips_is_reproducible() {
        let base = CoalescentTree::from_newick(
            "(((A:1,B:1):1,(C:1,D:2):1):1,(E:2,F:3):1);",
        )
        .unwrap();
        let mut t1 = base.clone();
        let mut t2 = base.clone();
        let mut r1 = Xorshift64::new(5);
        let mut r2 = Xorshift64::new(5);
        t1.reduce_tips(0.5, &mut r1).unwrap();
        t2.reduce_tips(0.5, &mut r2).unwrap();
        assert_eq!(t1.to_newick(), t2.to_newick());
        assert!(t1.leaf_count() <= base.leaf_count());
    }

    #[test]
    fn reduce_tips_rejects_bad_proportion() {
        let mut t = labeled_tree();
        let mut rng = Xorshift64::new(1);
        assert!(t.reduce_tips(1.5, &mut rng).is_err());
    }

    #[test]
    fn zero_match_prune_degenerates_to_root() {
        let mut t = labeled_tree();
        t.prune_to_label(&Label::new("no-such-label"));
        assert_eq!(t.node_count(), 1);
        assert!(t.is_alive(t.root()));
    }

    #[test]
    fn peel_back_promotes_single_child_root() {
        let mut t = CoalescentTree::from_newick("((A:1,B:2):1);").unwrap();
        t.peel_back();
        // The unary root chain collapses; the bifurcation becomes the root.
        assert_eq!(t.children_of(t.root()).len(), 2);
        assert_eq!(t.node(t.root()).unwrap().length, 0.0);
    }

    #[test]
    fn extract_subtree_is_independent() {
        let t = labeled_tree();
        let a = t.find_by_name("A").unwrap();
        let b = t.find_by_name("B").unwrap();
        let sub = t.extract_subtree(&[a, b]).unwrap();
        // A, B, their parent, and the root.
        assert_eq!(sub.node_count(), 4);
        assert!(sub.find_by_name("A").is_some());
        assert!(sub.find_by_name("C").is_none());
        // Times and labels came across.
        let sa = sub.find_by_name("A").unwrap();
        assert_eq!(sub.node(sa).unwrap().label, Label::new("1"));
        assert_eq!(sub.node(sa).unwrap().time, t.node(a).unwrap().time);
    }

    #[test]
    fn extract_subtree_rejects_empty_seeds() {
        let t = labeled_tree();
        assert!(t.extract_subtree(&[]).is_err());
    }
}
