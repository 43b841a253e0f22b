//! Trunk marking: flagging the lineages ancestral to present-day samples.

use physalia_core::{PhysaliaError, Result};

use crate::rng::Xorshift64;
use crate::tree::CoalescentTree;

impl CoalescentTree {
    /// Mark `trunk` on every node more recent than `present - window` and
    /// on every ancestor of such a node; the root is always trunk.
    ///
    /// Marking walks parent links and stops at the first already-marked
    /// ancestor, which is safe because marking only ever grows.
    pub fn renew_trunk(&mut self, window: f64) {
        let present = self.present_time();
        let ids = self.preorder();
        for &id in &ids {
            self.n_mut(id).trunk = false;
        }
        let root = self.root();
        self.n_mut(root).trunk = true;
        for &id in &ids {
            if self.n(id).time > present - window {
                let mut cur = Some(id);
                while let Some(c) = cur {
                    if self.n(c).trunk {
                        break;
                    }
                    self.n_mut(c).trunk = true;
                    cur = self.n(c).parent;
                }
            }
        }
    }

    /// Mark the trunk from a single uniformly-random sampled tip within
    /// the recency window, plus the root.
    pub fn renew_trunk_random(&mut self, window: f64, rng: &mut Xorshift64) -> Result<()> {
        let present = self.present_time();
        let ids = self.preorder();
        for &id in &ids {
            self.n_mut(id).trunk = false;
        }
        let root = self.root();
        self.n_mut(root).trunk = true;

        let candidates: Vec<_> = ids
            .iter()
            .copied()
            .filter(|&id| self.n(id).leaf && self.n(id).time > present - window)
            .collect();
        if candidates.is_empty() {
            return Err(PhysaliaError::Undefined(
                "renew_trunk_random: no sampled tip within the trunk window".into(),
            ));
        }
        let pick = candidates[rng.index(candidates.len())];
        let mut cur = Some(pick);
        while let Some(c) = cur {
            self.n_mut(c).trunk = true;
            cur = self.n(c).parent;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_tips_and_ancestors_are_trunk() {
        let mut t = CoalescentTree::from_newick("((A:0.5,B:0.5):1,C:2);").unwrap();
        t.renew_trunk(0.25);
        // Only C (time 0) is within 0.25 of the present; A and B sit at -0.5.
        let c = t.find_by_name("C").unwrap();
        let a = t.find_by_name("A").unwrap();
        assert!(t.node(c).unwrap().trunk);
        assert!(t.node(t.root()).unwrap().trunk);
        assert!(!t.node(a).unwrap().trunk);
        assert_eq!(t.trunk_numbers().len(), 2);
    }

    #[test]
    fn wide_window_marks_everything() {
        let mut t = CoalescentTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        t.renew_trunk(10.0);
        for id in t.preorder() {
            assert!(t.node(id).unwrap().trunk);
        }
    }

    #[test]
    fn remarking_is_idempotent() {
        let mut t = CoalescentTree::from_newick("((A:0.5,B:0.5):1,C:2);").unwrap();
        t.renew_trunk(0.25);
        let first = t.trunk_numbers();
        t.renew_trunk(0.25);
        assert_eq!(first, t.trunk_numbers());
    }

    #[test]
    fn random_variant_marks_one_path() {
        let mut t = CoalescentTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        let mut rng = Xorshift64::new(11);
        t.renew_trunk_random(0.5, &mut rng).unwrap();
        // All three tips are at time 0; exactly one tip path is marked.
        let marked_tips = t
            .leaves()
            .into_iter()
            .filter(|&id| t.node(id).unwrap().trunk)
            .count();
        assert_eq!(marked_tips, 1);
        assert!(t.node(t.root()).unwrap().trunk);
    }

    #[test]
    fn random_variant_is_reproducible() {
        let t0 = CoalescentTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        let mut t1 = t0.clone();
        let mut t2 = t0.clone();
        let mut r1 = Xorshift64::new(99);
        let mut r2 = Xorshift64::new(99);
        t1.renew_trunk_random(0.5, &mut r1).unwrap();
        t2.renew_trunk_random(0.5, &mut r2).unwrap();
        assert_eq!(t1.trunk_numbers(), t2.trunk_numbers());
    }

    #[test]
    fn random_variant_with_empty_window_is_undefined() {
        let mut t = CoalescentTree::from_newick("((A:0.5,B:0.5):1,C:2);").unwrap();
        let mut rng = Xorshift64::new(1);
        // Window excludes every tip.
        assert!(t.renew_trunk_random(-1.0, &mut rng).is_err());
    }
}
