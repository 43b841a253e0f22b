//! Read-only statistics over the current tree state.
//!
//! Every function here is a pure traversal: degenerate cases (no leaf
//! pairs, zero opportunity, zero length) surface as
//! [`PhysaliaError::Undefined`] rather than NaN or infinity.

use physalia_core::{PhysaliaError, Result};

use crate::node::{Label, Node, NodeId};
use crate::series::Series;
use crate::tree::CoalescentTree;

/// Granularity of the discretized time axis used for coalescent-weight
/// sums. The default of 1000 steps matches the classical choice; raise it
/// for tighter approximations.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalConfig {
    /// Number of discretization steps across the tree's time span.
    pub steps: usize,
}

impl Default for CoalConfig {
    fn default() -> Self {
        CoalConfig { steps: 1000 }
    }
}

impl CoalescentTree {
    // ── Basic measures ───────────────────────────────────────────────

    /// Most recent time in the tree.
    pub fn present_time(&self) -> f64 {
        self.preorder()
            .into_iter()
            .map(|id| self.n(id).time)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Most ancient time in the tree.
    pub fn root_time(&self) -> f64 {
        self.preorder()
            .into_iter()
            .map(|id| self.n(id).time)
            .fold(f64::INFINITY, f64::min)
    }

    /// Time for all samples to coalesce: the tree's full time span.
    pub fn tmrca(&self) -> Result<f64> {
        if self.leaf_count() <= 1 {
            return Err(PhysaliaError::Undefined(
                "tmrca: fewer than two sampled tips".into(),
            ));
        }
        Ok(self.present_time() - self.root_time())
    }

    /// Total included branch length.
    pub fn length(&self) -> f64 {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).include)
            .map(|id| self.n(id).length)
            .sum()
    }

    /// Total included branch length carrying `label`.
    pub fn length_of(&self, label: &Label) -> f64 {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).include && &self.n(id).label == label)
            .map(|id| self.n(id).length)
            .sum()
    }

    /// Proportion of tree length carrying `label`.
    pub fn label_pro(&self, label: &Label) -> Result<f64> {
        let total = self.length();
        if total <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "label_pro: tree has no included length".into(),
            ));
        }
        Ok(self.length_of(label) / total)
    }

    /// 1.0 if the root carries `label`, else 0.0.
    pub fn root_label_pro(&self, label: &Label) -> f64 {
        if &self.n(self.root()).label == label {
            1.0
        } else {
            0.0
        }
    }

    /// Proportion of tree length on the trunk.
    pub fn trunk_pro(&self) -> Result<f64> {
        let total = self.length();
        if total <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "trunk_pro: tree has no included length".into(),
            ));
        }
        let trunk: f64 = self
            .preorder()
            .into_iter()
            .filter(|&id| self.n(id).include && self.n(id).trunk)
            .map(|id| self.n(id).length)
            .sum();
        Ok(trunk / total)
    }

    /// Proportion of tips whose lineage, traced back `window` time units,
    /// carries `label`.
    pub fn label_pro_from_tips(&self, label: &Label, window: f64) -> Result<f64> {
        self.label_pro_from_tips_inner(label, window, None)
    }

    /// Same as [`label_pro_from_tips`](Self::label_pro_from_tips), over
    /// tips that currently carry `starting`.
    pub fn label_pro_from_tips_starting(
        &self,
        label: &Label,
        window: f64,
        starting: &Label,
    ) -> Result<f64> {
        self.label_pro_from_tips_inner(label, window, Some(starting))
    }

    fn label_pro_from_tips_inner(
        &self,
        label: &Label,
        window: f64,
        starting: Option<&Label>,
    ) -> Result<f64> {
        let mut hits = 0.0;
        let mut count = 0.0;
        for id in self.preorder() {
            let node = self.n(id);
            if !node.leaf {
                continue;
            }
            if let Some(s) = starting {
                if &node.label != s {
                    continue;
                }
            }
            let back = self.node_back_from_tip(id, window);
            if &self.n(back).label == label {
                hits += 1.0;
            }
            count += 1.0;
        }
        if count == 0.0 {
            return Err(PhysaliaError::Undefined(
                "label_pro_from_tips: no qualifying tips".into(),
            ));
        }
        Ok(hits / count)
    }

    /// `(label, included length)` for every registered label.
    pub fn lengths(&self) -> Vec<(Label, f64)> {
        self.label_set()
            .iter()
            .map(|l| (l.clone(), self.length_of(l)))
            .collect()
    }

    /// `(label, proportion)` for every registered label.
    pub fn label_pros(&self) -> Result<Vec<(Label, f64)>> {
        self.label_set()
            .iter()
            .map(|l| Ok((l.clone(), self.label_pro(l)?)))
            .collect()
    }

    // ── Coalescence ──────────────────────────────────────────────────

    /// Count of coalescent events: included nodes with two children.
    pub fn coal_count(&self) -> usize {
        self.preorder()
            .into_iter()
            .filter(|&id| self.n(id).include && self.n(id).children.len() == 2)
            .count()
    }

    /// Count of coalescent events carrying `label`.
    pub fn coal_count_of(&self, label: &Label) -> usize {
        self.preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                n.include && n.children.len() == 2 && &n.label == label
            })
            .count()
    }

    /// Count of coalescent events joining a trunk lineage with a side
    /// branch.
    pub fn coal_count_trunk(&self) -> usize {
        self.preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                if !n.include || n.children.len() != 2 {
                    return false;
                }
                let a = self.n(n.children[0]).trunk;
                let b = self.n(n.children[1]).trunk;
                a != b
            })
            .count()
    }

    /// Lineages alive at time `t`: included non-root nodes whose branch
    /// spans `t` (node time at or after `t`, parent strictly before).
    pub(crate) fn lineages_at(&self, t: f64) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                match n.parent {
                    Some(p) => n.include && n.time >= t && self.n(p).time < t,
                    None => false,
                }
            })
            .collect()
    }

    fn weight_over<F: Fn(&Node) -> bool>(&self, config: CoalConfig, pairwise: bool, pred: F) -> f64 {
        let start = self.root_time();
        let stop = self.present_time();
        if config.steps == 0 || stop <= start {
            return 0.0;
        }
        let step = (stop - start) / config.steps as f64;
        let mut weight = 0.0;
        let mut t = start;
        while t <= stop {
            let k = self
                .lineages_at(t)
                .into_iter()
                .filter(|&id| pred(self.n(id)))
                .count();
            if k > 0 {
                weight += if pairwise {
                    (k * (k - 1)) as f64 / 2.0 * step
                } else {
                    k as f64 * step
                };
            }
            t += step;
        }
        weight
    }

    /// Total opportunity for coalescence: the discretized integral of
    /// `C(lineages, 2)` over the tree's time span.
    pub fn coal_weight(&self, config: CoalConfig) -> f64 {
        self.weight_over(config, true, |_| true)
    }

    /// Coalescent opportunity restricted to lineages carrying `label`.
    pub fn coal_weight_of(&self, label: &Label, config: CoalConfig) -> f64 {
        self.weight_over(config, true, |n| &n.label == label)
    }

    /// Discretized integral of the raw lineage count, the opportunity for
    /// a side branch to meet the trunk.
    pub fn coal_weight_trunk(&self, config: CoalConfig) -> f64 {
        self.weight_over(config, false, |_| true)
    }

    /// Coalescent rate: events per unit opportunity.
    pub fn coal_rate(&self, config: CoalConfig) -> Result<f64> {
        let weight = self.coal_weight(config);
        if weight <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "coal_rate: zero coalescent opportunity".into(),
            ));
        }
        Ok(self.coal_count() as f64 / weight)
    }

    /// Coalescent rate restricted to `label`.
    pub fn coal_rate_of(&self, label: &Label, config: CoalConfig) -> Result<f64> {
        let weight = self.coal_weight_of(label, config);
        if weight <= 0.0 {
            return Err(PhysaliaError::Undefined(format!(
                "coal_rate: zero coalescent opportunity for label '{}'",
                label
            )));
        }
        Ok(self.coal_count_of(label) as f64 / weight)
    }

    /// `(label, coalescent count)` for every registered label.
    pub fn coal_counts(&self) -> Vec<(Label, usize)> {
        self.label_set()
            .iter()
            .map(|l| (l.clone(), self.coal_count_of(l)))
            .collect()
    }

    /// `(label, coalescent weight)` for every registered label.
    pub fn coal_weights(&self, config: CoalConfig) -> Vec<(Label, f64)> {
        self.label_set()
            .iter()
            .map(|l| (l.clone(), self.coal_weight_of(l, config)))
            .collect()
    }

    /// `(label, coalescent rate)` for every label with nonzero
    /// opportunity; zero-opportunity labels are omitted.
    pub fn coal_rates(&self, config: CoalConfig) -> Vec<(Label, f64)> {
        self.label_set()
            .iter()
            .filter_map(|l| self.coal_rate_of(l, config).ok().map(|r| (l.clone(), r)))
            .collect()
    }

    // ── Migration ────────────────────────────────────────────────────

    /// Count of migration events: included edges whose endpoint labels
    /// differ.
    pub fn mig_count(&self) -> usize {
        self.preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                match n.parent {
                    Some(p) => {
                        let parent = self.n(p);
                        n.include && parent.include && n.label != parent.label
                    }
                    None => false,
                }
            })
            .count()
    }

    /// Count of migration events from `from` to `to`, reading edges
    /// forward in time (parent carries `from`, child carries `to`).
    pub fn mig_count_between(&self, from: &Label, to: &Label) -> usize {
        self.preorder()
            .into_iter()
            .filter(|&id| {
                let n = self.n(id);
                match n.parent {
                    Some(p) => {
                        let parent = self.n(p);
                        n.include && parent.include && &n.label == to && &parent.label == from
                    }
                    None => false,
                }
            })
            .count()
    }

    /// Overall migration rate: events per unit tree length. Exactly zero
    /// for a migration-free tree with positive length.
    pub fn mig_rate(&self) -> Result<f64> {
        let length = self.length();
        if length <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "mig_rate: tree has no included length".into(),
            ));
        }
        Ok(self.mig_count() as f64 / length)
    }

    /// Migration rate from `from` to `to`, normalized by the destination
    /// label's branch length (the backward-in-time opportunity).
    pub fn mig_rate_between(&self, from: &Label, to: &Label) -> Result<f64> {
        let length = self.length_of(to);
        if length <= 0.0 {
            return Err(PhysaliaError::Undefined(format!(
                "mig_rate: no included length for label '{}'",
                to
            )));
        }
        Ok(self.mig_count_between(from, to) as f64 / length)
    }

    /// `(from, to, rate)` for every ordered label pair with a defined
    /// migration rate.
    pub fn mig_rates(&self) -> Vec<(Label, Label, f64)> {
        let labels: Vec<Label> = self.label_set().iter().cloned().collect();
        let mut out = Vec::new();
        for from in &labels {
            for to in &labels {
                if from == to {
                    continue;
                }
                if let Ok(rate) = self.mig_rate_between(from, to) {
                    out.push((from.clone(), to.clone(), rate));
                }
            }
        }
        out
    }

    // ── Diversity ────────────────────────────────────────────────────

    fn diversity_over<F: Fn(&Node, &Node) -> bool>(&self, pred: F) -> Result<f64> {
        let leaves = self.leaves();
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..leaves.len() {
            for j in (i + 1)..leaves.len() {
                let a = self.n(leaves[i]);
                let b = self.n(leaves[j]);
                if !a.include || !b.include || !pred(a, b) {
                    continue;
                }
                let anc = self.common_ancestor(leaves[i], leaves[j])?;
                let anc_time = self.n(anc).time;
                sum += (a.time - anc_time) + (b.time - anc_time);
                count += 1;
            }
        }
        if count == 0 {
            return Err(PhysaliaError::Undefined(
                "diversity: no qualifying tip pairs".into(),
            ));
        }
        Ok(sum / count as f64)
    }

    /// Mean pairwise divergence: for every pair of tips, the time from
    /// each back to their common ancestor, summed.
    pub fn diversity(&self) -> Result<f64> {
        self.diversity_over(|_, _| true)
    }

    /// Diversity among tips carrying `label`.
    pub fn diversity_of(&self, label: &Label) -> Result<f64> {
        self.diversity_over(|a, b| &a.label == label && &b.label == label)
    }

    /// Diversity among same-labeled tip pairs.
    pub fn diversity_within(&self) -> Result<f64> {
        self.diversity_over(|a, b| a.label == b.label)
    }

    /// Diversity among differently-labeled tip pairs.
    pub fn diversity_between(&self) -> Result<f64> {
        self.diversity_over(|a, b| a.label != b.label)
    }

    /// Divergence between two named tips.
    pub fn diversity_pair(&self, tip_a: &str, tip_b: &str) -> Result<f64> {
        let a = self.find_by_name(tip_a).ok_or_else(|| {
            PhysaliaError::InvalidInput(format!("diversity_pair: no tip named '{}'", tip_a))
        })?;
        let b = self.find_by_name(tip_b).ok_or_else(|| {
            PhysaliaError::InvalidInput(format!("diversity_pair: no tip named '{}'", tip_b))
        })?;
        let anc = self.common_ancestor(a, b)?;
        let anc_time = self.n(anc).time;
        Ok((self.n(a).time - anc_time) + (self.n(b).time - anc_time))
    }

    /// Tajima's D computed from tree-measured diversity and total length.
    ///
    /// `D = (pi - S/a1) / sqrt(e1 S + e2 S (S - 1))` with the standard
    /// normalization constants for the current sample size. Undefined for
    /// fewer than two tips or a vanishing variance term.
    pub fn tajima_d(&self) -> Result<f64> {
        let n = self.leaf_count();
        if n <= 1 {
            return Err(PhysaliaError::Undefined(
                "tajima_d: fewer than two sampled tips".into(),
            ));
        }
        let pi = self.diversity()?;
        let s = self.length();

        let mut a1 = 0.0;
        let mut a2 = 0.0;
        for i in 1..n {
            a1 += 1.0 / i as f64;
            a2 += 1.0 / (i * i) as f64;
        }
        let nf = n as f64;
        let e1 = (1.0 / a1) * ((nf + 1.0) / (3.0 * (nf - 1.0)) - 1.0 / a1);
        let e2 = (1.0 / (a1 * a1 + a2))
            * ((2.0 * (nf * nf + nf + 3.0)) / (9.0 * nf * (nf - 1.0)) - (nf + 2.0) / (nf * a1)
                + a2 / (a1 * a1));
        let denom = (e1 * s + e2 * s * (s - 1.0)).sqrt();
        if !(denom > 0.0) || !denom.is_finite() {
            return Err(PhysaliaError::Undefined(
                "tajima_d: vanishing variance term".into(),
            ));
        }
        Ok((pi - s / a1) / denom)
    }

    /// Population subdivision `Fst = (divBetween - divWithin) / divBetween`.
    pub fn fst(&self) -> Result<f64> {
        let within = self.diversity_within()?;
        let between = self.diversity_between()?;
        if between <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "fst: zero between-label diversity".into(),
            ));
        }
        Ok((between - within) / between)
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persistence_series(&self, label: Option<&Label>) -> Series {
        let mut series = Series::new();
        for id in self.leaves() {
            let node = self.n(id);
            if let Some(l) = label {
                if &node.label != l {
                    continue;
                }
            }
            let mut cur = node.parent;
            while let Some(c) = cur {
                if self.n(c).label != node.label {
                    series.insert(node.time - self.n(c).time);
                    break;
                }
                cur = self.n(c).parent;
            }
        }
        series
    }

    /// Mean time from each tip back to its nearest differently-labeled
    /// ancestor, an estimator of deme sojourn time.
    pub fn persistence(&self) -> Result<f64> {
        let series = self.persistence_series(None);
        if series.is_empty() {
            return Err(PhysaliaError::Undefined(
                "persistence: no tip has a differently-labeled ancestor".into(),
            ));
        }
        series.mean()
    }

    /// Persistence over tips carrying `label`.
    pub fn persistence_of(&self, label: &Label) -> Result<f64> {
        let series = self.persistence_series(Some(label));
        if series.is_empty() {
            return Err(PhysaliaError::Undefined(format!(
                "persistence: no qualifying tip with label '{}'",
                label
            )));
        }
        series.mean()
    }

    /// Empirical quantile of the persistence distribution.
    pub fn persistence_quantile(&self, q: f64) -> Result<f64> {
        let series = self.persistence_series(None);
        if series.is_empty() {
            return Err(PhysaliaError::Undefined(
                "persistence: no tip has a differently-labeled ancestor".into(),
            ));
        }
        series.quantile(q)
    }

    /// Persistence quantile over tips carrying `label`.
    pub fn persistence_quantile_of(&self, q: f64, label: &Label) -> Result<f64> {
        let series = self.persistence_series(Some(label));
        if series.is_empty() {
            return Err(PhysaliaError::Undefined(format!(
                "persistence: no qualifying tip with label '{}'",
                label
            )));
        }
        series.quantile(q)
    }

    // ── Diffusion and drift ──────────────────────────────────────────

    fn diffusion_over<F: Fn(&Node, &Node) -> bool>(&self, pred: F) -> Result<f64> {
        let mut total_sq = 0.0;
        let mut total_time = 0.0;
        let mut count = 0usize;
        for id in self.preorder() {
            let node = self.n(id);
            let Some(p) = node.parent else { continue };
            let parent = self.n(p);
            if !pred(node, parent) {
                continue;
            }
            let dx = node.x - parent.x;
            let dy = node.y - parent.y;
            total_sq += dx * dx + dy * dy;
            total_time += node.time - parent.time;
            count += 1;
        }
        if count == 0 || total_time <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "diffusion coefficient: no qualifying branches".into(),
            ));
        }
        Ok(total_sq / (4.0 * total_time))
    }

    /// Brownian diffusion coefficient over all branches:
    /// `sum(squared displacement) / (4 sum(elapsed time))`.
    pub fn diffusion_coefficient(&self) -> Result<f64> {
        self.diffusion_over(|_, _| true)
    }

    /// Diffusion coefficient over trunk branches.
    pub fn diffusion_coefficient_trunk(&self) -> Result<f64> {
        self.diffusion_over(|n, p| n.trunk && p.trunk)
    }

    /// Diffusion coefficient over side branches.
    pub fn diffusion_coefficient_side_branches(&self) -> Result<f64> {
        self.diffusion_over(|n, p| !n.trunk && !p.trunk)
    }

    /// Diffusion coefficient over internal side branches.
    pub fn diffusion_coefficient_internal(&self) -> Result<f64> {
        self.diffusion_over(|n, p| !n.leaf && !n.trunk && !p.trunk)
    }

    fn drift_over<F: Fn(&Node, &Node) -> bool>(&self, pred: F) -> Result<f64> {
        let mut total_dist = 0.0;
        let mut total_time = 0.0;
        let mut count = 0usize;
        for id in self.preorder() {
            let node = self.n(id);
            let Some(p) = node.parent else { continue };
            let parent = self.n(p);
            if !pred(node, parent) {
                continue;
            }
            total_dist += node.x - parent.x;
            total_time += node.time - parent.time;
            count += 1;
        }
        if count == 0 || total_time <= 0.0 {
            return Err(PhysaliaError::Undefined(
                "drift rate: no qualifying branches".into(),
            ));
        }
        Ok(total_dist / total_time)
    }

    /// Directional drift of the x trait over all branches.
    pub fn drift_rate(&self) -> Result<f64> {
        self.drift_over(|_, _| true)
    }

    /// Drift rate over trunk branches.
    pub fn drift_rate_trunk(&self) -> Result<f64> {
        self.drift_over(|n, p| n.trunk && p.trunk)
    }

    /// Drift rate over side branches.
    pub fn drift_rate_side_branches(&self) -> Result<f64> {
        self.drift_over(|n, p| !n.trunk && !p.trunk)
    }

    /// Drift rate over internal side branches.
    pub fn drift_rate_internal(&self) -> Result<f64> {
        self.drift_over(|n, p| !n.leaf && !n.trunk && !p.trunk)
    }

    // ── Tip-anchored trait walks ─────────────────────────────────────

    /// Walk back from a tip and return the node whose parent lies beyond
    /// `window` time units, or the deepest reachable child of the root.
    pub(crate) fn node_back_from_tip(&self, id: NodeId, window: f64) -> NodeId {
        let final_time = self.n(id).time - window;
        let mut cur = id;
        while let Some(p) = self.n(cur).parent {
            if self.n(p).time > final_time {
                cur = p;
            } else {
                break;
            }
        }
        cur
    }

    fn trait_back_from_tip(&self, id: NodeId, window: f64, use_x: bool) -> f64 {
        let final_time = self.n(id).time - window;
        let node = self.node_back_from_tip(id, window);
        let Some(p) = self.n(node).parent else {
            return 0.0;
        };
        let (child, parent) = (self.n(node), self.n(p));
        let dt = child.time - parent.time;
        if dt <= 0.0 {
            return 0.0;
        }
        let (cv, pv) = if use_x {
            (child.x, parent.x)
        } else {
            (child.y, parent.y)
        };
        let rate = (cv - pv) / dt;
        pv + (final_time - parent.time) * rate
    }

    /// Interpolated x trait value `window` time units back from a tip.
    pub fn x_back_from_tip(&self, id: NodeId, window: f64) -> f64 {
        self.trait_back_from_tip(id, window, true)
    }

    /// Interpolated y trait value `window` time units back from a tip.
    pub fn y_back_from_tip(&self, id: NodeId, window: f64) -> f64 {
        self.trait_back_from_tip(id, window, false)
    }

    /// Mean 1D drift of the x trait measured per tip between `offset` and
    /// `offset + window` back from the tip. Tips whose interpolation
    /// yields the 0.0 missing sentinel are skipped.
    pub fn rate_1d_from_tips(&self, offset: f64, window: f64) -> Result<f64> {
        let mut rate = 0.0;
        let mut count = 0.0;
        for id in self.preorder() {
            if !self.n(id).leaf {
                continue;
            }
            let start_x = self.x_back_from_tip(id, offset);
            let end_x = self.x_back_from_tip(id, offset + window);
            if start_x != 0.0 && end_x != 0.0 {
                rate += (start_x - end_x) / window;
                count += 1.0;
            }
        }
        if count == 0.0 {
            return Err(PhysaliaError::Undefined(
                "rate_1d_from_tips: no tips with usable trait values".into(),
            ));
        }
        Ok(rate / count)
    }

    /// Mean Euclidean drift of the `(x, y)` trait per tip between
    /// `offset` and `offset + window` back from the tip.
    pub fn rate_2d_from_tips(&self, offset: f64, window: f64) -> Result<f64> {
        let mut rate = 0.0;
        let mut count = 0.0;
        for id in self.preorder() {
            if !self.n(id).leaf {
                continue;
            }
            let start_x = self.x_back_from_tip(id, offset);
            let start_y = self.y_back_from_tip(id, offset);
            let end_x = self.x_back_from_tip(id, offset + window);
            let end_y = self.y_back_from_tip(id, offset + window);
            if start_x != 0.0 && end_x != 0.0 && start_y != 0.0 && end_y != 0.0 {
                let dx = start_x - end_x;
                let dy = start_y - end_y;
                rate += (dx * dx + dy * dy).sqrt() / window;
                count += 1.0;
            }
        }
        if count == 0.0 {
            return Err(PhysaliaError::Undefined(
                "rate_2d_from_tips: no tips with usable trait values".into(),
            ));
        }
        Ok(rate / count)
    }

    // ── Tip summaries ────────────────────────────────────────────────

    /// Mean x trait over structural tips.
    pub fn mean_x(&self) -> f64 {
        let leaves = self.leaves();
        leaves.iter().map(|&id| self.n(id).x).sum::<f64>() / leaves.len() as f64
    }

    /// Mean y trait over structural tips.
    pub fn mean_y(&self) -> f64 {
        let leaves = self.leaves();
        leaves.iter().map(|&id| self.n(id).y).sum::<f64>() / leaves.len() as f64
    }

    /// Mean branch rate over tips that carry one.
    pub fn mean_rate(&self) -> Result<f64> {
        let rates: Vec<f64> = self
            .leaves()
            .into_iter()
            .filter_map(|id| self.n(id).rate)
            .collect();
        if rates.is_empty() {
            return Err(PhysaliaError::Undefined(
                "mean_rate: no tip carries a rate".into(),
            ));
        }
        Ok(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    /// x trait of every structural tip, in pre-order.
    pub fn tips_x(&self) -> Vec<f64> {
        self.leaves().into_iter().map(|id| self.n(id).x).collect()
    }

    /// y trait of every structural tip, in pre-order.
    pub fn tips_y(&self) -> Vec<f64> {
        self.leaves().into_iter().map(|id| self.n(id).y).collect()
    }

    /// Time of the named node.
    pub fn time_of(&self, name: &str) -> Result<f64> {
        let id = self
            .find_by_name(name)
            .ok_or_else(|| PhysaliaError::InvalidInput(format!("no node named '{}'", name)))?;
        Ok(self.n(id).time)
    }

    /// Label of the named node.
    pub fn label_of(&self, name: &str) -> Result<Label> {
        let id = self
            .find_by_name(name)
            .ok_or_else(|| PhysaliaError::InvalidInput(format!("no node named '{}'", name)))?;
        Ok(self.n(id).label.clone())
    }

    /// Time for the named tip to coalesce with the trunk.
    pub fn time_to_trunk(&self, name: &str) -> Result<f64> {
        let id = self
            .find_by_name(name)
            .ok_or_else(|| PhysaliaError::InvalidInput(format!("no node named '{}'", name)))?;
        let mut cur = id;
        while !self.n(cur).trunk {
            match self.n(cur).parent {
                Some(p) => cur = p,
                None => {
                    return Err(PhysaliaError::Undefined(format!(
                        "time_to_trunk: no trunk ancestor for '{}'",
                        name
                    )))
                }
            }
        }
        Ok(self.n(id).time - self.n(cur).time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn three_tip_tree() -> CoalescentTree {
        CoalescentTree::from_newick("((A:1,B:1):1,C:2);").unwrap()
    }

    fn two_state_tree() -> CoalescentTree {
        CoalescentTree::from_newick(
            "((A:1[&states=1],B:1[&states=2]):1[&states=1],C:2[&states=1]);",
        )
        .unwrap()
    }

    #[test]
    fn three_tip_basics() {
        let t = three_tip_tree();
        assert_eq!(t.leaf_count(), 3);
        assert!((t.tmrca().unwrap() - 2.0).abs() < TOL);
        assert_eq!(t.coal_count(), 2);
    }

    #[test]
    fn single_tip_tmrca_is_undefined() {
        let mut t = three_tip_tree();
        t.prune_to_tips(&["A"]).unwrap();
        assert!(t.tmrca().is_err());
    }

    #[test]
    fn total_length_sums_branches() {
        let t = three_tip_tree();
        // 1 + 1 + 1 + 2
        assert!((t.length() - 5.0).abs() < TOL);
    }

    #[test]
    fn label_lengths_partition_total() {
        let t = two_state_tree();
        let total = t.length();
        let sum: f64 = t
            .label_set()
            .iter()
            .map(|l| t.length_of(l))
            .sum();
        assert!((sum - total).abs() < TOL);
        let pro: f64 = t
            .label_set()
            .iter()
            .map(|l| t.label_pro(l).unwrap())
            .sum();
        assert!((pro - 1.0).abs() < TOL);
    }

    #[test]
    fn per_label_vectors_cover_the_label_set() {
        let t = two_state_tree();
        assert_eq!(t.lengths().len(), 2);
        let pros = t.label_pros().unwrap();
        assert!((pros.iter().map(|(_, p)| p).sum::<f64>() - 1.0).abs() < TOL);
        let counts = t.coal_counts();
        let total: usize = counts.iter().map(|(_, c)| c).sum();
        assert_eq!(total, t.coal_count());
        let rates = t.mig_rates();
        assert!(rates
            .iter()
            .any(|(f, to, r)| f == &Label::new("1") && to == &Label::new("2") && *r > 0.0));
    }

    #[test]
    fn trunk_pro_is_a_proportion() {
        let mut t = three_tip_tree();
        t.renew_trunk(0.5);
        let pro = t.trunk_pro().unwrap();
        assert!((0.0..=1.0).contains(&pro), "trunk_pro = {}", pro);
    }

    #[test]
    fn coal_weight_matches_hand_computation() {
        let t = three_tip_tree();
        // Two lineages over [-2, -1] and three over [-1, 0]:
        // C(2,2) * 1 + C(3,2) * 1 = 1 + 3 = 4.
        let w = t.coal_weight(CoalConfig::default());
        assert!((w - 4.0).abs() < 0.05, "weight = {}", w);
    }

    #[test]
    fn coal_rate_is_count_over_weight() {
        let t = three_tip_tree();
        let config = CoalConfig::default();
        let rate = t.coal_rate(config).unwrap();
        let expected = t.coal_count() as f64 / t.coal_weight(config);
        assert!((rate - expected).abs() < TOL);
    }

    #[test]
    fn coal_config_steps_are_tunable() {
        let t = three_tip_tree();
        let coarse = t.coal_weight(CoalConfig { steps: 10 });
        let fine = t.coal_weight(CoalConfig { steps: 10_000 });
        assert!((coarse - fine).abs() < 0.5);
        assert!((fine - 4.0).abs() < 0.01);
    }

    #[test]
    fn migration_free_tree_has_zero_rate() {
        let t = three_tip_tree();
        // Unannotated tips all share the digit-derived label "1".
        assert_eq!(t.mig_count(), 0);
        let rate = t.mig_rate().unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn migration_counts_follow_label_changes() {
        let t = two_state_tree();
        // Only B's branch changes state (parent 1 -> child 2).
        assert_eq!(t.mig_count(), 1);
        assert_eq!(
            t.mig_count_between(&Label::new("1"), &Label::new("2")),
            1
        );
        assert_eq!(
            t.mig_count_between(&Label::new("2"), &Label::new("1")),
            0
        );
    }

    #[test]
    fn mig_rate_normalizes_by_destination_length() {
        let t = two_state_tree();
        let rate = t
            .mig_rate_between(&Label::new("1"), &Label::new("2"))
            .unwrap();
        let expected = 1.0 / t.length_of(&Label::new("2"));
        assert!((rate - expected).abs() < TOL);
    }

    #[test]
    fn diversity_averages_pairwise_divergence() {
        let t = three_tip_tree();
        // Pairs: (A,B) = 2, (A,C) = 4, (B,C) = 4 -> mean 10/3.
        let d = t.diversity().unwrap();
        assert!((d - 10.0 / 3.0).abs() < TOL);
    }

    #[test]
    fn diversity_pair_by_name() {
        let t = three_tip_tree();
        assert!((t.diversity_pair("A", "B").unwrap() - 2.0).abs() < TOL);
        assert!((t.diversity_pair("A", "C").unwrap() - 4.0).abs() < TOL);
        assert!(t.diversity_pair("A", "Z").is_err());
    }

    #[test]
    fn diversity_within_and_between() {
        let t = two_state_tree();
        // Within state 1: (A,C) = 4. Between: (A,B) = 2, (B,C) = 4.
        assert!((t.diversity_within().unwrap() - 4.0).abs() < TOL);
        assert!((t.diversity_between().unwrap() - 3.0).abs() < TOL);
        assert!((t.diversity_of(&Label::new("1")).unwrap() - 4.0).abs() < TOL);
    }

    #[test]
    fn single_tip_diversity_is_undefined() {
        let mut t = three_tip_tree();
        t.prune_to_tips(&["A"]).unwrap();
        assert!(t.diversity().is_err());
    }

    #[test]
    fn fst_from_diversities() {
        let t = two_state_tree();
        let fst = t.fst().unwrap();
        // (3 - 4) / 3
        assert!((fst - (-1.0 / 3.0)).abs() < TOL);
    }

    #[test]
    fn tajima_d_four_tips() {
        let t = CoalescentTree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        // pi = 10/3, S = 6, a1 = 11/6: positive numerator, positive variance.
        let d = t.tajima_d().unwrap();
        assert!(d.is_finite());
        assert!(d > 0.0, "d = {}", d);
    }

    #[test]
    fn tajima_d_degenerate_tree_is_undefined() {
        let mut t = three_tip_tree();
        t.prune_to_tips(&["A"]).unwrap();
        assert!(t.tajima_d().is_err());
        // The variance constants vanish identically for three samples,
        // which must surface as undefined rather than infinity.
        assert!(three_tip_tree().tajima_d().is_err());
    }

    #[test]
    fn persistence_measures_label_sojourn() {
        let t = two_state_tree();
        // Only B has a differently-labeled ancestor, 1 time unit back.
        let p = t.persistence().unwrap();
        assert!((p - 1.0).abs() < TOL);
        assert!((t.persistence_of(&Label::new("2")).unwrap() - 1.0).abs() < TOL);
        assert!(t.persistence_of(&Label::new("1")).is_err());
        assert!((t.persistence_quantile(0.5).unwrap() - 1.0).abs() < TOL);
    }

    #[test]
    fn diffusion_coefficient_from_displacements() {
        let mut t = three_tip_tree();
        // Unit x displacement per branch, zero y.
        for id in t.preorder() {
            let depth = t.ancestors_of(id).len() as f64 - 1.0;
            t.node_mut(id).unwrap().x = depth;
        }
        // Branch displacements are all 1; total time = 5.
        let c = t.diffusion_coefficient().unwrap();
        assert!((c - 4.0 / (4.0 * 5.0)).abs() < TOL);
    }

    #[test]
    fn drift_rate_from_displacements() {
        let mut t = three_tip_tree();
        for id in t.preorder() {
            let time = t.node(id).unwrap().time;
            t.node_mut(id).unwrap().x = 2.0 * time;
        }
        let r = t.drift_rate().unwrap();
        assert!((r - 2.0).abs() < TOL);
    }

    #[test]
    fn diffusion_without_branches_is_undefined() {
        let t = CoalescentTree::new();
        assert!(t.diffusion_coefficient().is_err());
        assert!(t.drift_rate().is_err());
    }

    #[test]
    fn mean_rate_over_annotated_tips() {
        let t = CoalescentTree::from_newick(
            "(A:1[&rate=0.002],B:1[&rate=0.004]);",
        )
        .unwrap();
        assert!((t.mean_rate().unwrap() - 0.003).abs() < TOL);
        let bare = three_tip_tree();
        assert!(bare.mean_rate().is_err());
    }

    #[test]
    fn time_to_trunk_walks_to_flagged_ancestor() {
        let mut t = CoalescentTree::from_newick("((A:0.5,B:0.5):1,C:2);").unwrap();
        t.renew_trunk(0.25);
        // A joins the trunk at the root (time -2); A sits at -0.5.
        assert!((t.time_to_trunk("A").unwrap() - 1.5).abs() < TOL);
        assert!((t.time_to_trunk("C").unwrap() - 0.0).abs() < TOL);
    }

    #[test]
    fn label_pro_from_tips_walks_back() {
        let t = two_state_tree();
        // A window of 0.5 stays on each tip's own branch.
        let pro = t.label_pro_from_tips(&Label::new("1"), 0.5).unwrap();
        assert!((pro - 2.0 / 3.0).abs() < TOL);
        let pro2 = t
            .label_pro_from_tips_starting(&Label::new("2"), 0.5, &Label::new("2"))
            .unwrap();
        assert!((pro2 - 1.0).abs() < TOL);
    }

    #[test]
    fn trait_interpolation_back_from_tip() {
        let mut t = CoalescentTree::from_newick("(A:1,B:1);").unwrap();
        let a = t.find_by_name("A").unwrap();
        t.node_mut(a).unwrap().x = 2.0;
        // Root x stays 0; halfway back the interpolated value is 1.0.
        assert!((t.x_back_from_tip(a, 0.5) - 1.0).abs() < TOL);
    }
}
