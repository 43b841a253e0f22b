//! Skyline sampling: time series of tree statistics at regular steps.
//!
//! Concurrent-lineage statistics only change at coalescent and migration
//! events, so each sampler works band-by-band between event times and
//! emits one `(time, value)` point per grid step. Grid points where a
//! statistic is undefined (no lineages, a single lineage) are skipped,
//! which keeps the two sequences equal-length and the index monotone.

use physalia_core::{PhysaliaError, Result};

use crate::node::Label;
use crate::tree::CoalescentTree;

/// Default sampling step for skyline series.
pub const DEFAULT_STEP_SIZE: f64 = 0.1;

/// A sampled statistic: parallel time points and values with a strictly
/// increasing index.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkylineSeries {
    /// Sample times.
    pub index: Vec<f64>,
    /// Statistic values at those times.
    pub value: Vec<f64>,
}

impl SkylineSeries {
    fn push(&mut self, t: f64, v: f64) {
        self.index.push(t);
        self.value.push(v);
    }

    /// Number of sampled points.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if nothing was sampled.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate over `(time, value)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.index.iter().copied().zip(self.value.iter().copied())
    }
}

fn check_step(step_size: f64) -> Result<()> {
    if !(step_size > 0.0) || !step_size.is_finite() {
        return Err(PhysaliaError::InvalidInput(format!(
            "skyline step size {} must be positive and finite",
            step_size
        )));
    }
    Ok(())
}

/// Sorted distinct event times of the tree.
fn event_times(tree: &CoalescentTree) -> Vec<f64> {
    let mut times: Vec<f64> = tree
        .preorder()
        .into_iter()
        .map(|id| tree.node(id).unwrap().time)
        .collect();
    times.sort_by(|a, b| a.partial_cmp(b).unwrap());
    times.dedup();
    times
}

/// Effective coalescent timescale `Ne * tau` per inter-event band.
///
/// A band contributes `k (k - 1) / 2` times its width when its ancient
/// boundary is a true coalescence (the lineage count drops moving
/// backward across it); sampling-event bands contribute zero.
pub fn ne_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let times = event_times(tree);
    if times.len() < 2 {
        return Ok(series);
    }

    let mut band_value = Vec::with_capacity(times.len() - 1);
    let mut prev_k = 1usize;
    for band in times.windows(2) {
        let mid = (band[0] + band[1]) / 2.0;
        let k = tree.lineages_at(mid).len();
        let coalescent_band = k == prev_k + 1;
        band_value.push(if coalescent_band && k >= 2 {
            (k * (k - 1)) as f64 / 2.0 * (band[1] - band[0])
        } else {
            0.0
        });
        prev_k = k;
    }

    let (start, stop) = (times[0], times[times.len() - 1]);
    let mut t = start;
    while t < stop {
        let band = match times.iter().position(|&e| e > t) {
            Some(i) => i - 1,
            None => band_value.len() - 1,
        };
        series.push(t, band_value[band]);
        t += step_size;
    }
    Ok(series)
}

/// Mean substitution rate across concurrent lineages.
pub fn sub_rate_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    let mut t = start;
    while t < stop {
        let rates: Vec<f64> = tree
            .lineages_at(t)
            .into_iter()
            .filter_map(|id| tree.node(id).unwrap().rate)
            .collect();
        if !rates.is_empty() {
            series.push(t, rates.iter().sum::<f64>() / rates.len() as f64);
        }
        t += step_size;
    }
    Ok(series)
}

/// Pairwise diversity among concurrent lineages: for each pair alive at
/// `t`, twice the time from `t` back to their common ancestor.
pub fn div_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    let mut t = start;
    while t < stop {
        let alive = tree.lineages_at(t);
        if alive.len() >= 2 {
            let mut sum = 0.0;
            let mut count = 0usize;
            for i in 0..alive.len() {
                for j in (i + 1)..alive.len() {
                    let anc = tree.common_ancestor(alive[i], alive[j])?;
                    sum += 2.0 * (t - tree.node(anc).unwrap().time);
                    count += 1;
                }
            }
            series.push(t, sum / count as f64);
        }
        t += step_size;
    }
    Ok(series)
}

/// Time back from `t` to the most recent common ancestor of the
/// concurrent lineages.
pub fn tmrca_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    let mut t = start;
    while t < stop {
        let alive = tree.lineages_at(t);
        if alive.len() >= 2 {
            let mut sub = tree.extract_subtree(&alive)?;
            sub.peel_back();
            series.push(t, t - sub.root_time());
        }
        t += step_size;
    }
    Ok(series)
}

/// Tajima's D among concurrent lineages, computed on a time slice of an
/// owned copy at each step.
pub fn tajima_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    let mut t = start;
    while t < stop {
        if tree.lineages_at(t).len() >= 2 {
            let mut sliced = tree.clone();
            sliced.time_slice(t)?;
            if let Ok(d) = sliced.tajima_d() {
                series.push(t, d);
            }
        }
        t += step_size;
    }
    Ok(series)
}

/// Proportion of concurrent lineages carrying `label`.
pub fn label_skyline(
    tree: &CoalescentTree,
    label: &Label,
    step_size: f64,
) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    let mut t = start;
    while t < stop {
        let alive = tree.lineages_at(t);
        if !alive.is_empty() {
            let matching = alive
                .iter()
                .filter(|&&id| &tree.node(id).unwrap().label == label)
                .count();
            series.push(t, matching as f64 / alive.len() as f64);
        }
        t += step_size;
    }
    Ok(series)
}

/// Mean time for sampled tips to coalesce with the trunk, bucketed by
/// the tips' own sample times. Buckets with no tips are skipped.
pub fn tc_skyline(tree: &CoalescentTree, step_size: f64) -> Result<SkylineSeries> {
    check_step(step_size)?;
    let mut series = SkylineSeries::default();
    let (start, stop) = (tree.root_time(), tree.present_time());
    if !(stop > start) {
        return Ok(series);
    }
    let buckets = ((stop - start) / step_size).ceil() as usize + 1;
    let mut sums = vec![0.0f64; buckets];
    let mut counts = vec![0usize; buckets];

    for id in tree.preorder() {
        let node = tree.node(id).unwrap();
        if !node.leaf {
            continue;
        }
        // Walk back to the first trunk ancestor.
        let mut cur = id;
        let reached = loop {
            if tree.node(cur).unwrap().trunk {
                break true;
            }
            match tree.node(cur).unwrap().parent {
                Some(p) => cur = p,
                None => break false,
            }
        };
        if !reached {
            continue;
        }
        let tc = node.time - tree.node(cur).unwrap().time;
        let bucket = (((node.time - start) / step_size).floor() as usize).min(buckets - 1);
        sums[bucket] += tc;
        counts[bucket] += 1;
    }

    for (i, (&sum, &count)) in sums.iter().zip(counts.iter()).enumerate() {
        if count > 0 {
            series.push(start + i as f64 * step_size, sum / count as f64);
        }
    }
    Ok(series)
}
