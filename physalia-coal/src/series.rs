//! Sorted-sample accumulator with quantile lookup.
//!
//! Backs persistence quantiles and ad hoc summaries of per-tip values.

use physalia_core::{PhysaliaError, Result};

/// An accumulating sample of scalar observations.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    /// Empty series.
    pub fn new() -> Self {
        Series { values: Vec::new() }
    }

    /// Insert an observation.
    pub fn insert(&mut self, v: f64) {
        self.values.push(v);
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no observations were inserted.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Arithmetic mean of the observations.
    pub fn mean(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(PhysaliaError::Undefined("mean of empty series".into()));
        }
        Ok(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Empirical quantile with linear interpolation between order statistics.
    ///
    /// `q` must lie in `[0, 1]`.
    pub fn quantile(&self, q: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(PhysaliaError::InvalidInput(format!(
                "quantile {} outside [0, 1]",
                q
            )));
        }
        if self.values.is_empty() {
            return Err(PhysaliaError::Undefined("quantile of empty series".into()));
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = q * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let frac = rank - lo as f64;
        Ok(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_endpoints() {
        let mut s = Series::new();
        for v in [3.0, 1.0, 2.0] {
            s.insert(v);
        }
        assert_eq!(s.quantile(0.0).unwrap(), 1.0);
        assert_eq!(s.quantile(1.0).unwrap(), 3.0);
        assert_eq!(s.quantile(0.5).unwrap(), 2.0);
    }

    #[test]
    fn quantile_interpolates() {
        let mut s = Series::new();
        for v in [0.0, 10.0] {
            s.insert(v);
        }
        assert!((s.quantile(0.25).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn empty_series_is_undefined() {
        let s = Series::new();
        assert!(s.quantile(0.5).is_err());
        assert!(s.mean().is_err());
    }

    #[test]
    fn out_of_range_q_rejected() {
        let mut s = Series::new();
        s.insert(1.0);
        assert!(s.quantile(1.5).is_err());
    }

    #[test]
    fn mean_of_values() {
        let mut s = Series::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.insert(v);
        }
        assert!((s.mean().unwrap() - 2.5).abs() < 1e-12);
    }
}
