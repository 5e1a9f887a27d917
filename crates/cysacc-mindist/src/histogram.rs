//! Fixed-range histograms of distance values.

use serde::{Deserialize, Serialize};

/// Upper bound on the number of bins of one histogram.
pub const MAX_BINS: usize = 10_000;

/// Histogram over `[lo, hi]` with equal-width bins.
///
/// Values exactly equal to `hi` fall into the last bin; values outside the
/// range or non-finite are not counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin edges, `counts.len() + 1` entries
    pub edges: Vec<f64>,
    /// Counts per bin
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Build a histogram of `values` with `bins` bins spanning `[lo, hi]`.
    ///
    /// `bins` is clamped to `1..=MAX_BINS`; an empty or inverted range yields
    /// a single zero-width bin.
    pub fn new(values: &[f64], bins: usize, lo: f64, hi: f64) -> Self {
        let bins = bins.clamp(1, MAX_BINS);
        let hi = if hi > lo { hi } else { lo };
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + i as f64 * width).collect();
        let mut counts = vec![0usize; bins];

        for &v in values {
            if !v.is_finite() || v < lo || v > hi {
                continue;
            }
            let idx = if width > 0.0 {
                (((v - lo) / width).floor() as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }

        Self { edges, counts }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of counted values.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Bin width (all bins share it).
    pub fn bin_width(&self) -> f64 {
        if self.edges.len() < 2 {
            0.0
        } else {
            self.edges[1] - self.edges[0]
        }
    }

    /// Bin centres.
    pub fn midpoints(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Probability density: integrates to 1 over the range when non-empty.
    pub fn density(&self) -> Vec<f64> {
        let total = self.total();
        let width = self.bin_width();
        if total == 0 || width <= 0.0 {
            return vec![0.0; self.counts.len()];
        }
        let norm = total as f64 * width;
        self.counts.iter().map(|&c| c as f64 / norm).collect()
    }

    /// Centre of the most populated bin (first one on ties).
    pub fn mode(&self) -> Option<f64> {
        if self.total() == 0 {
            return None;
        }
        let (idx, _) = self
            .counts
            .iter()
            .enumerate()
            .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best });
        self.midpoints().get(idx).copied()
    }
}
