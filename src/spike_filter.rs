//! Spike Detection over Segment Rates
//!
//! Polled view counts are noisy: an API replica can lag behind, a count can be
//! revised downwards, a single poll can report a wildly inflated figure. Each
//! of these shows up as one or two adjacent segments whose rate (views per
//! minute) is far away from the rest of the history.
//!
//! ## Algorithm
//! 1. Compute the rate of every adjacent pair of cleaned points
//! 2. Calculate median and MAD (Median Absolute Deviation) of those rates
//! 3. A segment is a "spike" if its deviation from the median exceeds k * MAD
//! 4. A point touching a spike segment on either side is excluded from the good set
//! 5. If fewer than 2 points survive, the whole sequence is used instead
//!
//! MAD is used over standard deviation because it is itself resistant to the
//! outliers it is trying to detect.

use log::debug;
use crate::preprocess::Point;

// ============================================================================
// SPIKE FILTER CONSTANTS
// ============================================================================

/// MAD multiplier. Rates further than K * MAD from the median are spikes.
pub const DEFAULT_K: f64 = 6.0;
/// Minimum MAD so perfectly regular histories don't divide by zero.
pub const MIN_MAD_FLOOR: f64 = 1e-6;

/// Rates of adjacent point pairs.
///
/// `by_segment[i]` is the rate between point `i` and point `i + 1`, or `None`
/// when that pair spans no time.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRates {
    pub by_segment: Vec<Option<f64>>,
}

impl SegmentRates {
    pub fn from_points(points: &[Point]) -> Self {
        let by_segment = points
            .windows(2)
            .map(|w| {
                let dt = w[1].minutes - w[0].minutes;
                if dt > 0.0 { Some((w[1].views - w[0].views) / dt) } else { None }
            })
            .collect();
        SegmentRates { by_segment }
    }

    /// Valid rates in time order.
    pub fn valid(&self) -> Vec<f64> {
        self.by_segment.iter().flatten().copied().collect()
    }
}

/// Median of a sample. Even-length samples average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around `center`.
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|&x| (x - center).abs()).collect();
    median(&deviations)
}

/// Result of spike rejection over a cleaned sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// Points used for regression (the good set, or everything on fallback)
    pub good: Vec<Point>,
    /// Number of points rejected before any fallback
    pub rejected: usize,
    /// True when too few points survived and the full sequence was used
    pub fallback: bool,
    /// Median of all segment rates
    pub median_rate: f64,
    /// MAD of all segment rates (floored)
    pub mad_rate: f64,
}

/// MAD spike filter over the segment rates of a history
#[derive(Debug, Clone)]
pub struct SpikeFilter {
    k: f64,
    min_mad: f64,
}

impl Default for SpikeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_K, MIN_MAD_FLOOR)
    }
}

impl SpikeFilter {
    pub fn new(k: f64, min_mad: f64) -> Self {
        SpikeFilter { k, min_mad }
    }

    /// Split `points` into the good set. Returns `None` when there is no valid segment.
    pub fn filter(&self, points: &[Point], rates: &SegmentRates) -> Option<FilterResult> {
        let valid = rates.valid();
        let median_rate = median(&valid)?;
        let mad_rate = mad(&valid, median_rate).unwrap_or(0.0).max(self.min_mad);
        let threshold = self.k * mad_rate;

        let is_spike = |seg: Option<&Option<f64>>| match seg {
            Some(Some(r)) => (r - median_rate).abs() > threshold,
            _ => false,
        };

        let good: Vec<Point> = points
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let left = if *i > 0 { rates.by_segment.get(i - 1) } else { None };
                let right = rates.by_segment.get(*i);
                !is_spike(left) && !is_spike(right)
            })
            .map(|(_, p)| *p)
            .collect();

        let rejected = points.len() - good.len();
        if rejected > 0 {
            debug!(
                "[Spike] Rejected {} of {} points (median={:.4}/min, MAD={:.4}, threshold={:.4})",
                rejected, points.len(), median_rate, mad_rate, threshold
            );
        }

        if good.len() < 2 {
            debug!("[Spike] Only {} good points, using unfiltered sequence", good.len());
            return Some(FilterResult {
                good: points.to_vec(),
                rejected,
                fallback: true,
                median_rate,
                mad_rate,
            });
        }

        Some(FilterResult { good, rejected, fallback: false, median_rate, mad_rate })
    }
}

// ============================================================================
// TESTS
// ============================================================================
