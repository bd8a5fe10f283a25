//! Robust growth-rate estimation.
//!
//! Two independent estimators run over the cleaned history:
//! - a weighted least-squares line through the good set, anchored at the last
//!   good point with an exponential (half-life) weight decay away from it;
//! - an EMA over every segment rate, which reacts faster but is noisier.
//!
//! They are blended by a confidence score built from the regression's R² and
//! how many good points backed it.

use log::debug;
use crate::config::EstimatorConfig;
use crate::preprocess::Point;
use crate::spike_filter::{SegmentRates, SpikeFilter};

/// Derived growth-rate estimate (views per minute). Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlopeEstimate {
    pub regression_slope: f64,
    pub ema_slope: f64,
    pub blended_slope: f64,
    pub r_squared: f64,
    pub confidence: f64,
    pub point_count: usize,
    pub good_count: usize,
    pub median_rate: f64,
}

/// Weighted line fit `views ≈ intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// True when the weighted system was singular and the two-point slope was used
    pub singular: bool,
}

/// Weighted regression over `points`, with `x = t - t_last`.
///
/// Requires at least two points.
pub fn weighted_regression(points: &[Point], half_life_minutes: f64, singular_epsilon: f64) -> Option<Regression> {
    let first = points.first()?;
    let last = points.last()?;
    if points.len() < 2 {
        return None;
    }

    let samples: Vec<(f64, f64, f64)> = points
        .iter()
        .map(|p| {
            let x = p.minutes - last.minutes;
            let w = (-(x.abs() / half_life_minutes) * std::f64::consts::LN_2).exp();
            (x, p.views, w)
        })
        .collect();

    let (mut sw, mut swx, mut swy, mut swxx, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(x, y, w) in &samples {
        sw += w;
        swx += w * x;
        swy += w * y;
        swxx += w * x * x;
        swxy += w * x * y;
    }

    let denom = sw * swxx - swx * swx;
    let singular = !(denom.abs() >= singular_epsilon) || sw <= 0.0;
    let (slope, intercept) = if singular {
        let dt = last.minutes - first.minutes;
        let slope = if dt > 0.0 { (last.views - first.views) / dt } else { 0.0 };
        (slope, last.views)
    } else {
        let slope = (sw * swxy - swx * swy) / denom;
        (slope, (swy - slope * swx) / sw)
    };

    let r_squared = if sw > 0.0 {
        let mean_y = swy / sw;
        let (mut ss_tot, mut ss_res) = (0.0, 0.0);
        for &(x, y, w) in &samples {
            ss_tot += w * (y - mean_y).powi(2);
            ss_res += w * (y - (intercept + slope * x)).powi(2);
        }
        let r2 = 1.0 - ss_res / ss_tot;
        if r2.is_finite() { r2.clamp(0.0, 1.0) } else { 0.0 }
    } else {
        0.0
    };

    Some(Regression { slope, intercept, r_squared, singular })
}

/// EMA of `rates`, seeded with the first rate. `None` for an empty slice.
pub fn ema(rates: &[f64], alpha: f64) -> Option<f64> {
    let (first, rest) = rates.split_first()?;
    Some(rest.iter().fold(*first, |acc, r| alpha * r + (1.0 - alpha) * acc))
}

/// Confidence in the regression: R² scaled by sample support, in `[0, 1]`.
pub fn confidence(r_squared: f64, good_count: usize, full_support: usize) -> f64 {
    let support = good_count.min(full_support) as f64 / full_support.max(1) as f64;
    let conf = r_squared * support;
    if conf.is_finite() { conf.clamp(0.0, 1.0) } else { 0.0 }
}

/// Combine both estimators.
///
/// Growth is treated as non-negative: a negative or non-finite blend falls
/// back to `max(0, ema, regression)`, so a genuinely declining history reports
/// zero growth rather than a decline. The result is bounded by
/// `max(|median| * cap_multiplier, cap_floor)`.
pub fn blend(regression: f64, ema: f64, conf: f64, median_rate: f64, cap_multiplier: f64, cap_floor: f64) -> f64 {
    let mut slope = conf * regression + (1.0 - conf) * ema;
    if !slope.is_finite() || slope < 0.0 {
        // f64::max ignores NaN operands.
        slope = 0.0_f64.max(ema).max(regression);
        if !slope.is_finite() {
            slope = 0.0;
        }
    }
    let cap = (median_rate.abs() * cap_multiplier).max(cap_floor);
    slope.clamp(-cap, cap)
}

/// Robust slope estimator over a cleaned point sequence
#[derive(Debug, Clone, Default)]
pub struct SlopeEstimator {
    config: EstimatorConfig,
}

impl SlopeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        SlopeEstimator { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the current growth rate. Fewer than 2 points (or no segment
    /// spanning time) gives a zero-slope, zero-confidence estimate.
    pub fn estimate(&self, points: &[Point]) -> SlopeEstimate {
        let neutral = SlopeEstimate { point_count: points.len(), ..SlopeEstimate::default() };
        if points.len() < 2 {
            return neutral;
        }

        let rates = SegmentRates::from_points(points);
        let spike_filter = SpikeFilter::new(self.config.outlier_k, self.config.mad_floor);
        let filtered = match spike_filter.filter(points, &rates) {
            Some(f) => f,
            None => return neutral,
        };

        let regression = match weighted_regression(&filtered.good, self.config.half_life_minutes, self.config.singular_epsilon) {
            Some(r) => r,
            None => return neutral,
        };
        if regression.singular {
            debug!("[Slope] Singular regression over {} points, using two-point slope", filtered.good.len());
        }

        let ema_slope = ema(&rates.valid(), self.config.ema_alpha).unwrap_or(0.0);
        let conf = confidence(regression.r_squared, filtered.good.len(), self.config.confidence_points);
        let blended_slope = blend(
            regression.slope,
            ema_slope,
            conf,
            filtered.median_rate,
            self.config.cap_multiplier,
            self.config.cap_floor,
        );

        debug!(
            "[Slope] reg={:.4} ema={:.4} r2={:.3} conf={:.3} -> {:.4} views/min",
            regression.slope, ema_slope, regression.r_squared, conf, blended_slope
        );

        SlopeEstimate {
            regression_slope: regression.slope,
            ema_slope,
            blended_slope,
            r_squared: regression.r_squared,
            confidence: conf,
            point_count: points.len(),
            good_count: filtered.good.len(),
            median_rate: filtered.median_rate,
        }
    }
}
