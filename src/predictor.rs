//! Point-in-time view predictions and trailing-window deltas.
//!
//! Every prediction anchors at the most recent cleaned observation and moves
//! along the blended slope, whether the target lies before or after it.

use chrono::{DateTime, Duration, TimeZone, Utc};
use crate::config::EstimatorConfig;
use crate::observation::Observation;
use crate::preprocess::{preprocess, to_minutes, Point};
use crate::slope::{SlopeEstimate, SlopeEstimator};

/// Width of the delta alignment grid, matching the sampling cadence.
pub const HALF_HOUR_SECS: i64 = 30 * 60;

/// Floor an instant to the preceding :00 or :30 boundary (UTC).
pub fn floor_to_half_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let over_secs = t.timestamp().rem_euclid(HALF_HOUR_SECS);
    t - Duration::seconds(over_secs) - Duration::nanoseconds(t.timestamp_subsec_nanos() as i64)
}

/// A history cleaned and estimated once, answering any number of queries.
#[derive(Debug, Clone)]
pub struct Forecaster {
    points: Vec<Point>,
    estimate: SlopeEstimate,
}

impl Forecaster {
    pub fn new(history: &[Observation]) -> Self {
        Self::with_config(history, &EstimatorConfig::default())
    }

    pub fn with_config(history: &[Observation], config: &EstimatorConfig) -> Self {
        let points = preprocess(history, config.dedupe_epsilon_minutes);
        let estimate = SlopeEstimator::new(config.clone()).estimate(&points);
        Forecaster { points, estimate }
    }

    pub fn estimate(&self) -> &SlopeEstimate {
        &self.estimate
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// View count at `target`. 0 when the history has no usable entry.
    pub fn predict(&self, target: DateTime<Utc>) -> u64 {
        let last = match self.points.last() {
            Some(p) => *p,
            None => return 0,
        };
        let elapsed = to_minutes(target) - last.minutes;
        let mut predicted = (last.views + self.estimate.blended_slope * elapsed).round();
        if !predicted.is_finite() {
            predicted = last.views;
        }
        predicted.max(0.0) as u64
    }

    /// Growth over the trailing `days`, measured from a half-hour-aligned base
    /// tick that never precedes the first observation. Never negative.
    pub fn delta(&self, days: i64, now: DateTime<Utc>) -> u64 {
        let first = match self.points.first() {
            Some(p) => *p,
            None => return 0,
        };
        let now_prediction = self.predict(now);

        let target_tick = floor_to_half_hour(now - Duration::days(days));
        let base_tick = match minutes_to_instant(first.minutes) {
            Some(first_time) => target_tick.max(floor_to_half_hour(first_time)),
            None => target_tick,
        };

        now_prediction.saturating_sub(self.predict(base_tick))
    }
}

fn minutes_to_instant(minutes: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt((minutes * 60_000.0).round() as i64).single()
}

/// Predict the view count of `history` at `target`.
pub fn predict(history: &[Observation], target: DateTime<Utc>) -> u64 {
    Forecaster::new(history).predict(target)
}

/// Net growth of `history` over the trailing `days` as of `now`.
pub fn delta(history: &[Observation], days: i64, now: DateTime<Utc>) -> u64 {
    Forecaster::new(history).delta(days, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn linear_history(n: i64, step_views: u64) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation::real(t0() + Duration::minutes(30 * i), 1000 + step_views * i as u64))
            .collect()
    }

    #[test]
    fn test_floor_to_half_hour() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 10, 47, 13).unwrap() + Duration::milliseconds(250);
        assert_eq!(floor_to_half_hour(t), Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 10, 29, 59).unwrap();
        assert_eq!(floor_to_half_hour(t), Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        let on_tick = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
        assert_eq!(floor_to_half_hour(on_tick), on_tick);
    }

    #[test]
    fn test_two_point_extrapolation() {
        let history = vec![
            Observation::real(t0(), 1000),
            Observation::real(t0() + Duration::minutes(30), 1100),
        ];
        assert_eq!(predict(&history, t0() + Duration::minutes(60)), 1200);
    }

    #[test]
    fn test_linear_extrapolation_and_interpolation() {
        let history = linear_history(10, 90);
        let forecaster = Forecaster::new(&history);
        let last = t0() + Duration::minutes(270);
        assert_eq!(forecaster.predict(last + Duration::hours(5)), 1000 + 90 * 9 + 900);
        assert_eq!(forecaster.predict(t0() + Duration::minutes(60)), 1180);
    }

    #[test]
    fn test_anchor_reproduces_last_point() {
        let mut history = linear_history(6, 40);
        history.push(Observation::real(t0() + Duration::minutes(200), 1111));
        let (last_time, last) = crate::observation::latest(&history).unwrap();
        assert_eq!(predict(&history, last_time), last.views);
    }

    #[test]
    fn test_empty_history_predicts_zero() {
        assert_eq!(predict(&[], t0()), 0);
        assert_eq!(delta(&[], 7, t0()), 0);
    }

    #[test]
    fn test_prediction_floored_at_zero() {
        // Far enough back the line crosses zero.
        let history = linear_history(4, 10);
        assert_eq!(predict(&history, t0() - Duration::days(365)), 0);
    }

    #[test]
    fn test_delta_over_window() {
        // 48 views per half hour = 96 per hour; history spans 10 days.
        let history: Vec<Observation> = (0..480)
            .map(|i| Observation::real(t0() + Duration::minutes(30 * i), 48 * i as u64))
            .collect();
        let now = t0() + Duration::minutes(30 * 479);
        assert_eq!(delta(&history, 1, now), 48 * 48);
        assert_eq!(delta(&history, 7, now), 48 * 48 * 7);
    }

    #[test]
    fn test_delta_clamps_base_to_first_tick() {
        // Data only starts two days before now.
        let start = t0() + Duration::minutes(13);
        let history: Vec<Observation> = (0..96)
            .map(|i| Observation::real(start + Duration::minutes(30 * i), 5000 + 60 * i as u64))
            .collect();
        let now = start + Duration::minutes(30 * 95);
        let forecaster = Forecaster::new(&history);

        let expected = forecaster.predict(now) - forecaster.predict(t0());
        assert_eq!(forecaster.delta(7, now), expected);
        assert_eq!(forecaster.delta(30, now), expected);
        assert!(forecaster.delta(1, now) < expected);
    }

    #[test]
    fn test_delta_never_negative_with_reversals() {
        let views = [5000, 4800, 4700, 4650, 4600, 4400, 4300];
        let history: Vec<Observation> = views
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::real(t0() + Duration::minutes(30 * i as i64), *v))
            .collect();
        let now = t0() + Duration::hours(6);
        // Declining data floors the slope, so every window reports zero growth.
        for days in [0, 1, 7, 30] {
            assert_eq!(delta(&history, days, now), 0);
        }
    }
}
