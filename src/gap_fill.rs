//! Collection-time gap filling.
//!
//! The collector is meant to run every 30 minutes but runs get delayed or
//! skipped. Without intervention the stored cadence degrades and segment-rate
//! statistics become unreliable, so each cycle tops the history back up to
//! the expected cadence with `predicted` entries:
//! - after a successful fetch, by interpolating between the last stored point
//!   and the fresh reading (only when the gap exceeds the threshold);
//! - after a failed fetch, by extrapolating a trailing rate up to now.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use crate::config::GapFillConfig;
use crate::observation::{latest, Observation};

/// What a fill pass changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillResult {
    /// Predicted grid points inserted before the point at `now`
    pub synthesized: usize,
    /// True when the point at `now` replaced an entry with the same timestamp
    pub replaced: bool,
    /// Oldest entries dropped to respect the retention limit
    pub trimmed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GapFiller {
    config: GapFillConfig,
}

impl GapFiller {
    pub fn new(config: GapFillConfig) -> Self {
        GapFiller { config }
    }

    fn interval(&self) -> Option<Duration> {
        (self.config.interval_minutes > 0).then(|| Duration::minutes(self.config.interval_minutes))
    }

    /// Record a fresh reading taken at `now`.
    pub fn record_success(&self, history: &mut Vec<Observation>, now: DateTime<Utc>, views: u64) -> FillResult {
        let mut result = FillResult::default();

        let anchor = latest(history).map(|(t, obs)| (t, obs.views));
        if let (Some((last_time, last_views)), Some(interval)) = (anchor, self.interval()) {
            let gap = now - last_time;
            if gap > Duration::minutes(self.config.gap_threshold_minutes) {
                let gap_minutes = gap.num_milliseconds() as f64 / 60_000.0;
                let span = views as f64 - last_views as f64;

                let mut t = last_time + interval;
                while t < now {
                    let frac = (t - last_time).num_milliseconds() as f64 / 60_000.0 / gap_minutes;
                    let v = (last_views as f64 + span * frac).round().max(0.0) as u64;
                    history.push(Observation::predicted(t, v));
                    result.synthesized += 1;
                    t = t + interval;
                }
                debug!(
                    "[GapFill] Interpolated {} points over a {:.0} min gap ({} -> {})",
                    result.synthesized, gap_minutes, last_views, views
                );
            }
        }

        result.replaced = append_replacing(history, Observation::real(now, views));
        result.trimmed = self.trim(history);
        result
    }

    /// Record a cycle whose fetch failed: extrapolate from the trailing rate up to `now`.
    ///
    /// A history with no resolvable entry is left unchanged.
    pub fn record_failure(&self, history: &mut Vec<Observation>, now: DateTime<Utc>) -> FillResult {
        let mut result = FillResult::default();

        let (last_time, last_views) = match latest(history) {
            Some((t, obs)) => (t, obs.views),
            None => {
                debug!("[GapFill] Nothing to extrapolate from");
                return result;
            }
        };
        let rate = self.trailing_rate(history);
        let at = |t: DateTime<Utc>| -> u64 {
            let minutes = (t - last_time).num_milliseconds() as f64 / 60_000.0;
            (last_views as f64 + rate * minutes).round().max(0.0) as u64
        };

        if let Some(interval) = self.interval() {
            let mut t = last_time + interval;
            while t < now {
                history.push(Observation::predicted(t, at(t)));
                result.synthesized += 1;
                t = t + interval;
            }
        }
        debug!(
            "[GapFill] Extrapolated {} points at {:.3} views/min from {}",
            result.synthesized, rate, last_views
        );

        result.replaced = append_replacing(history, Observation::predicted(now, at(now)));
        result.trimmed = self.trim(history);
        result
    }

    /// Views per minute across the last `trailing_window` real observations,
    /// or across the last entries of any kind when fewer than 2 are real.
    pub fn trailing_rate(&self, history: &[Observation]) -> f64 {
        let mut timed: Vec<(DateTime<Utc>, &Observation)> =
            history.iter().filter_map(|o| o.time().map(|t| (t, o))).collect();
        timed.sort_by_key(|(t, _)| *t);

        let real: Vec<(DateTime<Utc>, u64)> = timed
            .iter()
            .filter(|(_, o)| !o.predicted)
            .map(|(t, o)| (*t, o.views))
            .collect();
        let pool: Vec<(DateTime<Utc>, u64)> = if real.len() >= 2 {
            real
        } else {
            timed.iter().map(|(t, o)| (*t, o.views)).collect()
        };

        let window = &pool[pool.len().saturating_sub(self.config.trailing_window)..];
        match (window.first(), window.last()) {
            (Some(&(t0, v0)), Some(&(t1, v1))) => {
                let minutes = (t1 - t0).num_milliseconds() as f64 / 60_000.0;
                if minutes > 0.0 { (v1 as f64 - v0 as f64) / minutes } else { 0.0 }
            }
            _ => 0.0,
        }
    }

    /// Drop the oldest entries beyond `max_history`.
    pub fn trim(&self, history: &mut Vec<Observation>) -> usize {
        let excess = history.len().saturating_sub(self.config.max_history);
        if excess > 0 {
            history.drain(..excess);
        }
        excess
    }
}

/// Append `obs`, first removing entries stored at the same millisecond.
fn append_replacing(history: &mut Vec<Observation>, obs: Observation) -> bool {
    let key = obs.normalized_millis();
    let before = history.len();
    history.retain(|o| key.is_none() || o.normalized_millis() != key);
    let replaced = history.len() != before;
    history.push(obs);
    replaced
}
