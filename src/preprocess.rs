use chrono::{DateTime, Utc};
use crate::observation::Observation;

/// Default duplicate window in minutes (about 3.6 ms).
pub const DEDUPE_EPSILON_MINUTES: f64 = 6e-5;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// A cleaned sample: minutes since the Unix epoch and cumulative views.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub minutes: f64,
    pub views: f64,
}

pub fn to_minutes(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / MILLIS_PER_MINUTE
}

/// Resolve, sort and deduplicate a raw history.
///
/// Entries without a resolvable timestamp are dropped. The output has strictly
/// increasing times, at least `epsilon` minutes apart.
pub fn preprocess(history: &[Observation], epsilon: f64) -> Vec<Point> {
    let points: Vec<Point> = history
        .iter()
        .filter_map(|obs| {
            obs.time().map(|t| Point { minutes: to_minutes(t), views: obs.views as f64 })
        })
        .collect();
    clean_points(points, epsilon)
}

/// Sort ascending by time and collapse near-duplicates, keeping the later one.
pub fn clean_points(mut points: Vec<Point>, epsilon: f64) -> Vec<Point> {
    // Stable, so equal times keep input order and the later entry wins below.
    points.sort_by(|a, b| a.minutes.partial_cmp(&b.minutes).unwrap_or(std::cmp::Ordering::Equal));

    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if p.minutes - last.minutes < epsilon => *last = p,
            _ => out.push(p),
        }
    }
    out
}
