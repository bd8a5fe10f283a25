use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use crate::observation::Observation;
use crate::predictor::{floor_to_half_hour, HALF_HOUR_SECS};
use crate::preprocess::{preprocess, to_minutes, DEDUPE_EPSILON_MINUTES};

/// One value on the half-hour display grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridPoint {
    #[serde(rename = "datetime")]
    pub at: DateTime<Utc>,
    pub views: u64,
}

/// Resample a history onto :00/:30 ticks between its first and last cleaned
/// observation, interpolating linearly between the surrounding points.
pub fn half_hour_grid(history: &[Observation]) -> Vec<GridPoint> {
    let points = preprocess(history, DEDUPE_EPSILON_MINUTES);
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Vec::new(),
    };
    let first_time = match history.iter().filter_map(|o| o.time()).min() {
        Some(t) => t,
        None => return Vec::new(),
    };

    let step = Duration::seconds(HALF_HOUR_SECS);
    let mut tick = floor_to_half_hour(first_time);
    if to_minutes(tick) < first.minutes {
        tick = tick + step;
    }

    let mut grid = Vec::new();
    let mut idx = 0;
    while to_minutes(tick) <= last.minutes {
        let m = to_minutes(tick);
        while idx + 1 < points.len() && points[idx + 1].minutes < m {
            idx += 1;
        }
        let prev = points[idx];
        let views = match points.get(idx + 1) {
            Some(next) if next.minutes > prev.minutes => {
                let ratio = ((m - prev.minutes) / (next.minutes - prev.minutes)).clamp(0.0, 1.0);
                prev.views + (next.views - prev.views) * ratio
            }
            _ => prev.views,
        };
        grid.push(GridPoint { at: tick, views: views.max(0.0) as u64 });
        tick = tick + step;
    }
    grid
}
