use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::sync::Arc;
use viewpulse::config::SystemConfig;
use viewpulse::controller::Collector;
use viewpulse::document::{AggregateDocument, VideoTarget};
use viewpulse::traits::{MetadataSource, VideoMetadata};
use viewpulse::Forecaster;

// --- Simulated channel ---

struct World {
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    rng: StdRng,
    noise: f64,
    fail_next: bool,
    glitch_next: Option<&'static str>,
}

impl World {
    fn minutes(&self, t: DateTime<Utc>) -> f64 {
        (t - self.start).num_milliseconds() as f64 / 60_000.0
    }

    /// True cumulative views of each simulated video.
    fn truth(&self, id: &str, t: DateTime<Utc>) -> f64 {
        let m = self.minutes(t);
        match id {
            "fast" => 50_000.0 + 2.0 * m,
            "slow" => 1_000.0 + 0.5 * m,
            _ => 0.0,
        }
    }
}

struct SharedWorld {
    state: RefCell<World>,
}

struct SimSource(Arc<SharedWorld>);

impl MetadataSource for SimSource {
    fn fetch_batch(&self, ids: &[String]) -> Result<Vec<VideoMetadata>> {
        let mut world = self.0.state.borrow_mut();
        if world.fail_next {
            return Err(anyhow!("simulated outage"));
        }
        let now = world.now;
        let glitch = world.glitch_next.take();

        let mut out = Vec::new();
        for id in ids {
            let noise = world.noise;
            let jitter: f64 = if noise > 0.0 { world.rng.random_range(-noise..noise) } else { 0.0 };
            let mut views = (world.truth(id, now) + jitter).round().max(0.0) as u64;
            if glitch == Some(id.as_str()) {
                views *= 10;
            }
            out.push(VideoMetadata {
                id: id.clone(),
                title: format!("Sim {}", id),
                thumbnail: String::new(),
                published: "2024-01-01".into(),
                views,
            });
        }
        Ok(out)
    }
}

fn targets() -> Vec<VideoTarget> {
    ["fast", "slow"]
        .iter()
        .map(|id| VideoTarget { id: id.to_string(), unit: "Sim".into(), banner: String::new() })
        .collect()
}

// --- The Test Runner ---

/// Run `cycles` half-hourly collection cycles with jittered start times,
/// skipped runs and failed fetches. Returns the final document and the last cycle time.
fn run_simulation(seed: u64, cycles: i64, noise: f64, persist: bool) -> (AggregateDocument, Arc<SharedWorld>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let world = Arc::new(SharedWorld {
        state: RefCell::new(World {
            start,
            now: start,
            rng: StdRng::seed_from_u64(seed),
            noise,
            fail_next: false,
            glitch_next: None,
        }),
    });

    let collector = Collector::new(SimSource(world.clone()), SystemConfig::default());
    let targets = targets();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats_history.json");

    let mut schedule = StdRng::seed_from_u64(seed ^ 0x5eed);
    let mut doc = AggregateDocument::default();
    let mut now = start;

    for k in 0..cycles {
        let last = k == cycles - 1;
        if k > 0 && !last && schedule.random::<f64>() < 0.1 {
            continue; // run never happened
        }
        let offset_ms = schedule.random_range(-300_000..300_000);
        now = start + Duration::minutes(30 * k) + Duration::milliseconds(offset_ms);

        {
            let mut w = world.state.borrow_mut();
            w.now = now;
            w.fail_next = k > 0 && !last && schedule.random::<f64>() < 0.05;
            w.glitch_next = if k == 100 || k == 250 { Some("fast") } else { None };
        }

        if persist && k % 48 == 0 {
            doc.save(&path).unwrap();
            doc = AggregateDocument::load(&path).unwrap();
        }
        collector.run_cycle(&mut doc, &targets, now);
    }

    (doc, world, now)
}

#[test]
fn test_estimates_track_truth_through_outages() {
    for seed in [1, 2, 3] {
        let (doc, world, now) = run_simulation(seed, 480, 10.0, true);
        let world = world.state.borrow();

        for id in ["fast", "slow"] {
            let video = doc.video(id).unwrap();
            let forecaster = Forecaster::new(&video.history);

            let truth_now = world.truth(id, now);
            let predicted = forecaster.predict(now) as f64;
            assert!(
                ((predicted - truth_now) / truth_now).abs() < 0.005,
                "seed {} {}: predicted {} vs truth {}", seed, id, predicted, truth_now
            );

            let truth_week = truth_now - world.truth(id, now - Duration::days(7));
            let delta = forecaster.delta(7, now) as f64;
            assert!(
                ((delta - truth_week) / truth_week).abs() < 0.05,
                "seed {} {}: 7d delta {} vs truth {}", seed, id, delta, truth_week
            );
        }
    }
}

#[test]
fn test_history_keeps_sampling_cadence() {
    let (doc, _, _) = run_simulation(11, 300, 10.0, false);

    for video in &doc.videos {
        let mut times: Vec<DateTime<Utc>> = video.history.iter().filter_map(|o| o.time()).collect();
        times.sort();
        assert!(times.len() >= 290);
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap <= Duration::minutes(45), "{}: gap of {} min", video.video_id, gap.num_minutes());
            assert!(gap > Duration::zero(), "{}: duplicate timestamp", video.video_id);
        }
        assert!(video.history.iter().any(|o| o.predicted));
        assert!(video.history.iter().any(|o| !o.predicted));
    }
}

#[test]
fn test_young_history_delta_starts_at_first_tick() {
    // Two days of data: the 7-day and 30-day windows both clamp to the first tick.
    let (doc, _, now) = run_simulation(5, 96, 0.0, false);
    for video in &doc.videos {
        let forecaster = Forecaster::new(&video.history);
        assert_eq!(forecaster.delta(7, now), forecaster.delta(30, now));
        assert!(forecaster.delta(1, now) < forecaster.delta(7, now));
    }
}

#[test]
fn test_retention_limit_holds() {
    let mut config = SystemConfig::default();
    config.gap_fill.max_history = 50;

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let world = Arc::new(SharedWorld {
        state: RefCell::new(World {
            start,
            now: start,
            rng: StdRng::seed_from_u64(3),
            noise: 0.0,
            fail_next: false,
            glitch_next: None,
        }),
    });
    let collector = Collector::new(SimSource(world.clone()), config);
    let mut doc = AggregateDocument::default();

    for k in 0..120 {
        let now = start + Duration::minutes(30 * k);
        world.state.borrow_mut().now = now;
        collector.run_cycle(&mut doc, &targets(), now);
    }

    for video in &doc.videos {
        assert_eq!(video.history.len(), 50);
        assert_eq!(video.history.last().unwrap().time(), Some(start + Duration::minutes(30 * 119)));
    }
}
