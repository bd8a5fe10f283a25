use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub estimator: EstimatorConfig,
    pub gap_fill: GapFillConfig,
    pub collection: CollectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub dedupe_epsilon_minutes: f64, // sub-millisecond duplicate window
    pub outlier_k: f64,              // MAD multiplier for segment rejection
    pub mad_floor: f64,
    pub half_life_minutes: f64,      // regression weight decay from the anchor
    pub singular_epsilon: f64,
    pub ema_alpha: f64,
    pub confidence_points: usize,    // good points needed for full confidence
    pub cap_multiplier: f64,         // |median rate| multiple bounding the slope
    pub cap_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFillConfig {
    pub interval_minutes: i64,
    pub gap_threshold_minutes: i64,
    pub trailing_window: usize,
    pub max_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub batch_size: usize, // ids per upstream request
    pub watch_url_prefix: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            dedupe_epsilon_minutes: 6e-5,
            outlier_k: 6.0,
            mad_floor: 1e-6,
            half_life_minutes: 180.0,
            singular_epsilon: 1e-9,
            ema_alpha: 0.5,
            confidence_points: 6,
            cap_multiplier: 10.0,
            cap_floor: 1.0,
        }
    }
}

impl Default for GapFillConfig {
    fn default() -> Self {
        GapFillConfig {
            interval_minutes: 30,
            gap_threshold_minutes: 45,
            trailing_window: 6,
            max_history: 5000,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        CollectionConfig {
            batch_size: 50,
            watch_url_prefix: "https://www.youtube.com/watch?v=".to_string(),
        }
    }
}

impl SystemConfig {
    /// Load a JSON config file. Missing sections and fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: SystemConfig = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Invalid config {}: {}", path.display(), e))?;

        if config.gap_fill.interval_minutes <= 0 {
            return Err(anyhow!("gap_fill.interval_minutes must be positive"));
        }
        if config.collection.batch_size == 0 {
            return Err(anyhow!("collection.batch_size must be at least 1"));
        }
        Ok(config)
    }
}
