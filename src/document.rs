use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use crate::observation::Observation;

/// Per-video document read by the presentation layer
///
/// Metadata fields mirror what the upstream API last reported; `unit` and
/// `banner` come from the video target list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct VideoDocument {
    #[serde(rename = "videoId")]
    pub video_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    /// Publication date, `YYYY-MM-DD`
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub unit: String,
    /// Oldest first
    #[serde(default)]
    pub history: Vec<Observation>,
}

/// The whole stored dataset
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AggregateDocument {
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub videos: Vec<VideoDocument>,
}

impl Default for AggregateDocument {
    fn default() -> Self {
        AggregateDocument {
            updated_at: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            videos: Vec::new(),
        }
    }
}

/// One entry of the tracked-video list
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VideoTarget {
    pub id: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub banner: String,
}

impl AggregateDocument {
    /// Load the stored dataset. A missing file is an empty dataset.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AggregateDocument::default());
        }
        let file = File::open(path).map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| anyhow!("Invalid history document {}: {}", path.display(), e))
    }

    /// Write the dataset, replacing the file only once fully written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).map_err(|e| anyhow!("Failed to create {}: {}", tmp.display(), e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path).map_err(|e| anyhow!("Failed to replace {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn video(&self, id: &str) -> Option<&VideoDocument> {
        self.videos.iter().find(|v| v.video_id == id)
    }

    pub fn video_mut(&mut self, id: &str) -> Option<&mut VideoDocument> {
        self.videos.iter_mut().find(|v| v.video_id == id)
    }
}

pub fn load_targets(path: &Path) -> Result<Vec<VideoTarget>> {
    let file = File::open(path).map_err(|e| anyhow!("Failed to open video list {}: {}", path.display(), e))?;
    let targets: Vec<VideoTarget> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| anyhow!("Invalid video list {}: {}", path.display(), e))?;
    Ok(targets)
}
