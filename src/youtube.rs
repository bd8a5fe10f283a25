use anyhow::{anyhow, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use crate::traits::{MetadataSource, VideoMetadata};

const API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Preferred thumbnail sizes, best first.
const THUMBNAIL_ORDER: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

pub struct YoutubeClient {
    api_key: String,
    http: reqwest::blocking::Client,
}

impl YoutubeClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(YoutubeClient {
            api_key: api_key.to_string(),
            http,
        })
    }
}

impl MetadataSource for YoutubeClient {
    fn fetch_batch(&self, ids: &[String]) -> Result<Vec<VideoMetadata>> {
        let response = self
            .http
            .get(API_URL)
            .query(&[
                ("part", "snippet,statistics"),
                ("id", ids.join(",").as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("YouTube API returned {}", status));
        }

        let body: VideoListResponse = response.json()?;
        Ok(body.items.into_iter().filter_map(into_metadata).collect())
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
    statistics: Statistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    published_at: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // The API encodes counts as strings; hidden counts are omitted.
    view_count: Option<String>,
}

fn into_metadata(item: VideoItem) -> Option<VideoMetadata> {
    let views = match item.statistics.view_count.as_deref().map(str::parse::<u64>) {
        Some(Ok(v)) => v,
        _ => {
            log::warn!("[YouTube] {} has no usable viewCount, skipping", item.id);
            return None;
        }
    };

    let thumbnail = THUMBNAIL_ORDER
        .iter()
        .find_map(|size| item.snippet.thumbnails.get(*size))
        .map(|t| t.url.clone())
        .unwrap_or_default();

    let published = match DateTime::parse_from_rfc3339(&item.snippet.published_at) {
        Ok(t) => t.date_naive().format("%Y-%m-%d").to_string(),
        Err(_) => item.snippet.published_at.chars().take(10).collect(),
    };

    Some(VideoMetadata {
        id: item.id,
        title: item.snippet.title,
        thumbnail,
        published,
        views,
    })
}

// ============================================================================
// TESTS
// ============================================================================
