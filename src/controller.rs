//! Collection Controller - one polling cycle over every tracked video
//!
//! Each cycle:
//! 1. Makes sure every target has a document (new targets start empty)
//! 2. Requests metadata in batches of `batch_size`
//! 3. On a successful batch: refreshes metadata and records the reading,
//!    interpolating any missed slots since the last stored point
//! 4. On a failed batch: extrapolates every video of that batch up to now
//!
//! Videos are independent; a failure in one batch never affects another.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use crate::config::SystemConfig;
use crate::document::{AggregateDocument, VideoDocument, VideoTarget};
use crate::gap_fill::{FillResult, GapFiller};
use crate::observation::normalize_legacy;
use crate::traits::{MetadataSource, VideoMetadata};

/// Summary of one cycle
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Videos that received a real reading
    pub fetched: usize,
    /// Videos extrapolated because their batch failed
    pub extrapolated: usize,
    /// Videos absent from a successful response
    pub missing: usize,
    /// Batches that failed
    pub failed_batches: usize,
    /// Predicted points inserted across all videos
    pub synthesized: usize,
    /// Entries dropped by retention across all videos
    pub trimmed: usize,
}

impl CycleReport {
    fn absorb(&mut self, fill: FillResult) {
        self.synthesized += fill.synthesized;
        self.trimmed += fill.trimmed;
    }
}

pub struct Collector<S>
where
    S: MetadataSource,
{
    source: S,
    config: SystemConfig,
    gap_filler: GapFiller,
}

impl<S> Collector<S>
where
    S: MetadataSource,
{
    pub fn new(source: S, config: SystemConfig) -> Self {
        let gap_filler = GapFiller::new(config.gap_fill.clone());
        Collector { source, config, gap_filler }
    }

    /// Run one cycle at `now`, updating `doc` in place.
    pub fn run_cycle(&self, doc: &mut AggregateDocument, targets: &[VideoTarget], now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        for target in targets {
            self.ensure_document(doc, target);
        }

        let ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();
        let batch_size = self.config.collection.batch_size.max(1);

        for batch in ids.chunks(batch_size) {
            match self.source.fetch_batch(batch) {
                Ok(items) => self.apply_batch(doc, batch, items, now, &mut report),
                Err(e) => {
                    warn!("Batch fetch error ({} videos): {}", batch.len(), e);
                    report.failed_batches += 1;
                    for id in batch {
                        if let Some(video) = doc.video_mut(id) {
                            normalize_legacy(&mut video.history);
                            let fill = self.gap_filler.record_failure(&mut video.history, now);
                            report.extrapolated += 1;
                            report.absorb(fill);
                        }
                    }
                }
            }
        }

        doc.updated_at = now;
        info!(
            "Cycle done: fetched={} extrapolated={} missing={} failed_batches={} synthesized={} trimmed={}",
            report.fetched, report.extrapolated, report.missing, report.failed_batches, report.synthesized, report.trimmed
        );
        report
    }

    fn ensure_document(&self, doc: &mut AggregateDocument, target: &VideoTarget) {
        match doc.video_mut(&target.id) {
            Some(video) => {
                video.unit = target.unit.clone();
                video.banner = target.banner.clone();
            }
            None => {
                debug!("New target {}", target.id);
                doc.videos.push(VideoDocument {
                    video_id: target.id.clone(),
                    url: format!("{}{}", self.config.collection.watch_url_prefix, target.id),
                    unit: target.unit.clone(),
                    banner: target.banner.clone(),
                    ..VideoDocument::default()
                });
            }
        }
    }

    fn apply_batch(
        &self,
        doc: &mut AggregateDocument,
        batch: &[String],
        items: Vec<VideoMetadata>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let mut by_id: HashMap<String, VideoMetadata> = items.into_iter().map(|m| (m.id.clone(), m)).collect();

        for id in batch {
            let (meta, video) = match (by_id.remove(id), doc.video_mut(id)) {
                (Some(meta), Some(video)) => (meta, video),
                (None, _) => {
                    warn!("{} missing from API response, leaving history untouched", id);
                    report.missing += 1;
                    continue;
                }
                (Some(_), None) => continue,
            };

            video.title = meta.title;
            video.thumbnail = meta.thumbnail;
            video.published = meta.published;

            normalize_legacy(&mut video.history);
            let fill = self.gap_filler.record_success(&mut video.history, now, meta.views);
            report.fetched += 1;
            report.absorb(fill);
        }

        if !by_id.is_empty() {
            debug!("Ignoring {} unrequested ids in response", by_id.len());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
