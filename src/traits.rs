use anyhow::Result;

/// Snapshot of one video as reported by the upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    /// Publication date, `YYYY-MM-DD`
    pub published: String,
    pub views: u64,
}

#[cfg_attr(test, mockall::automock)]
pub trait MetadataSource {
    /// Fetch one batch of videos. Ids unknown upstream are simply absent from the result.
    /// An `Err` means the whole batch failed.
    fn fetch_batch(&self, ids: &[String]) -> Result<Vec<VideoMetadata>>;
}
