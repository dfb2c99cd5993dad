use std::path::{Path, PathBuf};

/// A playable result from the audio source's search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("no acceptable source for {query}")]
    ResolutionMiss { query: String },

    #[error("download failed: {reason}")]
    Download { reason: String },

    #[error("conversion failed: {reason}")]
    Conversion { reason: String },

    #[error("audio source unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Port trait for the audio source (YouTube Music through yt-dlp).
///
/// Implementations live in `services::downloader::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceTrack>, DownloadError>;

    /// Download `source` as MP3 into `output_dir`, named `{file_stem}.mp3`.
    async fn download(
        &self,
        source: &SourceTrack,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, DownloadError>;
}
