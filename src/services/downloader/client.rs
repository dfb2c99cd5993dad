use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};

use crate::ports::audio_source::{AudioSource, DownloadError, SourceTrack};
use crate::ytdlp::YtDlp;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Search results can come back slowly when YouTube is throttling.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct YtDlpAdapter {
    /// `None` when only library playlists are being built.
    ytdlp: Option<YtDlp>,
    // RateLimiter from governor is already thread-safe.
    rate_limiter: DirectRateLimiter,
    download_timeout: Duration,
}

impl YtDlpAdapter {
    pub fn new(
        ytdlp: Option<YtDlp>,
        requests_per_minute: NonZeroU32,
        download_timeout: Duration,
    ) -> Self {
        let quota = Quota::per_minute(requests_per_minute);
        Self {
            ytdlp,
            rate_limiter: RateLimiter::direct(quota),
            download_timeout,
        }
    }

    fn ytdlp(&self) -> Result<&YtDlp, DownloadError> {
        self.ytdlp.as_ref().ok_or_else(|| DownloadError::Unavailable {
            reason: "yt-dlp was not located for this run".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl AudioSource for YtDlpAdapter {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceTrack>, DownloadError> {
        let ytdlp = self.ytdlp()?;
        self.rate_limiter.until_ready().await;
        ytdlp.search(query, limit, SEARCH_TIMEOUT).await
    }

    async fn download(
        &self,
        source: &SourceTrack,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, DownloadError> {
        let ytdlp = self.ytdlp()?;
        self.rate_limiter.until_ready().await;
        tracing::debug!(video_id = %source.id, title = %source.title, "Downloading audio");
        ytdlp
            .download_audio(&source.id, output_dir, file_stem, self.download_timeout)
            .await
    }
}
