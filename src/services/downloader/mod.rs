pub mod client;

use std::path::PathBuf;

use futures::StreamExt;
use tempfile::TempDir;

use crate::ports::audio_source::{AudioSource, DownloadError, SourceTrack};
use crate::services::matching::{containment_score, split_title};
use crate::services::retry::{FailureClass, RetryPolicy};
use crate::services::storage::file_stem_for;
use crate::track::TrackCandidate;

/// Title and artist must both at least partially match.
const MIN_SOURCE_SCORE: u8 = 2;
const SEARCH_LIMIT: usize = 5;

/// A downloaded file waiting in its own temp directory to be tagged and staged.
#[derive(Debug)]
pub struct DownloadedTrack {
    pub candidate: TrackCandidate,
    pub source_id: String,
    pub file: PathBuf,
    // Removed with everything left in it when the track is dropped.
    _workdir: TempDir,
}

/// Only network and process hiccups are worth retrying.
pub fn classify_download_error(err: &DownloadError) -> FailureClass {
    match err {
        DownloadError::Download { .. } => FailureClass::Soft,
        DownloadError::ResolutionMiss { .. }
        | DownloadError::Conversion { .. }
        | DownloadError::Unavailable { .. } => FailureClass::Hard,
    }
}

/// Highest scoring search result, first one on ties.
///
/// Results carrying a different version marker (live, cover, sped up, ...)
/// than the candidate are never picked.
pub fn pick_best_source<'a>(
    candidate: &TrackCandidate,
    results: &'a [SourceTrack],
) -> Option<&'a SourceTrack> {
    let wanted_version = split_title(&candidate.title).version;
    let mut best: Option<(&SourceTrack, u8)> = None;
    for result in results {
        let version = split_title(&result.title).version;
        if version != wanted_version {
            tracing::trace!(candidate = %candidate, source = %result.id, ?version, "Skipping other version");
            continue;
        }
        let Some(score) = containment_score(
            &candidate.title,
            candidate.primary_artist(),
            &result.title,
            &result.artist,
        ) else {
            continue;
        };
        tracing::trace!(candidate = %candidate, source = %result.id, score, "Scored source");
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((result, score));
        }
    }

    best.filter(|(_, score)| *score >= MIN_SOURCE_SCORE)
        .map(|(result, _)| result)
}

pub struct TrackResolverDownloader<'a, A: AudioSource> {
    source: &'a A,
    retry: RetryPolicy,
}

impl<'a, A: AudioSource> TrackResolverDownloader<'a, A> {
    pub fn new(source: &'a A, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Find `candidate` on the audio source and download it as MP3.
    pub async fn resolve_and_download(
        &self,
        candidate: &TrackCandidate,
    ) -> Result<DownloadedTrack, DownloadError> {
        let query = format!("{} {}", candidate.primary_artist(), candidate.title);

        let results = self
            .retry
            .retry(
                "search audio source",
                || self.source.search(&query, SEARCH_LIMIT),
                classify_download_error,
            )
            .await?;

        let best = pick_best_source(candidate, &results)
            .ok_or_else(|| DownloadError::ResolutionMiss {
                query: query.clone(),
            })?
            .clone();

        let workdir = tempfile::tempdir().map_err(|e| DownloadError::Download {
            reason: format!("failed to create temp directory: {e}"),
        })?;
        let stem = file_stem_for(candidate);

        let file = self
            .retry
            .retry(
                "download audio",
                || self.source.download(&best, workdir.path(), &stem),
                classify_download_error,
            )
            .await?;

        Ok(DownloadedTrack {
            candidate: candidate.clone(),
            source_id: best.id,
            file,
            _workdir: workdir,
        })
    }

    /// Download every candidate with at most `concurrency` in flight.
    ///
    /// Results come back in completion order.
    pub async fn download_all(
        &self,
        candidates: Vec<TrackCandidate>,
        concurrency: usize,
    ) -> Vec<(TrackCandidate, Result<DownloadedTrack, DownloadError>)> {
        futures::stream::iter(candidates)
            .map(|candidate| async move {
                let result = self.resolve_and_download(&candidate).await;
                match &result {
                    Ok(downloaded) => tracing::info!(
                        candidate = %candidate,
                        source = %downloaded.source_id,
                        "Downloaded"
                    ),
                    Err(e) => tracing::warn!(candidate = %candidate, error = %e, "Download failed"),
                }
                (candidate, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
