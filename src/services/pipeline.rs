use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::Utc;

use crate::kind::PlaylistKind;
use crate::ports::audio_source::AudioSource;
use crate::ports::music_server::MusicServer;
use crate::ports::recommendations::RecommendationSource;
use crate::services::cleanup::CleanupManager;
use crate::services::downloader::TrackResolverDownloader;
use crate::services::library_matcher::LibraryMatcher;
use crate::services::matching::MatchPolicy;
use crate::services::recommendations::{FetchPolicy, RecommendationFetcher};
use crate::services::reconciler::{PlaylistReconciler, Reconciled};
use crate::services::reindex::{ReindexOutcome, ReindexTrigger};
use crate::services::retry::RetryPolicy;
use crate::services::storage::{ManagedFile, ManagedStorage};
use crate::services::tagger::MetadataTagger;
use crate::track::{LibraryTrack, TrackCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Fetching,
    PreMatching,
    Downloading,
    Tagging,
    Reindexing,
    PostMatching,
    Reconciling,
    Cleaning,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Fetching => "FETCHING",
            RunStage::PreMatching => "PRE_MATCHING",
            RunStage::Downloading => "DOWNLOADING",
            RunStage::Tagging => "TAGGING",
            RunStage::Reindexing => "REINDEXING",
            RunStage::PostMatching => "POST_MATCHING",
            RunStage::Reconciling => "RECONCILING",
            RunStage::Cleaning => "CLEANING",
            RunStage::Done => "DONE",
            RunStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Errors that fail a run. Everything else degrades it.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no usable candidates for {kind}")]
    InsufficientCandidates { kind: PlaylistKind },

    #[error("music server unavailable during {stage}: {reason}")]
    ServerUnavailable { stage: RunStage, reason: String },
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub kind: PlaylistKind,
    pub requested: usize,
    pub achieved: usize,
    /// Playlist contents, in provider rank order.
    pub tracks: Vec<LibraryTrack>,
    pub retained: Vec<ManagedFile>,
    pub playlist_id: String,
    pub downloaded: usize,
    pub reindex: ReindexOutcome,
    pub removed: usize,
}

impl RunResult {
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.achieved)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch: FetchPolicy,
    pub retry: RetryPolicy,
    pub match_policy: MatchPolicy,
    /// Candidates a run may consume per requested slot, across all rounds.
    pub max_candidates_per_slot: usize,
    pub download_concurrency: usize,
    pub reindex_timeout: Duration,
    pub reindex_poll_interval: Duration,
    pub library_id: Option<String>,
    /// Only playlists owned by this user are reused.
    pub playlist_owner: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch: FetchPolicy::default(),
            retry: RetryPolicy::default(),
            match_policy: MatchPolicy::default(),
            max_candidates_per_slot: 3,
            download_concurrency: 2,
            reindex_timeout: Duration::from_secs(300),
            reindex_poll_interval: Duration::from_secs(5),
            library_id: None,
            playlist_owner: None,
        }
    }
}

/// Where each slot of the playlist came from before post-matching.
struct Collected {
    hits: Vec<(usize, LibraryTrack)>,
    staged: Vec<(TrackCandidate, ManagedFile)>,
    downloaded: usize,
    /// Song ids already holding a slot.
    taken: HashSet<String>,
}

/// Builds one playlist kind end to end.
pub struct Pipeline<S, R, A>
where
    S: MusicServer,
    R: RecommendationSource,
    A: AudioSource,
{
    server: S,
    provider: R,
    audio: A,
    storage: ManagedStorage,
    tagger: MetadataTagger,
    settings: PipelineSettings,
}

impl<S, R, A> Pipeline<S, R, A>
where
    S: MusicServer,
    R: RecommendationSource,
    A: AudioSource,
{
    pub fn new(
        server: S,
        provider: R,
        audio: A,
        storage: ManagedStorage,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            server,
            provider,
            audio,
            storage,
            tagger: MetadataTagger,
            settings,
        }
    }

    pub async fn run(&self, kind: PlaylistKind, requested: usize) -> Result<RunResult, RunError> {
        let result = self.run_stages(kind, requested).await;
        if let Err(e) = &result {
            enter(kind, RunStage::Failed);
            tracing::error!(%kind, error = %e, "Run failed, previous playlist left as it was");
        }
        result
    }

    async fn run_stages(
        &self,
        kind: PlaylistKind,
        requested: usize,
    ) -> Result<RunResult, RunError> {
        let requested = kind
            .max_tracks()
            .map_or(requested, |max| requested.min(max));
        let run_id = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        tracing::info!(%kind, requested, %run_id, "Starting run");

        enter(kind, RunStage::Fetching);
        self.ensure_reachable(RunStage::Fetching).await?;
        let candidates =
            RecommendationFetcher::new(&self.provider, self.settings.fetch, self.settings.retry)
                .fetch(kind, requested)
                .await?;

        let Collected {
            hits,
            staged,
            downloaded,
            mut taken,
        } = self.collect(kind, requested, candidates, &run_id).await;

        enter(kind, RunStage::Reindexing);
        let staged_candidates: Vec<TrackCandidate> =
            staged.iter().map(|(candidate, _)| candidate.clone()).collect();
        let reindex = ReindexTrigger::new(
            &self.server,
            self.settings.match_policy,
            self.settings.library_id.clone(),
            self.settings.reindex_poll_interval,
        )
        .reindex_and_wait(
            self.storage.kind_dir_in_library(kind).as_deref(),
            &staged_candidates,
            self.settings.reindex_timeout,
        )
        .await;

        enter(kind, RunStage::PostMatching);
        let matcher = LibraryMatcher::new(&self.server, self.settings.match_policy);
        let mut slots = hits;
        for (candidate, file) in &staged {
            match matcher.find(candidate).await {
                Some(track) if taken.insert(track.id.clone()) => {
                    slots.push((candidate.rank, track))
                }
                Some(track) => tracing::warn!(
                    %kind,
                    candidate = %candidate,
                    song_id = %track.id,
                    "Download resolved to a song already in the playlist"
                ),
                None => tracing::warn!(
                    %kind,
                    candidate = %candidate,
                    file = %file.relative.display(),
                    "Staged track is not visible on the server, leaving it out"
                ),
            }
        }
        slots.sort_by_key(|(rank, _)| *rank);

        let tracks: Vec<LibraryTrack> = slots
            .into_iter()
            .map(|(_, track)| track)
            .take(requested)
            .collect();
        let staged_files: Vec<ManagedFile> = staged.into_iter().map(|(_, file)| file).collect();

        enter(kind, RunStage::Reconciling);
        let committed = match self.commit(kind, &tracks).await {
            Ok(committed) => committed,
            Err(e) => {
                if let Err(discard_error) = self.storage.discard(&staged_files) {
                    tracing::warn!(%kind, error = %discard_error, "Failed to discard staged files");
                }
                return Err(e);
            }
        };

        let mut retained: HashSet<ManagedFile> = staged_files.into_iter().collect();
        let mut removed = 0;
        if kind.downloads() {
            retained.extend(
                tracks
                    .iter()
                    .filter_map(|track| self.storage.resolve_library_track(kind, track)),
            );

            enter(kind, RunStage::Cleaning);
            match CleanupManager::new(&self.storage).cleanup(&committed, kind, &retained) {
                Ok(report) => removed = report.removed,
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "Cleanup failed, stale files stay until the next run")
                }
            }
        }

        let mut retained: Vec<ManagedFile> = retained.into_iter().collect();
        retained.sort();

        let result = RunResult {
            kind,
            requested,
            achieved: tracks.len(),
            tracks,
            retained,
            playlist_id: committed.playlist_id,
            downloaded,
            reindex,
            removed,
        };

        enter(kind, RunStage::Done);
        if result.shortfall() > 0 {
            tracing::warn!(
                %kind,
                requested = result.requested,
                achieved = result.achieved,
                shortfall = result.shortfall(),
                "Playlist is short of the requested size"
            );
        }
        tracing::info!(
            %kind,
            playlist_id = %result.playlist_id,
            achieved = result.achieved,
            downloaded = result.downloaded,
            removed = result.removed,
            "Run complete"
        );
        Ok(result)
    }

    /// Pre-match, download, tag and stage in rounds until every slot is filled
    /// or the candidate budget runs out.
    async fn collect(
        &self,
        kind: PlaylistKind,
        requested: usize,
        candidates: Vec<TrackCandidate>,
        run_id: &str,
    ) -> Collected {
        let budget = requested.saturating_mul(self.settings.max_candidates_per_slot.max(1));
        let matcher = LibraryMatcher::new(&self.server, self.settings.match_policy);
        let downloader = TrackResolverDownloader::new(&self.audio, self.settings.retry);

        let mut collected = Collected {
            hits: Vec::new(),
            staged: Vec::new(),
            downloaded: 0,
            taken: HashSet::new(),
        };
        let mut remaining = candidates.into_iter().take(budget);

        loop {
            let filled = collected.hits.len() + collected.staged.len();
            if filled >= requested {
                break;
            }
            let batch: Vec<TrackCandidate> = remaining.by_ref().take(requested - filled).collect();
            if batch.is_empty() {
                tracing::debug!(%kind, filled, budget, "Candidate budget exhausted");
                break;
            }

            enter(kind, RunStage::PreMatching);
            let mut misses = Vec::new();
            for candidate in batch {
                match matcher.find(&candidate).await {
                    Some(track) if collected.taken.insert(track.id.clone()) => {
                        tracing::debug!(%kind, candidate = %candidate, song_id = %track.id, "Already in library");
                        collected.hits.push((candidate.rank, track));
                    }
                    Some(track) => {
                        tracing::debug!(%kind, candidate = %candidate, song_id = %track.id, "Same song as an earlier candidate, trying the next one");
                    }
                    None if kind.downloads() => misses.push(candidate),
                    None => tracing::debug!(%kind, candidate = %candidate, "Not in library, skipping"),
                }
            }
            if misses.is_empty() {
                continue;
            }

            enter(kind, RunStage::Downloading);
            let results = downloader
                .download_all(misses, self.settings.download_concurrency)
                .await;

            enter(kind, RunStage::Tagging);
            for (candidate, result) in results {
                let Ok(track) = result else {
                    continue;
                };
                collected.downloaded += 1;

                if let Err(e) = self.tagger.tag(&track.file, &candidate, candidate.rank) {
                    tracing::warn!(%kind, candidate = %candidate, error = %e, "Tagging failed, staging untagged file");
                }
                match self.storage.stage(kind, &track.file, &candidate, run_id) {
                    Ok(file) => collected.staged.push((candidate, file)),
                    Err(e) => {
                        tracing::warn!(%kind, candidate = %candidate, error = %e, "Failed to stage download")
                    }
                }
            }
        }

        collected
    }

    async fn ensure_reachable(&self, stage: RunStage) -> Result<(), RunError> {
        self.server
            .ping()
            .await
            .map_err(|e| RunError::ServerUnavailable {
                stage,
                reason: format!("{e:#}"),
            })
    }

    async fn commit(
        &self,
        kind: PlaylistKind,
        tracks: &[LibraryTrack],
    ) -> Result<Reconciled, RunError> {
        self.ensure_reachable(RunStage::Reconciling).await?;
        PlaylistReconciler::new(&self.server, self.settings.playlist_owner.as_deref())
            .reconcile(kind, tracks)
            .await
    }
}

fn enter(kind: PlaylistKind, stage: RunStage) {
    tracing::info!(%kind, %stage, "Entering stage");
}
