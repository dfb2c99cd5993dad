use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

use crate::ports::music_server::MusicServer;
use crate::services::library_matcher::LibraryMatcher;
use crate::services::matching::MatchPolicy;
use crate::track::TrackCandidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// Nothing was staged, so nothing to scan.
    Skipped,
    Completed { elapsed: Duration },
    /// The run continues; tracks still invisible are left out of the playlist.
    TimedOut { pending: usize },
}

/// Asks the server to rescan and waits until staged tracks are searchable.
pub struct ReindexTrigger<'a, S: MusicServer> {
    server: &'a S,
    matcher: LibraryMatcher<'a, S>,
    library_id: Option<String>,
    poll_interval: Duration,
}

impl<'a, S: MusicServer> ReindexTrigger<'a, S> {
    pub fn new(
        server: &'a S,
        policy: MatchPolicy,
        library_id: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            server,
            matcher: LibraryMatcher::new(server, policy),
            library_id,
            poll_interval,
        }
    }

    /// `scan_dir` is the kind directory relative to the music root, when known.
    pub async fn reindex_and_wait(
        &self,
        scan_dir: Option<&Path>,
        staged: &[TrackCandidate],
        timeout: Duration,
    ) -> ReindexOutcome {
        if staged.is_empty() {
            tracing::debug!("Nothing staged, skipping library scan");
            return ReindexOutcome::Skipped;
        }

        let started = Instant::now();
        let deadline = started + timeout;

        self.start_scan(scan_dir).await;

        while Instant::now() < deadline {
            match self.server.scan_status().await {
                Ok(status) if !status.scanning => {
                    tracing::debug!(count = ?status.count, "Library scan finished");
                    break;
                }
                Ok(status) => tracing::trace!(count = ?status.count, "Library scan in progress"),
                Err(e) => tracing::warn!(error = %e, "Failed to read scan status"),
            }
            self.pause_until(deadline).await;
        }

        let mut pending: Vec<&TrackCandidate> = staged.iter().collect();
        loop {
            let mut still_pending = Vec::with_capacity(pending.len());
            for candidate in pending {
                if self.matcher.find(candidate).await.is_none() {
                    still_pending.push(candidate);
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                let elapsed = started.elapsed();
                tracing::info!(
                    staged = staged.len(),
                    elapsed = %humantime::format_duration(elapsed),
                    "Staged tracks are visible"
                );
                return ReindexOutcome::Completed { elapsed };
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    pending = pending.len(),
                    timeout = %humantime::format_duration(timeout),
                    "Timed out waiting for staged tracks to be indexed"
                );
                return ReindexOutcome::TimedOut {
                    pending: pending.len(),
                };
            }
            self.pause_until(deadline).await;
        }
    }

    async fn start_scan(&self, scan_dir: Option<&Path>) {
        let target = match (&self.library_id, scan_dir) {
            (Some(id), Some(dir)) => Some(format!("{id}:{}", dir.to_string_lossy())),
            _ => None,
        };

        if let Some(target) = target {
            match self.server.start_scan(Some(target.clone())).await {
                Ok(()) => {
                    tracing::info!(target, "Started targeted library scan");
                    return;
                }
                Err(e) => {
                    tracing::warn!(target, error = %e, "Targeted scan failed, falling back to full scan");
                }
            }
        }

        match self.server.start_scan(None).await {
            Ok(()) => tracing::info!("Started library scan"),
            // The server may still pick files up through its own watcher.
            Err(e) => tracing::warn!(error = %e, "Failed to start library scan"),
        }
    }

    async fn pause_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(self.poll_interval.min(remaining)).await;
    }
}
