pub mod client;

use std::collections::HashSet;
use std::time::Duration;

use crate::kind::PlaylistKind;
use crate::ports::recommendations::{ProviderError, RecommendationSource};
use crate::services::pipeline::RunError;
use crate::services::retry::{FailureClass, RetryPolicy};
use crate::track::{NormalizedKey, TrackCandidate};

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    /// Candidates wanted per requested track, to absorb misses and failed downloads.
    pub overfetch_multiplier: usize,
    pub max_pages: u32,
    /// Pause between pages so random stations don't get hammered.
    pub page_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            overfetch_multiplier: 3,
            max_pages: 20,
            page_delay: Duration::from_secs(1),
        }
    }
}

/// 4xx other than 429 won't get better by asking again.
pub fn classify_provider_error(err: &ProviderError) -> FailureClass {
    match err {
        ProviderError::Http {
            status: Some(status),
            ..
        } if (400..500).contains(status) && *status != 429 => FailureClass::Hard,
        ProviderError::Http { .. } => FailureClass::Soft,
        ProviderError::Decode(_) | ProviderError::NotFound(_) => FailureClass::Hard,
    }
}

pub struct RecommendationFetcher<'a, R: RecommendationSource> {
    source: &'a R,
    policy: FetchPolicy,
    retry: RetryPolicy,
}

impl<'a, R: RecommendationSource> RecommendationFetcher<'a, R> {
    pub fn new(source: &'a R, policy: FetchPolicy, retry: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            retry,
        }
    }

    /// Ranked, deduplicated candidates for `kind`, overfetched for `requested` slots.
    pub async fn fetch(
        &self,
        kind: PlaylistKind,
        requested: usize,
    ) -> Result<Vec<TrackCandidate>, RunError> {
        let target = requested.saturating_mul(self.policy.overfetch_multiplier.max(1));
        let mut candidates: Vec<TrackCandidate> = Vec::with_capacity(target);
        let mut seen: HashSet<NormalizedKey> = HashSet::new();

        tracing::info!(%kind, requested, target, "Fetching recommendations");

        for page_number in 0..self.policy.max_pages {
            let page = match self
                .retry
                .retry(
                    "fetch recommendations page",
                    || self.source.fetch_page(kind, page_number),
                    classify_provider_error,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        %kind,
                        page = page_number,
                        error = %e,
                        collected = candidates.len(),
                        "Recommendation page failed, continuing with what we have"
                    );
                    break;
                }
            };

            let mut added = 0usize;
            for track in page.tracks {
                if candidates.len() >= target {
                    break;
                }

                let title = track.title.trim();
                let artist = track.artist.trim();
                if title.is_empty() || artist.is_empty() {
                    continue;
                }

                let key = NormalizedKey::new(title, artist);
                if !seen.insert(key) {
                    continue;
                }

                let provider_id = track
                    .native_id
                    .unwrap_or_else(|| format!("{artist}:{title}"));
                candidates.push(TrackCandidate {
                    title: title.to_string(),
                    artist: artist.to_string(),
                    album: track.album.filter(|a| !a.trim().is_empty()),
                    rank: candidates.len(),
                    provider_id,
                });
                added += 1;
            }

            tracing::debug!(
                %kind,
                page = page_number,
                added,
                total = candidates.len(),
                target,
                "Fetched recommendations page"
            );

            if candidates.len() >= target || page.exhausted {
                break;
            }
            if added == 0 {
                tracing::info!(%kind, "Provider is repeating tracks, stopping");
                break;
            }

            if !self.policy.page_delay.is_zero() {
                tokio::time::sleep(self.policy.page_delay).await;
            }
        }

        if candidates.is_empty() {
            return Err(RunError::InsufficientCandidates { kind });
        }

        tracing::info!(%kind, collected = candidates.len(), requested, "Collected candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::recommendations::{
        MockRecommendationSource, ProviderTrack, RecommendationPage,
    };

    fn track(title: &str, artist: &str) -> ProviderTrack {
        ProviderTrack {
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            native_id: None,
        }
    }

    fn page(tracks: Vec<ProviderTrack>) -> RecommendationPage {
        RecommendationPage {
            tracks,
            exhausted: false,
        }
    }

    fn policy(multiplier: usize) -> FetchPolicy {
        FetchPolicy {
            overfetch_multiplier: multiplier,
            max_pages: 20,
            page_delay: Duration::ZERO,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_fetch_dedupes_and_keeps_rank_order() {
        let mut source = MockRecommendationSource::new();
        source.expect_fetch_page().returning(|_, page_number| {
            Ok(match page_number {
                0 => page(vec![
                    track("Café", "Mon Laferte"),
                    track("Yellow", "Coldplay"),
                    track("cafe", "MON LAFERTE"),
                ]),
                1 => page(vec![track("Yellow", "Coldplay"), track("Clocks", "Coldplay")]),
                _ => page(vec![track("Clocks", "Coldplay")]),
            })
        });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let candidates = fetcher.fetch(PlaylistKind::Recommended, 10).await.unwrap();

        let titles: Vec<_> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Café", "Yellow", "Clocks"]);
        let ranks: Vec<_> = candidates.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(candidates[1].provider_id, "Coldplay:Yellow");
    }

    #[tokio::test]
    async fn test_fetch_stops_at_overfetch_target() {
        let mut source = MockRecommendationSource::new();
        source
            .expect_fetch_page()
            .times(2)
            .returning(|_, page_number| {
                let base = page_number * 4;
                Ok(page(
                    (base..base + 4)
                        .map(|i| track(&format!("Song {i}"), "Artist"))
                        .collect(),
                ))
            });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let candidates = fetcher.fetch(PlaylistKind::Mix, 2).await.unwrap();

        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates.last().unwrap().title, "Song 5");
    }

    #[tokio::test]
    async fn test_fetch_drops_tracks_missing_title_or_artist() {
        let mut source = MockRecommendationSource::new();
        source.expect_fetch_page().returning(|_, _| {
            Ok(RecommendationPage {
                tracks: vec![track("", "Artist"), track("Title", "  "), track("Kept", "Artist")],
                exhausted: true,
            })
        });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let candidates = fetcher.fetch(PlaylistKind::Jams, 5).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Kept");
        assert_eq!(candidates[0].rank, 0);
    }

    #[tokio::test]
    async fn test_exhausted_provider_is_not_asked_again() {
        let mut source = MockRecommendationSource::new();
        source.expect_fetch_page().times(1).returning(|_, _| {
            Ok(RecommendationPage {
                tracks: vec![track("Only", "One")],
                exhausted: true,
            })
        });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let candidates = fetcher.fetch(PlaylistKind::Exploration, 50).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_is_retried_then_partial_result_returned() {
        let mut source = MockRecommendationSource::new();
        source
            .expect_fetch_page()
            .withf(|_, page_number| *page_number == 0)
            .times(1)
            .returning(|_, _| Ok(page(vec![track("A", "X"), track("B", "X")])));
        source
            .expect_fetch_page()
            .withf(|_, page_number| *page_number == 1)
            .times(3)
            .returning(|_, _| {
                Err(ProviderError::Http {
                    status: Some(503),
                    message: "unavailable".into(),
                })
            });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let candidates = fetcher.fetch(PlaylistKind::Recommended, 5).await.unwrap();

        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut source = MockRecommendationSource::new();
        source.expect_fetch_page().times(1).returning(|_, _| {
            Err(ProviderError::Http {
                status: Some(404),
                message: "no such user".into(),
            })
        });

        let fetcher = RecommendationFetcher::new(&source, policy(3), fast_retry());
        let result = fetcher.fetch(PlaylistKind::Recommended, 5).await;

        assert!(matches!(
            result,
            Err(RunError::InsufficientCandidates {
                kind: PlaylistKind::Recommended
            })
        ));
    }

    #[test]
    fn test_classify_provider_error() {
        let http = |status| ProviderError::Http {
            status,
            message: String::new(),
        };
        assert_eq!(classify_provider_error(&http(Some(429))), FailureClass::Soft);
        assert_eq!(classify_provider_error(&http(Some(502))), FailureClass::Soft);
        assert_eq!(classify_provider_error(&http(None)), FailureClass::Soft);
        assert_eq!(classify_provider_error(&http(Some(401))), FailureClass::Hard);
        assert_eq!(
            classify_provider_error(&ProviderError::Decode("bad json".into())),
            FailureClass::Hard
        );
    }
}
