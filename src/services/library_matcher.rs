use crate::ports::music_server::MusicServer;
use crate::services::matching::{MatchPolicy, MatchQuality, compare_tracks};
use crate::track::{LibraryTrack, TrackCandidate};

/// Songs requested per search; enough to see past remasters and live takes.
const SEARCH_LIMIT: u32 = 20;

/// Looks candidates up in the server's existing library. Read only.
pub struct LibraryMatcher<'a, S: MusicServer> {
    server: &'a S,
    policy: MatchPolicy,
}

impl<'a, S: MusicServer> LibraryMatcher<'a, S> {
    pub fn new(server: &'a S, policy: MatchPolicy) -> Self {
        Self { server, policy }
    }

    /// Best library match for `candidate`, exact before fuzzy.
    ///
    /// A failed search counts as no match; the candidate will be downloaded.
    pub async fn find(&self, candidate: &TrackCandidate) -> Option<LibraryTrack> {
        let queries = [
            format!("{} {}", candidate.primary_artist(), candidate.title),
            candidate.title.clone(),
        ];

        for query in queries {
            let results = match self.server.search_songs(&query, SEARCH_LIMIT).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(
                        candidate = %candidate,
                        %query,
                        error = %e,
                        "Library search failed, treating as not found"
                    );
                    return None;
                }
            };

            if let Some((track, quality)) = self.best_of(candidate, results) {
                tracing::debug!(
                    candidate = %candidate,
                    track_id = %track.id,
                    score = quality.score(),
                    exact = matches!(quality, MatchQuality::Exact),
                    "Found in library"
                );
                return Some(track);
            }
        }

        None
    }

    fn best_of(
        &self,
        candidate: &TrackCandidate,
        results: Vec<LibraryTrack>,
    ) -> Option<(LibraryTrack, MatchQuality)> {
        results
            .into_iter()
            .filter_map(|track| {
                compare_tracks(
                    &candidate.title,
                    &candidate.artist,
                    &track.title,
                    &track.artist,
                    self.policy,
                )
                .map(|quality| (track, quality))
            })
            // Ties keep the earlier result; the server orders by relevance.
            .fold(None, |best, (track, quality)| match best {
                Some((best_track, best_quality)) if !quality.beats(best_quality) => {
                    Some((best_track, best_quality))
                }
                _ => Some((track, quality)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::music_server::MockMusicServer;

    fn candidate(title: &str, artist: &str) -> TrackCandidate {
        TrackCandidate {
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            rank: 0,
            provider_id: String::new(),
        }
    }

    fn song(id: &str, title: &str, artist: &str) -> LibraryTrack {
        LibraryTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            path: None,
        }
    }

    #[tokio::test]
    async fn test_exact_match_is_preferred_over_fuzzy() {
        let mut server = MockMusicServer::new();
        server
            .expect_search_songs()
            .withf(|query, _| query == "Queen Bohemian Rhapsody")
            .returning(|_, _| {
                Ok(vec![
                    song("live", "Bohemian Rhapsody (Live Aid)", "Queen"),
                    song("remaster", "Bohemian Rhapsody (Remastered 2011)", "Queen"),
                    song("exact", "Bohemian Rhapsody", "Queen"),
                ])
            });

        let matcher = LibraryMatcher::new(&server, MatchPolicy::default());
        let found = matcher
            .find(&candidate("Bohemian Rhapsody", "Queen"))
            .await
            .unwrap();

        assert_eq!(found.id, "exact");
    }

    #[tokio::test]
    async fn test_diacritics_are_ignored() {
        let mut server = MockMusicServer::new();
        server
            .expect_search_songs()
            .returning(|_, _| Ok(vec![song("1", "cafe", "mon laferte")]));

        let matcher = LibraryMatcher::new(&server, MatchPolicy::default());
        let found = matcher.find(&candidate("Café", "Mon Laferte")).await;

        assert_eq!(found.map(|t| t.id), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_falls_back_to_title_query() {
        let mut server = MockMusicServer::new();
        server
            .expect_search_songs()
            .withf(|query, _| query == "Daft Punk Get Lucky")
            .times(1)
            .returning(|_, _| Ok(vec![]));
        server
            .expect_search_songs()
            .withf(|query, _| query == "Get Lucky")
            .times(1)
            .returning(|_, _| Ok(vec![song("7", "Get Lucky", "Daft Punk")]));

        let matcher = LibraryMatcher::new(&server, MatchPolicy::default());
        let found = matcher
            .find(&candidate("Get Lucky", "Daft Punk, Pharrell Williams"))
            .await;

        assert_eq!(found.map(|t| t.id), Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_version_is_not_a_match() {
        let mut server = MockMusicServer::new();
        server
            .expect_search_songs()
            .returning(|_, _| Ok(vec![song("1", "Creep (Acoustic)", "Radiohead")]));

        let matcher = LibraryMatcher::new(&server, MatchPolicy::default());
        assert!(matcher.find(&candidate("Creep", "Radiohead")).await.is_none());
    }

    #[tokio::test]
    async fn test_search_failure_is_no_match() {
        let mut server = MockMusicServer::new();
        server
            .expect_search_songs()
            .times(1)
            .returning(|_, _| Err(color_eyre::eyre::eyre!("connection refused")));

        let matcher = LibraryMatcher::new(&server, MatchPolicy::default());
        assert!(matcher.find(&candidate("Yellow", "Coldplay")).await.is_none());
    }
}
