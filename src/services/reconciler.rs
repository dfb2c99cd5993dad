use std::cmp::Ordering;
use std::collections::HashSet;

use crate::kind::PlaylistKind;
use crate::ports::music_server::{MusicServer, ServerPlaylist};
use crate::services::pipeline::{RunError, RunStage};
use crate::track::LibraryTrack;

/// Proof that a playlist write went through. Cleanup requires one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub playlist_id: String,
    pub track_count: usize,
    pub created: bool,
}

/// Numeric ids compare as numbers, anything else as strings.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Oldest playlist with `name` that `owner` may write to. Duplicates are left alone.
///
/// Playlists reported without an owner are assumed to be ours; with `owner`
/// unset every playlist qualifies.
pub fn find_playlist<'p>(
    playlists: &'p [ServerPlaylist],
    name: &str,
    owner: Option<&str>,
) -> Option<&'p ServerPlaylist> {
    let matching: Vec<&ServerPlaylist> = playlists
        .iter()
        .filter(|p| p.name == name)
        .filter(|p| match (owner, p.owner.as_deref()) {
            (Some(owner), Some(playlist_owner)) => owner == playlist_owner,
            _ => true,
        })
        .collect();
    if matching.len() > 1 {
        tracing::warn!(
            name,
            count = matching.len(),
            "Multiple playlists share this name, using the lowest id"
        );
    }
    matching
        .into_iter()
        .min_by(|a, b| compare_ids(&a.id, &b.id))
}

fn unavailable(e: color_eyre::Report) -> RunError {
    RunError::ServerUnavailable {
        stage: RunStage::Reconciling,
        reason: format!("{e:#}"),
    }
}

/// Writes the final track list into the kind's playlist, keeping its identity.
pub struct PlaylistReconciler<'a, S: MusicServer> {
    server: &'a S,
    owner: Option<&'a str>,
}

impl<'a, S: MusicServer> PlaylistReconciler<'a, S> {
    pub fn new(server: &'a S, owner: Option<&'a str>) -> Self {
        Self { server, owner }
    }

    pub async fn reconcile(
        &self,
        kind: PlaylistKind,
        tracks: &[LibraryTrack],
    ) -> Result<Reconciled, RunError> {
        let name = kind.display_name();
        let playlists = self.server.get_playlists().await.map_err(unavailable)?;

        let (playlist, created) = match find_playlist(&playlists, name, self.owner) {
            Some(existing) => (existing.clone(), false),
            None => {
                tracing::info!(name, "Creating playlist");
                (
                    self.server.create_playlist(name).await.map_err(unavailable)?,
                    true,
                )
            }
        };

        let mut seen = HashSet::new();
        let song_ids: Vec<String> = tracks
            .iter()
            .filter(|t| seen.insert(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();

        self.server
            .replace_playlist_tracks(&playlist.id, &song_ids)
            .await
            .map_err(unavailable)?;

        tracing::info!(
            name,
            playlist_id = %playlist.id,
            tracks = song_ids.len(),
            "Playlist updated"
        );

        Ok(Reconciled {
            playlist_id: playlist.id,
            track_count: song_ids.len(),
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::music_server::MockMusicServer;

    fn playlist(id: &str, name: &str) -> ServerPlaylist {
        ServerPlaylist {
            id: id.to_string(),
            name: name.to_string(),
            song_count: None,
            owner: None,
        }
    }

    fn owned(id: &str, name: &str, owner: &str) -> ServerPlaylist {
        ServerPlaylist {
            owner: Some(owner.to_string()),
            ..playlist(id, name)
        }
    }

    fn song(id: &str) -> LibraryTrack {
        LibraryTrack {
            id: id.to_string(),
            title: id.to_string(),
            artist: "Artist".to_string(),
            album: None,
            path: None,
        }
    }

    #[test]
    fn test_find_playlist_prefers_lowest_id() {
        let playlists = vec![
            playlist("10", "Weekly Jams"),
            playlist("9", "Weekly Jams"),
            playlist("1", "Something else"),
        ];
        assert_eq!(find_playlist(&playlists, "Weekly Jams", None).unwrap().id, "9");
        assert!(find_playlist(&playlists, "Library Mix", None).is_none());
    }

    #[test]
    fn test_find_playlist_skips_other_users_playlists() {
        let playlists = vec![
            owned("3", "Weekly Jams", "alice"),
            owned("12", "Weekly Jams", "navidrofm"),
        ];
        assert_eq!(
            find_playlist(&playlists, "Weekly Jams", Some("navidrofm")).unwrap().id,
            "12"
        );
        assert!(find_playlist(&playlists[..1], "Weekly Jams", Some("navidrofm")).is_none());
    }

    #[tokio::test]
    async fn test_reconcile_creates_own_playlist_next_to_foreign_one() {
        let mut server = MockMusicServer::new();
        server
            .expect_get_playlists()
            .returning(|| Ok(vec![owned("1", "Library Mix", "alice")]));
        server
            .expect_create_playlist()
            .times(1)
            .returning(|name| Ok(owned("8", name, "navidrofm")));
        server
            .expect_replace_playlist_tracks()
            .withf(|id, _| id == "8")
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = PlaylistReconciler::new(&server, Some("navidrofm"));
        let result = reconciler
            .reconcile(PlaylistKind::Library, &[song("x")])
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.playlist_id, "8");
    }

    #[tokio::test]
    async fn test_reconcile_updates_existing_playlist_in_place() {
        let mut server = MockMusicServer::new();
        server
            .expect_get_playlists()
            .returning(|| Ok(vec![playlist("42", "Discover Recommended")]));
        server.expect_create_playlist().never();
        server
            .expect_replace_playlist_tracks()
            .withf(|id, songs| id == "42" && songs == ["a".to_string(), "b".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = PlaylistReconciler::new(&server, None);
        let result = reconciler
            .reconcile(
                PlaylistKind::Recommended,
                &[song("a"), song("b"), song("a")],
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            Reconciled {
                playlist_id: "42".to_string(),
                track_count: 2,
                created: false,
            }
        );
    }

    #[tokio::test]
    async fn test_reconcile_creates_missing_playlist_once() {
        let mut server = MockMusicServer::new();
        server.expect_get_playlists().returning(|| Ok(vec![]));
        server
            .expect_create_playlist()
            .withf(|name| name == "Weekly Exploration")
            .times(1)
            .returning(|name| Ok(playlist("7", name)));
        server
            .expect_replace_playlist_tracks()
            .withf(|id, _| id == "7")
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = PlaylistReconciler::new(&server, None);
        let result = reconciler
            .reconcile(PlaylistKind::Exploration, &[song("x")])
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.playlist_id, "7");
    }

    #[tokio::test]
    async fn test_reconcile_failure_is_server_unavailable() {
        let mut server = MockMusicServer::new();
        server
            .expect_get_playlists()
            .returning(|| Err(color_eyre::eyre::eyre!("connection reset")));
        server.expect_replace_playlist_tracks().never();

        let reconciler = PlaylistReconciler::new(&server, None);
        let result = reconciler.reconcile(PlaylistKind::Mix, &[song("x")]).await;

        assert!(matches!(
            result,
            Err(RunError::ServerUnavailable {
                stage: RunStage::Reconciling,
                ..
            })
        ));
    }
}
