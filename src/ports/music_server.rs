use color_eyre::eyre::Result;

use crate::track::LibraryTrack;

/// Decoupled representation of a server playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPlaylist {
    pub id: String,
    pub name: String,
    pub song_count: Option<u32>,
    /// Username of the owner, when the server reports it.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatus {
    pub scanning: bool,
    pub count: Option<u64>,
}

/// Port trait wrapping the Subsonic API capabilities used by business logic.
///
/// Implementations live in `services::subsonic::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MusicServer: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn search_songs(&self, query: &str, count: u32) -> Result<Vec<LibraryTrack>>;

    async fn get_playlists(&self) -> Result<Vec<ServerPlaylist>>;

    async fn create_playlist(&self, name: &str) -> Result<ServerPlaylist>;

    /// Replace the whole membership, keeping the playlist id and name.
    async fn replace_playlist_tracks(&self, playlist_id: &str, song_ids: &[String]) -> Result<()>;

    /// `target` is `{library_id}:{path}`; `None` scans the whole library.
    async fn start_scan(&self, target: Option<String>) -> Result<()>;

    async fn scan_status(&self) -> Result<ScanStatus>;
}
