use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use reqwest::Client;

use crate::ports::music_server::{MusicServer, ScanStatus, ServerPlaylist};
use crate::subsonic_rs::{
    self, SubsonicAuth, SubsonicPlaylist, SubsonicScanStatus, SubsonicSong, create_playlist,
    get_playlists, get_scan_status, replace_playlist_tracks, search3, start_scan,
};
use crate::track::LibraryTrack;

pub struct SubsonicHttpAdapter {
    client: Client,
    auth: SubsonicAuth,
}

impl SubsonicHttpAdapter {
    pub fn new(auth: SubsonicAuth, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("Failed to build HTTP client")?;

        Ok(Self { client, auth })
    }
}

impl From<SubsonicSong> for LibraryTrack {
    fn from(song: SubsonicSong) -> Self {
        LibraryTrack {
            id: song.id,
            title: song.title,
            artist: song.artist.unwrap_or_default(),
            album: song.album,
            path: song.path,
        }
    }
}

impl From<SubsonicPlaylist> for ServerPlaylist {
    fn from(playlist: SubsonicPlaylist) -> Self {
        ServerPlaylist {
            id: playlist.id,
            name: playlist.name,
            song_count: playlist.song_count,
            owner: playlist.owner,
        }
    }
}

impl From<SubsonicScanStatus> for ScanStatus {
    fn from(status: SubsonicScanStatus) -> Self {
        ScanStatus {
            scanning: status.scanning,
            count: status.count,
        }
    }
}

#[async_trait::async_trait]
impl MusicServer for SubsonicHttpAdapter {
    async fn ping(&self) -> Result<()> {
        subsonic_rs::ping(&self.client, &self.auth).await
    }

    async fn search_songs(&self, query: &str, count: u32) -> Result<Vec<LibraryTrack>> {
        let songs = search3(&self.client, &self.auth, query, count).await?;
        Ok(songs.into_iter().map(LibraryTrack::from).collect())
    }

    async fn get_playlists(&self) -> Result<Vec<ServerPlaylist>> {
        let playlists = get_playlists(&self.client, &self.auth).await?;
        Ok(playlists.into_iter().map(ServerPlaylist::from).collect())
    }

    async fn create_playlist(&self, name: &str) -> Result<ServerPlaylist> {
        Ok(create_playlist(&self.client, &self.auth, name).await?.into())
    }

    async fn replace_playlist_tracks(&self, playlist_id: &str, song_ids: &[String]) -> Result<()> {
        replace_playlist_tracks(&self.client, &self.auth, playlist_id, song_ids).await
    }

    async fn start_scan(&self, target: Option<String>) -> Result<()> {
        start_scan(&self.client, &self.auth, target.as_deref()).await?;
        Ok(())
    }

    async fn scan_status(&self) -> Result<ScanStatus> {
        Ok(get_scan_status(&self.client, &self.auth).await?.into())
    }
}
