use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use color_eyre::eyre::{Result, eyre};

use crate::ports::audio_source::{AudioSource, DownloadError, SourceTrack};
use crate::ports::music_server::{MusicServer, ScanStatus, ServerPlaylist};
use crate::services::matching::normalize_string;
use crate::track::LibraryTrack;

pub fn library_track(id: &str, title: &str, artist: &str) -> LibraryTrack {
    LibraryTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        album: None,
        path: None,
    }
}

fn words(s: &str) -> HashSet<String> {
    normalize_string(s)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[derive(Default)]
struct ServerState {
    library: Vec<LibraryTrack>,
    playlists: Vec<(ServerPlaylist, Vec<String>)>,
    next_id: u64,
    ping_budget: Option<usize>,
}

impl ServerState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

/// In-memory music server that indexes `Artist - Title.mp3` files under the
/// music root when a scan is started.
#[derive(Clone)]
pub struct FakeMusicServer {
    music_root: PathBuf,
    state: Arc<Mutex<ServerState>>,
}

impl FakeMusicServer {
    pub fn new(music_root: &Path) -> Self {
        Self {
            music_root: music_root.to_path_buf(),
            state: Arc::default(),
        }
    }

    /// Put a user-owned file in the library, outside managed storage.
    pub fn add_user_file(&self, artist: &str, title: &str) -> LibraryTrack {
        let relative = PathBuf::from(artist).join(format!("{artist} - {title}.mp3"));
        let absolute = self.music_root.join(&relative);
        std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
        std::fs::write(&absolute, b"user audio").unwrap();

        let mut state = self.state.lock().unwrap();
        let id = format!("song-{}", state.next_id());
        let track = LibraryTrack {
            path: Some(relative.to_string_lossy().into_owned()),
            ..library_track(&id, title, artist)
        };
        state.library.push(track.clone());
        track
    }

    /// Pings left before the server starts refusing connections.
    pub fn set_ping_budget(&self, budget: usize) {
        self.state.lock().unwrap().ping_budget = Some(budget);
    }

    pub fn playlist_count(&self) -> usize {
        self.state.lock().unwrap().playlists.len()
    }

    pub fn playlist_tracks(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .playlists
            .iter()
            .find(|(p, _)| p.name == name)
            .map(|(_, songs)| songs.clone())
            .unwrap_or_default()
    }

    fn scan(&self) {
        let mut state = self.state.lock().unwrap();
        let root = &self.music_root;
        state.library.retain(|track| {
            track
                .path
                .as_ref()
                .is_none_or(|path| root.join(path).exists())
        });

        let known: HashSet<String> = state
            .library
            .iter()
            .filter_map(|t| t.path.clone())
            .collect();

        for entry in walkdir::WalkDir::new(root) {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            if known.contains(&relative) {
                continue;
            }
            let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
            let Some((artist, title)) = stem.split_once(" - ") else {
                continue;
            };
            let id = format!("song-{}", state.next_id());
            state.library.push(LibraryTrack {
                path: Some(relative),
                ..library_track(&id, title, artist)
            });
        }
    }
}

#[async_trait::async_trait]
impl MusicServer for FakeMusicServer {
    async fn ping(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.ping_budget.as_mut() {
            Some(0) => Err(eyre!("connection refused")),
            Some(budget) => {
                *budget -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn search_songs(&self, query: &str, count: u32) -> Result<Vec<LibraryTrack>> {
        let wanted = words(query);
        let state = self.state.lock().unwrap();
        Ok(state
            .library
            .iter()
            .filter(|t| wanted.is_subset(&words(&format!("{} {}", t.artist, t.title))))
            .take(count as usize)
            .cloned()
            .collect())
    }

    async fn get_playlists(&self) -> Result<Vec<ServerPlaylist>> {
        let state = self.state.lock().unwrap();
        Ok(state.playlists.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn create_playlist(&self, name: &str) -> Result<ServerPlaylist> {
        let mut state = self.state.lock().unwrap();
        let playlist = ServerPlaylist {
            id: state.next_id(),
            name: name.to_string(),
            song_count: Some(0),
            owner: None,
        };
        state.playlists.push((playlist.clone(), Vec::new()));
        Ok(playlist)
    }

    async fn replace_playlist_tracks(&self, playlist_id: &str, song_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let (playlist, songs) = state
            .playlists
            .iter_mut()
            .find(|(p, _)| p.id == playlist_id)
            .ok_or_else(|| eyre!("playlist {playlist_id} not found"))?;
        playlist.song_count = Some(song_ids.len() as u32);
        *songs = song_ids.to_vec();
        Ok(())
    }

    async fn start_scan(&self, _target: Option<String>) -> Result<()> {
        self.scan();
        Ok(())
    }

    async fn scan_status(&self) -> Result<ScanStatus> {
        let state = self.state.lock().unwrap();
        Ok(ScanStatus {
            scanning: false,
            count: Some(state.library.len() as u64),
        })
    }
}

/// Audio source with a fixed catalog of `(title, artist)` pairs.
#[derive(Clone)]
pub struct FakeAudioSource {
    catalog: Vec<SourceTrack>,
    failing: HashSet<String>,
    downloads: Arc<AtomicUsize>,
}

impl FakeAudioSource {
    pub fn new(catalog: Vec<(String, String)>) -> Self {
        Self {
            catalog: catalog
                .into_iter()
                .enumerate()
                .map(|(i, (title, artist))| SourceTrack {
                    id: format!("video-{i}"),
                    title,
                    artist,
                    duration_secs: Some(200),
                })
                .collect(),
            failing: HashSet::new(),
            downloads: Arc::default(),
        }
    }

    /// Titles whose download fails with a conversion error.
    pub fn failing(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.failing.extend(titles);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioSource for FakeAudioSource {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceTrack>, DownloadError> {
        let wanted = words(query);
        Ok(self
            .catalog
            .iter()
            .filter(|t| wanted.is_subset(&words(&format!("{} {}", t.artist, t.title))))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download(
        &self,
        source: &SourceTrack,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, DownloadError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&source.title) {
            return Err(DownloadError::Conversion {
                reason: "ffmpeg exited with status 1".to_string(),
            });
        }
        let path = output_dir.join(format!("{file_stem}.mp3"));
        std::fs::write(&path, b"audio").map_err(|e| DownloadError::Download {
            reason: e.to_string(),
        })?;
        Ok(path)
    }
}
