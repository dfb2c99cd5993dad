use std::path::Path;

use audiotags::{AudioTag, Id3v2Tag, Tag};

use crate::track::TrackCandidate;

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Failed to read tags from {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write tags to {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Multi-artist credits use `"; "`, which Navidrome splits into separate artists.
pub fn artist_tag_value(artist: &str) -> String {
    artist.replace(", ", "; ").replace(" & ", "; ")
}

/// Writes title, artist, album and track number onto downloaded files.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataTagger;

impl MetadataTagger {
    /// `position` is zero-based; the written track number starts at 1.
    pub fn tag(
        &self,
        file: &Path,
        candidate: &TrackCandidate,
        position: usize,
    ) -> Result<(), TagError> {
        let path_str = file.to_string_lossy().to_string();

        let mut tag: Box<dyn AudioTag + Send + Sync> = match Tag::new().read_from_path(file) {
            Ok(tag) => tag,
            Err(e) if is_mp3(file) => {
                log::debug!("No readable ID3 tag on {} ({}), starting fresh", path_str, e);
                Box::new(Id3v2Tag::new())
            }
            Err(e) => {
                return Err(TagError::Read {
                    path: path_str,
                    reason: e.to_string(),
                });
            }
        };

        // Without an album the server files the track under "Unknown Album".
        let album = candidate.album.as_deref().unwrap_or(&candidate.title);
        let track_number = u16::try_from(position + 1).unwrap_or(u16::MAX);

        tag.set_title(&candidate.title);
        tag.set_artist(&artist_tag_value(&candidate.artist));
        tag.set_album_title(album);
        tag.set_track_number(track_number);

        tag.write_to_path(&path_str).map_err(|e| TagError::Write {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        log::debug!("Tagged {} as #{} {}", path_str, track_number, candidate);
        Ok(())
    }
}

fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
}
