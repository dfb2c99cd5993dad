use std::fmt;

use serde::{Deserialize, Serialize};

use crate::services::matching::{normalize_string, primary_artist};

/// A track proposed by a recommendation provider.
///
/// `rank` is the zero-based position in the provider's deduplicated order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCandidate {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub rank: usize,
    pub provider_id: String,
}

impl TrackCandidate {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(&self.title, &self.artist)
    }

    /// First credited artist, used for search queries and fuzzy comparison.
    pub fn primary_artist(&self) -> &str {
        primary_artist(&self.artist)
    }
}

impl fmt::Display for TrackCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Case and diacritic insensitive identity of a (title, artist) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey {
    pub title: String,
    pub artist: String,
}

impl NormalizedKey {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            title: normalize_string(title),
            artist: normalize_string(artist),
        }
    }
}

/// A song as the music server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Path as reported by the server, usually relative to the library root.
    pub path: Option<String>,
}

impl LibraryTrack {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(&self.title, &self.artist)
    }
}
