use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the candidates for a playlist kind come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSource {
    /// A Last.fm player station, e.g. `user/{name}/recommended`.
    LastFmStation(&'static str),
    /// A ListenBrainz "created for" playlist identified by its `source_patch`.
    ListenBrainzPatch(&'static str),
}

/// The playlists this tool knows how to build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistKind {
    Recommended,
    Mix,
    Library,
    Exploration,
    Jams,
}

impl PlaylistKind {
    /// Order used by `run all`.
    pub const ALL: [PlaylistKind; 5] = [
        PlaylistKind::Recommended,
        PlaylistKind::Mix,
        PlaylistKind::Library,
        PlaylistKind::Exploration,
        PlaylistKind::Jams,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            PlaylistKind::Recommended => "recommended",
            PlaylistKind::Mix => "mix",
            PlaylistKind::Library => "library",
            PlaylistKind::Exploration => "exploration",
            PlaylistKind::Jams => "jams",
        }
    }

    /// Name of the playlist on the music server. Never changes once created.
    pub fn display_name(self) -> &'static str {
        match self {
            PlaylistKind::Recommended => "Discover Recommended",
            PlaylistKind::Mix => "Recommended Mix",
            PlaylistKind::Library => "Library Mix",
            PlaylistKind::Exploration => "Weekly Exploration",
            PlaylistKind::Jams => "Weekly Jams",
        }
    }

    pub fn source(self) -> ProviderSource {
        match self {
            PlaylistKind::Recommended => ProviderSource::LastFmStation("recommended"),
            PlaylistKind::Mix => ProviderSource::LastFmStation("mix"),
            PlaylistKind::Library => ProviderSource::LastFmStation("library"),
            PlaylistKind::Exploration => ProviderSource::ListenBrainzPatch("weekly-exploration"),
            PlaylistKind::Jams => ProviderSource::ListenBrainzPatch("weekly-jams"),
        }
    }

    /// Library kinds only reference tracks the server already has.
    pub fn downloads(self) -> bool {
        !matches!(self, PlaylistKind::Library)
    }

    /// ListenBrainz generated playlists never hold more than 50 tracks.
    pub fn max_tracks(self) -> Option<usize> {
        match self.source() {
            ProviderSource::ListenBrainzPatch(_) => Some(50),
            ProviderSource::LastFmStation(_) => None,
        }
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
