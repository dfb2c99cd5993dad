use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::ports::recommendations::{ProviderError, ProviderTrack};

/// Docs:
/// https://listenbrainz.readthedocs.io/en/latest/users/api/playlist.html
pub const DEFAULT_BASE_URL: &str = "https://api.listenbrainz.org/";

const JSPF_PLAYLIST_EXTENSION: &str = "https://musicbrainz.org/doc/jspf#playlist";
const JSPF_TRACK_EXTENSION: &str = "https://musicbrainz.org/doc/jspf#track";

/// Patches regenerated every day instead of every week.
const DAILY_PATCHES: &[&str] = &["daily-jams"];

/* ---------- JSPF ---------- */

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedForResponse {
    #[serde(default)]
    pub playlists: Vec<PlaylistEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEnvelope {
    pub playlist: JspfPlaylist,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JspfPlaylist {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub extension: serde_json::Value,
    #[serde(default)]
    pub track: Vec<JspfTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JspfTrack {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub identifier: Option<serde_json::Value>,
    #[serde(default)]
    pub extension: serde_json::Value,
}

impl JspfPlaylist {
    /// The playlist MBID, the last segment of its identifier URL.
    pub fn mbid(&self) -> &str {
        self.identifier
            .rsplit('/')
            .next()
            .unwrap_or(&self.identifier)
    }

    pub fn source_patch(&self) -> Option<&str> {
        self.extension
            .get(JSPF_PLAYLIST_EXTENSION)?
            .get("additional_metadata")?
            .get("algorithm_metadata")?
            .get("source_patch")?
            .as_str()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let date = self.date.as_deref()?;
        DateTime::parse_from_rfc3339(date)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

impl JspfTrack {
    /// All credited artists joined with `", "`, falling back to `creator`.
    pub fn artist_credit(&self) -> String {
        let names: Vec<&str> = self
            .extension
            .get(JSPF_TRACK_EXTENSION)
            .and_then(|ext| ext.get("additional_metadata"))
            .and_then(|meta| meta.get("artists"))
            .and_then(|artists| artists.as_array())
            .map(|artists| {
                artists
                    .iter()
                    .filter_map(|a| a.get("artist_credit_name").and_then(|n| n.as_str()))
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if names.len() > 1 {
            names.join(", ")
        } else {
            self.creator.clone()
        }
    }

    pub fn recording_mbid(&self) -> Option<String> {
        let identifier = match self.identifier.as_ref()? {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items.first()?.as_str()?.to_string(),
            _ => return None,
        };
        identifier.rsplit('/').next().map(str::to_string)
    }

    pub fn into_provider_track(self) -> ProviderTrack {
        ProviderTrack {
            artist: self.artist_credit(),
            native_id: self.recording_mbid(),
            album: self.album.filter(|a| !a.is_empty()),
            title: self.title,
        }
    }
}

/// Pick this period's generated playlist for `patch` out of the "created for" list.
///
/// Weekly patches match on ISO week, daily patches on the day of the year.
pub fn find_current_playlist<'a>(
    playlists: &'a [PlaylistEnvelope],
    patch: &str,
    now: DateTime<Utc>,
) -> Option<&'a JspfPlaylist> {
    let daily = DAILY_PATCHES.contains(&patch);

    playlists
        .iter()
        .map(|p| &p.playlist)
        .filter(|p| p.source_patch() == Some(patch))
        .find(|p| {
            let Some(created) = p.created_at() else {
                tracing::debug!(identifier = %p.identifier, "Skipping playlist without a parsable date");
                return false;
            };
            if daily {
                created.year() == now.year() && created.ordinal() == now.ordinal()
            } else {
                created.iso_week() == now.iso_week()
            }
        })
}

/// Endpoint: `GET /1/user/{user}/playlists/createdfor`
pub async fn get_created_for(
    client: &Client,
    base_url: &Url,
    user: &str,
) -> Result<Vec<PlaylistEnvelope>, ProviderError> {
    let url = base_url
        .join(&format!(
            "1/user/{}/playlists/createdfor",
            urlencoding::encode(user)
        ))
        .map_err(|e| ProviderError::Decode(format!("invalid ListenBrainz URL: {e}")))?;

    let res = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<CreatedForResponse>()
        .await?;

    Ok(res.playlists)
}

/// Endpoint: `GET /1/playlist/{mbid}`
pub async fn get_playlist(
    client: &Client,
    base_url: &Url,
    mbid: &str,
) -> Result<JspfPlaylist, ProviderError> {
    let url = base_url
        .join(&format!("1/playlist/{mbid}"))
        .map_err(|e| ProviderError::Decode(format!("invalid ListenBrainz URL: {e}")))?;

    let res = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<PlaylistEnvelope>()
        .await?;

    Ok(res.playlist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created_for_fixture() -> CreatedForResponse {
        serde_json::from_str(
            r#"{
                "count": 3,
                "playlists": [
                    {
                        "playlist": {
                            "identifier": "https://listenbrainz.org/playlist/old-jams",
                            "title": "Weekly Jams for alice, week of 2024-01-01 Mon",
                            "date": "2024-01-01T03:00:00.000000+00:00",
                            "extension": {
                                "https://musicbrainz.org/doc/jspf#playlist": {
                                    "additional_metadata": {
                                        "algorithm_metadata": { "source_patch": "weekly-jams" }
                                    }
                                }
                            },
                            "track": []
                        }
                    },
                    {
                        "playlist": {
                            "identifier": "https://listenbrainz.org/playlist/new-jams",
                            "date": "2024-01-08T03:00:00.000000+00:00",
                            "extension": {
                                "https://musicbrainz.org/doc/jspf#playlist": {
                                    "additional_metadata": {
                                        "algorithm_metadata": { "source_patch": "weekly-jams" }
                                    }
                                }
                            },
                            "track": []
                        }
                    },
                    {
                        "playlist": {
                            "identifier": "https://listenbrainz.org/playlist/new-exploration",
                            "date": "2024-01-08T03:00:00.000000+00:00",
                            "extension": {
                                "https://musicbrainz.org/doc/jspf#playlist": {
                                    "additional_metadata": {
                                        "algorithm_metadata": { "source_patch": "weekly-exploration" }
                                    }
                                }
                            },
                            "track": []
                        }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_find_current_week_playlist() {
        let response = created_for_fixture();
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();

        let jams = find_current_playlist(&response.playlists, "weekly-jams", now).unwrap();
        assert_eq!(jams.mbid(), "new-jams");

        let exploration =
            find_current_playlist(&response.playlists, "weekly-exploration", now).unwrap();
        assert_eq!(exploration.mbid(), "new-exploration");
    }

    #[test]
    fn test_no_playlist_for_current_week() {
        let response = created_for_fixture();
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();

        assert!(find_current_playlist(&response.playlists, "weekly-jams", now).is_none());
    }

    #[test]
    fn test_parse_playlist_tracks() {
        let envelope: PlaylistEnvelope = serde_json::from_str(
            r#"{
                "playlist": {
                    "identifier": "https://listenbrainz.org/playlist/new-jams",
                    "track": [
                        {
                            "title": "Midnight City",
                            "creator": "M83",
                            "album": "Hurry Up, We're Dreaming",
                            "identifier": ["https://musicbrainz.org/recording/rec-1"]
                        },
                        {
                            "title": "Under Pressure",
                            "creator": "Queen & David Bowie",
                            "album": "",
                            "identifier": "https://musicbrainz.org/recording/rec-2",
                            "extension": {
                                "https://musicbrainz.org/doc/jspf#track": {
                                    "additional_metadata": {
                                        "artists": [
                                            { "artist_credit_name": "Queen", "join_phrase": " & " },
                                            { "artist_credit_name": "David Bowie", "join_phrase": "" }
                                        ]
                                    }
                                }
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let tracks: Vec<_> = envelope
            .playlist
            .track
            .into_iter()
            .map(JspfTrack::into_provider_track)
            .collect();

        assert_eq!(tracks[0].artist, "M83");
        assert_eq!(tracks[0].native_id.as_deref(), Some("rec-1"));
        assert_eq!(tracks[0].album.as_deref(), Some("Hurry Up, We're Dreaming"));

        assert_eq!(tracks[1].artist, "Queen, David Bowie");
        assert_eq!(tracks[1].native_id.as_deref(), Some("rec-2"));
        assert_eq!(tracks[1].album, None);
    }
}
