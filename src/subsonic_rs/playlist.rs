use color_eyre::eyre::{OptionExt, Result};
use reqwest::Client;
use serde::Deserialize;

use super::{Empty, SubsonicAuth, one_or_many, request};

/* ---------- Playlists ---------- */

#[derive(Debug, Clone, Deserialize)]
pub struct SubsonicPlaylist {
    pub id: String,
    pub name: String,
    #[serde(rename = "songCount", default)]
    pub song_count: Option<u32>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PlaylistList {
    #[serde(default, deserialize_with = "one_or_many")]
    playlist: Vec<SubsonicPlaylist>,
}

#[derive(Debug, Clone, Deserialize)]
struct GetPlaylistsResponse {
    #[serde(default)]
    playlists: PlaylistList,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatePlaylistResponse {
    #[serde(default)]
    playlist: Option<SubsonicPlaylist>,
}

/// Endpoint: `GET /rest/getPlaylists`
pub async fn get_playlists(client: &Client, auth: &SubsonicAuth) -> Result<Vec<SubsonicPlaylist>> {
    let res: GetPlaylistsResponse = request(client, auth, "getPlaylists", &[]).await?;
    Ok(res.playlists.playlist)
}

/// Create an empty playlist.
///
/// Endpoint: `GET /rest/createPlaylist?name=...`
///
/// Servers older than API 1.14 answer with an empty body, in which case the
/// playlist is looked up by name afterwards.
pub async fn create_playlist(
    client: &Client,
    auth: &SubsonicAuth,
    name: &str,
) -> Result<SubsonicPlaylist> {
    let res: CreatePlaylistResponse =
        request(client, auth, "createPlaylist", &[("name", name.to_string())]).await?;

    if let Some(playlist) = res.playlist {
        return Ok(playlist);
    }

    get_playlists(client, auth)
        .await?
        .into_iter()
        .filter(|p| p.name == name)
        .max_by(|a, b| a.id.cmp(&b.id))
        .ok_or_eyre("createPlaylist succeeded but the playlist is not listed")
}

/// Replace all songs of an existing playlist, keeping its id and name.
///
/// Endpoint: `GET /rest/createPlaylist?playlistId=...&songId=...&songId=...`
pub async fn replace_playlist_tracks(
    client: &Client,
    auth: &SubsonicAuth,
    playlist_id: &str,
    song_ids: &[String],
) -> Result<()> {
    let mut params = vec![("playlistId", playlist_id.to_string())];
    params.extend(song_ids.iter().map(|id| ("songId", id.clone())));

    request::<Empty>(client, auth, "createPlaylist", &params).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsonic_rs::parse_response;
    use serde_json::json;

    #[test]
    fn test_parse_playlists() {
        let payload = json!({
            "subsonic-response": {
                "status": "ok",
                "playlists": {
                    "playlist": [
                        { "id": "1", "name": "Discover Recommended", "songCount": 25, "owner": "admin" },
                        { "id": "2", "name": "Road trip" }
                    ]
                }
            }
        });

        let res: GetPlaylistsResponse = parse_response("getPlaylists", payload).unwrap();
        assert_eq!(res.playlists.playlist.len(), 2);
        assert_eq!(res.playlists.playlist[0].song_count, Some(25));
        assert_eq!(res.playlists.playlist[1].song_count, None);
    }

    #[test]
    fn test_parse_no_playlists() {
        let payload = json!({
            "subsonic-response": { "status": "ok", "playlists": {} }
        });

        let res: GetPlaylistsResponse = parse_response("getPlaylists", payload).unwrap();
        assert!(res.playlists.playlist.is_empty());
    }

    #[test]
    fn test_parse_created_playlist() {
        let payload = json!({
            "subsonic-response": {
                "status": "ok",
                "playlist": { "id": "9", "name": "Weekly Jams", "songCount": 0 }
            }
        });

        let res: CreatePlaylistResponse = parse_response("createPlaylist", payload).unwrap();
        assert_eq!(res.playlist.unwrap().id, "9");
    }
}
