use color_eyre::eyre::Result;
use reqwest::Client;
use serde::Deserialize;

use super::{SubsonicAuth, one_or_many, request};

#[derive(Debug, Clone, Deserialize)]
pub struct SubsonicSong {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub track: Option<u32>,
    /// Relative to the library root on Navidrome.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchResult3 {
    #[serde(default, deserialize_with = "one_or_many")]
    pub song: Vec<SubsonicSong>,
}

#[derive(Debug, Clone, Deserialize)]
struct Search3Response {
    #[serde(rename = "searchResult3", default)]
    search_result: SearchResult3,
}

/// Search songs only.
///
/// Endpoint: `GET /rest/search3?query=...&songCount=N&artistCount=0&albumCount=0`
pub async fn search3(
    client: &Client,
    auth: &SubsonicAuth,
    query: &str,
    song_count: u32,
) -> Result<Vec<SubsonicSong>> {
    let res: Search3Response = request(
        client,
        auth,
        "search3",
        &[
            ("query", query.to_string()),
            ("songCount", song_count.to_string()),
            ("artistCount", "0".to_string()),
            ("albumCount", "0".to_string()),
        ],
    )
    .await?;

    Ok(res.search_result.song)
}
