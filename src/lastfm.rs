use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::ports::recommendations::{ProviderError, ProviderTrack};

pub const DEFAULT_BASE_URL: &str = "https://www.last.fm/";

/// Response of the web player's station endpoint. Undocumented, but it is what
/// the "My Recommendations" radio on last.fm plays from.
#[derive(Debug, Clone, Deserialize)]
pub struct StationResponse {
    #[serde(default)]
    pub playlist: Vec<StationTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationTrack {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<StationArtist>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationArtist {
    #[serde(default)]
    pub name: String,
}

impl StationTrack {
    /// Only the first credited artist is used; the rest are usually features.
    pub fn into_provider_track(self) -> ProviderTrack {
        let artist = self
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();
        let native_id = self
            .url
            .unwrap_or_else(|| format!("{}:{}", artist, self.name));

        ProviderTrack {
            title: self.name,
            artist,
            album: None,
            native_id: Some(native_id),
        }
    }
}

/// Fetch one station page. Every call returns a fresh random selection.
///
/// Endpoint: `GET /player/station/user/{user}/{station}`
pub async fn get_station_page(
    client: &Client,
    base_url: &Url,
    user: &str,
    station: &str,
) -> Result<StationResponse, ProviderError> {
    let url = base_url
        .join(&format!(
            "player/station/user/{}/{}",
            urlencoding::encode(user),
            station
        ))
        .map_err(|e| ProviderError::Decode(format!("invalid Last.fm URL: {e}")))?;

    let res = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json::<StationResponse>()
        .await?;

    Ok(res)
}
