use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use reqwest::Client;
use url::Url;

use crate::kind::{PlaylistKind, ProviderSource};
use crate::lastfm::{StationTrack, get_station_page};
use crate::listenbrainz::{JspfTrack, find_current_playlist, get_created_for, get_playlist};
use crate::ports::recommendations::{ProviderError, RecommendationPage, RecommendationSource};

pub struct ProviderSettings {
    pub lastfm_base_url: Url,
    pub listenbrainz_base_url: Url,
    pub lastfm_username: Option<String>,
    pub listenbrainz_username: Option<String>,
}

pub struct ProviderHttpAdapter {
    client: Client,
    settings: ProviderSettings,
}

impl ProviderHttpAdapter {
    pub fn new(settings: ProviderSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("Failed to build HTTP client")?;

        Ok(Self { client, settings })
    }

    async fn lastfm_page(&self, station: &str) -> Result<RecommendationPage, ProviderError> {
        let user = self
            .settings
            .lastfm_username
            .as_deref()
            .ok_or_else(|| ProviderError::NotFound("Last.fm username is not configured".into()))?;

        let res = get_station_page(&self.client, &self.settings.lastfm_base_url, user, station)
            .await?;

        Ok(RecommendationPage {
            tracks: res
                .playlist
                .into_iter()
                .map(StationTrack::into_provider_track)
                .collect(),
            exhausted: false,
        })
    }

    async fn listenbrainz_page(&self, patch: &str) -> Result<RecommendationPage, ProviderError> {
        let user = self
            .settings
            .listenbrainz_username
            .as_deref()
            .ok_or_else(|| {
                ProviderError::NotFound("ListenBrainz username is not configured".into())
            })?;

        let base = &self.settings.listenbrainz_base_url;
        let created_for = get_created_for(&self.client, base, user).await?;

        let Some(current) = find_current_playlist(&created_for, patch, Utc::now()) else {
            tracing::info!(patch, user, "No ListenBrainz playlist generated for this period yet");
            return Ok(RecommendationPage {
                tracks: Vec::new(),
                exhausted: true,
            });
        };

        tracing::debug!(patch, mbid = current.mbid(), "Found current ListenBrainz playlist");
        let playlist = get_playlist(&self.client, base, current.mbid()).await?;

        Ok(RecommendationPage {
            tracks: playlist
                .track
                .into_iter()
                .map(JspfTrack::into_provider_track)
                .collect(),
            exhausted: true,
        })
    }
}

#[async_trait::async_trait]
impl RecommendationSource for ProviderHttpAdapter {
    async fn fetch_page(
        &self,
        kind: PlaylistKind,
        page: u32,
    ) -> Result<RecommendationPage, ProviderError> {
        match kind.source() {
            ProviderSource::LastFmStation(station) => self.lastfm_page(station).await,
            // Generated playlists are a single static page.
            ProviderSource::ListenBrainzPatch(_) if page > 0 => Ok(RecommendationPage {
                tracks: Vec::new(),
                exhausted: true,
            }),
            ProviderSource::ListenBrainzPatch(patch) => self.listenbrainz_page(patch).await,
        }
    }
}
