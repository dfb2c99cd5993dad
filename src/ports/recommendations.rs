use crate::kind::PlaylistKind;

/// A track as a recommendation provider returns it, before ranking and dedupe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub native_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationPage {
    pub tracks: Vec<ProviderTrack>,
    /// The provider has nothing beyond this page.
    pub exhausted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed (status {status:?}): {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

/// Port trait for recommendation providers (Last.fm, ListenBrainz).
///
/// Implementations live in `services::recommendations::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Fetch one page of recommendations. `page` starts at 0.
    async fn fetch_page(
        &self,
        kind: PlaylistKind,
        page: u32,
    ) -> Result<RecommendationPage, ProviderError>;
}
