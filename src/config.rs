use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use color_eyre::eyre::{OptionExt, Result, WrapErr, ensure};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::kind::PlaylistKind;
use crate::services::matching::MatchPolicy;
use crate::services::pipeline::PipelineSettings;
use crate::services::recommendations::FetchPolicy;
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Passed through to whatever schedules `run`.
    pub timezone: Option<String>,
    pub run_on_startup: bool,
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub storage: StorageConfig,
    pub tuning: TuningConfig,
    pub kinds: KindsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Enables scans targeted at the managed directory (Navidrome library id).
    pub library_id: Option<String>,
    pub request_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4533".to_string(),
            username: String::new(),
            password: String::new(),
            library_id: None,
            request_timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub lastfm_username: Option<String>,
    pub listenbrainz_username: Option<String>,
    pub lastfm_base_url: String,
    pub listenbrainz_base_url: String,
    pub request_timeout: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            lastfm_username: None,
            listenbrainz_username: None,
            lastfm_base_url: crate::lastfm::DEFAULT_BASE_URL.to_string(),
            listenbrainz_base_url: crate::listenbrainz::DEFAULT_BASE_URL.to_string(),
            request_timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub music_dir: String,
    pub managed_subdir: String,
    pub cookie_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            music_dir: "/music".to_string(),
            managed_subdir: "navidrofm".to_string(),
            cookie_file: Some("/app/cookies/cookies.txt".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub overfetch_multiplier: usize,
    pub max_pages: u32,
    pub page_delay: String,
    pub fuzzy_threshold: f64,
    pub max_candidates_per_slot: usize,
    pub download_concurrency: usize,
    pub download_timeout: String,
    pub downloads_per_minute: u32,
    pub reindex_timeout: String,
    pub reindex_poll_interval: String,
    pub retry_attempts: usize,
    pub retry_min_delay: String,
    pub retry_max_delay: String,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            overfetch_multiplier: 3,
            max_pages: 20,
            page_delay: "1s".to_string(),
            fuzzy_threshold: MatchPolicy::default().fuzzy_threshold,
            max_candidates_per_slot: 3,
            download_concurrency: 2,
            download_timeout: "3m".to_string(),
            downloads_per_minute: 30,
            reindex_timeout: "5m".to_string(),
            reindex_poll_interval: "5s".to_string(),
            retry_attempts: 3,
            retry_min_delay: "1s".to_string(),
            retry_max_delay: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    pub enabled: bool,
    pub tracks: usize,
    /// Cron expression, only reported; scheduling happens outside this tool.
    pub schedule: String,
}

impl KindConfig {
    fn with_tracks(tracks: usize) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tracks: 25,
            schedule: "0 4 * * 1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KindsConfig {
    pub recommended: KindConfig,
    pub mix: KindConfig,
    pub library: KindConfig,
    pub exploration: KindConfig,
    pub jams: KindConfig,
}

impl Default for KindsConfig {
    fn default() -> Self {
        Self {
            recommended: KindConfig::default(),
            mix: KindConfig::default(),
            library: KindConfig::with_tracks(50),
            exploration: KindConfig::default(),
            jams: KindConfig::default(),
        }
    }
}

impl KindsConfig {
    pub fn get(&self, kind: PlaylistKind) -> &KindConfig {
        match kind {
            PlaylistKind::Recommended => &self.recommended,
            PlaylistKind::Mix => &self.mix,
            PlaylistKind::Library => &self.library,
            PlaylistKind::Exploration => &self.exploration,
            PlaylistKind::Jams => &self.jams,
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .wrap_err_with(|| format!("Invalid duration for {field}: {value:?}"))
}

impl Config {
    /// Load config from a TOML file, then apply environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("discovery-sync").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or_eyre("Config directory not found")?;

        Self::from_file(&config_path)
    }

    /// Write the default config, unless one already exists
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("Config directory not found")?;
        if path.exists() {
            log::info!("Config already exists at {}", path.display());
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Config::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Secrets are usually injected through the environment rather than the file.
    fn apply_env(&mut self) {
        if let Ok(password) = std::env::var("NAVIDROME_PASSWORD") {
            self.server.password = password;
        }
        if let Ok(user) = std::env::var("LASTFM_USERNAME") {
            self.providers.lastfm_username = Some(user);
        }
        if let Ok(user) = std::env::var("LZ_USERNAME") {
            self.providers.listenbrainz_username = Some(user);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server_url()?;
        self.lastfm_base_url()?;
        self.listenbrainz_base_url()?;

        let tuning = &self.tuning;
        ensure!(
            tuning.fuzzy_threshold > 0.0 && tuning.fuzzy_threshold <= 1.0,
            "tuning.fuzzy_threshold must be in (0, 1], got {}",
            tuning.fuzzy_threshold
        );
        ensure!(
            tuning.overfetch_multiplier >= 1,
            "tuning.overfetch_multiplier must be at least 1"
        );
        ensure!(tuning.max_pages > 0, "tuning.max_pages must be positive");
        ensure!(
            tuning.max_candidates_per_slot > 0,
            "tuning.max_candidates_per_slot must be positive"
        );
        ensure!(
            tuning.download_concurrency > 0,
            "tuning.download_concurrency must be positive"
        );
        ensure!(
            tuning.downloads_per_minute > 0,
            "tuning.downloads_per_minute must be positive"
        );
        ensure!(
            tuning.retry_attempts > 0,
            "tuning.retry_attempts must be positive"
        );
        for kind in PlaylistKind::ALL {
            ensure!(
                self.kinds.get(kind).tracks > 0,
                "kinds.{kind}.tracks must be positive"
            );
        }

        self.pipeline_settings()?;
        self.download_timeout()?;
        self.server_timeout()?;
        self.provider_timeout()?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn music_dir(&self) -> PathBuf {
        self.expand_path(&self.storage.music_dir)
    }

    pub fn cookie_file(&self) -> Option<PathBuf> {
        self.storage
            .cookie_file
            .as_deref()
            .map(|path| self.expand_path(path))
    }

    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server.url)
            .wrap_err_with(|| format!("Invalid server.url: {}", self.server.url))
    }

    pub fn lastfm_base_url(&self) -> Result<Url> {
        Url::parse(&self.providers.lastfm_base_url).wrap_err("Invalid providers.lastfm_base_url")
    }

    pub fn listenbrainz_base_url(&self) -> Result<Url> {
        Url::parse(&self.providers.listenbrainz_base_url)
            .wrap_err("Invalid providers.listenbrainz_base_url")
    }

    pub fn server_timeout(&self) -> Result<Duration> {
        parse_duration("server.request_timeout", &self.server.request_timeout)
    }

    pub fn provider_timeout(&self) -> Result<Duration> {
        parse_duration("providers.request_timeout", &self.providers.request_timeout)
    }

    pub fn download_timeout(&self) -> Result<Duration> {
        parse_duration("tuning.download_timeout", &self.tuning.download_timeout)
    }

    pub fn downloads_per_minute(&self) -> NonZeroU32 {
        NonZeroU32::new(self.tuning.downloads_per_minute).unwrap_or(NonZeroU32::MIN)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let tuning = &self.tuning;
        Ok(PipelineSettings {
            fetch: FetchPolicy {
                overfetch_multiplier: tuning.overfetch_multiplier,
                max_pages: tuning.max_pages,
                page_delay: parse_duration("tuning.page_delay", &tuning.page_delay)?,
            },
            retry: RetryPolicy {
                max_attempts: tuning.retry_attempts,
                min_delay: parse_duration("tuning.retry_min_delay", &tuning.retry_min_delay)?,
                max_delay: parse_duration("tuning.retry_max_delay", &tuning.retry_max_delay)?,
            },
            match_policy: MatchPolicy {
                fuzzy_threshold: tuning.fuzzy_threshold,
            },
            max_candidates_per_slot: tuning.max_candidates_per_slot,
            download_concurrency: tuning.download_concurrency,
            reindex_timeout: parse_duration("tuning.reindex_timeout", &tuning.reindex_timeout)?,
            reindex_poll_interval: parse_duration(
                "tuning.reindex_poll_interval",
                &tuning.reindex_poll_interval,
            )?,
            library_id: self.server.library_id.clone(),
            playlist_owner: Some(self.server.username.clone()).filter(|u| !u.is_empty()),
        })
    }
}
