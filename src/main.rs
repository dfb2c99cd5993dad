mod config;
mod kind;
mod lastfm;
mod listenbrainz;
mod logging;
mod ports;
mod services;
mod subsonic_rs;
#[cfg(test)]
mod test_utils;
mod track;
mod ytdlp;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};

use crate::{
    config::Config,
    kind::PlaylistKind,
    logging::init_tracing,
    ports::music_server::MusicServer,
    services::{
        downloader::client::YtDlpAdapter,
        pipeline::Pipeline,
        recommendations::client::{ProviderHttpAdapter, ProviderSettings},
        run_lock::RunLock,
        storage::ManagedStorage,
        subsonic::client::SubsonicHttpAdapter,
    },
    subsonic_rs::SubsonicAuth,
    ytdlp::YtDlp,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "DISCOVERY_SYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter directives (default: info)
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Export spans to this OTLP gRPC endpoint
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RunTarget {
    Recommended,
    Mix,
    Library,
    Exploration,
    Jams,
    /// Every enabled playlist, one after another
    All,
}

impl RunTarget {
    fn kinds(self) -> Vec<PlaylistKind> {
        match self {
            RunTarget::Recommended => vec![PlaylistKind::Recommended],
            RunTarget::Mix => vec![PlaylistKind::Mix],
            RunTarget::Library => vec![PlaylistKind::Library],
            RunTarget::Exploration => vec![PlaylistKind::Exploration],
            RunTarget::Jams => vec![PlaylistKind::Jams],
            RunTarget::All => PlaylistKind::ALL.to_vec(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build one playlist, or all enabled ones
    Run {
        #[arg(value_enum)]
        target: RunTarget,
    },
    /// Check that the music server is reachable with the configured credentials
    Check,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    log::debug!("Loading configuration");
    match path {
        Some(path) => Config::from_file(&path),
        None => Config::load(),
    }
    .wrap_err("Failed to load discovery-sync config")
}

fn music_server(config: &Config) -> Result<SubsonicHttpAdapter> {
    let auth = SubsonicAuth::new(
        config.server_url()?,
        &config.server.username,
        &config.server.password,
    );
    SubsonicHttpAdapter::new(auth, config.server_timeout()?)
}

/// Kinds of `target` that are enabled, in run order.
fn enabled_kinds(config: &Config, target: RunTarget) -> Vec<PlaylistKind> {
    target
        .kinds()
        .into_iter()
        .filter(|kind| {
            let enabled = config.kinds.get(*kind).enabled;
            if !enabled {
                log::info!("Skipping {kind}: disabled in config");
            }
            enabled
        })
        .collect()
}

/// The schedule is evaluated by whatever triggers `run`, in `timezone`.
fn completion_message(
    kind: PlaylistKind,
    schedule: &str,
    timezone: Option<&str>,
    finished: DateTime<Utc>,
) -> String {
    format!(
        "{} finished at {}; next run follows schedule '{}' in {}",
        kind.display_name(),
        finished.format("%Y-%m-%d %H:%M:%S UTC"),
        schedule,
        timezone.unwrap_or("UTC")
    )
}

async fn run(config: &Config, target: RunTarget) -> Result<()> {
    let kinds = enabled_kinds(config, target);
    if kinds.is_empty() {
        log::info!("No enabled playlists to build");
        return Ok(());
    }

    let storage = ManagedStorage::new(config.music_dir(), &config.storage.managed_subdir);
    log::debug!("Managed storage at {}", storage.root().display());
    let Some(_lock) = RunLock::try_acquire(storage.root())? else {
        log::info!(
            "Another run is in progress (lock held in {}), skipping",
            storage.root().display()
        );
        return Ok(());
    };

    let ytdlp = if kinds.iter().any(|kind| kind.downloads()) {
        Some(YtDlp::locate(config.cookie_file())?)
    } else {
        log::debug!("Only library playlists selected, not looking for yt-dlp");
        None
    };
    let audio = YtDlpAdapter::new(
        ytdlp,
        config.downloads_per_minute(),
        config.download_timeout()?,
    );
    let provider = ProviderHttpAdapter::new(
        ProviderSettings {
            lastfm_base_url: config.lastfm_base_url()?,
            listenbrainz_base_url: config.listenbrainz_base_url()?,
            lastfm_username: config.providers.lastfm_username.clone(),
            listenbrainz_username: config.providers.listenbrainz_username.clone(),
        },
        config.provider_timeout()?,
    )?;

    let pipeline = Pipeline::new(
        music_server(config)?,
        provider,
        audio,
        storage,
        config.pipeline_settings()?,
    );

    let mut failed = Vec::new();
    for kind in kinds {
        let kind_config = config.kinds.get(kind);

        match pipeline.run(kind, kind_config.tracks).await {
            Ok(result) => log::info!(
                "{}: {} of {} tracks, {} downloaded, {} files kept, {} removed, reindex {:?}",
                result.kind.display_name(),
                result.tracks.len(),
                result.requested,
                result.downloaded,
                result.retained.len(),
                result.removed,
                result.reindex
            ),
            Err(_) => failed.push(kind),
        }

        log::info!(
            "{}",
            completion_message(
                kind,
                &kind_config.schedule,
                config.timezone.as_deref(),
                Utc::now()
            )
        );
    }

    if failed.is_empty() {
        Ok(())
    } else {
        let names: Vec<&str> = failed.iter().map(|k| k.slug()).collect();
        Err(eyre!("Failed playlists: {}", names.join(", ")))
    }
}

async fn check(config: &Config) -> Result<()> {
    let server = music_server(config)?;
    server
        .ping()
        .await
        .wrap_err_with(|| format!("Could not reach {}", config.server.url))?;
    println!("Connected to {} as {}", config.server.url, config.server.username);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(
        env!("CARGO_PKG_NAME"),
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    log::debug!("discovery-sync starting");

    let result = match args.command {
        Commands::Run { target } => {
            async {
                let config = load_config(args.config)?;
                run(&config, target).await
            }
            .await
        }
        Commands::Check => {
            async {
                let config = load_config(args.config)?;
                check(&config).await
            }
            .await
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                Config::create_default().map(|path| {
                    println!("{}", path.display());
                })
            }
            ConfigCommands::Path => {
                match Config::config_path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("No default config path found"),
                }
                Ok(())
            }
        },
    };

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            log::warn!("Failed to flush traces: {e}");
        }
    }

    result
}
