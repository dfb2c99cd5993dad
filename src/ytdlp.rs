use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;
use tokio::process::Command;

use crate::ports::audio_source::{DownloadError, SourceTrack};

const WATCH_URL: &str = "https://music.youtube.com/watch?v=";
const SEARCH_URL: &str = "https://music.youtube.com/search?q=";

/// YouTube Music search limited to the "Songs" shelf.
pub fn songs_search_url(query: &str) -> String {
    format!("{SEARCH_URL}{}#songs", urlencoding::encode(query))
}

/// Thin wrapper around the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    cookie_file: Option<PathBuf>,
}

/// One line of `--dump-json --flat-playlist` output.
#[derive(Debug, Clone, Deserialize)]
struct FlatEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl FlatEntry {
    fn into_source_track(self) -> SourceTrack {
        // Auto generated "Artist - Topic" channels carry the clean artist name.
        let artist = self
            .artist
            .or(self.channel)
            .or(self.uploader)
            .map(|a| a.trim_end_matches(" - Topic").to_string())
            .unwrap_or_default();

        SourceTrack {
            title: self.track.or(self.title).unwrap_or_default(),
            artist,
            duration_secs: self.duration.map(|d| d.round() as u32),
            id: self.id,
        }
    }
}

pub fn parse_search_output(stdout: &str) -> Vec<SourceTrack> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => Some(entry.into_source_track()),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparsable yt-dlp line");
                None
            }
        })
        .collect()
}

/// Failures after the download finished are ffmpeg post-processing problems.
fn classify_failure(stderr: &str) -> DownloadError {
    let lower = stderr.to_lowercase();
    let reason = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or(stderr.trim())
        .to_string();

    if lower.contains("postprocessing") || lower.contains("ffmpeg") || lower.contains("ffprobe") {
        DownloadError::Conversion { reason }
    } else {
        DownloadError::Download { reason }
    }
}

impl YtDlp {
    /// Locate `yt-dlp` on `PATH`.
    pub fn locate(cookie_file: Option<PathBuf>) -> Result<Self> {
        let binary = which::which("yt-dlp").wrap_err(
            "yt-dlp not found in PATH. Please install yt-dlp and ensure it's available.",
        )?;

        let cookie_file = match cookie_file {
            Some(path) if path.is_file() => Some(path),
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Cookie file not found, downloads may hit age or bot checks"
                );
                None
            }
            None => None,
        };

        Ok(Self {
            binary,
            cookie_file,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-warnings")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cookies) = &self.cookie_file {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd
    }

    /// `yt-dlp --flat-playlist --dump-json --playlist-end {limit} "<songs search url>"`
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<SourceTrack>, DownloadError> {
        let mut cmd = self.command();
        cmd.arg("--flat-playlist")
            .arg("--dump-json")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg(songs_search_url(query));

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| DownloadError::Download {
                reason: format!("search timed out after {}", humantime::format_duration(timeout)),
            })?
            .map_err(|e| DownloadError::Download {
                reason: format!("failed to run yt-dlp: {e}"),
            })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(parse_search_output(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Download best audio for `video_id` and convert it to `{output_dir}/{file_stem}.mp3`.
    pub async fn download_audio(
        &self,
        video_id: &str,
        output_dir: &Path,
        file_stem: &str,
        timeout: Duration,
    ) -> Result<PathBuf, DownloadError> {
        let template = output_dir.join(format!("{file_stem}.%(ext)s"));

        let mut cmd = self.command();
        cmd.args([
            "--no-playlist",
            "--format",
            "bestaudio",
            "-x",
            "--audio-format",
            "mp3",
            "--audio-quality",
            "0",
            "--embed-thumbnail",
            "--no-embed-info-json",
            "--output",
        ])
        .arg(&template)
        .arg(format!("{WATCH_URL}{video_id}"));

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| DownloadError::Download {
                reason: format!(
                    "download timed out after {}",
                    humantime::format_duration(timeout)
                ),
            })?
            .map_err(|e| DownloadError::Download {
                reason: format!("failed to run yt-dlp: {e}"),
            })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let expected = output_dir.join(format!("{file_stem}.mp3"));
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            Ok(expected)
        } else {
            Err(DownloadError::Conversion {
                reason: format!("yt-dlp finished but {} is missing", expected.display()),
            })
        }
    }
}
