//! Stream resolution: turning a station URL into a direct playable stream
//! URL plus an optional finite duration.
//!
//! The production resolver shells out to yt-dlp and applies the audio-format
//! selection policy; the trait seam exists so the engine's cache behavior can
//! be tested against a counting stub.

use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of resolving one source URL.
#[derive(Debug, Clone, Default)]
pub struct ResolvedStream {
    pub is_live: bool,
    /// Finite duration in seconds; `None` for live/unbounded sources.
    pub duration: Option<f64>,
    /// Direct stream URL chosen by the selection policy.
    pub stream_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("yt-dlp binary not found")]
    BinaryMissing,
    #[error("yt-dlp failed: {0}")]
    Extraction(String),
    #[error("unparseable yt-dlp output: {0}")]
    BadOutput(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ResolveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ResolvedStream, ResolveError>> + Send + 'a>>;

pub trait StreamResolver: Send + Sync {
    fn resolve<'a>(&'a self, url: &'a str) -> ResolveFuture<'a>;
}

// ── yt-dlp JSON dump (the fields we use) ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct InfoDump {
    #[serde(default)]
    is_live: bool,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    url: Option<String>,
}

impl FormatInfo {
    fn is_audio_only(&self) -> bool {
        let has_audio = self.acodec.as_deref().map_or(false, |c| c != "none");
        let no_video = self.vcodec.as_deref().map_or(true, |c| c == "none");
        has_audio && no_video
    }

    /// Codec family preference times 1000 plus bitrate, so family always
    /// dominates and bitrate breaks ties.
    fn quality_score(&self) -> f64 {
        let codec = self.acodec.as_deref().unwrap_or("").to_ascii_lowercase();
        let family = if codec.contains("opus") {
            3.0
        } else if codec.contains("vorbis") {
            2.0
        } else {
            1.0
        };
        let bitrate = self.abr.or(self.tbr).unwrap_or(0.0);
        family * 1000.0 + bitrate
    }
}

/// Pick the best playable URL from an info dump: highest-scoring audio-only
/// format, the top-level URL for live sources without one, or the generic
/// best-available URL as a last resort.
fn select_stream_url(info: &InfoDump) -> Option<String> {
    let best_audio = info
        .formats
        .iter()
        .filter(|f| f.is_audio_only() && f.url.is_some())
        .max_by(|a, b| a.quality_score().total_cmp(&b.quality_score()));

    if let Some(best) = best_audio {
        debug!(
            "Selected audio format: {} @ {:.0}kbps",
            best.acodec.as_deref().unwrap_or("unknown"),
            best.abr.or(best.tbr).unwrap_or(0.0)
        );
        return best.url.clone();
    }

    info.url.clone()
}

// ── yt-dlp subprocess resolver ───────────────────────────────────────────────

pub struct YtDlpResolver;

impl YtDlpResolver {
    async fn run(url: &str) -> Result<ResolvedStream, ResolveError> {
        let binary =
            bakelite_core::platform::find_yt_dlp_binary().ok_or(ResolveError::BinaryMissing)?;

        let output = Command::new(binary)
            .arg("-J")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extraction(
                stderr.lines().last().unwrap_or("unknown error").to_string(),
            ));
        }

        let info: InfoDump = serde_json::from_slice(&output.stdout)?;
        let duration = if info.is_live { None } else { info.duration };
        let stream_url = select_stream_url(&info);
        if stream_url.is_none() {
            warn!("No playable stream URL found for {}", url);
        }

        Ok(ResolvedStream {
            is_live: info.is_live,
            duration,
            stream_url,
        })
    }
}

impl StreamResolver for YtDlpResolver {
    fn resolve<'a>(&'a self, url: &'a str) -> ResolveFuture<'a> {
        Box::pin(Self::run(url))
    }
}

/// True for sources that need yt-dlp resolution before the player can stream
/// them; plain http(s) radio streams and local files play directly.
pub fn needs_resolution(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}
