use std::collections::BTreeMap;
use std::{env, fs, time::Duration};

use anyhow::Context;
use libcast::AuthContext;
use serde::{Deserialize, Serialize};
use storage::StorageConfig;

use crate::recorder::MediaFormat;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub capture: Capture,
    #[serde(default)]
    pub recorder: Recorder,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Bearer token, takes precedence over `token_file`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Capture commands write the encoded stream to stdout.
/// `{format}` is replaced with the negotiated muxer name, `{video_codec}` and
/// `{audio_codec}` with the encoders of the negotiated codecs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    #[serde(default = "default_audio_video_command")]
    pub audio_video: Option<String>,
    #[serde(default = "default_video_only_command")]
    pub video_only: Option<String>,
    /// Muxers the capture command can produce
    #[serde(default = "default_muxers")]
    pub muxers: Vec<String>,
    /// Codec to encoder name, e.g. `vp9 = "libvpx-vp9"`. Formats using a
    /// codec missing here are not supported.
    #[serde(default = "default_encoders")]
    pub encoders: BTreeMap<String, String>,
    /// How long to wait for the first bytes before accepting a silent device
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recorder {
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    /// Ordered preference, most preferred first
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    /// Keep a copy of every assembled recording in `storage`
    #[serde(default = "default_local_copy")]
    pub local_copy: bool,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_api_base_url() -> String {
    env::var("LIVECAST_API").unwrap_or_else(|_| "http://localhost:8000/api".to_string())
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_upload_timeout_ms() -> u64 {
    600_000
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_audio_video_command() -> Option<String> {
    Some(
        "ffmpeg -hide_banner -loglevel error -f v4l2 -i /dev/video0 -f alsa -i default \
         -c:v {video_codec} -c:a {audio_codec} -f {format} -"
            .to_string(),
    )
}

fn default_video_only_command() -> Option<String> {
    Some(
        "ffmpeg -hide_banner -loglevel error -f v4l2 -i /dev/video0 \
         -c:v {video_codec} -f {format} -"
            .to_string(),
    )
}

fn default_muxers() -> Vec<String> {
    vec!["webm".to_string(), "matroska".to_string()]
}

fn default_encoders() -> BTreeMap<String, String> {
    [
        ("vp9", "libvpx-vp9"),
        ("vp8", "libvpx"),
        ("h264", "libx264"),
        ("opus", "libopus"),
        ("vorbis", "libvorbis"),
        ("aac", "aac"),
    ]
    .into_iter()
    .map(|(codec, encoder)| (codec.to_string(), encoder.to_string()))
    .collect()
}

fn default_startup_timeout_ms() -> u64 {
    2_000
}

fn default_chunk_interval_ms() -> u64 {
    1_000
}

fn default_formats() -> Vec<String> {
    vec![
        "video/webm;codecs=vp9,opus".to_string(),
        "video/webm;codecs=vp8,opus".to_string(),
        "video/webm".to_string(),
        "video/mp4".to_string(),
    ]
}

fn default_local_copy() -> bool {
    true
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            token: None,
            token_file: None,
            request_timeout_ms: default_request_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self {
            audio_video: default_audio_video_command(),
            video_only: default_video_only_command(),
            muxers: default_muxers(),
            encoders: default_encoders(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            chunk_interval_ms: default_chunk_interval_ms(),
            formats: default_formats(),
            local_copy: default_local_copy(),
            storage: StorageConfig::default(),
        }
    }
}

impl Api {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn auth_context(&self) -> anyhow::Result<AuthContext> {
        if let Some(token) = &self.token {
            return Ok(AuthContext::new(Some(token.clone())));
        }
        match &self.token_file {
            Some(path) => AuthContext::from_file(path)
                .with_context(|| format!("read token file {}", path)),
            None => Ok(AuthContext::default()),
        }
    }
}

impl Recorder {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn media_formats(&self) -> Vec<MediaFormat> {
        self.formats.iter().map(|f| MediaFormat::new(f)).collect()
    }
}

impl Config {
    pub fn parse(path: Option<String>) -> anyhow::Result<Self> {
        let content = match path {
            Some(path) => {
                fs::read_to_string(&path).with_context(|| format!("read config {}", path))?
            }
            None => fs::read_to_string("livecast.toml")
                .or(fs::read_to_string("/etc/livecast/livecast.toml"))
                .unwrap_or_default(),
        };
        let cfg: Self = toml::from_str(&content).context("config parse error")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let base = self.api.base_url.to_lowercase();
        if !base.starts_with("http://") && !base.starts_with("https://") {
            anyhow::bail!("api.base_url must be http(s): {}", self.api.base_url);
        }
        if self.recorder.chunk_interval_ms == 0 {
            anyhow::bail!("recorder.chunk_interval_ms must be greater than 0");
        }
        if self.recorder.formats.is_empty() {
            anyhow::bail!("recorder.formats cannot be empty");
        }
        if self.capture.audio_video.is_none() && self.capture.video_only.is_none() {
            anyhow::bail!("capture needs at least one of audio_video or video_only");
        }
        Ok(())
    }
}
