use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::MediaDevice;
use crate::error::RecorderError;

/// A container/codec combination such as `video/webm;codecs=vp9,opus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaFormat {
    mime: String,
}

impl MediaFormat {
    pub fn new<T: ToString>(mime: T) -> Self {
        Self {
            mime: mime.to_string().trim().to_string(),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Mime type without parameters, e.g. `video/webm`.
    pub fn container(&self) -> &str {
        self.mime.split(';').next().unwrap_or_default().trim()
    }

    pub fn codecs(&self) -> Vec<&str> {
        self.mime
            .split(';')
            .skip(1)
            .filter_map(|p| p.trim().strip_prefix("codecs="))
            .flat_map(|c| c.trim_matches('"').split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Video codec, in canonical form. Falls back to the container default
    /// when the mime carries no codecs parameter.
    pub fn video_codec(&self) -> Option<String> {
        self.pick_codec(is_video_codec, 0)
    }

    /// Audio codec, in canonical form, with the same container fallback.
    pub fn audio_codec(&self) -> Option<String> {
        self.pick_codec(is_audio_codec, 1)
    }

    /// The same format with its audio codecs removed, for video-only streams.
    pub fn video_only(&self) -> MediaFormat {
        let codecs: Vec<String> = self
            .codecs()
            .into_iter()
            .filter(|c| !is_audio_codec(&canonical_codec(c)))
            .map(str::to_string)
            .collect();
        if codecs.is_empty() {
            return MediaFormat::new(self.container());
        }
        MediaFormat::new(format!("{};codecs={}", self.container(), codecs.join(",")))
    }

    fn pick_codec(&self, matches: fn(&str) -> bool, slot: usize) -> Option<String> {
        let codecs = self.codecs();
        if codecs.is_empty() {
            return default_codecs(self.container())
                .get(slot)
                .map(|c| c.to_string());
        }
        codecs
            .into_iter()
            .map(canonical_codec)
            .find(|c| matches(c))
    }

    pub fn extension(&self) -> &'static str {
        match self.container() {
            "video/webm" | "audio/webm" => "webm",
            "video/mp4" | "audio/mp4" => "mp4",
            "video/x-matroska" => "mkv",
            "video/ogg" | "audio/ogg" => "ogg",
            _ => "bin",
        }
    }

    /// Encoder muxer names able to produce this container.
    pub fn muxers(&self) -> &'static [&'static str] {
        match self.container() {
            "video/webm" | "audio/webm" => &["webm", "matroska"],
            "video/mp4" | "audio/mp4" => &["mp4"],
            "video/x-matroska" => &["matroska"],
            "video/ogg" | "audio/ogg" => &["ogg"],
            _ => &[],
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime)
    }
}

/// `vp09.00.10.08` -> `vp9`, `avc1.42E01E` -> `h264`, `mp4a.40.2` -> `aac`.
pub fn canonical_codec(codec: &str) -> String {
    let base = codec
        .trim()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    match base.as_str() {
        "vp09" => "vp9".to_string(),
        "vp08" => "vp8".to_string(),
        "avc1" | "avc3" => "h264".to_string(),
        "hvc1" | "hev1" => "hevc".to_string(),
        "av01" => "av1".to_string(),
        "mp4a" => "aac".to_string(),
        _ => base,
    }
}

fn is_video_codec(codec: &str) -> bool {
    matches!(codec, "vp8" | "vp9" | "av1" | "h264" | "hevc" | "theora")
}

fn is_audio_codec(codec: &str) -> bool {
    matches!(codec, "opus" | "vorbis" | "aac" | "mp3" | "flac")
}

fn default_codecs(container: &str) -> &'static [&'static str] {
    match container {
        "video/webm" | "audio/webm" | "video/x-matroska" => &["vp8", "vorbis"],
        "video/mp4" | "audio/mp4" => &["h264", "aac"],
        "video/ogg" | "audio/ogg" => &["theora", "vorbis"],
        _ => &[],
    }
}

/// Picks the first format of `preferences` the device can produce.
pub fn negotiate(
    preferences: &[MediaFormat],
    device: &dyn MediaDevice,
) -> Result<MediaFormat, RecorderError> {
    for format in preferences {
        if device.supports(format) {
            info!("[recorder] selected format {}", format);
            return Ok(format.clone());
        }
        debug!("[recorder] format {} unsupported, trying next", format);
    }
    Err(RecorderError::NoSupportedFormat(
        preferences.iter().map(|f| f.mime.clone()).collect(),
    ))
}
