use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{MediaDevice, MediaStream, StreamKind, TrackControl};
use crate::config::Capture;
use crate::error::DeviceError;
use crate::recorder::MediaFormat;

/// Captures through an external encoder process (typically `ffmpeg`) that
/// writes the container stream to stdout.
pub struct CommandDevice {
    audio_video: Option<String>,
    video_only: Option<String>,
    muxers: Vec<String>,
    encoders: BTreeMap<String, String>,
    startup_timeout: Duration,
}

impl CommandDevice {
    pub fn new(cfg: &Capture) -> Self {
        Self {
            audio_video: cfg.audio_video.clone(),
            video_only: cfg.video_only.clone(),
            muxers: cfg.muxers.clone(),
            encoders: cfg.encoders.clone(),
            startup_timeout: Duration::from_millis(cfg.startup_timeout_ms),
        }
    }

    fn template(&self, kind: StreamKind) -> Option<&String> {
        match kind {
            StreamKind::AudioVideo => self.audio_video.as_ref(),
            StreamKind::VideoOnly => self.video_only.as_ref(),
        }
    }

    fn muxer(&self, format: &MediaFormat) -> Option<&str> {
        format
            .muxers()
            .iter()
            .copied()
            .find(|m| self.muxers.iter().any(|s| s == m))
    }

    fn encoder(&self, codec: Option<String>) -> Option<&str> {
        codec.and_then(|c| self.encoders.get(&c)).map(String::as_str)
    }

    /// Fills the command template for `kind`. `None` when the format needs a
    /// muxer or an encoder the device does not have.
    fn command_line(
        &self,
        template: &str,
        kind: StreamKind,
        format: &MediaFormat,
    ) -> Option<String> {
        let mut line = template.replace("{format}", self.muxer(format)?);
        line = line.replace("{video_codec}", self.encoder(format.video_codec())?);
        if kind == StreamKind::AudioVideo {
            line = line.replace("{audio_codec}", self.encoder(format.audio_codec())?);
        }
        Some(line)
    }
}

#[async_trait]
impl MediaDevice for CommandDevice {
    async fn open(
        &self,
        kind: StreamKind,
        format: &MediaFormat,
    ) -> Result<MediaStream, DeviceError> {
        let template = self
            .template(kind)
            .ok_or_else(|| DeviceError::unsupported(format!("no {} capture command", kind)))?;
        let line = self
            .command_line(template, kind, format)
            .ok_or_else(|| DeviceError::unsupported(format!("format {}", format)))?;
        let args = shellwords::split(&line).map_err(DeviceError::unknown)?;
        let (program, args) = args
            .split_first()
            .ok_or_else(|| DeviceError::unsupported("empty capture command"))?;

        debug!("[capture] spawn: {}", line);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::unknown("capture stdout unavailable"))?;
        let mut stderr = child.stderr.take();

        let mut head = vec![0u8; 4096];
        let head = match tokio::time::timeout(self.startup_timeout, stdout.read(&mut head)).await {
            Ok(Ok(0)) => {
                let status = child.wait().await.ok();
                let mut diagnostics = String::new();
                if let Some(mut stderr) = stderr.take() {
                    let _ = stderr.read_to_string(&mut diagnostics).await;
                }
                return Err(classify_exit(&diagnostics, status));
            }
            Ok(Ok(n)) => {
                head.truncate(n);
                head
            }
            Ok(Err(e)) => return Err(DeviceError::unknown(e)),
            Err(_) => {
                debug!("[capture] no output within startup window, accepting device");
                Vec::new()
            }
        };

        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(stderr));
        }

        let id = format!("{}-{}", program, child.id().unwrap_or_default());
        info!("[capture] {} capture running as {}", kind, id);
        let feed: Box<dyn AsyncRead + Send + Unpin> = Box::new(Cursor::new(head).chain(stdout));
        Ok(MediaStream::new(
            id.clone(),
            kind,
            feed,
            vec![Box::new(ProcessTrack {
                label: id,
                child: Mutex::new(Some(child)),
            })],
        ))
    }

    fn supports(&self, format: &MediaFormat) -> bool {
        self.muxer(format).is_some()
            && self.encoder(format.video_codec()).is_some()
            && format
                .audio_codec()
                .is_none_or(|c| self.encoders.contains_key(&c))
    }
}

struct ProcessTrack {
    label: String,
    child: Mutex<Option<Child>>,
}

impl TrackControl for ProcessTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn stop(&self) {
        if let Ok(mut guard) = self.child.lock()
            && let Some(mut child) = guard.take()
        {
            if let Err(e) = child.start_kill() {
                warn!("[capture] kill {} failed: {}", self.label, e);
            }
        }
    }
}

async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[capture] {}", line);
    }
}

fn spawn_error(err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::NotFound => DeviceError::not_found(err),
        io::ErrorKind::PermissionDenied => DeviceError::not_allowed(err),
        _ => DeviceError::unknown(err),
    }
}

fn classify_exit(diagnostics: &str, status: Option<std::process::ExitStatus>) -> DeviceError {
    let lower = diagnostics.to_lowercase();
    let message = match diagnostics.trim() {
        "" => format!("capture exited without output ({:?})", status),
        d => d.to_string(),
    };
    if lower.contains("permission denied") || lower.contains("not permitted") {
        DeviceError::NotAllowed(message)
    } else if lower.contains("busy") {
        DeviceError::DeviceBusy(message)
    } else if lower.contains("no such file") || lower.contains("not found") {
        DeviceError::NotFound(message)
    } else if lower.contains("unknown encoder") || lower.contains("unknown input format") {
        DeviceError::Unsupported(message)
    } else {
        DeviceError::Unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(audio_video: Option<&str>, video_only: Option<&str>) -> CommandDevice {
        CommandDevice::new(&Capture {
            audio_video: audio_video.map(str::to_string),
            video_only: video_only.map(str::to_string),
            muxers: vec!["webm".to_string()],
            encoders: [("vp8", "libvpx"), ("vorbis", "libvorbis"), ("opus", "libopus")]
                .into_iter()
                .map(|(c, e)| (c.to_string(), e.to_string()))
                .collect(),
            startup_timeout_ms: 2_000,
        })
    }

    #[test]
    fn test_supports_by_muxer_and_encoder() {
        let d = device(None, None);
        assert!(d.supports(&MediaFormat::new("video/webm;codecs=vp8,opus")));
        assert!(d.supports(&MediaFormat::new("video/webm")));
        assert!(!d.supports(&MediaFormat::new("video/webm;codecs=vp9,opus")));
        assert!(!d.supports(&MediaFormat::new("video/mp4")));
    }

    #[test]
    fn test_negotiation_skips_missing_encoder() {
        let prefs = vec![
            MediaFormat::new("video/webm;codecs=vp9,opus"),
            MediaFormat::new("video/webm;codecs=vp8,opus"),
            MediaFormat::new("video/webm"),
        ];
        let picked = crate::recorder::negotiate(&prefs, &device(None, None)).unwrap();
        assert_eq!(picked.mime(), "video/webm;codecs=vp8,opus");
    }

    #[test]
    fn test_classify_exit() {
        assert!(matches!(
            classify_exit("/dev/video0: Permission denied", None),
            DeviceError::NotAllowed(_)
        ));
        assert!(matches!(
            classify_exit("/dev/video0: Device or resource busy", None),
            DeviceError::DeviceBusy(_)
        ));
        assert!(matches!(
            classify_exit("/dev/video9: No such file or directory", None),
            DeviceError::NotFound(_)
        ));
        assert!(matches!(classify_exit("", None), DeviceError::Unknown(_)));
    }

    #[tokio::test]
    async fn test_missing_template_is_unsupported() {
        let err = device(None, None)
            .open(StreamKind::AudioVideo, &MediaFormat::new("video/webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let err = device(Some("/nonexistent/livecast-capture -f {format} -"), None)
            .open(StreamKind::AudioVideo, &MediaFormat::new("video/webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_the_feed() {
        let stream = device(None, Some("printf {format}-bytes"))
            .open(StreamKind::VideoOnly, &MediaFormat::new("video/webm"))
            .await
            .unwrap();
        let feed = stream.feed();
        let mut feed = feed.lock().await;
        let mut out = String::new();
        feed.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "webm-bytes");
        assert!(stream.release());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoders_fill_the_command() {
        let d = device(
            Some("printf {video_codec}:{audio_codec}:{format}"),
            Some("printf {video_codec}:{format}"),
        );
        let format = MediaFormat::new("video/webm;codecs=vp8,opus");
        for (kind, expected) in [
            (StreamKind::AudioVideo, "libvpx:libopus:webm"),
            (StreamKind::VideoOnly, "libvpx:webm"),
        ] {
            let stream = d.open(kind, &format).await.unwrap();
            let feed = stream.feed();
            let mut out = String::new();
            feed.lock().await.read_to_string(&mut out).await.unwrap();
            assert_eq!(out, expected);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_exit_is_classified() {
        let err = device(Some("sh -c 'echo \"Device or resource busy\" >&2'"), None)
            .open(StreamKind::AudioVideo, &MediaFormat::new("video/webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::DeviceBusy(_)));
    }
}
