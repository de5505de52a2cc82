use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    AudioVideo,
    VideoOnly,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::AudioVideo => write!(f, "audio+video"),
            StreamKind::VideoOnly => write!(f, "video-only"),
        }
    }
}

/// A device track, e.g. the camera or the microphone.
pub trait TrackControl: Send + Sync {
    fn label(&self) -> String;
    fn stop(&self);
}

pub type Feed = Box<dyn AsyncRead + Send + Unpin>;

/// Handle on acquired capture devices.
///
/// The encoded media is read from [`MediaStream::feed`]. Tracks are stopped
/// exactly once, by the first call to [`MediaStream::release`] or on drop.
pub struct MediaStream {
    id: String,
    kind: StreamKind,
    feed: Arc<Mutex<Feed>>,
    tracks: Vec<Box<dyn TrackControl>>,
    released: AtomicBool,
}

impl MediaStream {
    pub fn new(
        id: String,
        kind: StreamKind,
        feed: Feed,
        tracks: Vec<Box<dyn TrackControl>>,
    ) -> Self {
        Self {
            id,
            kind,
            feed: Arc::new(Mutex::new(feed)),
            tracks,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn feed(&self) -> Arc<Mutex<Feed>> {
        self.feed.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns `true` if this call stopped the tracks.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        for track in &self.tracks {
            track.stop();
        }
        info!(
            "[capture] stream {} released ({} tracks)",
            self.id,
            self.tracks.len()
        );
        true
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field(
                "tracks",
                &self.tracks.iter().map(|t| t.label()).collect::<Vec<_>>(),
            )
            .field("released", &self.is_released())
            .finish()
    }
}
