#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use httpmock::Mock;
use libcast::{AuthContext, Client};
use livecast::capture::{Feed, MediaDevice, MediaStream, StreamKind, TrackControl};
use livecast::recorder::MediaFormat;
use livecast::{BroadcastOptions, Broadcaster, DeviceError};
use serde_json::json;
use storage::Recordings;
use tokio::io::DuplexStream;

pub const CHUNK_INTERVAL: Duration = Duration::from_millis(20);

struct CountingTrack(Arc<AtomicUsize>);

impl TrackControl for CountingTrack {
    fn label(&self) -> String {
        "fake camera".to_string()
    }

    fn stop(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Capture device backed by an in-memory pipe the test writes media into.
#[derive(Default)]
pub struct FakeDevice {
    deny: bool,
    unplugged: AtomicBool,
    opens: AtomicUsize,
    stopped: Arc<AtomicUsize>,
    writers: Mutex<Vec<DuplexStream>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            ..Default::default()
        })
    }

    /// Every later open fails with `NotFound`.
    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Times a track of any opened stream was stopped.
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Writing end of the most recently opened stream.
    pub fn writer(&self) -> DuplexStream {
        self.writers.lock().unwrap().pop().expect("no stream opened")
    }
}

#[async_trait]
impl MediaDevice for FakeDevice {
    async fn open(
        &self,
        kind: StreamKind,
        _format: &MediaFormat,
    ) -> Result<MediaStream, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(DeviceError::not_allowed("permission denied by user"));
        }
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(DeviceError::not_found("camera unplugged"));
        }
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        self.writers.lock().unwrap().push(writer);
        let feed: Feed = Box::new(reader);
        Ok(MediaStream::new(
            format!("fake-{}", self.opens()),
            kind,
            feed,
            vec![Box::new(CountingTrack(self.stopped.clone()))],
        ))
    }

    fn supports(&self, format: &MediaFormat) -> bool {
        format.container() == "video/webm"
    }
}

pub fn client(server: &MockServer, upload_timeout: Duration) -> Client {
    Client::new(server.url("/api"), AuthContext::new(Some("secret".to_string())))
        .with_timeouts(Duration::from_secs(5), upload_timeout)
}

pub fn broadcaster(
    server: &MockServer,
    device: Arc<FakeDevice>,
    recordings: Option<Recordings>,
    upload_timeout: Duration,
) -> Arc<Broadcaster> {
    Arc::new(Broadcaster::new(
        client(server, upload_timeout),
        device,
        recordings,
        BroadcastOptions {
            formats: vec![
                MediaFormat::new("video/webm;codecs=vp9,opus"),
                MediaFormat::new("video/mp4"),
            ],
            chunk_interval: CHUNK_INTERVAL,
        },
    ))
}

pub fn chat_message(id: u64, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "author": {"name": "Mamadou", "avatar": null},
        "content": content,
        "timestamp": "2024-05-01T10:00:00Z",
    })
}

/// Start and stop endpoints of live `L1` on post 7, with an empty chat.
pub async fn mock_live(server: &MockServer) -> (Mock<'_>, Mock<'_>) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/posts/live/7/chat/messages/");
            then.status(200).json_body(json!([]));
        })
        .await;
    let start = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/posts/live/start/")
                .header("Authorization", "Bearer secret");
            then.status(201)
                .json_body(json!({"live_id": "L1", "post_id": 7, "stream_key": "k"}));
        })
        .await;
    let stop = server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/posts/live/L1/stop/");
            then.status(200)
                .json_body(json!({"message": "Live terminé", "duration": 3.5}));
        })
        .await;
    (start, stop)
}
