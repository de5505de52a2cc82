use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use api::request::StartLive;
use api::response::ChatMessage;
use chrono::Utc;
use libcast::{Client, VideoFile};
use storage::Recordings;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capture::{MediaDevice, MediaStream, StreamKind, acquire_stream};
use crate::chat::ChatChannel;
use crate::config;
use crate::error::{DeviceError, LiveError, StopFailure};
use crate::recorder::{ChunkedRecorder, MediaFormat, assemble, negotiate};
use crate::result::Result;

mod state;

const REOPEN_ATTEMPTS: u32 = 3;
const REOPEN_BACKOFF: Duration = Duration::from_millis(250);

pub use state::{BroadcastSession, BroadcastState, StartBroadcast, StopOptions, StopReport};

#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// Ordered preference, most preferred first
    pub formats: Vec<MediaFormat>,
    pub chunk_interval: Duration,
}

impl From<&config::Recorder> for BroadcastOptions {
    fn from(cfg: &config::Recorder) -> Self {
        Self {
            formats: cfg.media_formats(),
            chunk_interval: cfg.chunk_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Live,
    Stopping,
}

struct Inner {
    phase: Phase,
    /// Bumped by every forced stop; work started under an older epoch is ignored.
    epoch: u64,
    stream: Option<Arc<MediaStream>>,
    format: Option<MediaFormat>,
    session: Option<BroadcastSession>,
    recorder: Option<Arc<ChunkedRecorder>>,
}

/// Drives one broadcast at a time: capture, chunked recording, and the
/// stop choreography `Live -> Stopping -> Uploading -> Finalizing -> Idle`.
pub struct Broadcaster {
    client: Client,
    device: Arc<dyn MediaDevice>,
    recordings: Option<Recordings>,
    chat: ChatChannel,
    options: BroadcastOptions,
    inner: Mutex<Inner>,
    state: Arc<watch::Sender<BroadcastState>>,
}

impl Broadcaster {
    pub fn new(
        client: Client,
        device: Arc<dyn MediaDevice>,
        recordings: Option<Recordings>,
        options: BroadcastOptions,
    ) -> Self {
        let (state, _) = watch::channel(BroadcastState::Idle);
        Self {
            chat: ChatChannel::new(client.clone()),
            client,
            device,
            recordings,
            options,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                epoch: 0,
                stream: None,
                format: None,
                session: None,
                recorder: None,
            }),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> BroadcastState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BroadcastState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Option<BroadcastSession> {
        self.lock().session.clone()
    }

    pub fn chat(&self) -> &ChatChannel {
        &self.chat
    }

    pub fn stream_kind(&self) -> Option<StreamKind> {
        self.lock()
            .stream
            .as_ref()
            .filter(|s| !s.is_released())
            .map(|s| s.kind())
    }

    pub fn is_recording(&self) -> bool {
        self.lock()
            .recorder
            .as_ref()
            .is_some_and(|r| r.is_active())
    }

    /// Opens the capture device unless a stream is already held.
    pub async fn acquire(&self) -> Result<StreamKind> {
        if let Some(kind) = self.stream_kind() {
            return Ok(kind);
        }
        let format = negotiate(&self.options.formats, self.device.as_ref())?;
        let stream = acquire_stream(self.device.as_ref(), &format)
            .await
            .inspect_err(|e| error!("[live] capture unavailable: {}", e))?;

        let mut inner = self.lock();
        if let Some(existing) = inner.stream.as_ref().filter(|s| !s.is_released()) {
            // lost a race with another acquire, the new stream is released on drop
            return Ok(existing.kind());
        }
        let kind = stream.kind();
        inner.stream = Some(Arc::new(stream));
        inner.format = Some(format);
        Ok(kind)
    }

    pub async fn start(&self, req: StartBroadcast) -> Result<BroadcastSession> {
        let (kind, format, epoch) = {
            let mut inner = self.lock();
            if inner.phase != Phase::Idle {
                return Err(LiveError::AlreadyLive);
            }
            let kind = inner
                .stream
                .as_ref()
                .filter(|s| !s.is_released())
                .map(|s| s.kind())
                .ok_or(LiveError::NoStream)?;
            let format = inner.format.clone().ok_or(LiveError::NoStream)?;
            inner.phase = Phase::Starting;
            (kind, format, inner.epoch)
        };

        let content = if req.content.trim().is_empty() {
            req.description.clone()
        } else {
            req.content.clone()
        };
        let started = match self
            .client
            .start_live(&StartLive {
                title: req.title.clone(),
                description: req.description.clone(),
                content,
            })
            .await
        {
            Ok(started) => started,
            Err(e) => {
                error!("[live] start failed: {}", e);
                let mut inner = self.lock();
                if inner.epoch == epoch {
                    inner.phase = Phase::Idle;
                }
                return Err(LiveError::Start(e));
            }
        };

        let session = BroadcastSession {
            session_id: started.live_id.clone(),
            post_id: started.post_id.clone(),
            title: req.title,
            description: req.description,
            started_at: Utc::now(),
            is_active: true,
        };

        let stream = match self.reopen(epoch, kind, &format).await {
            Ok(stream) => stream,
            Err(e) => {
                {
                    let mut inner = self.lock();
                    if inner.epoch == epoch {
                        inner.phase = Phase::Idle;
                    }
                }
                self.end_remote(&session.session_id).await;
                return Err(e);
            }
        };
        let format = match kind {
            StreamKind::AudioVideo => format,
            StreamKind::VideoOnly => format.video_only(),
        };

        let cancelled = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                true
            } else {
                inner.recorder = Some(Arc::new(ChunkedRecorder::start(
                    stream.feed(),
                    format,
                    self.options.chunk_interval,
                )));
                inner.stream = Some(stream.clone());
                inner.session = Some(session.clone());
                inner.phase = Phase::Live;
                false
            }
        };
        if cancelled {
            warn!("[live] {} force stopped while starting", session.session_id);
            stream.release();
            self.end_remote(&session.session_id).await;
            return Err(LiveError::Cancelled);
        }
        self.state.send_replace(BroadcastState::Live);
        info!(
            "[live] broadcast {} (post {}) is live",
            session.session_id, session.post_id
        );

        self.chat.clear();
        if let Err(e) = self.chat.load_history(&session.post_id).await {
            warn!("[live] chat history unavailable: {}", e);
        }
        Ok(session)
    }

    /// Finalizes the recording, uploads it and notifies the end of the
    /// broadcast. Failures are reported in the [`StopReport`]; the
    /// broadcaster always ends `Idle`.
    pub async fn stop(&self, options: StopOptions) -> Result<StopReport> {
        let (session, recorder, epoch) = {
            let mut inner = self.lock();
            if inner.phase != Phase::Live {
                return Err(LiveError::NotLive);
            }
            let session = inner.session.clone().ok_or(LiveError::NotLive)?;
            inner.phase = Phase::Stopping;
            (session, inner.recorder.clone(), inner.epoch)
        };
        self.state.send_replace(BroadcastState::Stopping);
        info!("[live] stopping broadcast {}", session.session_id);

        let chunks = match &recorder {
            Some(recorder) => recorder.stop().await.unwrap_or_default(),
            None => Vec::new(),
        };
        self.check_epoch(epoch)?;

        let mut report = StopReport {
            session_id: session.session_id.clone(),
            chunks: chunks.len(),
            ..Default::default()
        };
        let format = recorder
            .as_ref()
            .map(|r| r.format().clone())
            .unwrap_or_else(|| MediaFormat::new("video/webm"));

        let recording = assemble(&chunks);
        drop(chunks);
        match recording {
            None => {
                warn!("[live] broadcast {} has no recording", session.session_id);
                report.failure = Some(StopFailure::NoRecording);
            }
            Some(recording) => {
                report.bytes = recording.len();

                if let Some(recordings) = &self.recordings {
                    match recordings
                        .save(
                            &session.session_id,
                            session.started_at,
                            format.extension(),
                            recording.clone(),
                        )
                        .await
                    {
                        Ok(path) => report.local_copy = Some(recordings.url(&path)),
                        Err(e) => warn!("[live] local copy not saved: {}", e),
                    }
                    self.check_epoch(epoch)?;
                }

                self.state
                    .send_replace(BroadcastState::Uploading { progress: 0.0 });
                let state = self.state.clone();
                let video = VideoFile {
                    data: recording,
                    file_name: format!("{}.{}", session.session_id, format.extension()),
                    mime: format.container().to_string(),
                };
                let upload = self
                    .client
                    .upload_video(&session.session_id, video, move |p| {
                        state.send_if_modified(|s| match s {
                            BroadcastState::Uploading { progress } => {
                                *progress = p;
                                true
                            }
                            _ => false,
                        });
                    })
                    .await;
                self.check_epoch(epoch)?;

                match upload {
                    Ok(result) => {
                        report.video_saved = result.is_saved();
                        if !report.video_saved {
                            warn!(
                                "[live] {} uploaded but not persisted by the server",
                                session.session_id
                            );
                        }
                        report.media_id = result.media_id;
                        report.file_url = result.file_url;
                    }
                    Err(e) => {
                        error!("[live] upload of {} failed: {}", session.session_id, e);
                        report.failure = Some(StopFailure::from(&e));
                    }
                }
            }
        }

        self.state.send_replace(BroadcastState::Finalizing);
        match self.client.stop_live(&session.session_id).await {
            Ok(_) => report.ended_remotely = true,
            Err(e) => {
                error!("[live] end of {} not notified: {}", session.session_id, e);
                report.failure.get_or_insert(StopFailure::from(&e));
            }
        }
        self.check_epoch(epoch)?;

        report.recorded_video = report.file_url.clone().or(report.local_copy.clone());
        self.finish(epoch, options, report)
    }

    /// Tears everything down immediately: the recorder is killed, the device
    /// released and the session dropped. An in-flight stop is left to finish
    /// on its own and its outcome ignored.
    pub fn force_stop(&self) {
        let (recorder, stream, session) = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.phase = Phase::Idle;
            inner.format = None;
            (
                inner.recorder.take(),
                inner.stream.take(),
                inner.session.take(),
            )
        };
        if let Some(recorder) = recorder {
            recorder.abort();
        }
        if let Some(stream) = stream {
            stream.release();
        }
        if let Some(session) = session {
            warn!(
                "[live] broadcast {} force stopped, recording discarded",
                session.session_id
            );
        }
        self.state.send_replace(BroadcastState::Idle);
    }

    /// Closing the view: a live broadcast is force stopped, otherwise only the
    /// device is released. A stop in progress keeps running to completion.
    pub fn close(&self) {
        let phase = self.lock().phase;
        match phase {
            Phase::Starting | Phase::Live => self.force_stop(),
            Phase::Idle | Phase::Stopping => {
                let stream = {
                    let mut inner = self.lock();
                    inner.format = None;
                    inner.stream.take()
                };
                if let Some(stream) = stream {
                    stream.release();
                }
            }
        }
    }

    /// Swaps the held stream for a newly opened one, so that a recording
    /// holds only media captured while live and begins with the container
    /// header.
    async fn reopen(
        &self,
        epoch: u64,
        kind: StreamKind,
        format: &MediaFormat,
    ) -> Result<Arc<MediaStream>> {
        let previous = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return Err(LiveError::Cancelled);
            }
            inner.stream.take()
        };
        if let Some(previous) = previous {
            previous.release();
        }

        let mut attempt = 1;
        loop {
            match self.device.open(kind, format).await {
                Ok(stream) => return Ok(Arc::new(stream)),
                // the released encoder may not have let go of the device yet
                Err(DeviceError::DeviceBusy(msg)) if attempt < REOPEN_ATTEMPTS => {
                    debug!("[live] capture busy ({}), retry {}", msg, attempt);
                    attempt += 1;
                    tokio::time::sleep(REOPEN_BACKOFF).await;
                }
                Err(e) => {
                    error!("[live] capture reopen failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn end_remote(&self, live_id: &str) {
        if let Err(e) = self.client.stop_live(live_id).await {
            warn!("[live] end of {} not notified: {}", live_id, e);
        }
    }

    pub async fn send_chat(&self, text: &str) -> Result<ChatMessage> {
        let post_id = self.live_post_id()?;
        Ok(self.chat.send(&post_id, text).await?)
    }

    pub async fn sync_chat(&self) -> Result<Vec<ChatMessage>> {
        let post_id = self.live_post_id()?;
        Ok(self.chat.sync(&post_id).await?)
    }

    fn live_post_id(&self) -> Result<String> {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.post_id.clone())
            .ok_or(LiveError::NotLive)
    }

    fn finish(&self, epoch: u64, options: StopOptions, report: StopReport) -> Result<StopReport> {
        let released = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return Err(LiveError::Cancelled);
            }
            inner.session = None;
            inner.recorder = None;
            inner.phase = Phase::Idle;
            if options.close_view {
                inner.format = None;
                inner.stream.take()
            } else {
                None
            }
        };
        if let Some(stream) = released {
            stream.release();
        }
        if let Some(reason) = report.failure {
            self.state.send_replace(BroadcastState::Error { reason });
        }
        self.state.send_replace(BroadcastState::Idle);
        debug!("[live] stop report: {:?}", report);
        Ok(report)
    }

    fn check_epoch(&self, epoch: u64) -> Result<()> {
        if self.lock().epoch != epoch {
            debug!("[live] stop outcome ignored after forced stop");
            return Err(LiveError::Cancelled);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(recorder) = inner.recorder.take() {
            recorder.abort();
        }
        if let Some(stream) = inner.stream.take() {
            stream.release();
        }
    }
}
