use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::capture::Feed;

mod format;

pub use format::{MediaFormat, negotiate};

const READ_BUFFER: usize = 16 * 1024;
const FLUSH_READS: usize = 64;
/// How long a stop waits for output the encoder already produced.
const FLUSH_WAIT: Duration = Duration::from_millis(50);

/// One timed increment of the recording. `seq` follows capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    pub seq: u64,
    pub data: Bytes,
}

#[derive(Default)]
struct Control {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Records a capture feed into an in-memory list of chunks, one per interval.
pub struct ChunkedRecorder {
    format: MediaFormat,
    chunks: Arc<Mutex<Vec<MediaChunk>>>,
    control: Mutex<Control>,
    abort: AbortHandle,
}

impl ChunkedRecorder {
    pub fn start(
        feed: Arc<tokio::sync::Mutex<Feed>>,
        format: MediaFormat,
        interval: Duration,
    ) -> Self {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(record(feed, chunks.clone(), interval, stop_rx));
        info!("[recorder] started, format {} every {:?}", format, interval);
        Self {
            format,
            chunks,
            abort: handle.abort_handle(),
            control: Mutex::new(Control {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            }),
        }
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    pub fn is_active(&self) -> bool {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle
            .is_some()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Asks the recording task to flush and waits for it to finish. Returns
    /// the final chunk list, or `None` if the recorder was not active.
    pub async fn stop(&self) -> Option<Vec<MediaChunk>> {
        let (stop_tx, handle) = {
            let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            (control.stop_tx.take(), control.handle.take())
        };
        let handle = handle?;
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Err(e) = handle.await {
            warn!("[recorder] task ended abnormally: {}", e);
        }
        let chunks = std::mem::take(
            &mut *self.chunks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        info!("[recorder] stopped with {} chunks", chunks.len());
        Some(chunks)
    }

    /// Kills the recording task without flushing and drops every chunk.
    pub fn abort(&self) {
        self.abort.abort();
        {
            let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            control.stop_tx = None;
            control.handle = None;
        }
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).clear();
        warn!("[recorder] aborted, recording discarded");
    }
}

impl Drop for ChunkedRecorder {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

async fn record(
    feed: Arc<tokio::sync::Mutex<Feed>>,
    chunks: Arc<Mutex<Vec<MediaChunk>>>,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut feed = feed.lock().await;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = BytesMut::new();
    let mut scratch = vec![0u8; READ_BUFFER];
    let mut seq = 0u64;
    let mut emit = |pending: &mut BytesMut| {
        if pending.is_empty() {
            return;
        }
        let data = pending.split().freeze();
        debug!("[recorder] chunk {} ({} bytes)", seq, data.len());
        chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MediaChunk { seq, data });
        seq += 1;
    };

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("[recorder] stop requested");
                // take what the capture already produced
                for _ in 0..FLUSH_READS {
                    match tokio::time::timeout(FLUSH_WAIT, feed.read(&mut scratch)).await {
                        Ok(Ok(n)) if n > 0 => pending.extend_from_slice(&scratch[..n]),
                        _ => break,
                    }
                }
                break;
            }
            _ = ticker.tick() => emit(&mut pending),
            read = feed.read(&mut scratch) => match read {
                Ok(0) => {
                    info!("[recorder] capture feed ended");
                    break;
                }
                Ok(n) => pending.extend_from_slice(&scratch[..n]),
                Err(e) => {
                    warn!("[recorder] capture feed error: {}", e);
                    break;
                }
            },
        }
    }
    emit(&mut pending);
}

/// Concatenates chunks in capture order into one recording.
pub fn assemble(chunks: &[MediaChunk]) -> Option<Bytes> {
    if chunks.iter().all(|c| c.data.is_empty()) {
        return None;
    }
    let mut ordered: Vec<&MediaChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.seq);
    let mut out = BytesMut::with_capacity(ordered.iter().map(|c| c.data.len()).sum());
    for chunk in ordered {
        out.extend_from_slice(&chunk.data);
    }
    Some(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn feed(reader: tokio::io::DuplexStream) -> Arc<tokio::sync::Mutex<Feed>> {
        let feed: Feed = Box::new(reader);
        Arc::new(tokio::sync::Mutex::new(feed))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_chunk_per_interval_in_order() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let recorder = ChunkedRecorder::start(
            feed(reader),
            MediaFormat::new("video/webm"),
            Duration::from_secs(1),
        );

        writer.write_all(b"one-").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        writer.write_all(b"two-").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        writer.write_all(b"three").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let chunks = recorder.stop().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(assemble(&chunks).unwrap(), Bytes::from_static(b"one-two-three"));
    }

    #[tokio::test]
    async fn test_stop_when_inactive_is_noop() {
        let (_writer, reader) = tokio::io::duplex(64);
        let recorder = ChunkedRecorder::start(
            feed(reader),
            MediaFormat::new("video/webm"),
            Duration::from_secs(1),
        );
        assert!(recorder.is_active());
        assert!(recorder.stop().await.is_some());
        assert!(!recorder.is_active());
        assert!(recorder.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_feed_end_keeps_chunks() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let recorder = ChunkedRecorder::start(
            feed(reader),
            MediaFormat::new("video/webm"),
            Duration::from_secs(60),
        );
        writer.write_all(b"tail").await.unwrap();
        drop(writer);
        let chunks = recorder.stop().await.unwrap();
        assert_eq!(assemble(&chunks).unwrap(), Bytes::from_static(b"tail"));
    }

    #[tokio::test]
    async fn test_stop_takes_output_still_in_flight() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let recorder = ChunkedRecorder::start(
            feed(reader),
            MediaFormat::new("video/webm"),
            Duration::from_secs(60),
        );
        writer.write_all(b"body-").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (chunks, _) = tokio::join!(recorder.stop(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.write_all(b"trailer").await.unwrap();
        });
        assert_eq!(
            assemble(&chunks.unwrap()).unwrap(),
            Bytes::from_static(b"body-trailer")
        );
    }

    #[tokio::test]
    async fn test_abort_discards() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let recorder = ChunkedRecorder::start(
            feed(reader),
            MediaFormat::new("video/webm"),
            Duration::from_millis(10),
        );
        writer.write_all(b"data").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        recorder.abort();
        assert_eq!(recorder.chunk_count(), 0);
        assert!(recorder.stop().await.is_none());
    }

    #[test]
    fn test_assemble_orders_by_seq() {
        let chunks = vec![
            MediaChunk { seq: 1, data: Bytes::from_static(b"b") },
            MediaChunk { seq: 0, data: Bytes::from_static(b"a") },
        ];
        assert_eq!(assemble(&chunks).unwrap(), Bytes::from_static(b"ab"));
        assert!(assemble(&[]).is_none());
    }
}
