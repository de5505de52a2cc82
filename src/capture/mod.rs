use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::DeviceError;
use crate::recorder::MediaFormat;

mod command;
mod stream;

pub use command::CommandDevice;
pub use stream::{Feed, MediaStream, StreamKind, TrackControl};

#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Opens the device tracks for `kind`, encoding into `format`.
    async fn open(&self, kind: StreamKind, format: &MediaFormat)
    -> Result<MediaStream, DeviceError>;

    /// Whether the device can produce `format`.
    fn supports(&self, format: &MediaFormat) -> bool;
}

/// Camera and microphone first, camera alone as fallback.
///
/// A permission denial on the first attempt wins over whatever the fallback
/// reports, otherwise the fallback error is surfaced.
pub async fn acquire_stream(
    device: &dyn MediaDevice,
    format: &MediaFormat,
) -> Result<MediaStream, DeviceError> {
    let first = match device.open(StreamKind::AudioVideo, format).await {
        Ok(stream) => {
            info!("[capture] acquired {} stream {}", stream.kind(), stream.id());
            return Ok(stream);
        }
        Err(e) => e,
    };
    warn!("[capture] audio+video failed: {}, retrying video only", first);

    match device.open(StreamKind::VideoOnly, format).await {
        Ok(stream) => {
            info!("[capture] acquired {} stream {}", stream.kind(), stream.id());
            Ok(stream)
        }
        Err(fallback) => {
            warn!("[capture] video only failed: {}", fallback);
            if first.is_not_allowed() {
                Err(first)
            } else {
                Err(fallback)
            }
        }
    }
}
