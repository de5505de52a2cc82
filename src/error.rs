use libcast::ClientError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera or microphone access denied: {0}")]
    NotAllowed(String),
    #[error("no capture device found: {0}")]
    NotFound(String),
    #[error("capture device busy: {0}")]
    DeviceBusy(String),
    #[error("capture not supported: {0}")]
    Unsupported(String),
    #[error("capture failed: {0}")]
    Unknown(String),
}

impl DeviceError {
    pub fn not_allowed<T: ToString>(t: T) -> Self {
        DeviceError::NotAllowed(t.to_string())
    }

    pub fn not_found<T: ToString>(t: T) -> Self {
        DeviceError::NotFound(t.to_string())
    }

    pub fn device_busy<T: ToString>(t: T) -> Self {
        DeviceError::DeviceBusy(t.to_string())
    }

    pub fn unsupported<T: ToString>(t: T) -> Self {
        DeviceError::Unsupported(t.to_string())
    }

    pub fn unknown<T: ToString>(t: T) -> Self {
        DeviceError::Unknown(t.to_string())
    }

    pub fn is_not_allowed(&self) -> bool {
        matches!(self, DeviceError::NotAllowed(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("none of the preferred formats is supported: {0:?}")]
    NoSupportedFormat(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("empty chat message")]
    Empty,
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("no capture stream, acquire the device first")]
    NoStream,
    #[error("a broadcast is already live")]
    AlreadyLive,
    #[error("no live broadcast")]
    NotLive,
    #[error("broadcast was force stopped")]
    Cancelled,
    #[error("start broadcast failed: {0}")]
    Start(ClientError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Why a stop ended without the recording reaching the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopFailure {
    NetworkError,
    ApiError,
    NoRecording,
}

impl From<&ClientError> for StopFailure {
    fn from(err: &ClientError) -> Self {
        if err.is_network() {
            StopFailure::NetworkError
        } else {
            StopFailure::ApiError
        }
    }
}

impl std::fmt::Display for StopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopFailure::NetworkError => write!(f, "network_error"),
            StopFailure::ApiError => write!(f, "api_error"),
            StopFailure::NoRecording => write!(f, "no_recording"),
        }
    }
}
