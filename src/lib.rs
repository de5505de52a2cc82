pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod live;
pub mod log;
pub mod recorder;
pub mod result;

pub use config::Config;
pub use error::{ChatError, DeviceError, LiveError, RecorderError, StopFailure};
pub use live::{
    BroadcastOptions, BroadcastSession, BroadcastState, Broadcaster, StartBroadcast, StopOptions,
    StopReport,
};
