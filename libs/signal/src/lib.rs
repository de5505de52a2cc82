//! Maps OS stop signals onto broadcast stop requests: the first signal asks
//! for a graceful stop, any further signal escalates to a forced stop.

use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// Finish the recording, upload it and end the broadcast.
    Graceful,
    /// Tear down immediately without waiting for the upload.
    Forced,
}

/// Waits for a signal that requests a shutdown, like SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_signal_impl() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut signal_terminate, mut signal_interrupt) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(t), Ok(i)) => (t, i),
            _ => {
                let _ = tokio::signal::ctrl_c().await;
                return "CTRL_C";
            }
        };

    tokio::select! {
        _ = signal_terminate.recv() => "SIGTERM",
        _ = signal_interrupt.recv() => "SIGINT",
    }
}

/// Waits for a signal that requests a shutdown, Ctrl-C (SIGINT).
#[cfg(windows)]
async fn wait_for_signal_impl() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}

/// Registers signal handlers and waits for a signal that
/// indicates a shutdown request.
pub async fn wait_for_stop_signal() -> &'static str {
    wait_for_signal_impl().await
}

/// Escalation policy for successive stop signals.
#[derive(Debug, Default)]
pub struct Escalation {
    received: usize,
}

impl Escalation {
    pub fn next(&mut self) -> StopRequest {
        self.received += 1;
        if self.received == 1 {
            StopRequest::Graceful
        } else {
            StopRequest::Forced
        }
    }
}

/// Spawns a listener that forwards stop requests for every received signal.
pub fn stop_requests() -> mpsc::UnboundedReceiver<StopRequest> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut escalation = Escalation::default();
        loop {
            let name = wait_for_stop_signal().await;
            let request = escalation.next();
            warn!("Received signal {}, requesting {:?} stop", name, request);
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_signal_escalates() {
        let mut escalation = Escalation::default();
        assert_eq!(escalation.next(), StopRequest::Graceful);
        assert_eq!(escalation.next(), StopRequest::Forced);
        assert_eq!(escalation.next(), StopRequest::Forced);
    }
}
