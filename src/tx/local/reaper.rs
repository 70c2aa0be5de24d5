//! Background timeout reaper

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::observability::Event;

use super::Shared;

/// Thread that periodically rolls back transactions past their deadline.
/// Dropping the reaper also stops it, since the thread exits once its
/// stop channel disconnects.
pub(super) struct Reaper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub fn spawn(shared: Arc<Shared>, interval: Duration) -> io::Result<Self> {
        let (stop, signal) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("xatm-reaper".to_string())
            .spawn(move || {
                info!(
                    event = %Event::ReaperStarted,
                    interval_ms = interval.as_millis() as u64,
                    "timeout reaper started"
                );
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let expired = shared.expire_overdue();
                            if expired > 0 {
                                debug!(expired, "reaper rolled back expired transactions");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(event = %Event::ReaperStopped, "timeout reaper stopped");
            })?;

        Ok(Self { stop, handle })
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(self) -> Result<(), String> {
        let _ = self.stop.send(());
        self.handle
            .join()
            .map_err(|_| "timeout reaper thread panicked".to_string())
    }
}
