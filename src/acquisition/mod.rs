//! QR acquisition
//!
//! Two capability sources feed the session:
//! - a live camera stream: a lazy, effectively endless run of decode
//!   attempts while a scan is active (each activation opens a fresh one)
//! - a one-shot still-image decode
//!
//! Both normalize to [`DecodeOutcome`]; "no code present" is an outcome,
//! never an error. Both are producers into the same single-consumer
//! channel of [`DecodeEvent`]s.

pub mod command;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::AccessError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use command::{CommandImageDecoder, CommandLiveScanner};

/// Result of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Text(String),
    NothingFound,
}

/// Which capability produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeSource {
    Camera,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeEvent {
    pub source: DecodeSource,
    pub outcome: DecodeOutcome,
}

impl DecodeEvent {
    pub fn camera(outcome: DecodeOutcome) -> Self {
        Self {
            source: DecodeSource::Camera,
            outcome,
        }
    }

    pub fn image(outcome: DecodeOutcome) -> Self {
        Self {
            source: DecodeSource::Image,
            outcome,
        }
    }
}

/// One-shot decode of a still image
#[async_trait]
pub trait StillImageDecoder: Send + Sync {
    async fn decode(&self, path: &Path) -> Result<DecodeOutcome, AccessError>;
}

/// Opens live decode streams
#[async_trait]
pub trait LiveScanner: Send + Sync {
    async fn open(&self) -> Result<Box<dyn LiveStream>, AccessError>;
}

/// An open capture. Dropping it releases the capture device.
#[async_trait]
pub trait LiveStream: Send {
    /// Next decode attempt, or `None` once the capture has ended
    async fn next_outcome(&mut self) -> Option<DecodeOutcome>;
}

/// A running camera producer; stops the capture when stopped or dropped
pub struct LiveScanHandle {
    task: JoinHandle<()>,
}

impl LiveScanHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LiveScanHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open a live stream and forward its outcomes into `tx` until the stream
/// ends, the receiver goes away, or the handle is stopped
pub fn spawn_live_producer(
    scanner: Arc<dyn LiveScanner>,
    tx: mpsc::Sender<DecodeEvent>,
) -> LiveScanHandle {
    let task = tokio::spawn(async move {
        let mut stream = match scanner.open().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to open live scan: {}", e);
                return;
            }
        };
        info!("Live scan started");

        while let Some(outcome) = stream.next_outcome().await {
            if tx.send(DecodeEvent::camera(outcome)).await.is_err() {
                debug!("Decode channel closed, stopping live scan");
                break;
            }
        }

        info!("Live scan stopped");
    });

    LiveScanHandle { task }
}

/// Keeps the camera producer running exactly while scanning is wanted.
///
/// Every switch into scanning opens a fresh stream; switching out of it,
/// or dropping the control, releases the capture.
pub struct LiveScanControl {
    scanner: Arc<dyn LiveScanner>,
    tx: mpsc::Sender<DecodeEvent>,
    live: Option<LiveScanHandle>,
}

impl LiveScanControl {
    pub fn new(scanner: Arc<dyn LiveScanner>, tx: mpsc::Sender<DecodeEvent>) -> Self {
        Self {
            scanner,
            tx,
            live: None,
        }
    }

    pub fn set_scanning(&mut self, scanning: bool) {
        if scanning {
            if self.live.as_ref().map_or(true, LiveScanHandle::is_finished) {
                self.live = Some(spawn_live_producer(self.scanner.clone(), self.tx.clone()));
            }
        } else if let Some(handle) = self.live.take() {
            debug!("Releasing camera");
            handle.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.live.as_ref().is_some_and(|h| !h.is_finished())
    }
}
