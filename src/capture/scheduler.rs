//! Periodic capture ticks.

use super::worker::{SessionStatus, WorkerMessage};
use crate::config::StillCamConfig;
use crate::errors::CaptureError;
use crate::timing::CaptureClock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Cooperative cancellation shared by the controller and the scheduler loop.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Only fails when the sender is gone, which `self` prevents.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// `<dir>/<millis>.<extension>`
pub fn output_path(dir: &Path, unix_millis: i64, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", unix_millis, extension))
}

pub struct CaptureScheduler {
    period: Duration,
    output_dir: PathBuf,
    extension: String,
    clock: Arc<dyn CaptureClock>,
    status: Arc<SessionStatus>,
    worker: mpsc::UnboundedSender<WorkerMessage>,
    cancel: CancellationToken,
}

impl CaptureScheduler {
    pub(crate) fn new(
        config: &StillCamConfig,
        clock: Arc<dyn CaptureClock>,
        status: Arc<SessionStatus>,
        worker: mpsc::UnboundedSender<WorkerMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            period: config.capture.period(),
            output_dir: config.storage.output_dir(),
            extension: config.storage.file_extension.clone(),
            clock,
            status,
            worker,
            cancel,
        }
    }

    pub(crate) async fn run(self) {
        log::info!("Capture scheduler started, period {:?}", self.period);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.tick().is_err() {
                log::debug!("Capture worker gone, stopping scheduler");
                break;
            }

            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = self.cancel.cancelled() => {
                    log::debug!(
                        "{}",
                        CaptureError::InterruptedWait("scheduler cancelled".to_string())
                    );
                }
            }
        }

        log::info!("Capture scheduler stopped");
    }

    /// One tick: request a capture when the device is open, a reopen when it
    /// is not. Errors only when the worker has gone away.
    fn tick(&self) -> Result<(), mpsc::error::SendError<WorkerMessage>> {
        if self.status.is_open() {
            if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
                log::error!("{}", CaptureError::write(&self.output_dir, e));
                return Ok(());
            }
            let path = output_path(&self.output_dir, self.clock.unix_millis(), &self.extension);
            self.worker.send(WorkerMessage::Capture { path })
        } else if self.status.surface_ready() && self.status.reopen_allowed() {
            log::debug!("Camera closed, requesting reopen");
            self.worker.send(WorkerMessage::EnsureOpen)
        } else {
            Ok(())
        }
    }
}
