//! Start/stop entry points of the capture service.

use super::scheduler::{CancellationToken, CaptureScheduler};
use super::worker::{CaptureWorker, SessionStatus, StatusSnapshot, WorkerMessage};
use crate::config::StillCamConfig;
use crate::errors::{CaptureError, Result};
use crate::platform::{CameraManager, ForegroundHost, NoopHost, PreviewSurface};
use crate::storage::{ImageSink, ImageWriter};
use crate::timing::{CaptureClock, SystemClock};
use crate::types::Size;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct Running {
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

/// Owns the capture worker and scheduler tasks.
///
/// `start` and `stop` are idempotent. Surface lifecycle notifications are
/// forwarded to the worker while running and ignored otherwise.
pub struct CaptureController {
    config: StillCamConfig,
    manager: Arc<dyn CameraManager>,
    surface: Arc<dyn PreviewSurface>,
    sink: Arc<dyn ImageSink>,
    host: Arc<dyn ForegroundHost>,
    clock: Arc<dyn CaptureClock>,
    status: Arc<SessionStatus>,
    running: Option<Running>,
}

impl CaptureController {
    pub fn new(
        config: StillCamConfig,
        manager: Arc<dyn CameraManager>,
        surface: Arc<dyn PreviewSurface>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            manager,
            surface,
            sink: Arc::new(ImageWriter::new()),
            host: Arc::new(NoopHost),
            clock: Arc::new(SystemClock),
            status: Arc::new(SessionStatus::new()),
            running: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ImageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn ForegroundHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn CaptureClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StillCamConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Spawn the worker and the scheduler. Must be called within a tokio
    /// runtime; a second call while running does nothing.
    pub fn start(&mut self) {
        if self.running.is_some() {
            log::debug!("Capture already running");
            return;
        }

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let worker = CaptureWorker::new(
            &self.config,
            self.manager.clone(),
            self.surface.clone(),
            self.sink.clone(),
            self.status.clone(),
            worker_tx.clone(),
            worker_rx,
        );

        let cancel = CancellationToken::new();
        let scheduler = CaptureScheduler::new(
            &self.config,
            self.clock.clone(),
            self.status.clone(),
            worker_tx.clone(),
            cancel.clone(),
        );

        self.running = Some(Running {
            worker_tx,
            cancel,
            worker: tokio::spawn(worker.run()),
            scheduler: tokio::spawn(scheduler.run()),
        });
        self.host.keep_alive(true);

        log::info!(
            "Capture started: {} camera, every {:?}, into {}",
            self.config.camera.facing,
            self.config.capture.period(),
            self.config.storage.output_dir().display()
        );
    }

    /// Cancel the scheduler, close the device and wait for both tasks.
    /// A call while stopped does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.cancel.cancel();

        let (ack_tx, ack_rx) = oneshot::channel();
        if running
            .worker_tx
            .send(WorkerMessage::Shutdown(Some(ack_tx)))
            .is_ok()
        {
            let _ = ack_rx.await;
        }

        if let Err(e) = running.scheduler.await {
            log::error!("Capture scheduler task failed: {}", e);
        }
        if let Err(e) = running.worker.await {
            log::error!("Capture worker task failed: {}", e);
        }

        self.host.keep_alive(false);
        log::info!("Capture stopped");
    }

    /// The preview surface can now be rendered into; `view` is its size.
    pub fn surface_available(&self, view: Size) -> Result<()> {
        self.post(WorkerMessage::SurfaceAvailable(view))
    }

    pub fn surface_size_changed(&self, view: Size) -> Result<()> {
        self.post(WorkerMessage::SurfaceSizeChanged(view))
    }

    /// The surface is gone: the device is closed and stays closed until the
    /// next `surface_available`.
    pub fn surface_destroyed(&self) -> Result<()> {
        self.post(WorkerMessage::SurfaceDestroyed)
    }

    fn post(&self, message: WorkerMessage) -> Result<()> {
        let running = self.running.as_ref().ok_or(CaptureError::Closed)?;
        running
            .worker_tx
            .send(message)
            .map_err(|_| CaptureError::Closed)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            let _ = running.worker_tx.send(WorkerMessage::Shutdown(None));
            self.host.keep_alive(false);
        }
    }
}
