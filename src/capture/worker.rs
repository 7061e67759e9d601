//! The serialized capture context.
//!
//! Every device call and every device callback is handled here, one message at
//! a time, in the order messages were posted. Nothing else mutates the device
//! session or the focus/exposure state machine.

use super::device_session::DeviceSession;
use super::request::{RequestId, RequestPurpose, SessionId};
use super::state_machine::{Action, FocusExposureStateMachine};
use crate::config::StillCamConfig;
use crate::errors::CaptureError;
use crate::platform::{CameraManager, DeviceCallbacks, DeviceEvent, PreviewSurface};
use crate::storage::{ImageBuffer, ImageSink, StillImage};
use crate::types::{LensFacing, Size};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Messages processed by the capture worker.
#[derive(Debug)]
pub enum WorkerMessage {
    /// The preview surface became available with the given view size.
    SurfaceAvailable(Size),
    SurfaceSizeChanged(Size),
    SurfaceDestroyed,
    /// Open the device if it is closed and a surface is known.
    EnsureOpen,
    /// Begin one capture cycle writing to `path`.
    Capture { path: PathBuf },
    Device(DeviceEvent),
    /// Close the device and exit; the sender is notified once closed.
    Shutdown(Option<oneshot::Sender<()>>),
}

/// Flags and counters shared between the worker, the scheduler and the
/// controller. Written only by the worker.
#[derive(Debug, Default)]
pub struct SessionStatus {
    open: AtomicBool,
    surface_ready: AtomicBool,
    reopen_allowed: AtomicBool,
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_abandoned: AtomicU64,
    images_dispatched: AtomicU64,
}

/// Point-in-time copy of [`SessionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub open: bool,
    pub surface_ready: bool,
    pub reopen_allowed: bool,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_abandoned: u64,
    pub images_dispatched: u64,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn surface_ready(&self) -> bool {
        self.surface_ready.load(Ordering::SeqCst)
    }

    pub fn reopen_allowed(&self) -> bool {
        self.reopen_allowed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            open: self.is_open(),
            surface_ready: self.surface_ready(),
            reopen_allowed: self.reopen_allowed(),
            cycles_started: self.cycles_started.load(Ordering::SeqCst),
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            cycles_abandoned: self.cycles_abandoned.load(Ordering::SeqCst),
            images_dispatched: self.images_dispatched.load(Ordering::SeqCst),
        }
    }

    fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    fn set_surface_ready(&self, ready: bool) {
        self.surface_ready.store(ready, Ordering::SeqCst);
    }

    fn set_reopen_allowed(&self, allowed: bool) {
        self.reopen_allowed.store(allowed, Ordering::SeqCst);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A cycle between `begin_capture` and the still completion.
#[derive(Debug)]
struct CycleInProgress {
    /// Destination of the image; taken when the image arrives.
    path: Option<PathBuf>,
    started: Instant,
}

pub(crate) struct CaptureWorker {
    device: DeviceSession,
    machine: FocusExposureStateMachine,
    facing: LensFacing,
    cycle_timeout: Duration,
    cycle: Option<CycleInProgress>,
    /// Destination left over by a cycle that completed before its image arrived.
    pending_image: Option<PathBuf>,
    view: Option<Size>,
    sink: Arc<dyn ImageSink>,
    status: Arc<SessionStatus>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl CaptureWorker {
    pub(crate) fn new(
        config: &StillCamConfig,
        manager: Arc<dyn CameraManager>,
        surface: Arc<dyn PreviewSurface>,
        sink: Arc<dyn ImageSink>,
        status: Arc<SessionStatus>,
        tx: mpsc::UnboundedSender<WorkerMessage>,
        rx: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Self {
        let device = DeviceSession::new(
            manager,
            surface,
            DeviceCallbacks::new(tx),
            config.camera.clone(),
        );
        Self {
            device,
            machine: FocusExposureStateMachine::new(),
            facing: config.camera.facing,
            cycle_timeout: config.capture.cycle_timeout(),
            cycle: None,
            pending_image: None,
            view: None,
            sink,
            status,
            rx,
        }
    }

    pub(crate) async fn run(mut self) {
        log::debug!("Capture worker started");

        while let Some(message) = self.rx.recv().await {
            match message {
                WorkerMessage::SurfaceAvailable(view) => self.on_surface_available(view).await,
                WorkerMessage::SurfaceSizeChanged(view) => {
                    self.view = Some(view);
                    self.device.apply_transform(view);
                }
                WorkerMessage::SurfaceDestroyed => self.on_surface_destroyed().await,
                WorkerMessage::EnsureOpen => self.ensure_open().await,
                WorkerMessage::Capture { path } => self.begin_cycle(path).await,
                WorkerMessage::Device(event) => self.on_device_event(event).await,
                WorkerMessage::Shutdown(ack) => {
                    self.shut_down().await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    return;
                }
            }
            self.status.set_open(self.device.is_open());
        }

        self.shut_down().await;
    }

    async fn shut_down(&mut self) {
        self.drop_cycle();
        self.device.close().await;
        self.status.set_open(false);
        log::debug!("Capture worker stopped");
    }

    async fn on_surface_available(&mut self, view: Size) {
        log::debug!("Preview surface available at {}", view);
        self.view = Some(view);
        self.status.set_surface_ready(true);
        self.status.set_reopen_allowed(true);
        self.ensure_open().await;
    }

    async fn on_surface_destroyed(&mut self) {
        log::info!("Preview surface destroyed, closing camera");
        self.view = None;
        self.status.set_surface_ready(false);
        self.abandon_cycle_silently();
        self.device.close().await;
    }

    async fn ensure_open(&mut self) {
        if self.device.is_open() {
            return;
        }
        let Some(view) = self.view else {
            log::debug!("No preview surface yet, not opening");
            return;
        };
        if !self.status.reopen_allowed() {
            return;
        }

        if let Err(e) = self.device.open(self.facing, view).await {
            if e.is_retryable() {
                log::warn!("Failed to open camera: {}", e);
            } else {
                log::error!("{}; waiting for the surface to be re-announced", e);
                self.status.set_reopen_allowed(false);
            }
        }
        self.status.set_open(self.device.is_open());
    }

    async fn begin_cycle(&mut self, path: PathBuf) {
        if !self.device.is_open() {
            log::debug!("Camera closed, skipping tick");
            return;
        }

        if let Some(elapsed) = self.cycle.as_ref().map(|c| c.started.elapsed()) {
            if elapsed < self.cycle_timeout {
                log::debug!("Capture cycle in progress, skipping tick");
                return;
            }
            log::warn!(
                "Capture cycle stuck in {:?} for {:?}, abandoning",
                self.machine.state(),
                elapsed
            );
            self.abandon_cycle().await;
        }

        let Some(action) = self.machine.begin_capture() else {
            return;
        };

        log::debug!("Starting capture cycle for {}", path.display());
        self.cycle = Some(CycleInProgress {
            path: Some(path),
            started: Instant::now(),
        });
        SessionStatus::bump(&self.status.cycles_started);
        self.perform(action).await;
    }

    async fn perform(&mut self, action: Action) {
        let outcome = match action {
            Action::LockFocus => self
                .device
                .lock_focus()
                .map(|tag| self.machine.trigger_submitted(tag.request)),
            Action::RunPrecapture => self
                .device
                .run_precapture()
                .map(|tag| self.machine.trigger_submitted(tag.request)),
            Action::CaptureStill => match self.device.capture_still() {
                Ok(tag) => {
                    self.machine.still_submitted(tag.request);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Action::UnlockFocus => self.device.unlock_focus(),
        };

        if let Err(e) = outcome {
            log::error!("{:?} failed: {}", action, e);
            self.abandon_cycle_silently();
            if matches!(e, CaptureError::DeviceAccess(_)) {
                // Reopened on the next tick.
                self.device.close().await;
            }
        }
    }

    async fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::CaptureProgressed { tag, result } => {
                if self.is_live(tag.session) {
                    if let Some(action) = self.machine.on_result(&result) {
                        self.perform(action).await;
                    }
                }
            }
            DeviceEvent::CaptureCompleted { tag, result } => {
                if !self.is_live(tag.session) {
                    return;
                }
                if tag.purpose == RequestPurpose::StillCapture {
                    self.on_still_finished(tag.request).await;
                } else if let Some(action) = self.machine.on_result(&result) {
                    self.perform(action).await;
                }
            }
            DeviceEvent::CaptureFailed { tag, reason } => {
                if !self.is_live(tag.session) {
                    return;
                }
                match tag.purpose {
                    RequestPurpose::StillCapture => {
                        log::warn!("Still capture failed: {}", reason);
                        self.on_still_finished(tag.request).await;
                    }
                    RequestPurpose::FocusLock | RequestPurpose::Precapture => {
                        if self.machine.on_trigger_failed(tag.request) {
                            log::warn!(
                                "{:?} request failed: {}, abandoning cycle",
                                tag.purpose,
                                reason
                            );
                            self.abandon_cycle().await;
                        } else {
                            log::debug!("{:?} request failed: {}", tag.purpose, reason);
                        }
                    }
                    RequestPurpose::Preview | RequestPurpose::FocusUnlock => {
                        log::debug!("{:?} request failed: {}", tag.purpose, reason);
                    }
                }
            }
            DeviceEvent::ImageAvailable { session, image } => {
                if self.is_live(session) {
                    self.dispatch_image(image);
                }
            }
            DeviceEvent::Disconnected { camera_id } => {
                log::warn!("Camera {} disconnected", camera_id);
                self.abandon_cycle_silently();
                self.device.close().await;
            }
            DeviceEvent::Error { camera_id, code } => {
                log::error!("Camera {} reported error {}", camera_id, code);
                self.abandon_cycle_silently();
                self.device.close().await;
            }
        }
    }

    fn is_live(&self, session: SessionId) -> bool {
        let live = self.device.session_id() == Some(session);
        if !live {
            log::debug!("Dropping result from stale {}", session);
        }
        live
    }

    async fn on_still_finished(&mut self, request: RequestId) {
        let Some(action) = self.machine.on_still_completed(request) else {
            return;
        };

        if let Some(mut cycle) = self.cycle.take() {
            if let Some(path) = cycle.path.take() {
                self.pending_image = Some(path);
            }
            log::info!("Capture cycle finished in {:?}", cycle.started.elapsed());
        }
        SessionStatus::bump(&self.status.cycles_completed);
        self.perform(action).await;
    }

    fn dispatch_image(&mut self, image: StillImage) {
        // An image arriving while no still is outstanding belongs to a cycle
        // that was abandoned; it must not take the current cycle's path.
        let path = if self.machine.still_outstanding() {
            self.cycle.as_mut().and_then(|cycle| cycle.path.take())
        } else {
            self.pending_image.take()
        };

        match path {
            Some(path) => {
                log::debug!("Handing {} bytes to the writer", image.len());
                self.sink.persist(ImageBuffer::new(image, path));
                SessionStatus::bump(&self.status.images_dispatched);
            }
            None => log::warn!("Image arrived with no capture cycle, dropping it"),
        }
    }

    /// Reset the machine and resume the repeating preview.
    async fn abandon_cycle(&mut self) {
        let resume = !self.machine.is_idle();
        self.abandon_cycle_silently();
        if resume && self.device.is_open() {
            self.perform(Action::UnlockFocus).await;
        }
    }

    /// Reset the machine without touching the device.
    fn abandon_cycle_silently(&mut self) {
        if self.cycle.is_some() || !self.machine.is_idle() {
            SessionStatus::bump(&self.status.cycles_abandoned);
        }
        self.drop_cycle();
    }

    fn drop_cycle(&mut self) {
        self.machine.reset();
        self.cycle = None;
        self.pending_image = None;
    }
}
