//! Collaborator interfaces
//!
//! The camera stack, the preview surface and the foreground host are owned by
//! the embedding platform. The capture pipeline only talks to them through
//! these traits. Device callbacks never touch pipeline state: they post
//! [`DeviceEvent`]s to the capture worker through [`DeviceCallbacks`].

use crate::capture::request::{CaptureRequest, FrameResult, RequestTag, SessionId};
use crate::capture::worker::WorkerMessage;
use crate::errors::Result;
use crate::storage::StillImage;
use crate::transform::Affine;
use crate::types::{CameraCharacteristics, DisplayMetrics, OutputFormat, Size};
use tokio::sync::mpsc;

/// Enumerates and opens camera devices.
pub trait CameraManager: Send + Sync {
    /// Device ids in enumeration order.
    fn camera_ids(&self) -> Result<Vec<String>>;

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics>;

    /// Open a device. Asynchronous device events are posted to `callbacks`
    /// until the device is closed.
    fn open_camera(&self, camera_id: &str, callbacks: DeviceCallbacks)
        -> Result<Box<dyn CameraDevice>>;
}

/// An open camera device. Calls after `close` are a programming error.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Create the output stream still images are delivered through.
    fn create_still_output(
        &mut self,
        size: Size,
        format: OutputFormat,
        max_images: usize,
    ) -> Result<Box<dyn StillOutput>>;

    /// Configure a session streaming to the preview surface (at `preview`
    /// size) and to `still`. Results are tagged with `session`.
    fn create_capture_session(
        &mut self,
        session: SessionId,
        preview: Size,
        still: &dyn StillOutput,
    ) -> Result<Box<dyn CaptureSession>>;

    fn close(&mut self) -> Result<()>;
}

/// Still-image output stream; images arrive as [`DeviceEvent::ImageAvailable`].
pub trait StillOutput: Send {
    fn size(&self) -> Size;
    fn close(&mut self) -> Result<()>;
}

/// A configured preview + still session.
pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest, tag: RequestTag) -> Result<()>;
    fn capture(&mut self, request: &CaptureRequest, tag: RequestTag) -> Result<()>;
    fn stop_repeating(&mut self) -> Result<()>;
    fn abort_captures(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Host-owned drawable the preview stream renders into.
pub trait PreviewSurface: Send + Sync {
    /// Current display rotation and size.
    fn display(&self) -> DisplayMetrics;
    fn set_default_buffer_size(&self, size: Size);
    fn set_transform(&self, transform: Affine);
}

/// Receives the request to keep this work alive in the foreground.
pub trait ForegroundHost: Send + Sync {
    fn keep_alive(&self, active: bool);
}

/// Host that ignores keep-alive requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl ForegroundHost for NoopHost {
    fn keep_alive(&self, active: bool) {
        log::debug!("keep-alive {}", if active { "requested" } else { "released" });
    }
}

/// Asynchronous notifications from an open device.
#[derive(Debug)]
pub enum DeviceEvent {
    CaptureProgressed {
        tag: RequestTag,
        result: FrameResult,
    },
    CaptureCompleted {
        tag: RequestTag,
        result: FrameResult,
    },
    CaptureFailed {
        tag: RequestTag,
        reason: String,
    },
    ImageAvailable {
        session: SessionId,
        image: StillImage,
    },
    Disconnected {
        camera_id: String,
    },
    Error {
        camera_id: String,
        code: i32,
    },
}

/// Handle given to a device at open time; posts events to the capture worker.
#[derive(Debug, Clone)]
pub struct DeviceCallbacks {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl DeviceCallbacks {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { tx }
    }

    /// Post an event. Events sent after the worker has stopped are dropped.
    pub fn post(&self, event: DeviceEvent) {
        if self.tx.send(WorkerMessage::Device(event)).is_err() {
            log::debug!("Capture worker gone, dropping device event");
        }
    }

    pub fn progressed(&self, tag: RequestTag, result: FrameResult) {
        self.post(DeviceEvent::CaptureProgressed { tag, result });
    }

    pub fn completed(&self, tag: RequestTag, result: FrameResult) {
        self.post(DeviceEvent::CaptureCompleted { tag, result });
    }

    pub fn failed(&self, tag: RequestTag, reason: impl Into<String>) {
        self.post(DeviceEvent::CaptureFailed {
            tag,
            reason: reason.into(),
        });
    }

    pub fn image_available(&self, session: SessionId, image: StillImage) {
        self.post(DeviceEvent::ImageAvailable { session, image });
    }

    pub fn disconnected(&self, camera_id: impl Into<String>) {
        self.post(DeviceEvent::Disconnected {
            camera_id: camera_id.into(),
        });
    }

    pub fn error(&self, camera_id: impl Into<String>, code: i32) {
        self.post(DeviceEvent::Error {
            camera_id: camera_id.into(),
            code,
        });
    }
}
