//! Ownership of the camera device and its streams.
//!
//! Only the capture worker holds a `DeviceSession`, so device calls are
//! serialized. The single-permit ownership lock additionally bounds how long
//! an open or close sequence may wait for another one to finish.

use super::request::{
    AePrecaptureTrigger, AeMode, AfTrigger, CaptureRequest, RequestId, RequestPurpose, RequestTag,
    SessionId,
};
use crate::config::CameraConfig;
use crate::errors::{CaptureError, Result};
use crate::platform::{
    CameraDevice, CameraManager, CaptureSession, DeviceCallbacks, PreviewSurface, StillOutput,
};
use crate::size_selector::{choose_optimal_size, largest_by_area, preview_bounds};
use crate::transform::{jpeg_orientation, preview_transform};
use crate::types::{LensFacing, OutputFormat, Size};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Maximum still images the output may hold before the pipeline drains them.
const STILL_OUTPUT_MAX_IMAGES: usize = 2;

/// Device chosen for a given facing, with its negotiated preview size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSelection {
    pub camera_id: String,
    pub preview_size: Size,
    pub sensor_orientation: u32,
    pub flash_supported: bool,
    /// Preview size fell back to the first advertised size
    pub degraded: bool,
}

/// Properties of the currently configured session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: SessionId,
    pub camera_id: String,
    pub preview_size: Size,
    pub sensor_orientation: u32,
    pub flash_supported: bool,
}

pub struct DeviceSession {
    manager: Arc<dyn CameraManager>,
    surface: Arc<dyn PreviewSurface>,
    callbacks: DeviceCallbacks,
    config: CameraConfig,
    ownership: Arc<Semaphore>,
    device: Option<Box<dyn CameraDevice>>,
    still_output: Option<Box<dyn StillOutput>>,
    session: Option<Box<dyn CaptureSession>>,
    active: Option<ActiveSession>,
    preview_request: Option<CaptureRequest>,
    next_session: u64,
    next_request: u64,
}

impl DeviceSession {
    pub fn new(
        manager: Arc<dyn CameraManager>,
        surface: Arc<dyn PreviewSurface>,
        callbacks: DeviceCallbacks,
        config: CameraConfig,
    ) -> Self {
        Self {
            manager,
            surface,
            callbacks,
            config,
            ownership: Arc::new(Semaphore::new(1)),
            device: None,
            still_output: None,
            session: None,
            active: None,
            preview_request: None,
            next_session: 0,
            next_request: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// The ownership permit is free, i.e. no open or close sequence holds it.
    pub fn permit_available(&self) -> bool {
        self.ownership.available_permits() == 1
    }

    /// Shared handle to the ownership lock.
    pub fn ownership(&self) -> Arc<Semaphore> {
        self.ownership.clone()
    }

    /// Pick the first device matching `facing` and negotiate its preview size
    /// for a view of `view` pixels.
    pub fn select_camera(&self, facing: LensFacing, view: Size) -> Result<CameraSelection> {
        let display = self.surface.display();

        for camera_id in self.manager.camera_ids()? {
            let characteristics = self.manager.characteristics(&camera_id)?;

            if let Some(actual) = characteristics.facing {
                if actual != facing {
                    continue;
                }
            }
            let Some(map) = characteristics.stream_configuration.as_ref() else {
                continue;
            };

            let still_sizes = map.output_sizes(OutputFormat::Jpeg);
            let Some(aspect) = largest_by_area(still_sizes) else {
                log::warn!("Camera {} advertises no still sizes, skipping", camera_id);
                continue;
            };

            let (view, bound) = preview_bounds(
                view,
                display,
                characteristics.sensor_orientation,
                self.config.max_preview_size(),
            );
            let preview_sizes = map.output_sizes(OutputFormat::PreviewSurface);
            let Some(selection) = choose_optimal_size(preview_sizes, view, bound, aspect) else {
                log::warn!("Camera {} advertises no preview sizes, skipping", camera_id);
                continue;
            };

            return Ok(CameraSelection {
                camera_id,
                preview_size: selection.size,
                sensor_orientation: characteristics.sensor_orientation,
                flash_supported: characteristics.flash_available.unwrap_or(false),
                degraded: selection.degraded,
            });
        }

        Err(CaptureError::NoMatchingDevice(facing.to_string()))
    }

    fn acquire_permit(&self) -> impl Future<Output = Result<OwnedSemaphorePermit>> + Send {
        acquire_ownership(self.ownership.clone(), self.config.lock_timeout())
    }

    /// Open the device matching `facing` and start the preview. A no-op when
    /// already open.
    pub async fn open(&mut self, facing: LensFacing, view: Size) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let selection = self.select_camera(facing, view)?;
        if selection.degraded {
            log::warn!(
                "Preview size for camera {} is a fallback: {}",
                selection.camera_id,
                selection.preview_size
            );
        }

        let _permit = self.acquire_permit().await?;

        log::info!(
            "Opening camera {} (preview {}, output {})",
            selection.camera_id,
            selection.preview_size,
            self.config.output_size()
        );
        let device = self
            .manager
            .open_camera(&selection.camera_id, self.callbacks.clone())?;
        self.device = Some(device);

        if let Err(e) = self.configure(&selection, view) {
            log::error!("Failed to configure camera {}: {}", selection.camera_id, e);
            self.release_resources();
            return Err(e);
        }
        Ok(())
    }

    fn configure(&mut self, selection: &CameraSelection, view: Size) -> Result<()> {
        let device = self.device.as_mut().ok_or(CaptureError::Closed)?;

        self.surface.set_default_buffer_size(selection.preview_size);
        let display = self.surface.display();
        self.surface.set_transform(preview_transform(
            view,
            selection.preview_size,
            display.rotation,
        ));

        let still = device.create_still_output(
            self.config.output_size(),
            OutputFormat::Jpeg,
            STILL_OUTPUT_MAX_IMAGES,
        )?;

        self.next_session += 1;
        let id = SessionId(self.next_session);
        let session = device.create_capture_session(id, selection.preview_size, still.as_ref());
        self.still_output = Some(still);
        let session = session?;
        self.session = Some(session);

        self.active = Some(ActiveSession {
            id,
            camera_id: selection.camera_id.clone(),
            preview_size: selection.preview_size,
            sensor_orientation: selection.sensor_orientation,
            flash_supported: selection.flash_supported,
        });

        let preview = CaptureRequest::preview(self.ae_mode());
        self.preview_request = Some(preview.clone());
        self.submit(RequestPurpose::Preview, &preview, true)?;

        log::info!("Camera {} configured as {}", selection.camera_id, id);
        Ok(())
    }

    /// Reapply the preview transform after the view changed size.
    pub fn apply_transform(&self, view: Size) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let display = self.surface.display();
        self.surface
            .set_transform(preview_transform(view, active.preview_size, display.rotation));
    }

    fn ae_mode(&self) -> AeMode {
        let flash = self.active.as_ref().map_or(false, |a| a.flash_supported);
        if flash && self.config.auto_flash {
            AeMode::OnAutoFlash
        } else {
            AeMode::On
        }
    }

    fn submit(
        &mut self,
        purpose: RequestPurpose,
        request: &CaptureRequest,
        repeating: bool,
    ) -> Result<RequestTag> {
        let active_id = self.session_id().ok_or(CaptureError::Closed)?;
        let session = self.session.as_mut().ok_or(CaptureError::Closed)?;

        self.next_request += 1;
        let tag = RequestTag {
            session: active_id,
            request: RequestId(self.next_request),
            purpose,
        };

        if repeating {
            session.set_repeating_request(request, tag)?;
        } else {
            session.capture(request, tag)?;
        }
        Ok(tag)
    }

    fn preview_request(&self) -> Result<CaptureRequest> {
        self.preview_request.clone().ok_or(CaptureError::Closed)
    }

    /// Submit the autofocus trigger on top of the preview request.
    pub fn lock_focus(&mut self) -> Result<RequestTag> {
        let request = self.preview_request()?.with_af_trigger(AfTrigger::Start);
        self.submit(RequestPurpose::FocusLock, &request, false)
    }

    /// Submit the exposure precapture trigger on top of the preview request.
    pub fn run_precapture(&mut self) -> Result<RequestTag> {
        let request = self
            .preview_request()?
            .with_precapture_trigger(AePrecaptureTrigger::Start);
        self.submit(RequestPurpose::Precapture, &request, false)
    }

    /// Stop the preview and request the still frame, oriented for the
    /// current display rotation.
    pub fn capture_still(&mut self) -> Result<RequestTag> {
        let sensor = self
            .active
            .as_ref()
            .map(|a| a.sensor_orientation)
            .ok_or(CaptureError::Closed)?;
        let rotation = self.surface.display().rotation;
        let orientation = jpeg_orientation(&self.config.rotation_table, rotation, sensor);
        let request = CaptureRequest::still(self.ae_mode(), orientation);

        {
            let session = self.session.as_mut().ok_or(CaptureError::Closed)?;
            session.stop_repeating()?;
            session.abort_captures()?;
        }
        log::debug!("Requesting still capture, orientation {}", orientation);
        self.submit(RequestPurpose::StillCapture, &request, false)
    }

    /// Cancel the focus trigger and resume the repeating preview.
    pub fn unlock_focus(&mut self) -> Result<()> {
        let preview = self.preview_request()?;
        let cancel = preview.clone().with_af_trigger(AfTrigger::Cancel);
        self.submit(RequestPurpose::FocusUnlock, &cancel, false)?;
        self.submit(RequestPurpose::Preview, &preview, true)?;
        Ok(())
    }

    /// Release the still output, the capture session and the device, in that
    /// order. Idempotent; safe without a prior `open`.
    pub async fn close(&mut self) {
        let permit = match self.acquire_permit().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                log::warn!("Closing camera without the ownership lock: {}", e);
                None
            }
        };

        self.release_resources();
        drop(permit);
    }

    fn release_resources(&mut self) {
        let had_device = self.device.is_some();

        if let Some(mut still) = self.still_output.take() {
            if let Err(e) = still.close() {
                log::warn!("Failed to close still output: {}", e);
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                log::warn!("Failed to close capture session: {}", e);
            }
        }
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.close() {
                log::warn!("Failed to close camera {}: {}", device.id(), e);
            }
        }

        self.active = None;
        self.preview_request = None;

        if had_device {
            log::info!("Camera closed");
        }
    }
}

/// Wait at most `timeout` for the single ownership permit.
async fn acquire_ownership(
    ownership: Arc<Semaphore>,
    timeout: Duration,
) -> Result<OwnedSemaphorePermit> {
    match tokio::time::timeout(timeout, ownership.acquire_owned()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(_)) => Err(CaptureError::Closed),
        Err(_) => Err(CaptureError::AcquisitionTimeout(timeout.as_millis() as u64)),
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.is_open() {
            self.release_resources();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::worker::WorkerMessage;
    use crate::config::StillCamConfig;
    use crate::testing::{MockCameraManager, MockDeviceSpec, MockPreviewSurface, MockStats};
    use tokio::sync::mpsc;

    struct Fixture {
        manager: Arc<MockCameraManager>,
        surface: Arc<MockPreviewSurface>,
        session: DeviceSession,
        _rx: mpsc::UnboundedReceiver<WorkerMessage>,
    }

    fn fixture(devices: Vec<MockDeviceSpec>, config: CameraConfig) -> Fixture {
        let manager = Arc::new(MockCameraManager::new(devices));
        let surface = Arc::new(MockPreviewSurface::portrait());
        let (tx, rx) = mpsc::unbounded_channel();
        let session = DeviceSession::new(
            manager.clone(),
            surface.clone(),
            DeviceCallbacks::new(tx),
            config,
        );
        Fixture {
            manager,
            surface,
            session,
            _rx: rx,
        }
    }

    fn front_fixture() -> Fixture {
        fixture(
            vec![MockDeviceSpec::back("0"), MockDeviceSpec::front("1")],
            StillCamConfig::default().camera,
        )
    }

    const VIEW: Size = Size::new(480, 680);

    #[tokio::test]
    async fn test_close_without_open_keeps_permit() {
        let mut f = front_fixture();
        f.session.close().await;
        f.session.close().await;
        assert!(f.session.permit_available());
        assert_eq!(MockStats::get(&f.manager.stats().devices_closed), 0);
    }

    #[test]
    fn test_front_preview_matches_still_aspect() {
        let f = front_fixture();
        let selection = f.session.select_camera(LensFacing::Front, VIEW).unwrap();
        assert_eq!(selection.camera_id, "1");
        assert_eq!(selection.preview_size, Size::new(480, 680));
        assert_eq!(selection.sensor_orientation, 270);
        assert!(!selection.degraded);
    }

    #[tokio::test]
    async fn test_open_configures_streams() {
        let mut f = front_fixture();
        assert!(!f.session.select_camera(LensFacing::Front, VIEW).unwrap().degraded);
        f.session.open(LensFacing::Front, VIEW).await.unwrap();

        assert!(f.session.is_open());
        assert!(f.session.permit_available());
        let active = f.session.active().unwrap();
        assert_eq!(active.camera_id, "1");
        assert_eq!(active.preview_size, Size::new(480, 680));
        assert_eq!(f.surface.buffer_size(), Some(Size::new(480, 680)));
        assert!(f.surface.transform().is_some());

        let stats = f.manager.stats();
        assert_eq!(MockStats::get(&stats.outputs_created), 1);
        assert_eq!(MockStats::get(&stats.sessions_created), 1);
        assert_eq!(MockStats::get(&stats.repeating_requests), 1);
    }

    #[tokio::test]
    async fn test_double_close_releases_once() {
        let mut f = front_fixture();
        f.session.open(LensFacing::Front, VIEW).await.unwrap();
        f.session.close().await;
        f.session.close().await;

        let stats = f.manager.stats();
        assert!(!f.session.is_open());
        assert!(f.session.permit_available());
        assert_eq!(MockStats::get(&stats.outputs_closed), 1);
        assert_eq!(MockStats::get(&stats.sessions_closed), 1);
        assert_eq!(MockStats::get(&stats.devices_closed), 1);
    }

    #[tokio::test]
    async fn test_open_times_out_while_permit_held() {
        let mut config = StillCamConfig::default().camera;
        config.lock_timeout_ms = 30;
        let mut f = fixture(vec![MockDeviceSpec::front("1")], config);

        let held = f.session.ownership().try_acquire_owned().unwrap();
        let err = f.session.open(LensFacing::Front, VIEW).await.unwrap_err();
        assert_eq!(err, CaptureError::AcquisitionTimeout(30));
        assert_eq!(MockStats::get(&f.manager.stats().devices_opened), 0);

        // Close proceeds without the lock rather than hanging.
        f.session.close().await;
        drop(held);
        assert!(f.session.permit_available());
    }

    #[tokio::test]
    async fn test_no_matching_facing() {
        let mut f = fixture(
            vec![MockDeviceSpec::front("1")],
            StillCamConfig::default().camera,
        );
        let err = f.session.open(LensFacing::Back, VIEW).await.unwrap_err();
        assert!(matches!(err, CaptureError::NoMatchingDevice(_)));
        assert!(f.session.permit_available());
    }

    #[test]
    fn test_unknown_facing_accepted_and_unconfigured_skipped() {
        let f = fixture(
            vec![
                MockDeviceSpec::front("0").without_stream_configuration(),
                MockDeviceSpec::back("1").with_facing(None),
            ],
            StillCamConfig::default().camera,
        );
        let selection = f.session.select_camera(LensFacing::Front, VIEW).unwrap();
        assert_eq!(selection.camera_id, "1");
        assert!(selection.flash_supported);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_session_closed() {
        let mut f = front_fixture();
        f.manager.fail_next_open();
        let err = f.session.open(LensFacing::Front, VIEW).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceAccess(_)));
        assert!(!f.session.is_open());
        assert!(f.session.permit_available());

        f.session.open(LensFacing::Front, VIEW).await.unwrap();
        assert!(f.session.is_open());
    }

    #[tokio::test]
    async fn test_still_request_orientation() {
        let mut f = front_fixture();
        f.session.open(LensFacing::Front, VIEW).await.unwrap();

        let tag = f.session.capture_still().unwrap();
        assert_eq!(tag.purpose, RequestPurpose::StillCapture);
        assert_eq!(Some(tag.session), f.session.session_id());
        // Natural orientation, sensor mounted at 270 degrees.
        assert_eq!(f.manager.stats().last_orientation(), Some(270));

        f.surface.set_rotation(crate::types::Rotation::Rotation90);
        f.session.capture_still().unwrap();
        assert_eq!(f.manager.stats().last_orientation(), Some(180));
    }

    #[tokio::test]
    async fn test_still_request_tolerates_unnormalized_sensor_orientation() {
        let mut f = fixture(
            vec![MockDeviceSpec::back("0").with_sensor_orientation(u32::MAX - 89)],
            StillCamConfig::default().camera,
        );
        f.session.open(LensFacing::Back, VIEW).await.unwrap();
        f.session.capture_still().unwrap();
        let orientation = f.manager.stats().last_orientation().unwrap();
        assert!(orientation < 360);

        // 450 degrees is the same mount as 90.
        let mut f = fixture(
            vec![MockDeviceSpec::back("0").with_sensor_orientation(450)],
            StillCamConfig::default().camera,
        );
        f.session.open(LensFacing::Back, VIEW).await.unwrap();
        f.session.capture_still().unwrap();
        assert_eq!(f.manager.stats().last_orientation(), Some(90));
    }

    #[tokio::test]
    async fn test_reopen_starts_new_session_generation() {
        let mut f = front_fixture();
        f.session.open(LensFacing::Front, VIEW).await.unwrap();
        let first = f.session.session_id().unwrap();
        f.session.close().await;
        assert_eq!(f.session.session_id(), None);

        f.session.open(LensFacing::Front, VIEW).await.unwrap();
        assert!(f.session.session_id().unwrap() > first);
    }

    #[tokio::test]
    async fn test_submissions_fail_when_closed() {
        let mut f = front_fixture();
        assert_eq!(f.session.lock_focus().unwrap_err(), CaptureError::Closed);
        assert_eq!(f.session.capture_still().unwrap_err(), CaptureError::Closed);
        assert_eq!(f.session.unlock_focus().unwrap_err(), CaptureError::Closed);
    }
}
