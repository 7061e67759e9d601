//! Scripted in-memory camera stack
//!
//! Implements the platform traits without hardware. Focus-lock and precapture
//! requests answer with scripted result batches; still requests answer with a
//! real JPEG payload encoded by the `image` crate. Every device call is
//! counted in [`MockStats`] so tests can assert on resource handling.

use crate::capture::request::{
    AeState, AfState, CaptureRequest, FrameResult, RequestPurpose, RequestTag, SessionId,
};
use crate::errors::{CaptureError, Result};
use crate::platform::{
    CameraDevice, CameraManager, CaptureSession, DeviceCallbacks, ForegroundHost, PreviewSurface,
    StillOutput,
};
use crate::storage::{ImageBuffer, ImageSink, StillImage};
use crate::transform::Affine;
use crate::types::{
    CameraCharacteristics, DisplayMetrics, LensFacing, OutputFormat, Rotation,
    StreamConfigurationMap, Size,
};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Encode a gradient test pattern as JPEG.
pub fn synthetic_jpeg(size: Size, seed: u8) -> Result<Vec<u8>> {
    let pattern = RgbImage::from_fn(size.width, size.height, |x, y| {
        Rgb([
            seed.wrapping_add((x % 256) as u8),
            seed.wrapping_add((y % 256) as u8),
            seed.wrapping_add(((x + y) % 256) as u8),
        ])
    });

    let mut data = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut data, 85);
    pattern
        .write_with_encoder(encoder)
        .map_err(|e| CaptureError::device_access(format!("JPEG encoding failed: {}", e)))?;
    Ok(data)
}

/// One enumerable device.
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub id: String,
    pub characteristics: CameraCharacteristics,
}

impl MockDeviceSpec {
    /// Portrait-mounted front camera. Previews at 480x680 or 960x1280; the
    /// largest still size, 960x1360, has the 480:680 aspect.
    pub fn front(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            characteristics: CameraCharacteristics {
                facing: Some(LensFacing::Front),
                sensor_orientation: 270,
                stream_configuration: Some(
                    StreamConfigurationMap::new()
                        .with_sizes(
                            OutputFormat::Jpeg,
                            vec![Size::new(480, 680), Size::new(960, 1360)],
                        )
                        .with_sizes(
                            OutputFormat::PreviewSurface,
                            vec![Size::new(480, 680), Size::new(960, 1280)],
                        ),
                ),
                flash_available: Some(false),
            },
        }
    }

    /// Landscape back camera with a flash.
    pub fn back(id: impl Into<String>) -> Self {
        let sizes = vec![Size::new(640, 480), Size::new(1280, 960), Size::new(1920, 1440)];
        Self {
            id: id.into(),
            characteristics: CameraCharacteristics {
                facing: Some(LensFacing::Back),
                sensor_orientation: 90,
                stream_configuration: Some(
                    StreamConfigurationMap::new()
                        .with_sizes(OutputFormat::Jpeg, sizes.clone())
                        .with_sizes(OutputFormat::PreviewSurface, sizes),
                ),
                flash_available: Some(true),
            },
        }
    }

    pub fn with_facing(mut self, facing: Option<LensFacing>) -> Self {
        self.characteristics.facing = facing;
        self
    }

    pub fn with_sensor_orientation(mut self, degrees: u32) -> Self {
        self.characteristics.sensor_orientation = degrees;
        self
    }

    pub fn without_stream_configuration(mut self) -> Self {
        self.characteristics.stream_configuration = None;
        self
    }
}

/// Call counters for everything the pipeline does to the mock.
#[derive(Debug, Default)]
pub struct MockStats {
    pub devices_opened: AtomicUsize,
    pub devices_closed: AtomicUsize,
    pub outputs_created: AtomicUsize,
    pub outputs_closed: AtomicUsize,
    pub sessions_created: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub repeating_requests: AtomicUsize,
    pub focus_triggers: AtomicUsize,
    pub focus_cancels: AtomicUsize,
    pub precapture_triggers: AtomicUsize,
    pub still_captures: AtomicUsize,
    pub images_released: AtomicUsize,
    last_orientation: Mutex<Option<u32>>,
    last_still_request: Mutex<Option<CaptureRequest>>,
}

impl MockStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// JPEG orientation carried by the most recent still request.
    pub fn last_orientation(&self) -> Option<u32> {
        *self.last_orientation.lock().expect("mock stats poisoned")
    }

    pub fn last_still_request(&self) -> Option<CaptureRequest> {
        self.last_still_request
            .lock()
            .expect("mock stats poisoned")
            .clone()
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted answer to one focus-lock or precapture trigger.
struct ScriptedReply {
    results: Vec<FrameResult>,
    /// The trigger fails after its results were reported
    fail: bool,
}

struct MockShared {
    devices: Vec<MockDeviceSpec>,
    script: Mutex<VecDeque<ScriptedReply>>,
    hold_triggers: AtomicBool,
    fail_next_open: AtomicBool,
    fail_next_still: AtomicBool,
    current: Mutex<Option<(String, DeviceCallbacks)>>,
    stats: MockStats,
}

impl MockShared {
    fn next_reply(&self) -> ScriptedReply {
        self.script
            .lock()
            .expect("mock script poisoned")
            .pop_front()
            .unwrap_or_else(|| ScriptedReply {
                results: vec![FrameResult::new(
                    Some(AfState::FocusedLocked),
                    Some(AeState::Converged),
                )],
                fail: false,
            })
    }

    fn push(&self, reply: ScriptedReply) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(reply);
    }
}

/// In-memory [`CameraManager`].
#[derive(Clone)]
pub struct MockCameraManager {
    shared: Arc<MockShared>,
}

impl MockCameraManager {
    pub fn new(devices: Vec<MockDeviceSpec>) -> Self {
        Self {
            shared: Arc::new(MockShared {
                devices,
                script: Mutex::new(VecDeque::new()),
                hold_triggers: AtomicBool::new(false),
                fail_next_open: AtomicBool::new(false),
                fail_next_still: AtomicBool::new(false),
                current: Mutex::new(None),
                stats: MockStats::default(),
            }),
        }
    }

    /// Results answered to the next focus-lock or precapture request, in
    /// order. Without a script every trigger reports focus locked and
    /// exposure converged.
    pub fn push_results(&self, batch: Vec<FrameResult>) {
        self.shared.push(ScriptedReply {
            results: batch,
            fail: false,
        });
    }

    /// Like [`push_results`](Self::push_results), but the trigger then fails
    /// instead of completing.
    pub fn push_failure(&self, batch: Vec<FrameResult>) {
        self.shared.push(ScriptedReply {
            results: batch,
            fail: true,
        });
    }

    /// Report every trigger result as partial and keep the trigger in flight
    /// until `abort_captures` fails it, the way hardware pipelines do.
    pub fn hold_triggers_until_abort(&self) {
        self.shared.hold_triggers.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_still(&self) {
        self.shared.fail_next_still.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &MockStats {
        &self.shared.stats
    }

    /// Callbacks of the currently open device.
    pub fn callbacks(&self) -> Option<DeviceCallbacks> {
        self.shared
            .current
            .lock()
            .expect("mock device poisoned")
            .as_ref()
            .map(|(_, callbacks)| callbacks.clone())
    }

    /// Simulate the open device going away. Returns false when none is open.
    pub fn disconnect(&self) -> bool {
        let current = self
            .shared
            .current
            .lock()
            .expect("mock device poisoned")
            .clone();
        match current {
            Some((id, callbacks)) => {
                callbacks.disconnected(id);
                true
            }
            None => false,
        }
    }
}

impl CameraManager for MockCameraManager {
    fn camera_ids(&self) -> Result<Vec<String>> {
        Ok(self.shared.devices.iter().map(|d| d.id.clone()).collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics> {
        self.shared
            .devices
            .iter()
            .find(|d| d.id == camera_id)
            .map(|d| d.characteristics.clone())
            .ok_or_else(|| CaptureError::device_access(format!("unknown camera {}", camera_id)))
    }

    fn open_camera(
        &self,
        camera_id: &str,
        callbacks: DeviceCallbacks,
    ) -> Result<Box<dyn CameraDevice>> {
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::device_access(format!(
                "camera {} is in use",
                camera_id
            )));
        }

        MockStats::bump(&self.shared.stats.devices_opened);
        *self.shared.current.lock().expect("mock device poisoned") =
            Some((camera_id.to_string(), callbacks.clone()));

        Ok(Box::new(MockDevice {
            id: camera_id.to_string(),
            callbacks,
            shared: self.shared.clone(),
        }))
    }
}

struct MockDevice {
    id: String,
    callbacks: DeviceCallbacks,
    shared: Arc<MockShared>,
}

impl CameraDevice for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_still_output(
        &mut self,
        size: Size,
        format: OutputFormat,
        max_images: usize,
    ) -> Result<Box<dyn StillOutput>> {
        if format != OutputFormat::Jpeg || max_images == 0 {
            return Err(CaptureError::device_access("unsupported still output"));
        }
        MockStats::bump(&self.shared.stats.outputs_created);
        Ok(Box::new(MockStillOutput {
            size,
            shared: self.shared.clone(),
        }))
    }

    fn create_capture_session(
        &mut self,
        session: SessionId,
        _preview: Size,
        still: &dyn StillOutput,
    ) -> Result<Box<dyn CaptureSession>> {
        MockStats::bump(&self.shared.stats.sessions_created);
        Ok(Box::new(MockCaptureSession {
            session,
            still_size: still.size(),
            callbacks: self.callbacks.clone(),
            shared: self.shared.clone(),
            in_flight: Vec::new(),
            frames: 0,
        }))
    }

    fn close(&mut self) -> Result<()> {
        MockStats::bump(&self.shared.stats.devices_closed);
        let mut current = self.shared.current.lock().expect("mock device poisoned");
        if current.as_ref().map_or(false, |(id, _)| id == &self.id) {
            *current = None;
        }
        Ok(())
    }
}

struct MockStillOutput {
    size: Size,
    shared: Arc<MockShared>,
}

impl StillOutput for MockStillOutput {
    fn size(&self) -> Size {
        self.size
    }

    fn close(&mut self) -> Result<()> {
        MockStats::bump(&self.shared.stats.outputs_closed);
        Ok(())
    }
}

struct MockCaptureSession {
    session: SessionId,
    still_size: Size,
    callbacks: DeviceCallbacks,
    shared: Arc<MockShared>,
    /// Triggers held until aborted
    in_flight: Vec<RequestTag>,
    frames: u8,
}

impl MockCaptureSession {
    fn answer(&mut self, tag: RequestTag, reply: ScriptedReply) {
        let hold = self.shared.hold_triggers.load(Ordering::SeqCst);
        let settles = !reply.fail && !hold;
        let last = reply.results.len().saturating_sub(1);

        for (i, result) in reply.results.into_iter().enumerate() {
            if settles && i == last {
                self.callbacks.completed(tag, result);
            } else {
                self.callbacks.progressed(tag, result);
            }
        }

        if reply.fail {
            self.callbacks.failed(tag, "trigger failed");
        } else if hold {
            self.in_flight.push(tag);
        }
    }

    fn deliver_still(&mut self, request: &CaptureRequest, tag: RequestTag) -> Result<()> {
        let stats = &self.shared.stats;
        MockStats::bump(&stats.still_captures);
        *stats.last_orientation.lock().expect("mock stats poisoned") = request.jpeg_orientation;
        *stats.last_still_request.lock().expect("mock stats poisoned") = Some(request.clone());

        self.frames = self.frames.wrapping_add(1);
        let data = synthetic_jpeg(self.still_size, self.frames)?;
        let shared = self.shared.clone();
        let image = StillImage::new(data).with_release(move || {
            MockStats::bump(&shared.stats.images_released);
        });

        self.callbacks.image_available(self.session, image);
        self.callbacks.completed(tag, FrameResult::default());
        Ok(())
    }
}

/// Result reported once the focus trigger has been cancelled.
fn idle_result() -> FrameResult {
    FrameResult::new(Some(AfState::Inactive), Some(AeState::Converged))
}

impl CaptureSession for MockCaptureSession {
    fn set_repeating_request(&mut self, _request: &CaptureRequest, tag: RequestTag) -> Result<()> {
        MockStats::bump(&self.shared.stats.repeating_requests);
        self.callbacks.progressed(
            tag,
            FrameResult::new(Some(AfState::PassiveFocused), Some(AeState::Converged)),
        );
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest, tag: RequestTag) -> Result<()> {
        match tag.purpose {
            RequestPurpose::FocusLock => {
                MockStats::bump(&self.shared.stats.focus_triggers);
                let reply = self.shared.next_reply();
                self.answer(tag, reply);
            }
            RequestPurpose::Precapture => {
                MockStats::bump(&self.shared.stats.precapture_triggers);
                let reply = self.shared.next_reply();
                self.answer(tag, reply);
            }
            RequestPurpose::StillCapture => {
                if self.shared.fail_next_still.swap(false, Ordering::SeqCst) {
                    return Err(CaptureError::device_access("still capture rejected"));
                }
                self.deliver_still(request, tag)?;
            }
            RequestPurpose::FocusUnlock => {
                MockStats::bump(&self.shared.stats.focus_cancels);
                self.callbacks.completed(tag, idle_result());
            }
            RequestPurpose::Preview => self.callbacks.completed(tag, idle_result()),
        }
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        Ok(())
    }

    fn abort_captures(&mut self) -> Result<()> {
        for tag in self.in_flight.drain(..) {
            self.callbacks.failed(tag, "aborted");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        MockStats::bump(&self.shared.stats.sessions_closed);
        Ok(())
    }
}

/// Preview surface that records what the pipeline configured on it.
#[derive(Debug)]
pub struct MockPreviewSurface {
    display: Mutex<DisplayMetrics>,
    buffer_size: Mutex<Option<Size>>,
    transform: Mutex<Option<Affine>>,
}

impl MockPreviewSurface {
    pub fn new(rotation: Rotation, size: Size) -> Self {
        Self {
            display: Mutex::new(DisplayMetrics { rotation, size }),
            buffer_size: Mutex::new(None),
            transform: Mutex::new(None),
        }
    }

    /// Natural-orientation 1080x1920 phone display.
    pub fn portrait() -> Self {
        Self::new(Rotation::Rotation0, Size::new(1080, 1920))
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        self.display.lock().expect("mock surface poisoned").rotation = rotation;
    }

    pub fn buffer_size(&self) -> Option<Size> {
        *self.buffer_size.lock().expect("mock surface poisoned")
    }

    pub fn transform(&self) -> Option<Affine> {
        *self.transform.lock().expect("mock surface poisoned")
    }
}

impl PreviewSurface for MockPreviewSurface {
    fn display(&self) -> DisplayMetrics {
        *self.display.lock().expect("mock surface poisoned")
    }

    fn set_default_buffer_size(&self, size: Size) {
        *self.buffer_size.lock().expect("mock surface poisoned") = Some(size);
    }

    fn set_transform(&self, transform: Affine) {
        *self.transform.lock().expect("mock surface poisoned") = Some(transform);
    }
}

/// Records keep-alive transitions.
#[derive(Debug, Default)]
pub struct MockHost {
    transitions: Mutex<Vec<bool>>,
}

impl MockHost {
    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().expect("mock host poisoned").clone()
    }
}

impl ForegroundHost for MockHost {
    fn keep_alive(&self, active: bool) {
        self.transitions
            .lock()
            .expect("mock host poisoned")
            .push(active);
    }
}

/// A persisted image as seen by [`CollectingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub len: usize,
    /// Starts with the JPEG SOI marker
    pub is_jpeg: bool,
}

/// Sink that records buffers instead of writing them, then releases them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().expect("sink poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().expect("sink poisoned").len()
    }

    /// Poll until at least `count` buffers arrived or `timeout` elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl ImageSink for CollectingSink {
    fn persist(&self, buffer: ImageBuffer) {
        let record = SinkRecord {
            path: buffer.path().to_path_buf(),
            len: buffer.len(),
            is_jpeg: buffer.bytes().starts_with(&[0xFF, 0xD8]),
        };
        self.records.lock().expect("sink poisoned").push(record);
    }
}
