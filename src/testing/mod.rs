//! Testing utilities for stillcam
//!
//! A scripted camera stack that runs the whole capture pipeline offline,
//! without hardware.

pub mod mock_camera;

pub use mock_camera::{
    synthetic_jpeg, CollectingSink, MockCameraManager, MockDeviceSpec, MockHost,
    MockPreviewSurface, MockStats, SinkRecord,
};
