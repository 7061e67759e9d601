//! Capture pipeline: device session, focus/exposure negotiation, worker and
//! scheduler.

pub mod controller;
pub mod device_session;
pub mod request;
pub mod scheduler;
pub mod state_machine;
pub mod worker;

pub use controller::CaptureController;
pub use device_session::{ActiveSession, CameraSelection, DeviceSession};
pub use request::{
    AeMode, AeState, AfState, CaptureRequest, FrameResult, RequestId, RequestPurpose, RequestTag,
    SessionId,
};
pub use scheduler::{output_path, CancellationToken, CaptureScheduler};
pub use state_machine::{Action, CaptureState, FocusExposureStateMachine};
pub use worker::{SessionStatus, StatusSnapshot, WorkerMessage};
