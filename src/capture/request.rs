//! Capture requests, their correlation tags and the result fields devices report.

use std::fmt;

/// Generation number of a configured capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Identifier of one submitted request, unique within the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// Why a request was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPurpose {
    /// Repeating preview stream
    Preview,
    /// One-shot autofocus trigger start
    FocusLock,
    /// One-shot auto-exposure precapture trigger
    Precapture,
    /// The still frame itself
    StillCapture,
    /// One-shot autofocus trigger cancel after the still is taken
    FocusUnlock,
}

/// Correlation attached to every submission and echoed back with every
/// result, so results can be matched to the session that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub session: SessionId,
    pub request: RequestId,
    pub purpose: RequestPurpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    Preview,
    Still,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    ContinuousPicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeMode {
    On,
    OnAutoFlash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AePrecaptureTrigger {
    Idle,
    Start,
}

/// Immutable description of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<StreamTarget>,
    pub af_mode: AfMode,
    pub af_trigger: AfTrigger,
    pub ae_mode: AeMode,
    pub ae_precapture_trigger: AePrecaptureTrigger,
    /// Degrees, one of 0/90/180/270; only set on still requests.
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    /// Repeating preview request with continuous-picture autofocus.
    pub fn preview(ae_mode: AeMode) -> Self {
        Self {
            template: RequestTemplate::Preview,
            targets: vec![StreamTarget::Preview],
            af_mode: AfMode::ContinuousPicture,
            af_trigger: AfTrigger::Idle,
            ae_mode,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
            jpeg_orientation: None,
        }
    }

    /// Still request targeting the still output, same AF/AE modes as preview.
    pub fn still(ae_mode: AeMode, orientation: u32) -> Self {
        Self {
            template: RequestTemplate::StillCapture,
            targets: vec![StreamTarget::Still],
            af_mode: AfMode::ContinuousPicture,
            af_trigger: AfTrigger::Idle,
            ae_mode,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
            jpeg_orientation: Some(orientation),
        }
    }

    pub fn with_af_trigger(mut self, trigger: AfTrigger) -> Self {
        self.af_trigger = trigger;
        self
    }

    pub fn with_precapture_trigger(mut self, trigger: AePrecaptureTrigger) -> Self {
        self.ae_precapture_trigger = trigger;
        self
    }
}

/// Autofocus state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    PassiveUnfocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
}

impl AfState {
    /// Focus has settled and will not move until the trigger is cancelled.
    pub fn is_locked(&self) -> bool {
        matches!(self, AfState::FocusedLocked | AfState::NotFocusedLocked)
    }
}

/// Auto-exposure state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

/// The fields of a partial or final result the state machine looks at.
/// Devices may omit either field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameResult {
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
}

impl FrameResult {
    pub fn new(af_state: Option<AfState>, ae_state: Option<AeState>) -> Self {
        Self { af_state, ae_state }
    }
}
