use thiserror::Error;

/// Errors raised by the capture pipeline.
///
/// None of these are surfaced to an end user. The worker logs them and
/// abandons the current cycle; the scheduler keeps ticking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The ownership permit was not obtained within the configured bound.
    #[error("timed out after {0} ms waiting for the camera ownership lock")]
    AcquisitionTimeout(u64),

    /// No enumerated device matches the requested lens facing.
    #[error("no camera device matches facing {0}")]
    NoMatchingDevice(String),

    /// Transport or driver failure during a device call.
    #[error("camera access error: {0}")]
    DeviceAccess(String),

    /// Persisting an image failed; the image is dropped.
    #[error("failed to write image {path}: {message}")]
    Write { path: String, message: String },

    /// A scheduler wait ended early.
    #[error("scheduler wait interrupted: {0}")]
    InterruptedWait(String),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation issued against a closed device or stopped controller.
    #[error("capture session is closed")]
    Closed,
}

impl CaptureError {
    pub fn device_access(message: impl Into<String>) -> Self {
        Self::DeviceAccess(message.into())
    }

    pub fn write(path: impl AsRef<std::path::Path>, error: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.as_ref().display().to_string(),
            message: error.to_string(),
        }
    }

    /// Whether the scheduler should keep trying to open the device on later ticks.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoMatchingDevice(_) | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
