//! stillcam: periodic still capture with asynchronous focus/exposure negotiation
//!
//! This crate drives a camera device through the platform traits in
//! [`platform`] while a host-owned preview surface is live, and writes one
//! JPEG still per period without ever blocking the capture pipeline on
//! storage.
//!
//! # Features
//! - Exclusive device ownership with a bounded acquisition wait
//! - Preview/still resolution negotiation against advertised sizes
//! - Autofocus lock and auto-exposure precapture driven purely by device results
//! - Cancellable periodic scheduling
//! - Out-of-band image persistence on the blocking pool
//!
//! # Usage
//! ```rust,ignore
//! use stillcam::{CaptureController, StillCamConfig};
//!
//! let mut controller = CaptureController::new(config, manager, surface)?;
//! controller.start();
//! controller.surface_available(Size::new(1080, 1920))?;
//! // ...
//! controller.stop().await;
//! ```
pub mod capture;
pub mod config;
pub mod errors;
pub mod platform;
pub mod size_selector;
pub mod storage;
pub mod timing;
pub mod transform;
pub mod types;

// Testing utilities - scripted camera for offline runs
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureController, StatusSnapshot};
pub use config::StillCamConfig;
pub use errors::CaptureError;
pub use storage::{ImageBuffer, ImageSink, ImageWriter, StillImage};
pub use types::{LensFacing, Rotation, Size};

/// Initialize logging for the capture service
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "stillcam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "stillcam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
