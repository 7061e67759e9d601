//! Configuration management for stillcam
//!
//! Every tunable of the capture pipeline lives here and is handed to the
//! controller once, at construction. Nothing downstream mutates it.

use crate::errors::CaptureError;
use crate::transform::DEFAULT_ROTATION_TABLE;
use crate::types::{LensFacing, Size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillCamConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

/// Device selection and stream negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Lens facing to open
    pub facing: LensFacing,
    /// Still output size [width, height]; the device is asked for exactly this
    pub output_resolution: [u32; 2],
    /// Upper bound for the preview stream [width, height]
    pub max_preview_resolution: [u32; 2],
    /// Bounded wait on the camera ownership lock in milliseconds
    pub lock_timeout_ms: u64,
    /// JPEG orientation lookup indexed by display quarter turns
    pub rotation_table: [u32; 4],
    /// Let the device fire the flash when exposure asks for it
    pub auto_flash: bool,
}

/// Periodic capture timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Time between capture ticks in milliseconds
    pub period_ms: u64,
    /// A cycle older than this is abandoned on the next tick
    pub cycle_timeout_ms: u64,
}

/// Where finished images go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory, created on first use
    pub output_directory: String,
    /// File extension appended to the millisecond timestamp
    pub file_extension: String,
}

impl Default for StillCamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                facing: LensFacing::Front,
                output_resolution: [480, 680],
                max_preview_resolution: [1920, 1080],
                lock_timeout_ms: 2500,
                rotation_table: DEFAULT_ROTATION_TABLE,
                auto_flash: false,
            },
            capture: CaptureConfig {
                period_ms: 30_000,
                cycle_timeout_ms: 10_000,
            },
            storage: StorageConfig {
                output_directory: "./captures/picture".to_string(),
                file_extension: "jpg".to_string(),
            },
        }
    }
}

impl CameraConfig {
    pub fn output_size(&self) -> Size {
        Size::new(self.output_resolution[0], self.output_resolution[1])
    }

    pub fn max_preview_size(&self) -> Size {
        Size::new(self.max_preview_resolution[0], self.max_preview_resolution[1])
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl CaptureConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

impl StorageConfig {
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_directory)
    }
}

impl StillCamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            CaptureError::InvalidConfig(format!("Failed to read config file: {}", e))
        })?;

        let config: StillCamConfig = toml::from_str(&contents).map_err(|e| {
            CaptureError::InvalidConfig(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::InvalidConfig(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CaptureError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CaptureError::InvalidConfig(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("stillcam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CaptureError> {
        let invalid = |msg: &str| Err(CaptureError::InvalidConfig(msg.to_string()));

        if self.camera.output_resolution.contains(&0) {
            return invalid("Output resolution must be non-zero");
        }
        if self.camera.max_preview_resolution.contains(&0) {
            return invalid("Max preview resolution must be non-zero");
        }
        if self.camera.lock_timeout_ms == 0 {
            return invalid("Lock timeout must be at least 1 ms");
        }
        if self
            .camera
            .rotation_table
            .iter()
            .any(|degrees| degrees % 90 != 0 || *degrees >= 360)
        {
            return invalid("Rotation table entries must be one of 0, 90, 180, 270");
        }

        if self.capture.period_ms == 0 {
            return invalid("Capture period must be at least 1 ms");
        }
        if self.capture.cycle_timeout_ms == 0 {
            return invalid("Cycle timeout must be at least 1 ms");
        }

        if self.storage.output_directory.trim().is_empty() {
            return invalid("Output directory must not be empty");
        }
        let ext = self.storage.file_extension.as_str();
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            return invalid("File extension must be a bare extension such as \"jpg\"");
        }

        Ok(())
    }
}
