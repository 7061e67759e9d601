use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A stream resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, widened so large sensors cannot overflow.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Same size with width and height exchanged.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Direction the lens points relative to the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

impl LensFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            LensFacing::Front => "front",
            LensFacing::Back => "back",
            LensFacing::External => "external",
        }
    }
}

impl fmt::Display for LensFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display rotation in quarter turns from the natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// Quarter-turn index: 0, 1, 2 or 3.
    pub fn quarter_turns(&self) -> usize {
        match self {
            Rotation::Rotation0 => 0,
            Rotation::Rotation90 => 1,
            Rotation::Rotation180 => 2,
            Rotation::Rotation270 => 3,
        }
    }

    pub fn degrees(&self) -> u32 {
        self.quarter_turns() as u32 * 90
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Rotation0),
            90 => Some(Rotation::Rotation90),
            180 => Some(Rotation::Rotation180),
            270 => Some(Rotation::Rotation270),
            _ => None,
        }
    }

    pub const ALL: [Rotation; 4] = [
        Rotation::Rotation0,
        Rotation::Rotation90,
        Rotation::Rotation180,
        Rotation::Rotation270,
    ];
}

/// What the host display looks like right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMetrics {
    pub rotation: Rotation,
    pub size: Size,
}

/// Output formats a stream can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Encoded still images.
    Jpeg,
    /// Frames rendered into the preview surface.
    PreviewSurface,
}

/// Sizes a device can emit, per output format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfigurationMap {
    sizes: HashMap<OutputFormat, Vec<Size>>,
}

impl StreamConfigurationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sizes(mut self, format: OutputFormat, sizes: Vec<Size>) -> Self {
        self.sizes.insert(format, sizes);
        self
    }

    /// Sizes in the order the device advertises them.
    pub fn output_sizes(&self, format: OutputFormat) -> &[Size] {
        self.sizes.get(&format).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Static properties of one camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCharacteristics {
    /// `None` when the device does not report a facing.
    pub facing: Option<LensFacing>,
    /// Clockwise degrees the sensor is mounted at: 0, 90, 180 or 270.
    pub sensor_orientation: u32,
    /// `None` when the device exposes no stream configuration.
    pub stream_configuration: Option<StreamConfigurationMap>,
    pub flash_available: Option<bool>,
}
