//! Image buffers and their persistence
//!
//! A still image handed over by the device is wrapped together with its
//! destination path into an [`ImageBuffer`] and moved into an [`ImageSink`].
//! The device-side resource behind the image is released exactly once, when
//! the buffer is dropped, on every path.

pub mod writer;

pub use writer::{write_image, ImageWriter};

use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Encoded bytes acquired from a still output, plus the hook that returns the
/// underlying slot to the device.
pub struct StillImage {
    data: Bytes,
    release: Option<ReleaseHook>,
}

impl StillImage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            release: None,
        }
    }

    /// Attach the hook run when this image is dropped.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for StillImage {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for StillImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillImage")
            .field("len", &self.data.len())
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

/// One finished capture on its way to storage.
#[derive(Debug)]
pub struct ImageBuffer {
    image: StillImage,
    path: PathBuf,
}

impl ImageBuffer {
    pub fn new(image: StillImage, path: impl Into<PathBuf>) -> Self {
        Self {
            image,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        self.image.data()
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

/// Consumer of finished captures. Implementations must not block the caller
/// on storage I/O and must not report failures back.
pub trait ImageSink: Send + Sync {
    fn persist(&self, buffer: ImageBuffer);
}
