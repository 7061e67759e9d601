use super::{ImageBuffer, ImageSink};
use crate::errors::CaptureError;
use std::fs::File;
use std::io::Write;

/// Writes buffers to disk on the tokio blocking pool.
///
/// `persist` must be called from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageWriter;

impl ImageWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSink for ImageWriter {
    fn persist(&self, buffer: ImageBuffer) {
        // Detached: the capture pipeline never waits on storage.
        tokio::task::spawn_blocking(move || match write_image(buffer) {
            Ok(written) => log::info!("Saved image ({} bytes)", written),
            Err(e) => log::error!("{}", e),
        });
    }
}

/// Write the raw bytes of `buffer` to its path and release it.
///
/// The buffer is consumed; its device resource is released when this
/// function returns, whatever the outcome.
pub fn write_image(buffer: ImageBuffer) -> Result<usize, CaptureError> {
    let path = buffer.path().to_path_buf();

    let mut file = File::create(&path).map_err(|e| CaptureError::write(&path, e))?;
    file.write_all(buffer.bytes())
        .map_err(|e| CaptureError::write(&path, e))?;
    file.sync_all().map_err(|e| CaptureError::write(&path, e))?;

    log::debug!("Wrote {}", path.display());
    Ok(buffer.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StillImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tracked(data: Vec<u8>, released: &Arc<AtomicUsize>) -> StillImage {
        let counter = released.clone();
        StillImage::new(data).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_write_image_persists_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1700000000000.jpg");
        let released = Arc::new(AtomicUsize::new(0));

        let buffer = ImageBuffer::new(tracked(vec![0xFF, 0xD8, 0xFF, 0xD9], &released), &path);
        let written = write_image(buffer).unwrap();

        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_failure_still_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("1.jpg");
        let released = Arc::new(AtomicUsize::new(0));

        let buffer = ImageBuffer::new(tracked(vec![1, 2, 3], &released), &path);
        let err = write_image(buffer).unwrap_err();

        assert!(matches!(err, CaptureError::Write { .. }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_writer_persists_off_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.jpg");
        let released = Arc::new(AtomicUsize::new(0));

        ImageWriter::new().persist(ImageBuffer::new(tracked(vec![9; 64], &released), &path));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while released.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&path).unwrap().len(), 64);
    }
}
