// SPDX-License-Identifier: MPL-2.0

//! Photo persistence
//!
//! ```text
//! persist frame → JPEG encode → write (create-only) → SavedFile on disk
//! ```
//!
//! Writes happen synchronously inside the save trigger; the preview loop
//! resumes once the file is on disk or the write has failed.

pub mod encoding;

pub use encoding::{EncodedImage, PhotoEncoder};

use crate::constants::JpegQuality;
use crate::errors::PhotoError;
use image::RgbImage;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Filesystem collaborator used by the save workflow
pub trait PhotoSink {
    /// Persist `image` at `path`
    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), PhotoError>;
}

/// Writes JPEG files, never replacing an existing file
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegFileSink {
    encoder: PhotoEncoder,
}

impl JpegFileSink {
    pub fn new(quality: JpegQuality) -> Self {
        Self {
            encoder: PhotoEncoder::new(quality),
        }
    }
}

impl PhotoSink for JpegFileSink {
    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), PhotoError> {
        let encoded = self.encoder.encode(image)?;

        write_create_only(path, |file| file.write_all(&encoded.data))?;

        info!(
            path = %path.display(),
            width = encoded.width,
            height = encoded.height,
            bytes = encoded.data.len(),
            "Photo saved successfully"
        );
        Ok(())
    }
}

/// Write a file that appears at `path` complete or not at all
///
/// The bytes go to a hidden staging file next to `path` first. It is linked
/// into place only after `fill` and the sync succeeded, and never over an
/// existing file. On any failure the staging file is removed.
pub fn write_create_only<F>(path: &Path, fill: F) -> Result<(), PhotoError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".genmai-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| save_failed(path, e))?;

    fill(staged.as_file_mut())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| save_failed(path, e))?;

    staged
        .persist_noclobber(path)
        .map_err(|e| save_failed(path, e.error))?;
    Ok(())
}

fn save_failed(path: &Path, e: io::Error) -> PhotoError {
    PhotoError::SaveFailed(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_write_creates_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let image = RgbImage::from_pixel(20, 10, Rgb([10, 200, 10]));

        JpegFileSink::default().write(&path, &image).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn test_existing_file_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"keep me").unwrap();

        let result = JpegFileSink::default().write(&path, &RgbImage::new(4, 4));
        assert!(matches!(result, Err(PhotoError::SaveFailed(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_interrupted_write_leaves_nothing_and_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240901_hara_koshihikari_01_001.jpg");

        let result = write_create_only(&path, |file| {
            file.write_all(&[0xff, 0xd8, 0xff])?;
            Err(io::Error::other("No space left on device"))
        });

        assert!(matches!(result, Err(PhotoError::SaveFailed(_))));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let image = RgbImage::from_pixel(8, 8, Rgb([40, 40, 40]));
        JpegFileSink::default().write(&path, &image).unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 8);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_directory_is_save_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("frame.jpg");

        let result = JpegFileSink::default().write(&path, &RgbImage::new(4, 4));
        assert!(matches!(result, Err(PhotoError::SaveFailed(_))));
    }
}
