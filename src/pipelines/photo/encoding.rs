// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding for saved pictures

use crate::constants::JpegQuality;
use crate::errors::PhotoError;
use image::RgbImage;
use tracing::debug;

/// Encoded image data ready for saving
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Photo encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoEncoder {
    quality: JpegQuality,
}

impl PhotoEncoder {
    pub fn new(quality: JpegQuality) -> Self {
        Self { quality }
    }

    /// Encode an RGB frame as JPEG
    pub fn encode(&self, image: &RgbImage) -> Result<EncodedImage, PhotoError> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);

        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, self.quality.value());

        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| PhotoError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;

        debug!(
            size = buffer.len(),
            quality = self.quality.value(),
            "Encoding complete"
        );

        Ok(EncodedImage {
            data: buffer,
            width: image.width(),
            height: image.height(),
        })
    }
}
