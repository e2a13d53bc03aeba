// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::errors::CameraError;

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout requested from or delivered by the sensor driver
///
/// Every layout is converted to packed RGB before a [`RawFrame`] leaves the
/// camera backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGB24 - 3 bytes per pixel, R G B order
    #[default]
    Rgb24,
    /// BGR24 - 3 bytes per pixel, B G R order
    Bgr24,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    Yuyv,
    /// Motion JPEG - every buffer is a complete JPEG image
    Mjpeg,
}

impl PixelFormat {
    /// V4L2 FourCC code for this layout
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Rgb24 => *b"RGB3",
            Self::Bgr24 => *b"BGR3",
            Self::Yuyv => *b"YUYV",
            Self::Mjpeg => *b"MJPG",
        }
    }

    /// Map a V4L2 FourCC code back to a supported layout
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }

    /// Bytes per pixel of the packed layout (None for compressed formats)
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Yuyv => Some(2),
            Self::Mjpeg => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

/// Sensor rotation in degrees (clockwise)
///
/// The capture station mounts its camera module upside down, so the default
/// correction is a half turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    #[default]
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Apply the correction to a captured frame
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        match self {
            SensorRotation::None => image.clone(),
            SensorRotation::Rotate90 => image::imageops::rotate90(image),
            SensorRotation::Rotate180 => image::imageops::rotate180(image),
            SensorRotation::Rotate270 => image::imageops::rotate270(image),
        }
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Autofocus algorithm mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutofocusMode {
    /// Lens stays where it is
    Manual,
    /// Single focus sweep on request
    Auto,
    /// Refocus continuously while streaming
    #[default]
    Continuous,
}

/// Autofocus sweep speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutofocusSpeed {
    Normal,
    #[default]
    Fast,
}

/// Runtime controls applied after the camera has started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraControls {
    pub autofocus_mode: AutofocusMode,
    pub autofocus_speed: AutofocusSpeed,
}

/// A frame as delivered by the sensor, converted to packed RGB
///
/// Orientation is whatever the sensor delivers; correction happens in the
/// frame processor.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: RgbImage,
    /// Driver sequence number
    pub sequence: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
}
