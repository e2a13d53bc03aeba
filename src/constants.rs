// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Preview surface width in pixels
pub const DISPLAY_WIDTH: u32 = 1200;
/// Preview surface height in pixels
pub const DISPLAY_HEIGHT: u32 = 600;

/// Sensor capture width (full-FOV mode of the mounted camera module)
pub const CAPTURE_WIDTH: u32 = 2304;
/// Sensor capture height
pub const CAPTURE_HEIGHT: u32 = 1296;

/// Bounded wait of one UI poll in the preview loop
pub const UI_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Directory saved pictures are written to (must already exist)
pub const DEFAULT_OUTPUT_DIR: &str = "./_capture";

/// Extension of every saved picture
pub const SAVED_FILE_EXTENSION: &str = "jpg";

/// Zero-padded width of the picture counter in filenames
pub const PICTURE_COUNTER_WIDTH: usize = 3;

pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
/// Sensor subdevice exposing the wide dynamic range control
pub const DEFAULT_SENSOR_SUBDEVICE: &str = "/dev/v4l-subdev1";

/// Standard frontal-face cascade as installed by the OpenCV data package
pub const DEFAULT_CASCADE_PATH: &str =
    "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml";

/// Face detection pyramid step
pub const FACE_SCALE_FACTOR: f64 = 1.3;
/// Neighbouring hits required to keep a detection
pub const FACE_MIN_NEIGHBORS: u32 = 5;
/// Smallest face reported, in pixels (square)
pub const FACE_MIN_SIZE: u32 = 30;

/// Face marker outline colour (RGB)
pub const FACE_BOX_COLOR: [u8; 3] = [0, 0, 255];
/// Face marker outline thickness in pixels
pub const FACE_BOX_THICKNESS: u32 = 2;

/// evdev name of the front-panel button device
pub const DEFAULT_BUTTON_DEVICE_NAME: &str = "gpio_keys";

/// Front-panel key codes and the names they resolve to
pub const DEFAULT_BUTTON_CODES: [(u16, &str); 4] =
    [(0x290, "F1"), (0x291, "F2"), (0x292, "F3"), (0x293, "O")];

/// Sample kinds offered in the kind selector
pub const DEFAULT_SAMPLE_KINDS: [&str; 5] = [
    "コシヒカリ",
    "あきたこまち",
    "ひとめぼれ",
    "ササニシキ",
    "つや姫",
];

pub const DEFAULT_POSITION: &str = "hara";
pub const DEFAULT_POSITION_COUNTER: &str = "01";
pub const DEFAULT_PICTURE_COUNTER: u32 = 1;

/// Date format pre-filled in the date field
pub const DATE_FIELD_FORMAT: &str = "%Y/%m/%d";

/// JPEG quality presets for saved pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JpegQuality {
    /// Smaller files, visible artefacts
    Low,
    /// Balanced quality and file size
    Medium,
    /// Near-lossless (default)
    #[default]
    High,
    /// Minimal compression
    Maximum,
}

impl JpegQuality {
    /// JPEG encoder quality value (1-100)
    pub fn value(&self) -> u8 {
        match self {
            JpegQuality::Low => 60,
            JpegQuality::Medium => 80,
            JpegQuality::High => 92,
            JpegQuality::Maximum => 98,
        }
    }
}
