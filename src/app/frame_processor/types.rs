// SPDX-License-Identifier: MPL-2.0

//! Core types for frame processing results

use crate::constants::{FACE_MIN_NEIGHBORS, FACE_MIN_SIZE, FACE_SCALE_FACTOR};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A detected face in pixel coordinates
///
/// Coordinates are in the pixel space of the image detection ran on (the
/// orientation-corrected frame, before the display resize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Scale all coordinates by `factor`, rounding to the nearest pixel
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: (self.x as f64 * factor).round() as i32,
            y: (self.y as f64 * factor).round() as i32,
            width: (self.width as f64 * factor).round() as i32,
            height: (self.height as f64 * factor).round() as i32,
        }
    }
}

/// Parameters of one face detection pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Pyramid step between scales (must be > 1)
    pub scale_factor: f64,
    /// Overlapping raw hits a face needs to be reported
    pub min_neighbors: u32,
    /// Smallest reported face (width, height) in full-resolution pixels
    pub min_size: (u32, u32),
    /// Downscale the intensity image so its longer side is at most this
    pub max_dimension: Option<u32>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: FACE_SCALE_FACTOR,
            min_neighbors: FACE_MIN_NEIGHBORS,
            min_size: (FACE_MIN_SIZE, FACE_MIN_SIZE),
            max_dimension: None,
        }
    }
}

/// Output of [`FrameProcessor::process`](super::FrameProcessor::process)
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Corrected, annotated and resized frame for the preview surface
    pub display: RgbImage,
    /// Corrected frame without annotation; this is what gets saved
    pub persist: RgbImage,
    /// Faces found in `persist` pixel space
    pub faces: Vec<FaceBox>,
}
