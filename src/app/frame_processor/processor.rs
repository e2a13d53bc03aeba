// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame transform from sensor output to preview and persist frames

use super::tasks::FaceDetector;
use super::types::{DetectionParams, FaceBox, ProcessedFrame};
use crate::backends::camera::{RawFrame, Resolution, SensorRotation};
use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, FACE_BOX_COLOR, FACE_BOX_THICKNESS};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use tracing::{trace, warn};

/// Stateless frame transform
///
/// Holds only configuration and the detector; `process` keeps no state
/// between calls.
pub struct FrameProcessor<D> {
    detector: D,
    params: DetectionParams,
    rotation: SensorRotation,
    display_size: Resolution,
    box_color: Rgb<u8>,
    box_thickness: u32,
}

impl<D: FaceDetector> FrameProcessor<D> {
    pub fn new(detector: D, params: DetectionParams) -> Self {
        Self {
            detector,
            params,
            rotation: SensorRotation::default(),
            display_size: Resolution::new(DISPLAY_WIDTH, DISPLAY_HEIGHT),
            box_color: Rgb(FACE_BOX_COLOR),
            box_thickness: FACE_BOX_THICKNESS,
        }
    }

    pub fn with_rotation(mut self, rotation: SensorRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_display_size(mut self, display_size: Resolution) -> Self {
        self.display_size = display_size;
        self
    }

    /// Turn one raw frame into its display and persist frames
    ///
    /// A failed detection is logged and treated as "no faces" so the preview
    /// keeps running.
    pub fn process(&self, raw: RawFrame) -> ProcessedFrame {
        let persist = self.rotation.apply(&raw.image);
        let mut display = persist.clone();

        let gray = imageops::grayscale(&display);
        let faces = match self.detect(&gray) {
            Ok(faces) => faces,
            Err(e) => {
                warn!(error = %e, sequence = raw.sequence, "Face detection failed");
                Vec::new()
            }
        };

        draw_face_boxes(&mut display, &faces, self.box_color, self.box_thickness);

        let display = if display.dimensions() == (self.display_size.width, self.display_size.height)
        {
            display
        } else {
            imageops::resize(
                &display,
                self.display_size.width,
                self.display_size.height,
                FilterType::Triangle,
            )
        };

        trace!(
            sequence = raw.sequence,
            faces = faces.len(),
            elapsed_us = raw.captured_at.elapsed().as_micros(),
            "Frame processed"
        );

        ProcessedFrame {
            display,
            persist,
            faces,
        }
    }

    /// Run detection, downscaling first when `max_dimension` asks for it
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceBox>, crate::errors::DetectorError> {
        let (width, height) = gray.dimensions();
        let longest = width.max(height);

        match self.params.max_dimension {
            Some(max_dim) if max_dim > 0 && longest > max_dim => {
                let scale = longest as f64 / max_dim as f64;
                let small = imageops::resize(
                    gray,
                    ((width as f64 / scale).round() as u32).max(1),
                    ((height as f64 / scale).round() as u32).max(1),
                    FilterType::Triangle,
                );

                // Keep the minimum size meaningful in full-resolution pixels
                let params = DetectionParams {
                    min_size: (
                        (self.params.min_size.0 as f64 / scale).ceil() as u32,
                        (self.params.min_size.1 as f64 / scale).ceil() as u32,
                    ),
                    max_dimension: None,
                    ..self.params
                };

                Ok(self
                    .detector
                    .detect(&small, &params)?
                    .into_iter()
                    .map(|face| face.scaled(scale))
                    .collect())
            }
            _ => self.detector.detect(gray, &self.params),
        }
    }
}

/// Draw rectangle outlines for each face, clipped to the image
///
/// The outline grows inward from the box edge.
pub fn draw_face_boxes(image: &mut RgbImage, faces: &[FaceBox], color: Rgb<u8>, thickness: u32) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let thickness = thickness.max(1) as i32;

    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < width && y < height {
            image.put_pixel(x as u32, y as u32, color);
        }
    };

    for face in faces {
        if face.width <= 0 || face.height <= 0 {
            continue;
        }
        let (left, top) = (face.x, face.y);
        let (right, bottom) = (face.right() - 1, face.bottom() - 1);

        for t in 0..thickness {
            let (l, r, tp, b) = (left + t, right - t, top + t, bottom - t);
            if l > r || tp > b {
                break;
            }
            for x in l..=r {
                put(x, tp);
                put(x, b);
            }
            for y in tp..=b {
                put(l, y);
                put(r, y);
            }
        }
    }
}
