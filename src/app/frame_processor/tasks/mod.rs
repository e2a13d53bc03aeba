// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis tasks
//!
//! Detectors that run on every preview frame.

pub mod face_detector;

pub use face_detector::{FaceDetector, HaarCascade, group_rectangles};
