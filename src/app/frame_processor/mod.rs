// SPDX-License-Identifier: MPL-2.0

//! Frame processor
//!
//! Turns each raw sensor frame into two images: the clean, orientation
//! corrected frame that gets saved, and the annotated, resized frame shown
//! on the preview surface.
//!
//! ```text
//! RawFrame ──► rotate ──► persist ───────────────────────────► (save)
//!                            │
//!                            └─► clone ─► gray ─► detect ─► draw ─► resize ─► display
//! ```

pub mod processor;
pub mod tasks;
pub mod types;

pub use processor::{FrameProcessor, draw_face_boxes};
pub use tasks::{FaceDetector, HaarCascade};
pub use types::{DetectionParams, FaceBox, ProcessedFrame};
