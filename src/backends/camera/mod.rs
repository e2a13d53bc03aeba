// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │     Coordinator     │  ← owns the handle for the process lifetime
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Camera Trait     │  ← configure / start / capture / stop / close
//! └──────────┬──────────┘
//!            │
//!            ▼
//!       ┌────────┐
//!       │  V4L2  │  ← Concrete implementation (mmap streaming)
//!       └────────┘
//! ```

pub mod types;
pub mod v4l2_camera;
pub mod v4l2_controls;

pub use types::*;
pub use v4l2_camera::{V4l2Camera, enumerate_devices, supported_formats};

/// Camera collaborator used by the preview loop
///
/// The lifecycle is `configure` → `start` → (`set_controls` / `capture_array`)*
/// → `stop` → `close`. `stop` and `close` must tolerate repeated calls; the
/// coordinator still calls each exactly once.
pub trait Camera {
    /// Negotiate resolution and pixel layout with the driver
    fn configure(&mut self, resolution: Resolution, format: PixelFormat) -> CameraResult<()>;

    /// Start streaming
    fn start(&mut self) -> CameraResult<()>;

    /// Apply runtime controls (autofocus)
    fn set_controls(&mut self, controls: &CameraControls) -> CameraResult<()>;

    /// Block until the next frame is available and return it as RGB
    fn capture_array(&mut self) -> CameraResult<RawFrame>;

    /// Stop streaming, keeping the device open
    fn stop(&mut self);

    /// Release the device
    fn close(&mut self);
}
