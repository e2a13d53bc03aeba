// SPDX-License-Identifier: MPL-2.0

//! Genmai Capture - still-capture utility for a fixed-position imaging station
//!
//! This library provides the core of the station: a preview loop that
//! shows the camera feed with face markers, a hardware button listener, and
//! a save workflow that names pictures from operator-entered metadata.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Frame processing, save workflow, UI abstraction and coordinator
//! - [`backends`]: V4L2 camera and evdev button panel
//! - [`pipelines`]: JPEG encoding and the file sink
//! - [`config`]: Station configuration
//! - [`storage`]: Output directory and saved-file naming
//! - [`terminal`]: Terminal operator surface
//!
//! # Example
//!
//! ```ignore
//! // The station is run via:
//! // genmai-capture capture
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;
pub mod terminal;

// Re-export commonly used types
pub use app::{CaptureForm, CaptureStateMachine, Coordinator, Mode, UiEvent, UiSurface};
pub use config::Config;
pub use constants::JpegQuality;
pub use errors::{AppError, AppResult};
