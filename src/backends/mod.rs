// SPDX-License-Identifier: MPL-2.0

//! Hardware backends
//!
//! - [`camera`]: V4L2 capture and sensor controls
//! - [`buttons`]: front-panel buttons over evdev

pub mod buttons;
pub mod camera;
