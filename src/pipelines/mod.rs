// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines for saved pictures
//!
//! - [`photo`]: JPEG encoding and the file sink used by the save workflow

pub mod photo;
