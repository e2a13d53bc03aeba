// SPDX-License-Identifier: MPL-2.0

//! Capture station core
//!
//! # Architecture
//!
//! - `frame_processor`: raw frame → persist frame + annotated display frame
//! - `capture`: save workflow and the running picture counter
//! - `ui`: the operator surface the preview loop talks to
//! - `coordinator`: owns the handles, runs the button task and the preview loop
//!
//! # Main Types
//!
//! - `Coordinator`: lifecycle owner
//! - `CaptureStateMachine`: validated save with counter advance
//! - `UiSurface` / `UiEvent`: closed set of operator events

pub mod capture;
pub mod coordinator;
pub mod frame_processor;
pub mod ui;

pub use capture::{CaptureForm, CaptureMetadata, CaptureState, CaptureStateMachine, SaveOutcome};
pub use coordinator::{Coordinator, Mode, RunSummary, Session};
pub use ui::{FormField, UiEvent, UiSurface};
