// SPDX-License-Identifier: GPL-3.0-only

//! Preview loop and lifecycle owner
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────── current-thread runtime ───────────────────────────┐
//!  │                                                                               │
//!  │  button task (spawned)            preview loop (this task)                     │
//!  │  ─────────────────────            ────────────────────────                     │
//!  │  await next key event             ui.read(poll) ─► exit? ─► break              │
//!  │  log named events                     │                                         │
//!  │                                       ▼                                         │
//!  │                                   camera.capture_array                          │
//!  │                                       ▼                                         │
//!  │                                   FrameProcessor::process                       │
//!  │                                       ▼                                         │
//!  │                                   ui.show_frame ─► Save? ─► CaptureStateMachine │
//!  │                                                                               │
//!  └───────────────────────────────────────────────────────────────────────────────┘
//!                     on exit: abort button task, ui.close, camera.stop, camera.close
//! ```
//!
//! The two tasks share nothing. The camera and UI live in a [`Session`]
//! whose release runs exactly once, either explicitly at the end of
//! [`Coordinator::run`] or from `Drop` if the loop is torn down early.

use crate::app::capture::{CaptureStateMachine, SaveOutcome};
use crate::app::frame_processor::{FaceDetector, FrameProcessor};
use crate::app::ui::{UiEvent, UiSurface};
use crate::backends::buttons::{self, ButtonEvent};
use crate::backends::camera::Camera;
use crate::constants::UI_POLL_INTERVAL;
use crate::errors::{AppResult, CaptureError};
use crate::pipelines::photo::PhotoSink;
use futures::stream::BoxStream;
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the save control is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Full workflow: metadata form and saving
    #[default]
    Capture,
    /// Camera test: preview with face markers only, save is ignored
    Preview,
}

/// Camera and UI handles with ordered, once-only release
pub struct Session<C: Camera, U: UiSurface> {
    camera: C,
    ui: U,
    released: bool,
}

impl<C: Camera, U: UiSurface> Session<C, U> {
    pub fn new(camera: C, ui: U) -> Self {
        Self {
            camera,
            ui,
            released: false,
        }
    }

    pub fn camera(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn ui(&mut self) -> &mut U {
        &mut self.ui
    }

    /// Close the UI, then stop and close the camera
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.ui.close();
        self.camera.stop();
        self.camera.close();
        info!("Session released");
    }
}

impl<C: Camera, U: UiSurface> Drop for Session<C, U> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Loop iterations, including the one that saw the exit
    pub iterations: u64,
    /// Frames captured and shown
    pub frames: u64,
    /// Captures that failed and were skipped
    pub capture_failures: u64,
    /// Successful saves
    pub saves: u64,
}

/// Owns every long-lived handle and drives both tasks
pub struct Coordinator<C: Camera, U: UiSurface, D, S> {
    session: Session<C, U>,
    processor: FrameProcessor<D>,
    capture: CaptureStateMachine<S>,
    buttons: Option<BoxStream<'static, ButtonEvent>>,
    mode: Mode,
    poll_interval: Duration,
}

impl<C, U, D, S> Coordinator<C, U, D, S>
where
    C: Camera,
    U: UiSurface,
    D: FaceDetector,
    S: PhotoSink,
{
    pub fn new(
        camera: C,
        ui: U,
        processor: FrameProcessor<D>,
        capture: CaptureStateMachine<S>,
    ) -> Self {
        Self {
            session: Session::new(camera, ui),
            processor,
            capture,
            buttons: None,
            mode: Mode::default(),
            poll_interval: UI_POLL_INTERVAL,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Hand over the button event stream; it is consumed by its own task
    pub fn with_buttons(mut self, events: BoxStream<'static, ButtonEvent>) -> Self {
        self.buttons = Some(events);
        self
    }

    /// Run until the operator exits or the surface goes away
    ///
    /// Only a UI read failure ends the loop with an error. The session is
    /// released on every path before this returns.
    pub async fn run(mut self) -> AppResult<RunSummary> {
        let listener = self.buttons.take().map(|events| {
            debug!("Starting button listener");
            tokio::spawn(buttons::listen(events))
        });

        info!(mode = ?self.mode, poll_ms = self.poll_interval.as_millis(), "Preview loop started");
        let result = self.preview_loop().await;

        if let Some(handle) = listener {
            handle.abort();
        }
        self.session.release();

        match &result {
            Ok(summary) => info!(
                iterations = summary.iterations,
                frames = summary.frames,
                saves = summary.saves,
                "Preview loop finished"
            ),
            Err(e) => warn!(error = %e, "Preview loop failed"),
        }
        result
    }

    async fn preview_loop(&mut self) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();

        loop {
            let event = self.session.ui.read(self.poll_interval).await?;
            summary.iterations += 1;

            if event.is_exit() {
                info!(?event, "Exit requested");
                break;
            }

            let raw = match self.session.camera.capture_array() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Frame capture failed, skipping iteration");
                    summary.capture_failures += 1;
                    if event == UiEvent::Save && self.mode == Mode::Capture {
                        self.notify(&CaptureError::NoFrameAvailable.to_string());
                    }
                    continue;
                }
            };

            let processed = self.processor.process(raw);
            summary.frames += 1;

            if let Err(e) = self.session.ui.show_frame(processed.display) {
                warn!(error = %e, "Failed to show frame");
            }

            if event == UiEvent::Save {
                match self.mode {
                    Mode::Capture => {
                        if self.handle_save(&processed.persist).is_some() {
                            summary.saves += 1;
                        }
                    }
                    Mode::Preview => debug!("Save ignored in preview mode"),
                }
            }
        }

        Ok(summary)
    }

    fn handle_save(&mut self, persist: &RgbImage) -> Option<SaveOutcome> {
        let form = self.session.ui.form();

        match self.capture.on_save_trigger(&form, persist) {
            Ok(outcome) => {
                self.session
                    .ui
                    .set_picture_counter(&outcome.next_counter_text());
                self.notify(&format!("Saved {}", outcome.file.name()));
                Some(outcome)
            }
            Err(e) => {
                self.notify(&e.to_string());
                None
            }
        }
    }

    fn notify(&mut self, message: &str) {
        if let Err(e) = self.session.ui.popup(message) {
            warn!(error = %e, message, "Failed to show popup");
        }
    }
}
