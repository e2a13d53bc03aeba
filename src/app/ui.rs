// SPDX-License-Identifier: GPL-3.0-only

//! UI surface collaborator
//!
//! The preview loop only talks to the operator through [`UiSurface`]: it
//! polls for one [`UiEvent`] with a bounded wait, reads the form as a
//! [`CaptureForm`], pushes the display frame and shows popups.

use crate::app::capture::CaptureForm;
use crate::errors::AppResult;
use image::RgbImage;
use std::future::Future;
use std::time::Duration;

/// Form fields, in focus order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Date,
    Position,
    Kind,
    PositionCounter,
    PictureCounter,
}

impl FormField {
    pub const ALL: [FormField; 5] = [
        FormField::Date,
        FormField::Position,
        FormField::Kind,
        FormField::PositionCounter,
        FormField::PictureCounter,
    ];

    /// Stable widget identifier
    pub fn key(&self) -> &'static str {
        match self {
            FormField::Date => "-date-",
            FormField::Position => "-pos-",
            FormField::Kind => "-kind-",
            FormField::PositionCounter => "-pos_cnt-",
            FormField::PictureCounter => "-pic_cnt-",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Date => "Date",
            FormField::Position => "Position",
            FormField::Kind => "Kind",
            FormField::PositionCounter => "Pos#",
            FormField::PictureCounter => "Pic#",
        }
    }

    pub fn next(&self) -> Self {
        let idx = Self::ALL.iter().position(|f| f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn previous(&self) -> Self {
        let idx = Self::ALL.iter().position(|f| f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Read this field from a form
    pub fn get<'a>(&self, form: &'a CaptureForm) -> &'a str {
        match self {
            FormField::Date => &form.date,
            FormField::Position => &form.position,
            FormField::Kind => &form.kind,
            FormField::PositionCounter => &form.position_counter,
            FormField::PictureCounter => &form.picture_counter,
        }
    }

    /// Mutable access to this field of a form
    pub fn get_mut<'a>(&self, form: &'a mut CaptureForm) -> &'a mut String {
        match self {
            FormField::Date => &mut form.date,
            FormField::Position => &mut form.position,
            FormField::Kind => &mut form.kind,
            FormField::PositionCounter => &mut form.position_counter,
            FormField::PictureCounter => &mut form.picture_counter,
        }
    }
}

/// What one bounded poll of the surface produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// Nothing happened before the timeout
    Timeout,
    /// The operator edited a form field
    Input(FormField),
    /// Save control (`-save-`)
    Save,
    /// Exit control (`-exit-`)
    Exit,
    /// The surface went away (terminal closed, SIGTERM, SIGHUP, SIGINT)
    WindowClosed,
}

impl UiEvent {
    /// True for events that end the preview loop
    pub fn is_exit(&self) -> bool {
        matches!(self, UiEvent::Exit | UiEvent::WindowClosed)
    }
}

/// Operator-facing surface driven by the preview loop
pub trait UiSurface {
    /// Wait at most `timeout` for the next event
    fn read(&mut self, timeout: Duration) -> impl Future<Output = AppResult<UiEvent>>;

    /// Current form values
    fn form(&self) -> CaptureForm;

    /// Replace the preview image
    fn show_frame(&mut self, frame: RgbImage) -> AppResult<()>;

    /// Update the picture counter field (`-pic_cnt-`)
    fn set_picture_counter(&mut self, value: &str);

    /// Show a modal notification
    fn popup(&mut self, message: &str) -> AppResult<()>;

    /// Release the surface; called exactly once by the coordinator
    fn close(&mut self);
}
