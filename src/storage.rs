// SPDX-License-Identifier: MPL-2.0

//! Output directory checks and saved-file naming

use crate::constants::{PICTURE_COUNTER_WIDTH, SAVED_FILE_EXTENSION};
use crate::errors::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A picture file as it will be written by the save workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    dir: PathBuf,
    name: String,
}

impl SavedFile {
    /// Build the name `{date}_{position}_{kind}_{position_counter}_{picture_counter}.jpg`
    ///
    /// `date_digits` must already be reduced to digits; the picture counter is
    /// zero-padded to three places.
    pub fn new(
        dir: impl Into<PathBuf>,
        date_digits: &str,
        position: &str,
        kind: &str,
        position_counter: &str,
        picture_counter: u32,
    ) -> Self {
        let name = format!(
            "{}_{}_{}_{}_{}.{}",
            date_digits,
            position,
            kind,
            position_counter,
            render_counter(picture_counter),
            SAVED_FILE_EXTENSION
        );
        Self {
            dir: dir.into(),
            name,
        }
    }

    /// File name without directory
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Render a picture counter as shown in the form and in file names
pub fn render_counter(value: u32) -> String {
    format!("{:0width$}", value, width = PICTURE_COUNTER_WIDTH)
}

/// Keep only the digits of a date field (`2024/09/01` → `20240901`)
///
/// Full-width digits typed through an IME (`２０２４`) are folded to ASCII.
pub fn date_digits(date: &str) -> String {
    date.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect()
}

/// Check that the output directory exists and is a directory
///
/// The directory is never created here; a missing directory is reported so
/// the caller can warn before the first save fails.
pub fn check_output_dir(dir: &Path) -> AppResult<()> {
    let metadata = std::fs::metadata(dir)
        .map_err(|e| AppError::Storage(format!("{}: {}", dir.display(), e)))?;
    if !metadata.is_dir() {
        return Err(AppError::Storage(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    debug!(dir = %dir.display(), "Output directory available");
    Ok(())
}
