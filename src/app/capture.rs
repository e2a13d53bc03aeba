// SPDX-License-Identifier: GPL-3.0-only

//! Save workflow
//!
//! Turns a save trigger into a validated file name, a JPEG on disk and an
//! advanced picture counter.
//!
//! ```text
//!             on_save_trigger
//! Previewing ────────────────► Saving ──► validate ──► SavedFile ──► PhotoSink
//!     ▲                                                                 │
//!     └──────────── counter + 1 (only when the write succeeded) ◄───────┘
//! ```

use crate::errors::CaptureError;
use crate::pipelines::photo::PhotoSink;
use crate::storage::{SavedFile, date_digits, render_counter};
use image::RgbImage;
use std::path::PathBuf;
use tracing::{info, warn};

/// Operator-entered metadata as it stands in the form
///
/// Every field is raw text; nothing here has been validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureForm {
    pub date: String,
    pub position: String,
    pub kind: String,
    pub position_counter: String,
    pub picture_counter: String,
}

/// Metadata that passed validation and can name a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetadata {
    /// Date with every non-digit removed
    pub date_digits: String,
    pub position: String,
    pub kind: String,
    pub position_counter: String,
    pub picture_counter: u32,
}

impl CaptureMetadata {
    /// Validate a form against the configured sample kinds
    ///
    /// An empty `kinds` list accepts any kind.
    pub fn from_form(form: &CaptureForm, kinds: &[String]) -> Result<Self, CaptureError> {
        let picture_counter = form
            .picture_counter
            .trim()
            .parse::<u32>()
            .map_err(|_| CaptureError::InvalidCounter(form.picture_counter.clone()))?;

        let digits = date_digits(&form.date);
        if digits.is_empty() {
            return Err(CaptureError::InvalidDate(form.date.clone()));
        }

        check_field("position", &form.position)?;
        check_field("kind", &form.kind)?;
        check_field("position counter", &form.position_counter)?;

        if !kinds.is_empty() && !kinds.iter().any(|k| k == &form.kind) {
            return Err(CaptureError::UnknownKind(form.kind.clone()));
        }

        Ok(Self {
            date_digits: digits,
            position: form.position.clone(),
            kind: form.kind.clone(),
            position_counter: form.position_counter.clone(),
            picture_counter,
        })
    }

    pub fn saved_file(&self, dir: impl Into<PathBuf>) -> SavedFile {
        SavedFile::new(
            dir,
            &self.date_digits,
            &self.position,
            &self.kind,
            &self.position_counter,
            self.picture_counter,
        )
    }
}

/// A filename component must be non-empty and stay inside the output directory
fn check_field(field: &'static str, value: &str) -> Result<(), CaptureError> {
    if value.is_empty() || value.contains('/') || value.contains('\0') {
        return Err(CaptureError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Previewing,
    Saving,
}

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub file: SavedFile,
    /// Counter value the form should show next
    pub next_counter: u32,
}

impl SaveOutcome {
    /// Counter as the form renders it (`"002"`)
    pub fn next_counter_text(&self) -> String {
        render_counter(self.next_counter)
    }
}

/// Holds the running picture counter and performs saves
pub struct CaptureStateMachine<S> {
    sink: S,
    output_dir: PathBuf,
    kinds: Vec<String>,
    state: CaptureState,
    picture_counter: u32,
    saves: u64,
}

impl<S: PhotoSink> CaptureStateMachine<S> {
    pub fn new(
        sink: S,
        output_dir: impl Into<PathBuf>,
        kinds: Vec<String>,
        initial_counter: u32,
    ) -> Self {
        Self {
            sink,
            output_dir: output_dir.into(),
            kinds,
            state: CaptureState::Previewing,
            picture_counter: initial_counter,
            saves: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Counter the next save will use unless the operator edits it
    pub fn picture_counter(&self) -> u32 {
        self.picture_counter
    }

    pub fn picture_counter_text(&self) -> String {
        render_counter(self.picture_counter)
    }

    /// Successful saves in this process
    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Validate the form, persist `frame` and advance the counter
    ///
    /// On any error the counter is left exactly as it was.
    pub fn on_save_trigger(
        &mut self,
        form: &CaptureForm,
        frame: &RgbImage,
    ) -> Result<SaveOutcome, CaptureError> {
        self.state = CaptureState::Saving;
        let result = self.save(form, frame);
        self.state = CaptureState::Previewing;

        match &result {
            Ok(outcome) => info!(
                file = outcome.file.name(),
                next_counter = outcome.next_counter,
                "Picture saved"
            ),
            Err(e) => warn!(error = %e, "Save rejected"),
        }
        result
    }

    fn save(&mut self, form: &CaptureForm, frame: &RgbImage) -> Result<SaveOutcome, CaptureError> {
        let metadata = CaptureMetadata::from_form(form, &self.kinds)?;
        let next_counter = metadata
            .picture_counter
            .checked_add(1)
            .ok_or_else(|| CaptureError::InvalidCounter(form.picture_counter.clone()))?;
        let file = metadata.saved_file(&self.output_dir);

        self.sink.write(&file.path(), frame)?;

        self.picture_counter = next_counter;
        self.saves += 1;

        Ok(SaveOutcome { file, next_counter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PhotoError;
    use crate::pipelines::photo::{JpegFileSink, write_create_only};
    use std::cell::{Cell, RefCell};
    use std::io::{self, Write};
    use std::path::Path;

    #[derive(Default)]
    struct RecordingSink {
        writes: RefCell<Vec<PathBuf>>,
        fail: bool,
    }

    impl PhotoSink for RecordingSink {
        fn write(&self, path: &Path, _image: &RgbImage) -> Result<(), PhotoError> {
            if self.fail {
                return Err(PhotoError::SaveFailed("read-only".into()));
            }
            self.writes.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    fn kinds() -> Vec<String> {
        vec!["コシヒカリ".to_string(), "つや姫".to_string()]
    }

    fn form(counter: &str) -> CaptureForm {
        CaptureForm {
            date: "2024/09/01".into(),
            position: "hara".into(),
            kind: "コシヒカリ".into(),
            position_counter: "01".into(),
            picture_counter: counter.into(),
        }
    }

    fn machine(sink: RecordingSink) -> CaptureStateMachine<RecordingSink> {
        CaptureStateMachine::new(sink, "/data/_capture", kinds(), 1)
    }

    #[test]
    fn test_save_names_file_and_advances_counter() {
        let mut capture = machine(RecordingSink::default());
        let outcome = capture.on_save_trigger(&form("001"), &RgbImage::new(2, 2)).unwrap();

        assert_eq!(outcome.file.name(), "20240901_hara_コシヒカリ_01_001.jpg");
        assert_eq!(outcome.next_counter_text(), "002");
        assert_eq!(capture.picture_counter_text(), "002");
        assert_eq!(capture.state(), CaptureState::Previewing);
        assert_eq!(
            capture.sink().writes.borrow().as_slice(),
            &[PathBuf::from("/data/_capture/20240901_hara_コシヒカリ_01_001.jpg")]
        );
    }

    #[test]
    fn test_operator_edited_counter_wins() {
        let mut capture = machine(RecordingSink::default());
        let outcome = capture.on_save_trigger(&form("17"), &RgbImage::new(1, 1)).unwrap();

        assert_eq!(outcome.file.name(), "20240901_hara_コシヒカリ_01_017.jpg");
        assert_eq!(capture.picture_counter(), 18);
    }

    #[test]
    fn test_non_numeric_counter_is_rejected() {
        let mut capture = machine(RecordingSink::default());
        let err = capture.on_save_trigger(&form("abc"), &RgbImage::new(1, 1)).unwrap_err();

        assert_eq!(err, CaptureError::InvalidCounter("abc".into()));
        assert_eq!(capture.picture_counter(), 1);
        assert!(capture.sink().writes.borrow().is_empty());
    }

    #[test]
    fn test_negative_counter_is_rejected() {
        let mut capture = machine(RecordingSink::default());
        let err = capture.on_save_trigger(&form("-1"), &RgbImage::new(1, 1)).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidCounter(_)));
    }

    #[test]
    fn test_write_failure_keeps_counter() {
        let mut capture = machine(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let err = capture.on_save_trigger(&form("005"), &RgbImage::new(1, 1)).unwrap_err();

        assert!(matches!(err, CaptureError::Write(PhotoError::SaveFailed(_))));
        assert_eq!(capture.picture_counter(), 1);
        assert_eq!(capture.saves(), 0);
        assert_eq!(capture.state(), CaptureState::Previewing);
    }

    /// Fails its first write after part of the file went out
    struct DiskFullOnceSink {
        failed: Cell<bool>,
    }

    impl PhotoSink for DiskFullOnceSink {
        fn write(&self, path: &Path, image: &RgbImage) -> Result<(), PhotoError> {
            if !self.failed.replace(true) {
                return write_create_only(path, |file| {
                    file.write_all(&[0xff, 0xd8])?;
                    Err(io::Error::other("No space left on device"))
                });
            }
            JpegFileSink::default().write(path, image)
        }
    }

    #[test]
    fn test_retry_after_interrupted_write_reuses_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskFullOnceSink {
            failed: Cell::new(false),
        };
        let mut capture = CaptureStateMachine::new(sink, dir.path(), kinds(), 1);
        let frame = RgbImage::new(4, 4);

        let err = capture.on_save_trigger(&form("001"), &frame).unwrap_err();
        assert!(matches!(err, CaptureError::Write(PhotoError::SaveFailed(_))));
        assert_eq!(capture.picture_counter(), 1);

        let outcome = capture.on_save_trigger(&form("001"), &frame).unwrap();
        assert_eq!(outcome.file.name(), "20240901_hara_コシヒカリ_01_001.jpg");
        assert!(outcome.file.path().exists());
        assert_eq!(capture.picture_counter(), 2);
    }

    #[test]
    fn test_full_width_date_names_file_with_ascii_digits() {
        let mut f = form("1");
        f.date = "２０２４/０９/０１".into();
        let meta = CaptureMetadata::from_form(&f, &kinds()).unwrap();
        assert_eq!(meta.date_digits, "20240901");
    }

    #[test]
    fn test_field_validation() {
        let kinds = kinds();

        let mut f = form("1");
        f.date = "--/--".into();
        assert!(matches!(
            CaptureMetadata::from_form(&f, &kinds),
            Err(CaptureError::InvalidDate(_))
        ));

        let mut f = form("1");
        f.position = "../etc".into();
        assert!(matches!(
            CaptureMetadata::from_form(&f, &kinds),
            Err(CaptureError::InvalidField { field: "position", .. })
        ));

        let mut f = form("1");
        f.position_counter = String::new();
        assert!(matches!(
            CaptureMetadata::from_form(&f, &kinds),
            Err(CaptureError::InvalidField { field: "position counter", .. })
        ));

        let mut f = form("1");
        f.kind = "basmati".into();
        assert_eq!(
            CaptureMetadata::from_form(&f, &kinds),
            Err(CaptureError::UnknownKind("basmati".into()))
        );
        assert!(CaptureMetadata::from_form(&f, &[]).is_ok());
    }

    #[test]
    fn test_counter_overflow_does_not_wrap() {
        let mut capture = machine(RecordingSink::default());
        let err = capture
            .on_save_trigger(&form(&u32::MAX.to_string()), &RgbImage::new(1, 1))
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidCounter(_)));
        assert_eq!(capture.picture_counter(), 1);
    }
}
