// SPDX-License-Identifier: GPL-3.0-only

//! Station configuration
//!
//! Read once at startup from JSON. Every field has a default, so a partial
//! file only overrides what it names.

use crate::app::capture::CaptureForm;
use crate::app::frame_processor::DetectionParams;
use crate::backends::buttons::ButtonMap;
use crate::backends::camera::{CameraControls, PixelFormat, Resolution, SensorRotation};
use crate::constants::{
    CAPTURE_HEIGHT, CAPTURE_WIDTH, DATE_FIELD_FORMAT, DEFAULT_BUTTON_CODES,
    DEFAULT_BUTTON_DEVICE_NAME, DEFAULT_CAMERA_DEVICE, DEFAULT_CASCADE_PATH, DEFAULT_OUTPUT_DIR,
    DEFAULT_PICTURE_COUNTER, DEFAULT_POSITION, DEFAULT_POSITION_COUNTER, DEFAULT_SAMPLE_KINDS,
    DEFAULT_SENSOR_SUBDEVICE, DISPLAY_HEIGHT, DISPLAY_WIDTH, JpegQuality, UI_POLL_INTERVAL,
};
use crate::errors::{AppError, AppResult};
use crate::storage::render_counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory name under the user config dir
const CONFIG_DIR_NAME: &str = "genmai-capture";
const CONFIG_FILE_NAME: &str = "config.json";

/// Form values shown when the station starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialMetadata {
    /// Pre-filled date; today's date when unset
    pub date: Option<String>,
    pub position: String,
    /// Pre-selected kind; the first sample kind when unset
    pub kind: Option<String>,
    pub position_counter: String,
    pub picture_counter: u32,
}

impl Default for InitialMetadata {
    fn default() -> Self {
        Self {
            date: None,
            position: DEFAULT_POSITION.to_string(),
            kind: None,
            position_counter: DEFAULT_POSITION_COUNTER.to_string(),
            picture_counter: DEFAULT_PICTURE_COUNTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 video node of the station camera
    pub camera_device: String,
    /// Sensor subdevice carrying the WDR control
    pub sensor_subdevice: String,
    /// Turn on sensor wide dynamic range before streaming
    pub enable_wdr: bool,
    pub capture_resolution: Resolution,
    pub pixel_format: PixelFormat,
    pub display_resolution: Resolution,
    /// Correction for the camera's mounting orientation
    pub rotation: SensorRotation,
    pub camera_controls: CameraControls,
    pub poll_interval_ms: u64,
    /// Saved pictures go here; the directory must exist
    pub output_dir: PathBuf,
    pub jpeg_quality: JpegQuality,
    pub cascade_path: PathBuf,
    pub detection: DetectionParams,
    /// evdev name of the button panel
    pub button_device_name: String,
    /// Key code → button name allow-list
    pub button_codes: BTreeMap<u16, String>,
    /// Abort startup when the button panel is missing
    pub require_buttons: bool,
    /// Kinds offered in the kind selector
    pub sample_kinds: Vec<String>,
    pub initial_metadata: InitialMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: DEFAULT_CAMERA_DEVICE.to_string(),
            sensor_subdevice: DEFAULT_SENSOR_SUBDEVICE.to_string(),
            enable_wdr: true,
            capture_resolution: Resolution::new(CAPTURE_WIDTH, CAPTURE_HEIGHT),
            pixel_format: PixelFormat::default(),
            display_resolution: Resolution::new(DISPLAY_WIDTH, DISPLAY_HEIGHT),
            rotation: SensorRotation::default(),
            camera_controls: CameraControls::default(),
            poll_interval_ms: UI_POLL_INTERVAL.as_millis() as u64,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            jpeg_quality: JpegQuality::default(),
            cascade_path: PathBuf::from(DEFAULT_CASCADE_PATH),
            detection: DetectionParams::default(),
            button_device_name: DEFAULT_BUTTON_DEVICE_NAME.to_string(),
            button_codes: DEFAULT_BUTTON_CODES
                .iter()
                .map(|&(code, name)| (code, name.to_string()))
                .collect(),
            require_buttons: false,
            sample_kinds: DEFAULT_SAMPLE_KINDS.iter().map(|k| k.to_string()).collect(),
            initial_metadata: InitialMetadata::default(),
        }
    }
}

impl Config {
    /// Default config file location (`$XDG_CONFIG_HOME/genmai-capture/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(text: &str) -> AppResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the station cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.detection.scale_factor <= 1.0 {
            return Err(AppError::Config(format!(
                "detection.scale_factor must be greater than 1, got {}",
                self.detection.scale_factor
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be positive".into()));
        }
        if self.display_resolution.width == 0 || self.display_resolution.height == 0 {
            return Err(AppError::Config("display_resolution must not be empty".into()));
        }
        if self.sample_kinds.is_empty() {
            return Err(AppError::Config("sample_kinds must not be empty".into()));
        }
        if let Some(kind) = &self.initial_metadata.kind
            && !self.sample_kinds.contains(kind)
        {
            return Err(AppError::Config(format!(
                "initial kind '{}' is not one of sample_kinds",
                kind
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn button_map(&self) -> ButtonMap {
        ButtonMap::new(
            self.button_codes
                .iter()
                .map(|(&code, name)| (code, name.clone())),
        )
    }

    /// Form contents at startup, dating it `today` unless a date is configured
    pub fn initial_form(&self, today: chrono::NaiveDate) -> CaptureForm {
        let initial = &self.initial_metadata;
        CaptureForm {
            date: initial
                .date
                .clone()
                .unwrap_or_else(|| today.format(DATE_FIELD_FORMAT).to_string()),
            position: initial.position.clone(),
            kind: initial
                .kind
                .clone()
                .or_else(|| self.sample_kinds.first().cloned())
                .unwrap_or_default(),
            position_counter: initial.position_counter.clone(),
            picture_counter: render_counter(initial.picture_counter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_form_uses_today_and_first_kind() {
        let today = chrono::NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let form = Config::default().initial_form(today);

        assert_eq!(form.date, "2024/09/01");
        assert_eq!(form.position, "hara");
        assert_eq!(form.kind, "コシヒカリ");
        assert_eq!(form.position_counter, "01");
        assert_eq!(form.picture_counter, "001");
    }

    #[test]
    fn test_button_map_from_defaults() {
        let map = Config::default().button_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map.name(0x293), Some("O"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/genmai.json")));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
