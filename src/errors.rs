// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture station

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Hardware button panel errors
    Button(ButtonError),
    /// Face detector errors
    Detector(DetectorError),
    /// Save workflow errors
    Capture(CaptureError),
    /// Photo encoding/write errors
    Photo(PhotoError),
    /// Configuration errors
    Config(String),
    /// UI surface errors
    Ui(String),
    /// Storage/filesystem errors
    Storage(String),
}

/// Camera-specific errors
#[derive(Debug, Clone)]
pub enum CameraError {
    /// Device could not be opened
    OpenFailed(String),
    /// Format negotiation failed
    ConfigureFailed(String),
    /// Streaming could not be started
    StartFailed(String),
    /// Operation requires a started camera
    NotStarted,
    /// Operation requires a configured camera
    NotConfigured,
    /// Camera was already closed
    Closed,
    /// A single frame could not be captured
    CaptureFailed(String),
    /// Driver delivered a pixel format we cannot convert
    UnsupportedFormat(String),
    /// V4L2 control ioctl failed
    ControlFailed(String),
}

/// Hardware button errors
#[derive(Debug, Clone)]
pub enum ButtonError {
    /// No input device with the configured name
    DeviceNotFound(String),
    /// Device exists but could not be opened or streamed
    OpenFailed(String),
    /// Reading the event stream failed
    ReadFailed(String),
}

/// Face detector errors
#[derive(Debug, Clone)]
pub enum DetectorError {
    /// Cascade file could not be read
    LoadFailed(String),
    /// Cascade file content is not a usable cascade
    InvalidCascade(String),
    /// Detection could not run on the given image
    DetectFailed(String),
}

/// Errors raised by a save trigger
///
/// None of these change the in-memory picture counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Picture counter field is not a non-negative integer
    InvalidCounter(String),
    /// Date field holds no digits
    InvalidDate(String),
    /// A filename component is empty or contains a path separator
    InvalidField { field: &'static str, value: String },
    /// Kind is not one of the configured sample kinds
    UnknownKind(String),
    /// Save requested before any frame was captured
    NoFrameAvailable,
    /// Persisting the frame failed
    Write(PhotoError),
}

/// Photo encode/write errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoError {
    /// Encoding failed
    EncodingFailed(String),
    /// Save failed
    SaveFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Button(e) => write!(f, "Button error: {}", e),
            AppError::Detector(e) => write!(f, "Face detector error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Photo(e) => write!(f, "Photo error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Ui(msg) => write!(f, "UI error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::ConfigureFailed(msg) => write!(f, "Failed to configure camera: {}", msg),
            CameraError::StartFailed(msg) => write!(f, "Failed to start camera: {}", msg),
            CameraError::NotStarted => write!(f, "Camera is not started"),
            CameraError::NotConfigured => write!(f, "Camera is not configured"),
            CameraError::Closed => write!(f, "Camera is closed"),
            CameraError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            CameraError::UnsupportedFormat(msg) => write!(f, "Unsupported pixel format: {}", msg),
            CameraError::ControlFailed(msg) => write!(f, "Control failed: {}", msg),
        }
    }
}

impl fmt::Display for ButtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonError::DeviceNotFound(name) => write!(f, "No input device named '{}'", name),
            ButtonError::OpenFailed(msg) => write!(f, "Failed to open button device: {}", msg),
            ButtonError::ReadFailed(msg) => write!(f, "Failed to read button events: {}", msg),
        }
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::LoadFailed(msg) => write!(f, "Failed to load cascade: {}", msg),
            DetectorError::InvalidCascade(msg) => write!(f, "Invalid cascade: {}", msg),
            DetectorError::DetectFailed(msg) => write!(f, "Detection failed: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InvalidCounter(value) => {
                write!(f, "Picture counter must be a number, got '{}'", value)
            }
            CaptureError::InvalidDate(value) => {
                write!(f, "Date must contain digits, got '{}'", value)
            }
            CaptureError::InvalidField { field, value } => {
                write!(f, "Invalid {}: '{}'", field, value)
            }
            CaptureError::UnknownKind(kind) => write!(f, "Unknown sample kind '{}'", kind),
            CaptureError::NoFrameAvailable => write!(f, "No frame available for capture"),
            CaptureError::Write(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for ButtonError {}
impl std::error::Error for DetectorError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for PhotoError {}

// Conversions from sub-errors to AppError
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<ButtonError> for AppError {
    fn from(err: ButtonError) -> Self {
        AppError::Button(err)
    }
}

impl From<DetectorError> for AppError {
    fn from(err: DetectorError) -> Self {
        AppError::Detector(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<PhotoError> for AppError {
    fn from(err: PhotoError) -> Self {
        AppError::Photo(err)
    }
}

impl From<PhotoError> for CaptureError {
    fn from(err: PhotoError) -> Self {
        CaptureError::Write(err)
    }
}

// Conversions for I/O errors
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(err: std::io::Error) -> Self {
        PhotoError::SaveFailed(err.to_string())
    }
}
