// SPDX-License-Identifier: GPL-3.0-only

//! Preview loop tests with in-memory collaborators

use futures::StreamExt;
use genmai_capture::app::frame_processor::types::{DetectionParams, FaceBox};
use genmai_capture::app::frame_processor::{FaceDetector, FrameProcessor};
use genmai_capture::app::{CaptureForm, CaptureStateMachine, Coordinator, Mode, UiEvent, UiSurface};
use genmai_capture::backends::buttons::{self, ButtonEvent, ButtonMap};
use genmai_capture::backends::camera::{
    Camera, CameraControls, CameraResult, PixelFormat, RawFrame, Resolution, SensorRotation,
};
use genmai_capture::errors::{AppError, AppResult, CameraError, DetectorError, PhotoError};
use genmai_capture::pipelines::photo::{JpegFileSink, PhotoSink};
use genmai_capture::JpegQuality;
use image::{GrayImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn frame() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| Rgb([(x * 13) as u8, (y * 29) as u8, 90]))
}

struct FakeCamera {
    log: Log,
    failures: VecDeque<bool>,
    sequence: u32,
}

impl FakeCamera {
    fn new(log: Log) -> Self {
        Self {
            log,
            failures: VecDeque::new(),
            sequence: 0,
        }
    }

    /// `true` entries fail the matching capture
    fn with_failures(mut self, failures: &[bool]) -> Self {
        self.failures = failures.iter().copied().collect();
        self
    }
}

impl Camera for FakeCamera {
    fn configure(&mut self, _: Resolution, _: PixelFormat) -> CameraResult<()> {
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        Ok(())
    }

    fn set_controls(&mut self, _: &CameraControls) -> CameraResult<()> {
        Ok(())
    }

    fn capture_array(&mut self) -> CameraResult<RawFrame> {
        if self.failures.pop_front().unwrap_or(false) {
            return Err(CameraError::CaptureFailed("dropped frame".into()));
        }
        self.sequence += 1;
        Ok(RawFrame::new(frame(), self.sequence))
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push("camera.stop");
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push("camera.close");
    }
}

#[derive(Default)]
struct UiRecord {
    shown: Vec<RgbImage>,
    popups: Vec<String>,
    counters: Vec<String>,
}

struct ScriptedUi {
    log: Log,
    record: Arc<Mutex<UiRecord>>,
    events: VecDeque<AppResult<UiEvent>>,
    form: CaptureForm,
}

impl ScriptedUi {
    fn new(log: Log, events: Vec<UiEvent>, form: CaptureForm) -> (Self, Arc<Mutex<UiRecord>>) {
        let record = Arc::new(Mutex::new(UiRecord::default()));
        let ui = Self {
            log,
            record: record.clone(),
            events: events.into_iter().map(Ok).collect(),
            form,
        };
        (ui, record)
    }

    fn failing_after(mut self, error: AppError) -> Self {
        self.events.push_back(Err(error));
        self
    }
}

impl UiSurface for ScriptedUi {
    async fn read(&mut self, _timeout: Duration) -> AppResult<UiEvent> {
        // Waiting for input lets spawned tasks run on the current-thread runtime
        tokio::task::yield_now().await;
        self.events.pop_front().unwrap_or(Ok(UiEvent::Exit))
    }

    fn form(&self) -> CaptureForm {
        self.form.clone()
    }

    fn show_frame(&mut self, frame: RgbImage) -> AppResult<()> {
        self.record.lock().unwrap().shown.push(frame);
        Ok(())
    }

    fn set_picture_counter(&mut self, value: &str) {
        self.form.picture_counter = value.to_string();
        self.record.lock().unwrap().counters.push(value.to_string());
    }

    fn popup(&mut self, message: &str) -> AppResult<()> {
        self.record.lock().unwrap().popups.push(message.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push("ui.close");
    }
}

struct FixedDetector(Vec<FaceBox>);

impl FaceDetector for FixedDetector {
    fn detect(&self, _: &GrayImage, _: &DetectionParams) -> Result<Vec<FaceBox>, DetectorError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    writes: Arc<Mutex<Vec<(PathBuf, RgbImage)>>>,
}

impl PhotoSink for RecordingSink {
    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), PhotoError> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), image.clone()));
        Ok(())
    }
}

fn scenario_form() -> CaptureForm {
    CaptureForm {
        date: "2024/09/01".into(),
        position: "hara".into(),
        kind: "コシヒカリ".into(),
        position_counter: "01".into(),
        picture_counter: "001".into(),
    }
}

fn kinds() -> Vec<String> {
    vec!["コシヒカリ".to_string(), "つや姫".to_string()]
}

fn processor(faces: Vec<FaceBox>) -> FrameProcessor<FixedDetector> {
    FrameProcessor::new(FixedDetector(faces), DetectionParams::default())
        .with_rotation(SensorRotation::None)
        .with_display_size(Resolution::new(WIDTH, HEIGHT))
}

#[tokio::test]
async fn test_save_writes_named_jpeg_and_advances_counter() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let (ui, record) = ScriptedUi::new(
        log.clone(),
        vec![UiEvent::Save, UiEvent::Exit],
        scenario_form(),
    );
    let capture =
        CaptureStateMachine::new(JpegFileSink::new(JpegQuality::High), dir.path(), kinds(), 1);

    let summary = Coordinator::new(FakeCamera::new(log), ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    let expected = dir.path().join("20240901_hara_コシヒカリ_01_001.jpg");
    assert!(expected.exists());
    let saved = image::open(&expected).unwrap();
    assert_eq!((saved.width(), saved.height()), (WIDTH, HEIGHT));

    let record = record.lock().unwrap();
    assert_eq!(record.counters, vec!["002"]);
    assert_eq!(record.popups, vec!["Saved 20240901_hara_コシヒカリ_01_001.jpg"]);
    assert_eq!(summary.saves, 1);
}

#[tokio::test]
async fn test_consecutive_saves_use_next_counter_and_same_pixels() {
    let log = Log::default();
    let sink = RecordingSink::default();
    let (ui, record) = ScriptedUi::new(
        log.clone(),
        vec![UiEvent::Save, UiEvent::Save, UiEvent::Exit],
        scenario_form(),
    );
    let capture = CaptureStateMachine::new(sink.clone(), "/station", kinds(), 1);

    let summary = Coordinator::new(FakeCamera::new(log), ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, PathBuf::from("/station/20240901_hara_コシヒカリ_01_001.jpg"));
    assert_eq!(writes[1].0, PathBuf::from("/station/20240901_hara_コシヒカリ_01_002.jpg"));
    assert_eq!(writes[0].1, writes[1].1);
    assert_eq!(record.lock().unwrap().counters, vec!["002", "003"]);
    assert_eq!(summary.saves, 2);
}

#[tokio::test]
async fn test_persisted_frame_carries_no_face_markers() {
    let log = Log::default();
    let sink = RecordingSink::default();
    let (ui, record) = ScriptedUi::new(log.clone(), vec![UiEvent::Save], scenario_form());
    let capture = CaptureStateMachine::new(sink.clone(), "/station", kinds(), 1);
    let faces = vec![FaceBox::new(2, 1, 6, 5)];

    Coordinator::new(FakeCamera::new(log), ui, processor(faces), capture)
        .run()
        .await
        .unwrap();

    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes[0].1, frame());

    let record = record.lock().unwrap();
    assert_ne!(record.shown[0], frame());
    assert_eq!(record.shown[0].get_pixel(2, 1), &Rgb([0, 0, 255]));
}

#[tokio::test]
async fn test_no_faces_shows_frame_unchanged() {
    let log = Log::default();
    let (ui, record) = ScriptedUi::new(log.clone(), vec![UiEvent::Timeout], scenario_form());
    let capture = CaptureStateMachine::new(RecordingSink::default(), "/station", kinds(), 1);

    Coordinator::new(FakeCamera::new(log), ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    assert_eq!(record.lock().unwrap().shown, vec![frame()]);
}

#[tokio::test]
async fn test_exit_releases_ui_then_camera_once() {
    let log = Log::default();
    let (ui, record) = ScriptedUi::new(
        log.clone(),
        vec![
            UiEvent::Timeout,
            UiEvent::Input(genmai_capture::app::FormField::Kind),
            UiEvent::WindowClosed,
        ],
        scenario_form(),
    );
    let capture = CaptureStateMachine::new(RecordingSink::default(), "/station", kinds(), 1);

    let summary = Coordinator::new(FakeCamera::new(log.clone()), ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["ui.close", "camera.stop", "camera.close"]);
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.frames, 2);
    assert_eq!(record.lock().unwrap().shown.len(), 2);
}

#[tokio::test]
async fn test_failed_capture_is_skipped() {
    let log = Log::default();
    let sink = RecordingSink::default();
    let (ui, record) = ScriptedUi::new(
        log.clone(),
        vec![UiEvent::Save, UiEvent::Timeout, UiEvent::Exit],
        scenario_form(),
    );
    let capture = CaptureStateMachine::new(sink.clone(), "/station", kinds(), 1);
    let camera = FakeCamera::new(log).with_failures(&[true, false]);

    let summary = Coordinator::new(camera, ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.capture_failures, 1);
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.saves, 0);
    assert!(sink.writes.lock().unwrap().is_empty());

    let record = record.lock().unwrap();
    assert_eq!(record.popups, vec!["No frame available for capture"]);
    assert!(record.counters.is_empty());
}

#[tokio::test]
async fn test_invalid_counter_reports_and_keeps_form() {
    let log = Log::default();
    let sink = RecordingSink::default();
    let form = CaptureForm {
        picture_counter: "abc".into(),
        ..scenario_form()
    };
    let (ui, record) = ScriptedUi::new(log.clone(), vec![UiEvent::Save], form);
    let capture = CaptureStateMachine::new(sink.clone(), "/station", kinds(), 1);

    let summary = Coordinator::new(FakeCamera::new(log), ui, processor(vec![]), capture)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.saves, 0);
    assert!(sink.writes.lock().unwrap().is_empty());

    let record = record.lock().unwrap();
    assert_eq!(record.popups, vec!["Picture counter must be a number, got 'abc'"]);
    assert!(record.counters.is_empty());
}

#[tokio::test]
async fn test_preview_mode_ignores_save() {
    let log = Log::default();
    let sink = RecordingSink::default();
    let (ui, record) = ScriptedUi::new(
        log.clone(),
        vec![UiEvent::Save, UiEvent::Exit],
        scenario_form(),
    );
    let capture = CaptureStateMachine::new(sink.clone(), "/station", kinds(), 1);

    let summary = Coordinator::new(FakeCamera::new(log), ui, processor(vec![]), capture)
        .with_mode(Mode::Preview)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.frames, 1);
    assert_eq!(summary.saves, 0);
    assert!(sink.writes.lock().unwrap().is_empty());
    assert!(record.lock().unwrap().popups.is_empty());
}

#[tokio::test]
async fn test_ui_failure_propagates_after_release() {
    let log = Log::default();
    let (ui, _record) = ScriptedUi::new(log.clone(), vec![UiEvent::Timeout], scenario_form());
    let ui = ui.failing_after(AppError::Ui("terminal gone".into()));
    let capture = CaptureStateMachine::new(RecordingSink::default(), "/station", kinds(), 1);

    let result = Coordinator::new(FakeCamera::new(log.clone()), ui, processor(vec![]), capture)
        .run()
        .await;

    assert!(matches!(result, Err(AppError::Ui(_))));
    assert_eq!(*log.lock().unwrap(), vec!["ui.close", "camera.stop", "camera.close"]);
}

/// Log sink shared between the test and the fmt subscriber
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_button_stream_runs_alongside_preview() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let log = Log::default();
    let (ui, _record) = ScriptedUi::new(
        log.clone(),
        vec![UiEvent::Timeout, UiEvent::Timeout, UiEvent::Exit],
        scenario_form(),
    );
    let capture = CaptureStateMachine::new(RecordingSink::default(), "/station", kinds(), 1);
    let map = ButtonMap::new([(0x290u16, "F1"), (0x293, "O")]);
    let events = futures::stream::iter(vec![
        map.resolve(0x290, 1),
        map.resolve(30, 1),
        map.resolve(0x293, 1),
    ])
    .boxed();

    let summary = Coordinator::new(FakeCamera::new(log.clone()), ui, processor(vec![]), capture)
        .with_buttons(events)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.frames, 2);
    assert_eq!(log.lock().unwrap().len(), 3);

    let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let button_lines: Vec<&str> = output.lines().filter(|l| l.contains("Button event")).collect();
    assert_eq!(button_lines.len(), 2, "{}", output);
    assert!(button_lines[0].contains("name=F1"));
    assert!(button_lines[1].contains("name=O"));
    assert!(!output.contains("code=30"));
}

#[tokio::test]
async fn test_listener_counts_only_allow_listed_buttons() {
    let map = ButtonMap::new([(0x290u16, "F1"), (0x293, "O")]);
    let events: Vec<ButtonEvent> = vec![
        map.resolve(0x290, 1),
        map.resolve(0x290, 0),
        map.resolve(30, 1),
        map.resolve(0x293, 1),
    ];

    let named: Vec<_> = buttons::named_events(futures::stream::iter(events.clone()))
        .collect()
        .await;
    let names: Vec<&str> = named.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["F1", "F1", "O"]);

    assert_eq!(buttons::listen(futures::stream::iter(events)).await, 3);
}
