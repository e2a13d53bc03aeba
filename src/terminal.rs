// SPDX-License-Identifier: GPL-3.0-only

//! Terminal operator surface
//!
//! Renders the preview to the terminal using Unicode half-block characters
//! for improved vertical resolution, with the metadata form and a status bar
//! underneath. Popups are drawn as a bordered box over the preview.

use crate::app::capture::CaptureForm;
use crate::app::ui::{FormField, UiEvent, UiSurface};
use crate::errors::{AppError, AppResult};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use image::RgbImage;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph, Widget, Wrap},
};
use std::io::{self, Stdout, stdout};
use std::time::Duration;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{info, warn};

/// What a key press did to the form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Nothing changed
    Ignored,
    /// Only the on-screen state changed (focus, popup dismissed)
    Redraw,
    /// Report this to the preview loop
    Event(UiEvent),
}

/// Form contents, focus and popup, independent of the terminal
#[derive(Debug, Clone)]
pub struct FormState {
    form: CaptureForm,
    focus: FormField,
    kinds: Vec<String>,
    popup: Option<String>,
}

impl FormState {
    pub fn new(form: CaptureForm, kinds: Vec<String>) -> Self {
        Self {
            form,
            focus: FormField::Date,
            kinds,
            popup: None,
        }
    }

    pub fn form(&self) -> &CaptureForm {
        &self.form
    }

    pub fn focus(&self) -> FormField {
        self.focus
    }

    pub fn popup(&self) -> Option<&str> {
        self.popup.as_deref()
    }

    pub fn set_popup(&mut self, message: &str) {
        self.popup = Some(message.to_string());
    }

    pub fn set_picture_counter(&mut self, value: &str) {
        self.form.picture_counter = value.to_string();
    }

    /// Apply one key press
    ///
    /// While a popup is open the next press only dismisses it. With
    /// `editable` false the form ignores edits and only exit/save remain.
    pub fn handle_key(&mut self, key: KeyEvent, editable: bool) -> KeyOutcome {
        if key.kind != KeyEventKind::Press {
            return KeyOutcome::Ignored;
        }
        if self.popup.take().is_some() {
            return KeyOutcome::Redraw;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => KeyOutcome::Event(UiEvent::Exit),
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => KeyOutcome::Event(UiEvent::Exit),
            KeyCode::Char('s') if ctrl => KeyOutcome::Event(UiEvent::Save),
            KeyCode::F(5) | KeyCode::Enter => KeyOutcome::Event(UiEvent::Save),
            _ if !editable => KeyOutcome::Ignored,
            KeyCode::Tab => {
                self.focus = self.focus.next();
                KeyOutcome::Redraw
            }
            KeyCode::BackTab => {
                self.focus = self.focus.previous();
                KeyOutcome::Redraw
            }
            KeyCode::Left if self.focus == FormField::Kind => self.cycle_kind(false),
            KeyCode::Right if self.focus == FormField::Kind => self.cycle_kind(true),
            KeyCode::Backspace if self.focus != FormField::Kind => {
                self.focus.get_mut(&mut self.form).pop();
                KeyOutcome::Event(UiEvent::Input(self.focus))
            }
            KeyCode::Char(c) if !ctrl && self.focus != FormField::Kind => {
                self.focus.get_mut(&mut self.form).push(c);
                KeyOutcome::Event(UiEvent::Input(self.focus))
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn cycle_kind(&mut self, forward: bool) -> KeyOutcome {
        if self.kinds.is_empty() {
            return KeyOutcome::Ignored;
        }
        let len = self.kinds.len();
        let next = match self.kinds.iter().position(|k| k == &self.form.kind) {
            Some(idx) if forward => (idx + 1) % len,
            Some(idx) => (idx + len - 1) % len,
            None => 0,
        };
        self.form.kind = self.kinds[next].clone();
        KeyOutcome::Event(UiEvent::Input(FormField::Kind))
    }
}

/// Why a poll woke up
enum Wake {
    Deadline,
    Signal(&'static str),
    Input(Option<io::Result<Event>>),
}

/// Signals that close the operator window
pub struct TerminationSignals {
    terminate: Signal,
    hangup: Signal,
    interrupt: Signal,
}

impl TerminationSignals {
    /// Register SIGTERM, SIGHUP and SIGINT handlers (needs a tokio runtime)
    pub fn install() -> AppResult<Self> {
        let terminate =
            signal(SignalKind::terminate()).map_err(|e| ui_err("SIGTERM handler", e))?;
        let hangup = signal(SignalKind::hangup()).map_err(|e| ui_err("SIGHUP handler", e))?;
        let interrupt =
            signal(SignalKind::interrupt()).map_err(|e| ui_err("SIGINT handler", e))?;
        Ok(Self {
            terminate,
            hangup,
            interrupt,
        })
    }

    /// Wait for the next termination signal and return its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

/// Full-screen terminal implementation of [`UiSurface`]
pub struct TerminalSurface {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    events: EventStream,
    signals: TerminationSignals,
    state: FormState,
    show_form: bool,
    title: String,
    frame: Option<RgbImage>,
    closed: bool,
}

fn ui_err(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Ui(format!("{}: {}", context, e))
}

impl TerminalSurface {
    /// Take over the terminal
    ///
    /// Must be called inside the tokio runtime (signal handlers are
    /// registered here). `show_form` false gives the preview-only layout.
    pub fn open(
        form: CaptureForm,
        kinds: Vec<String>,
        show_form: bool,
        title: impl Into<String>,
    ) -> AppResult<Self> {
        let signals = TerminationSignals::install()?;

        enable_raw_mode().map_err(|e| ui_err("raw mode", e))?;
        let mut out = stdout();
        if let Err(e) = execute!(out, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(ui_err("alternate screen", e));
        }
        let terminal = match Terminal::new(CrosstermBackend::new(out)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(stdout(), LeaveAlternateScreen);
                return Err(ui_err("terminal", e));
            }
        };

        let mut surface = Self {
            terminal,
            events: EventStream::new(),
            signals,
            state: FormState::new(form, kinds),
            show_form,
            title: title.into(),
            frame: None,
            closed: false,
        };
        surface.draw()?;
        info!(show_form, "Terminal surface opened");
        Ok(surface)
    }

    fn draw(&mut self) -> AppResult<()> {
        let Self {
            terminal,
            state,
            show_form,
            title,
            frame,
            ..
        } = self;

        terminal
            .draw(|f| {
                let area = f.area();
                let form_height = if *show_form { 1 } else { 0 };
                let [frame_area, form_area, status_area] = Layout::vertical([
                    Constraint::Min(1),
                    Constraint::Length(form_height),
                    Constraint::Length(1),
                ])
                .areas(area);

                f.render_widget(FrameWidget { frame: frame.as_ref() }, frame_area);

                if *show_form {
                    f.render_widget(Paragraph::new(form_line(state)), form_area);
                }

                let message = status_message(*show_form);
                f.render_widget(StatusBar { message: &message }, status_area);

                if let Some(text) = state.popup() {
                    let popup_area = centered(area, 60, 5);
                    f.render_widget(Clear, popup_area);
                    f.render_widget(
                        Paragraph::new(text)
                            .wrap(Wrap { trim: true })
                            .block(Block::bordered().title(title.as_str())),
                        popup_area,
                    );
                }
            })
            .map_err(|e| ui_err("draw", e))?;
        Ok(())
    }

    async fn wait(&mut self, timeout: Duration) -> Wake {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => Wake::Deadline,
            name = self.signals.recv() => Wake::Signal(name),
            next = self.events.next() => Wake::Input(next),
        }
    }
}

impl UiSurface for TerminalSurface {
    async fn read(&mut self, timeout: Duration) -> AppResult<UiEvent> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.wait(remaining).await {
                Wake::Deadline => return Ok(UiEvent::Timeout),
                Wake::Signal(name) => {
                    info!(signal = name, "Termination signal received");
                    return Ok(UiEvent::WindowClosed);
                }
                Wake::Input(None) => return Ok(UiEvent::WindowClosed),
                Wake::Input(Some(Err(e))) => return Err(ui_err("terminal input", e)),
                Wake::Input(Some(Ok(Event::Key(key)))) => {
                    match self.state.handle_key(key, self.show_form) {
                        KeyOutcome::Ignored => {}
                        KeyOutcome::Redraw => self.draw()?,
                        KeyOutcome::Event(event) => {
                            if matches!(event, UiEvent::Input(_)) {
                                self.draw()?;
                            }
                            return Ok(event);
                        }
                    }
                }
                Wake::Input(Some(Ok(Event::Resize(..)))) => self.draw()?,
                Wake::Input(Some(Ok(_))) => {}
            }
        }
    }

    fn form(&self) -> CaptureForm {
        self.state.form().clone()
    }

    fn show_frame(&mut self, frame: RgbImage) -> AppResult<()> {
        self.frame = Some(frame);
        self.draw()
    }

    fn set_picture_counter(&mut self, value: &str) {
        self.state.set_picture_counter(value);
    }

    fn popup(&mut self, message: &str) -> AppResult<()> {
        self.state.set_popup(message);
        self.draw()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Restore terminal
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to leave raw mode");
        }
        if let Err(e) = execute!(self.terminal.backend_mut(), LeaveAlternateScreen) {
            warn!(error = %e, "Failed to leave alternate screen");
        }
        if let Err(e) = self.terminal.show_cursor() {
            warn!(error = %e, "Failed to show cursor");
        }
        info!("Terminal surface closed");
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.close();
    }
}

fn status_message(show_form: bool) -> String {
    if show_form {
        "Enter/F5/Ctrl+S save | Tab field | ←/→ kind | Esc quit".to_string()
    } else {
        "Camera test | Esc/Ctrl+C quit".to_string()
    }
}

fn form_line(state: &FormState) -> Line<'static> {
    let mut spans = Vec::new();
    for field in FormField::ALL {
        let value = field.get(state.form());
        let shown = if field == FormField::Kind {
            format!("‹{}›", value)
        } else {
            format!("[{}]", value)
        };
        let style = if field == state.focus() {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        spans.push(Span::raw(format!(" {} ", field.label())));
        spans.push(Span::styled(shown, style));
    }
    Line::from(spans)
}

/// Rectangle of at most `width` x `height` centered in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Widget that renders a frame using half-block characters
struct FrameWidget<'a> {
    frame: Option<&'a RgbImage>,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.filter(|f| f.width() > 0 && f.height() > 0) else {
            // No frame yet - show placeholder
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &RgbImage, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    let [r, g, b] = frame.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sigint_closes_the_window() {
        let mut signals = TerminationSignals::install().unwrap();
        unsafe {
            libc::raise(libc::SIGINT);
        }
        let name = tokio::time::timeout(Duration::from_secs(2), signals.recv())
            .await
            .unwrap();
        assert_eq!(name, "SIGINT");
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn state() -> FormState {
        FormState::new(
            CaptureForm {
                date: "2024/09/01".into(),
                position: "hara".into(),
                kind: "コシヒカリ".into(),
                position_counter: "01".into(),
                picture_counter: "001".into(),
            },
            vec!["コシヒカリ".into(), "つや姫".into()],
        )
    }

    #[test]
    fn test_exit_and_save_controls() {
        let mut s = state();
        assert_eq!(s.handle_key(key(KeyCode::Esc), true), KeyOutcome::Event(UiEvent::Exit));
        assert_eq!(s.handle_key(ctrl('c'), true), KeyOutcome::Event(UiEvent::Exit));
        assert_eq!(s.handle_key(ctrl('q'), false), KeyOutcome::Event(UiEvent::Exit));
        assert_eq!(s.handle_key(ctrl('s'), true), KeyOutcome::Event(UiEvent::Save));
        assert_eq!(s.handle_key(key(KeyCode::F(5)), true), KeyOutcome::Event(UiEvent::Save));
        assert_eq!(s.handle_key(key(KeyCode::Enter), true), KeyOutcome::Event(UiEvent::Save));
    }

    #[test]
    fn test_typing_edits_focused_field() {
        let mut s = state();
        s.handle_key(key(KeyCode::Tab), true);
        assert_eq!(s.focus(), FormField::Position);

        assert_eq!(
            s.handle_key(key(KeyCode::Backspace), true),
            KeyOutcome::Event(UiEvent::Input(FormField::Position))
        );
        s.handle_key(key(KeyCode::Char('u')), true);
        assert_eq!(s.form().position, "haru");
    }

    #[test]
    fn test_kind_cycles_through_kinds() {
        let mut s = state();
        s.handle_key(key(KeyCode::Tab), true);
        s.handle_key(key(KeyCode::Tab), true);
        assert_eq!(s.focus(), FormField::Kind);

        s.handle_key(key(KeyCode::Right), true);
        assert_eq!(s.form().kind, "つや姫");
        s.handle_key(key(KeyCode::Right), true);
        assert_eq!(s.form().kind, "コシヒカリ");
        s.handle_key(key(KeyCode::Left), true);
        assert_eq!(s.form().kind, "つや姫");

        // Kind is a selector, not free text
        assert_eq!(s.handle_key(key(KeyCode::Char('x')), true), KeyOutcome::Ignored);
    }

    #[test]
    fn test_popup_swallows_next_key() {
        let mut s = state();
        s.set_popup("Saved");
        assert_eq!(s.handle_key(key(KeyCode::Esc), true), KeyOutcome::Redraw);
        assert!(s.popup().is_none());
        assert_eq!(s.handle_key(key(KeyCode::Esc), true), KeyOutcome::Event(UiEvent::Exit));
    }

    #[test]
    fn test_read_only_form_ignores_edits() {
        let mut s = state();
        assert_eq!(s.handle_key(key(KeyCode::Char('9')), false), KeyOutcome::Ignored);
        assert_eq!(s.handle_key(key(KeyCode::Tab), false), KeyOutcome::Ignored);
        assert_eq!(s.form().date, "2024/09/01");
    }

    #[test]
    fn test_frame_widget_uses_half_blocks() {
        let mut image = RgbImage::new(4, 4);
        for x in 0..4 {
            image.put_pixel(x, 0, image::Rgb([255, 0, 0]));
        }
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        FrameWidget { frame: Some(&image) }.render(area, &mut buf);

        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
        assert_eq!(cell.bg, Color::Rgb(0, 0, 0));
    }

    #[test]
    fn test_status_bar_truncates_by_character() {
        let area = Rect::new(0, 0, 3, 1);
        let mut buf = Buffer::empty(area);
        StatusBar { message: "←/→ kind" }.render(area, &mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "←");
    }
}
