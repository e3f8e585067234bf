//! Terminal User Interface module for Video Cropper
//! Built with Ratatui; the preview frame is drawn with half-block cells

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use image::RgbImage;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::geometry::{centered_for_ratio, Letterbox};
use crate::preview::{self, PreviewCanvas};
use crate::types::{AspectPreset, CropRect, Size, VideoInfo, APP_NAME, APP_VERSION};
use crate::video;

/// Messages sent from background tasks to the TUI
#[derive(Debug, Clone)]
pub enum AppMessage {
    /// Update current status message
    Status(String),
    /// Add a log entry
    Log(LogLevel, String),
    /// Update export progress (0.0 - 1.0)
    Progress(f64, String),
    /// A video was probed and is ready to edit
    VideoLoaded(VideoInfo),
    /// A full preview frame was decoded
    FrameLoaded {
        request: u64,
        timestamp: f64,
        image: RgbImage,
    },
    /// A cropped preview frame was decoded
    CroppedPreview(RgbImage),
    /// An export job began writing to this path
    ExportStarted(PathBuf),
    /// Export finished and the file is in place
    ExportFinished(PathBuf),
    /// Export failed or was cancelled
    ExportFailed(String),
    /// A native file dialog closed, with the chosen path if any
    DialogClosed(PathPurpose, Option<PathBuf>),
    /// Error occurred
    Error(String),
}

/// Log levels for messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// What a typed path will be used for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathPurpose {
    Open,
    SaveAs,
}

/// Current screen/state of the application
#[derive(Debug, Clone, PartialEq)]
pub enum AppScreen {
    /// No video opened yet
    Welcome,
    /// Crop editor
    Editor,
    /// Typed path entry when no file dialog is available
    PathInput(PathPurpose),
    /// Confirm replacing the opened file
    ConfirmOverwrite,
}

/// Work the event loop must start on behalf of the UI
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenDialog,
    Open(PathBuf),
    LoadFrame(f64),
    PreviewCrop,
    SaveAsDialog,
    Export(PathBuf),
    ExportOverwrite,
    CancelExport,
    OpenLastExport,
}

/// Log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

/// Main application state
pub struct App {
    /// Current screen
    pub screen: AppScreen,
    /// Screen to go back to from path input
    pub previous_screen: AppScreen,
    /// Application start time
    pub start_time: Instant,
    /// Current status message
    pub status: String,
    /// Log entries
    pub logs: Vec<LogEntry>,
    /// Current export progress (0.0 - 1.0)
    pub progress: f64,
    /// Progress label
    pub progress_label: String,
    /// User input buffer
    pub input: String,
    /// Cursor position in input (in characters)
    pub cursor_pos: usize,
    /// Whether app should quit
    pub should_quit: bool,
    /// Loaded settings
    pub config: AppConfig,
    /// Probed video being edited
    pub video: Option<VideoInfo>,
    /// Crop box in source pixels
    pub crop: CropRect,
    /// Active aspect preset
    pub preset: AspectPreset,
    /// Decoded full frame shown behind the crop box
    pub frame: Option<RgbImage>,
    /// Timestamp of the shown frame
    pub frame_timestamp: f64,
    /// Last frame request id; older results are dropped
    pub frame_request: u64,
    /// Decoded cropped preview
    pub cropped_preview: Option<RgbImage>,
    /// Show the cropped preview instead of the full frame
    pub show_cropped: bool,
    /// Canvas point where the current mouse drag started
    pub drag_anchor: Option<(i32, i32)>,
    /// Crop box before the current drag, restored if the drag is empty
    pub drag_origin: Option<CropRect>,
    /// Whole terminal area, refreshed by the event loop
    pub viewport: Rect,
    /// Whether an export is running
    pub exporting: bool,
    /// Last successfully exported file
    pub last_export: Option<PathBuf>,
}

impl App {
    /// Create new app instance
    pub fn new(config: AppConfig) -> Self {
        let preset = config.default_preset;
        Self {
            screen: AppScreen::Welcome,
            previous_screen: AppScreen::Welcome,
            start_time: Instant::now(),
            status: "Ready".to_string(),
            logs: Vec::new(),
            progress: 0.0,
            progress_label: String::new(),
            input: String::new(),
            cursor_pos: 0,
            should_quit: false,
            config,
            video: None,
            crop: CropRect::default(),
            preset,
            frame: None,
            frame_timestamp: 0.0,
            frame_request: 0,
            cropped_preview: None,
            show_cropped: false,
            drag_anchor: None,
            drag_origin: None,
            viewport: Rect::default(),
            exporting: false,
            last_export: None,
        }
    }

    /// Get formatted uptime
    pub fn uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: String) {
        let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
        self.logs.push(LogEntry {
            level,
            message,
            timestamp,
        });
        // Keep logs manageable
        if self.logs.len() > 200 {
            self.logs.remove(0);
        }
    }

    pub fn frame_size(&self) -> Option<Size> {
        self.video.as_ref().map(VideoInfo::frame_size)
    }

    /// Id for a new frame request; older in-flight frames become stale
    pub fn next_frame_request(&mut self) -> u64 {
        self.frame_request += 1;
        self.frame_request
    }

    /// Switch preset, snapping the box to the largest centered fit
    pub fn apply_preset(&mut self, preset: AspectPreset) {
        self.preset = preset;
        if let (Some(frame), Some(ratio)) = (self.frame_size(), preset.ratio()) {
            self.crop = centered_for_ratio(frame, ratio);
            self.show_cropped = false;
        }
        self.status = format!("Preset: {}", preset.label());
        self.config.default_preset = preset;
        if let Err(e) = self.config.save() {
            self.log(LogLevel::Warning, format!("Could not save settings: {}", e));
        }
    }

    /// Reset to the full frame, or the largest centered box for the preset
    pub fn reset_crop(&mut self) {
        if let Some(frame) = self.frame_size() {
            self.crop = match self.preset.ratio() {
                Some(ratio) => centered_for_ratio(frame, ratio),
                None => CropRect::full_frame(frame),
            };
            self.show_cropped = false;
        }
    }

    /// Area of the preview canvas inside the current viewport
    pub fn preview_area(&self) -> Rect {
        preview_inner(editor_layout(self.viewport).preview)
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        match self.screen.clone() {
            AppScreen::PathInput(purpose) => self.handle_path_key(key.code, purpose),
            AppScreen::ConfirmOverwrite => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.screen = AppScreen::Editor;
                    Some(Action::ExportOverwrite)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.screen = AppScreen::Editor;
                    None
                }
                _ => None,
            },
            AppScreen::Welcome => match key.code {
                KeyCode::Char('o') | KeyCode::Enter => Some(Action::OpenDialog),
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                    None
                }
                _ => None,
            },
            AppScreen::Editor => self.handle_editor_key(key),
        }
    }

    fn handle_path_key(&mut self, code: KeyCode, purpose: PathPurpose) -> Option<Action> {
        match code {
            KeyCode::Enter => {
                let path = self.input.trim().to_string();
                if path.is_empty() {
                    return None;
                }
                self.screen = self.previous_screen.clone();
                self.input.clear();
                self.cursor_pos = 0;
                let path = PathBuf::from(path);
                Some(match purpose {
                    PathPurpose::Open => Action::Open(path),
                    PathPurpose::SaveAs => Action::Export(path),
                })
            }
            KeyCode::Char(c) => {
                let idx = byte_index(&self.input, self.cursor_pos);
                self.input.insert(idx, c);
                self.cursor_pos += 1;
                None
            }
            KeyCode::Backspace => {
                if self.cursor_pos > 0 {
                    self.cursor_pos -= 1;
                    let idx = byte_index(&self.input, self.cursor_pos);
                    self.input.remove(idx);
                }
                None
            }
            KeyCode::Delete => {
                if self.cursor_pos < self.input.chars().count() {
                    let idx = byte_index(&self.input, self.cursor_pos);
                    self.input.remove(idx);
                }
                None
            }
            KeyCode::Left => {
                self.cursor_pos = self.cursor_pos.saturating_sub(1);
                None
            }
            KeyCode::Right => {
                if self.cursor_pos < self.input.chars().count() {
                    self.cursor_pos += 1;
                }
                None
            }
            KeyCode::Esc => {
                self.screen = self.previous_screen.clone();
                self.input.clear();
                self.cursor_pos = 0;
                None
            }
            _ => None,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> Option<Action> {
        let frame = self.frame_size()?;
        let fast = key.modifiers.contains(KeyModifiers::SHIFT);
        let step = ((frame.width / 100).max(1) as i64) * if fast { 10 } else { 1 };

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                None
            }
            KeyCode::Char('o') => Some(Action::OpenDialog),
            KeyCode::Char('p') => {
                self.apply_preset(self.preset.next());
                None
            }
            KeyCode::Char('P') => {
                self.apply_preset(self.preset.previous());
                None
            }
            KeyCode::Char(c @ '1'..='6') => {
                let idx = c as usize - '1' as usize;
                self.apply_preset(AspectPreset::ALL[idx]);
                None
            }
            KeyCode::Left => self.nudge(-step, 0, frame),
            KeyCode::Right => self.nudge(step, 0, frame),
            KeyCode::Up => self.nudge(0, -step, frame),
            KeyCode::Down => self.nudge(0, step, frame),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.crop = self
                    .crop
                    .resize_by((frame.width / 50).max(2) as i64, self.preset.ratio(), frame);
                self.show_cropped = false;
                None
            }
            KeyCode::Char('-') => {
                self.crop = self
                    .crop
                    .resize_by(-((frame.width / 50).max(2) as i64), self.preset.ratio(), frame);
                self.show_cropped = false;
                None
            }
            KeyCode::Char('f') => {
                self.reset_crop();
                None
            }
            KeyCode::Char('[') => Some(Action::LoadFrame(
                (self.frame_timestamp - self.config.seek_step).max(0.0),
            )),
            KeyCode::Char(']') => Some(Action::LoadFrame(
                self.frame_timestamp + self.config.seek_step,
            )),
            KeyCode::Char('v') => {
                if let Err(e) = self.crop.validate(frame) {
                    self.log(LogLevel::Error, e.to_string());
                    return None;
                }
                Some(Action::PreviewCrop)
            }
            KeyCode::Tab => {
                if self.cropped_preview.is_some() {
                    self.show_cropped = !self.show_cropped;
                }
                None
            }
            KeyCode::Char('s') => Some(Action::SaveAsDialog),
            KeyCode::Char('w') => {
                self.screen = AppScreen::ConfirmOverwrite;
                None
            }
            KeyCode::Char('c') => Some(Action::CancelExport),
            KeyCode::Char('x') => Some(Action::OpenLastExport),
            _ => None,
        }
    }

    fn nudge(&mut self, dx: i64, dy: i64, frame: Size) -> Option<Action> {
        self.crop = self.crop.translate(dx, dy, frame);
        self.show_cropped = false;
        None
    }

    /// Start typed path entry
    pub fn request_path(&mut self, purpose: PathPurpose, initial: String) {
        if !matches!(self.screen, AppScreen::PathInput(_)) {
            self.previous_screen = self.screen.clone();
        }
        self.screen = AppScreen::PathInput(purpose);
        self.cursor_pos = initial.chars().count();
        self.input = initial;
    }

    /// Handle mouse drags on the preview
    pub fn handle_mouse(&mut self, event: MouseEvent) {
        if self.screen != AppScreen::Editor || self.show_cropped {
            return;
        }
        let Some(frame) = self.frame_size() else {
            return;
        };
        let area = self.preview_area();
        let Some(letterbox) = Letterbox::fit(frame, preview::canvas_size(area)) else {
            return;
        };
        let point = preview::cell_to_canvas(area, event.column, event.row);

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if letterbox.contains(point.0, point.1) {
                    self.drag_anchor = Some(point);
                    self.drag_origin = Some(self.crop);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some(anchor) = self.drag_anchor {
                    self.crop = letterbox.rect_from_drag(anchor, point, self.preset.ratio());
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(anchor) = self.drag_anchor.take() {
                    self.crop = letterbox.rect_from_drag(anchor, point, self.preset.ratio());
                    let origin = self.drag_origin.take();
                    if self.crop.is_degenerate() {
                        if let Some(origin) = origin {
                            self.crop = origin;
                        }
                    } else {
                        self.status = format!("Crop {}", self.crop);
                    }
                }
            }
            _ => {}
        }
    }

    /// Suggested destination for a cropped export: `{stem}_cropped.{ext}`
    pub fn default_export_path(&self) -> Option<PathBuf> {
        let info = self.video.as_ref()?;
        let stem = info.path.file_stem()?.to_string_lossy();
        let ext = info
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        Some(info.path.with_file_name(format!("{}_cropped.{}", stem, ext)))
    }

    /// Process messages from background tasks. Returns follow-up work for the event loop.
    pub fn handle_message(&mut self, msg: AppMessage) -> Option<Action> {
        match msg {
            AppMessage::Status(s) => self.status = s,
            AppMessage::Log(level, message) => self.log(level, message),
            AppMessage::Progress(p, label) => {
                self.progress = p.clamp(0.0, 1.0);
                self.progress_label = label;
            }
            AppMessage::DialogClosed(purpose, Some(path)) => {
                return Some(match purpose {
                    PathPurpose::Open => Action::Open(path),
                    PathPurpose::SaveAs => Action::Export(path),
                });
            }
            AppMessage::DialogClosed(purpose, None) => {
                // No native dialog or it was dismissed: fall back to typing the path
                let initial = match purpose {
                    PathPurpose::Open => self
                        .config
                        .last_directory
                        .as_ref()
                        .map(|d| format!("{}{}", d, std::path::MAIN_SEPARATOR))
                        .unwrap_or_default(),
                    PathPurpose::SaveAs => self
                        .default_export_path()
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default(),
                };
                self.request_path(purpose, initial);
            }
            AppMessage::VideoLoaded(info) => {
                self.log(LogLevel::Success, format!("Loaded: {}", info.describe()));
                self.status = format!("Editing {}", info.file_name());
                if let Some(dir) = info.path.parent() {
                    self.config.last_directory = Some(dir.to_string_lossy().to_string());
                    if let Err(e) = self.config.save() {
                        log::warn!("Could not save settings: {}", e);
                    }
                }
                self.video = Some(info);
                self.frame = None;
                self.frame_timestamp = 0.0;
                self.cropped_preview = None;
                self.show_cropped = false;
                self.screen = AppScreen::Editor;
                self.reset_crop();
                return Some(Action::LoadFrame(0.0));
            }
            AppMessage::FrameLoaded {
                request,
                timestamp,
                image,
            } => {
                if request == self.frame_request {
                    self.frame = Some(image);
                    self.frame_timestamp = timestamp;
                }
            }
            AppMessage::CroppedPreview(image) => {
                self.cropped_preview = Some(image);
                self.show_cropped = true;
                self.log(LogLevel::Info, "Preview updated using cropped frame.".to_string());
            }
            AppMessage::ExportStarted(path) => {
                self.exporting = true;
                self.progress = 0.0;
                self.progress_label = format!("Exporting {}", path.display());
            }
            AppMessage::ExportFinished(path) => {
                self.exporting = false;
                self.log(
                    LogLevel::Success,
                    format!("Export complete! Saved cropped video to {}", path.display()),
                );
                self.last_export = Some(path.clone());
                // Continue editing the exported file
                return Some(Action::Open(path));
            }
            AppMessage::ExportFailed(msg) => {
                self.exporting = false;
                self.progress = 0.0;
                self.progress_label = "Failed".to_string();
                for line in msg.lines().filter(|l| !l.trim().is_empty()) {
                    self.log(LogLevel::Error, line.to_string());
                }
            }
            AppMessage::Error(msg) => {
                for line in msg.lines().filter(|l| !l.trim().is_empty()) {
                    self.log(LogLevel::Error, line.to_string());
                }
            }
        }
        None
    }
}

fn byte_index(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Screen regions of the editor
pub struct EditorLayout {
    pub header: Rect,
    pub preview: Rect,
    pub sidebar: Rect,
    pub logs: Rect,
    pub footer: Rect,
}

/// Split the terminal into editor regions
pub fn editor_layout(area: Rect) -> EditorLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Preview + sidebar
            Constraint::Length(8), // Logs
            Constraint::Length(3), // Footer
        ])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(36)])
        .split(rows[1]);

    EditorLayout {
        header: rows[0],
        preview: body[0],
        sidebar: body[1],
        logs: rows[2],
        footer: rows[3],
    }
}

/// Preview area without its border
pub fn preview_inner(preview: Rect) -> Rect {
    preview.inner(Margin {
        horizontal: 1,
        vertical: 1,
    })
}

/// Setup the terminal for TUI
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal state
pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Render the TUI
pub fn render(frame: &mut Frame, app: &App) {
    let layout = editor_layout(frame.area());

    render_header(frame, app, layout.header);
    match &app.screen {
        AppScreen::Welcome => render_welcome(frame, layout.preview),
        AppScreen::PathInput(purpose) => render_path_input(frame, app, *purpose, layout.preview),
        AppScreen::ConfirmOverwrite => render_confirm_overwrite(frame, app, layout.preview),
        AppScreen::Editor => render_preview(frame, app, layout.preview),
    }
    render_sidebar(frame, app, layout.sidebar);
    render_logs(frame, app, layout.logs);
    render_footer(frame, app, layout.footer);
}

/// Render the header section
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let header_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            format!(" {} v{} ", APP_NAME, APP_VERSION),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ));

    let line = Line::from(vec![
        Span::raw("⚡ Status: "),
        Span::styled(&app.status, Style::default().fg(Color::Green)),
        Span::raw("   ⏱  Uptime: "),
        Span::styled(app.uptime(), Style::default().fg(Color::Cyan)),
    ]);
    frame.render_widget(Paragraph::new(line).block(header_block), area);
}

fn render_welcome(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" 🎬 Open a Video ");

    let text = Text::from(vec![
        Line::from(""),
        Line::from("Load a video to start."),
        Line::from(""),
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("o", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(" to choose a file."),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "Supported formats: {}",
                crate::types::SUPPORTED_EXTENSIONS.join(", ")
            ),
            Style::default().fg(Color::Gray),
        )),
    ]);

    frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), area);
}

fn render_path_input(frame: &mut Frame, app: &App, purpose: PathPurpose, area: Rect) {
    let title = match purpose {
        PathPurpose::Open => " 📂 Open Video ",
        PathPurpose::SaveAs => " 💾 Save Cropped Video As ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let input_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(inner);

    let instructions = Paragraph::new("Type a file path and press Enter:")
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(instructions, input_layout[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let input_text = Paragraph::new(app.input.as_str())
        .block(input_block)
        .style(Style::default().fg(Color::Yellow));

    frame.render_widget(input_text, input_layout[1]);

    frame.set_cursor_position((
        input_layout[1].x + 1 + app.cursor_pos as u16,
        input_layout[1].y + 1,
    ));
}

fn render_confirm_overwrite(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" ⚠ Overwrite Original ");

    let name = app
        .video
        .as_ref()
        .map(VideoInfo::file_name)
        .unwrap_or_default();

    let text = Text::from(vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("Replace "),
            Span::styled(name, Style::default().fg(Color::Cyan)),
            Span::raw(" with the cropped video?"),
        ]),
        Line::from(""),
        Line::from(format!("Crop: {}", app.crop)),
        Line::from(""),
        Line::from("(Y)es - Overwrite the original file"),
        Line::from("(N)o  - Go back"),
    ]);

    frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), area);
}

fn render_preview(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.show_cropped {
        " 🔍 Cropped Preview (Tab: back) ".to_string()
    } else {
        format!(" 🎞  Frame @ {} ", video::format_timecode(app.frame_timestamp))
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    frame.render_widget(block, area);

    let inner = preview_inner(area);
    match (app.show_cropped, &app.cropped_preview, &app.frame, app.frame_size()) {
        (true, Some(image), _, _) => {
            let size = Size::new(image.width(), image.height());
            frame.render_widget(PreviewCanvas::new(image, size), inner);
        }
        (_, _, Some(image), Some(source)) => {
            let accent = if app.crop.validate(source).is_ok() {
                Color::Cyan
            } else {
                Color::Red
            };
            frame.render_widget(
                PreviewCanvas::new(image, source)
                    .crop(Some(app.crop))
                    .accent(accent),
                inner,
            );
        }
        _ => {
            frame.render_widget(
                Paragraph::new("Generating preview frame…").style(Style::default().fg(Color::Gray)),
                inner,
            );
        }
    }
}

fn render_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Video info
            Constraint::Length(8), // Presets
            Constraint::Length(6), // Crop coordinates
            Constraint::Min(3),    // Progress
        ])
        .split(area);

    let info_lines = match &app.video {
        Some(info) => vec![
            Line::from(Span::styled(info.file_name(), Style::default().fg(Color::Yellow))),
            Line::from(format!("{}x{} • {:.2}s", info.width, info.height, info.duration)),
            Line::from(format!("{:.2} fps • {}", info.frame_rate, info.codec)),
            Line::from(if info.has_audio { "Audio: copied" } else { "Audio: none" }),
        ],
        None => vec![Line::from("Load a video to start")],
    };
    frame.render_widget(
        Paragraph::new(info_lines)
            .block(Block::default().borders(Borders::ALL).title(" Video "))
            .wrap(Wrap { trim: true }),
        layout[0],
    );

    let presets: Vec<ListItem> = AspectPreset::ALL
        .iter()
        .enumerate()
        .map(|(i, preset)| {
            let selected = *preset == app.preset;
            let style = if selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            let marker = if selected { "▶" } else { " " };
            ListItem::new(Line::from(Span::styled(
                format!("{} {} {}", marker, i + 1, preset.label()),
                style,
            )))
        })
        .collect();
    frame.render_widget(
        List::new(presets).block(Block::default().borders(Borders::ALL).title(" Aspect Preset ")),
        layout[1],
    );

    let crop_lines = vec![
        Line::from(format!("X: {:<6} Y: {}", app.crop.x, app.crop.y)),
        Line::from(format!("W: {:<6} H: {}", app.crop.width, app.crop.height)),
        Line::from(Span::styled(
            video::crop_filter(&app.crop),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(crop_lines)
            .block(Block::default().borders(Borders::ALL).title(" Crop (px) ")),
        layout[2],
    );

    let progress_block = Block::default().borders(Borders::ALL).title(" Export ");
    let progress_inner = progress_block.inner(layout[3]);
    frame.render_widget(progress_block, layout[3]);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green).bg(Color::DarkGray))
        .percent((app.progress * 100.0) as u16)
        .label(app.progress_label.as_str());
    frame.render_widget(gauge, progress_inner);
}

fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
    let logs_block = Block::default()
        .borders(Borders::ALL)
        .title(" Activity Log ");

    let visible = area.height.saturating_sub(2) as usize;
    let log_items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|entry| {
            let (icon, color) = match entry.level {
                LogLevel::Info => ("ℹ ", Color::Blue),
                LogLevel::Success => ("✔ ", Color::Green),
                LogLevel::Warning => ("⚠ ", Color::Yellow),
                LogLevel::Error => ("✘ ", Color::Red),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(icon),
                Span::styled(&entry.message, Style::default().fg(color)),
            ]))
        })
        .collect();

    frame.render_widget(List::new(log_items).block(logs_block), area);
}

/// Render the footer with keyboard shortcuts
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = match &app.screen {
        AppScreen::Welcome => "O: Open | Q/Esc: Quit",
        AppScreen::PathInput(_) => "Enter: Submit | Esc: Back",
        AppScreen::ConfirmOverwrite => "Y: Yes | N: No",
        AppScreen::Editor if app.exporting => {
            "C: Cancel export | Drag: Crop | P/1-6: Preset | Arrows: Move | +/-: Size | Q: Quit"
        }
        AppScreen::Editor => {
            "O: Open | Drag: Crop | P/1-6: Preset | Arrows: Move | +/-: Size | F: Full | [/]: Seek | V: Preview | S: Save As | W: Save | X: Open export | Q: Quit"
        }
    };

    let footer_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Keyboard Shortcuts ");

    let footer_text = Paragraph::new(shortcuts)
        .block(footer_block)
        .style(Style::default().fg(Color::Gray));

    frame.render_widget(footer_text, area);
}

/// Channel for sending messages to the TUI
pub type TuiSender = mpsc::UnboundedSender<AppMessage>;
pub type TuiReceiver = mpsc::UnboundedReceiver<AppMessage>;

/// Create a new message channel
pub fn create_channel() -> (TuiSender, TuiReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use std::path::Path;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: crossterm::event::KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn editor_app() -> App {
        let mut app = App::new(AppConfig::default());
        app.video = Some(VideoInfo {
            path: Path::new("/videos/clip.mp4").to_path_buf(),
            width: 1920,
            height: 1080,
            duration: 10.0,
            frame_rate: 25.0,
            codec: "h264".to_string(),
            has_audio: true,
        });
        app.screen = AppScreen::Editor;
        app.viewport = Rect::new(0, 0, 140, 50);
        app.reset_crop();
        app
    }

    #[test]
    fn test_reset_crop_covers_frame() {
        let app = editor_app();
        assert_eq!(app.crop, CropRect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_preset_keys_snap_crop() {
        let mut app = editor_app();
        // Avoid touching the real settings file
        app.preset = AspectPreset::Square;
        app.reset_crop();
        assert_eq!(app.crop, CropRect::new(420, 0, 1080, 1080));
    }

    #[test]
    fn test_arrow_keys_move_crop_inside_frame() {
        let mut app = editor_app();
        app.crop = CropRect::new(100, 100, 200, 200);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.crop.x, 119);
        for _ in 0..200 {
            app.handle_key(key(KeyCode::Up));
        }
        assert_eq!(app.crop.y, 0);
    }

    #[test]
    fn test_preview_key_rejects_degenerate_crop() {
        let mut app = editor_app();
        app.crop = CropRect::new(10, 10, 0, 0);
        assert_eq!(app.handle_key(key(KeyCode::Char('v'))), None);
        assert_eq!(app.logs.last().map(|l| l.level), Some(LogLevel::Error));

        app.crop = CropRect::new(10, 10, 100, 100);
        assert_eq!(app.handle_key(key(KeyCode::Char('v'))), Some(Action::PreviewCrop));
    }

    #[test]
    fn test_overwrite_requires_confirmation() {
        let mut app = editor_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('w'))), None);
        assert_eq!(app.screen, AppScreen::ConfirmOverwrite);
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), None);
        assert_eq!(app.screen, AppScreen::Editor);

        app.handle_key(key(KeyCode::Char('w')));
        assert_eq!(app.handle_key(key(KeyCode::Char('y'))), Some(Action::ExportOverwrite));
    }

    #[test]
    fn test_path_input_submits_typed_path() {
        let mut app = editor_app();
        app.request_path(PathPurpose::SaveAs, String::new());
        for c in "out.mp5".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Char('4')));
        let action = app.handle_key(key(KeyCode::Enter));
        assert_eq!(action, Some(Action::Export(PathBuf::from("out.mp4"))));
        assert_eq!(app.screen, AppScreen::Editor);
    }

    #[test]
    fn test_mouse_drag_sets_crop() {
        let mut app = editor_app();
        let area = app.preview_area();
        let (x0, y0) = (area.x + 10, area.y + 5);
        let (x1, y1) = (area.x + 40, area.y + 15);

        app.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), x0, y0));
        app.handle_mouse(mouse(MouseEventKind::Drag(MouseButton::Left), x1, y1));
        app.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), x1, y1));

        let frame = app.frame_size().unwrap();
        let letterbox = Letterbox::fit(frame, preview::canvas_size(area)).unwrap();
        let expected = letterbox.rect_from_drag(
            preview::cell_to_canvas(area, x0, y0),
            preview::cell_to_canvas(area, x1, y1),
            None,
        );
        assert_eq!(app.crop, expected);
        assert!(!app.crop.is_degenerate());
    }

    #[test]
    fn test_mouse_click_without_drag_keeps_crop() {
        let mut app = editor_app();
        let before = app.crop;
        let area = app.preview_area();
        let (x, y) = (area.x + 20, area.y + 10);
        app.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), x, y));
        app.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), x, y));
        assert_eq!(app.crop, before);
    }

    #[test]
    fn test_stale_frames_are_ignored() {
        let mut app = editor_app();
        let old = app.next_frame_request();
        let new = app.next_frame_request();
        app.handle_message(AppMessage::FrameLoaded {
            request: old,
            timestamp: 1.0,
            image: RgbImage::new(2, 2),
        });
        assert!(app.frame.is_none());
        app.handle_message(AppMessage::FrameLoaded {
            request: new,
            timestamp: 2.0,
            image: RgbImage::new(2, 2),
        });
        assert!(app.frame.is_some());
        assert_eq!(app.frame_timestamp, 2.0);
    }

    #[test]
    fn test_dismissed_save_dialog_falls_back_to_typed_path() {
        let mut app = editor_app();
        assert_eq!(
            app.handle_message(AppMessage::DialogClosed(PathPurpose::SaveAs, None)),
            None
        );
        assert_eq!(app.screen, AppScreen::PathInput(PathPurpose::SaveAs));
        assert_eq!(app.input, "/videos/clip_cropped.mp4");

        let action = app.handle_message(AppMessage::DialogClosed(
            PathPurpose::Open,
            Some(PathBuf::from("/videos/other.mov")),
        ));
        assert_eq!(action, Some(Action::Open(PathBuf::from("/videos/other.mov"))));
    }

    #[test]
    fn test_finished_export_reloads_output() {
        let mut app = editor_app();
        let out = PathBuf::from("/videos/clip_cropped.mp4");
        let action = app.handle_message(AppMessage::ExportFinished(out.clone()));
        assert_eq!(action, Some(Action::Open(out.clone())));
        assert_eq!(app.last_export, Some(out));
        assert!(!app.exporting);
    }

    #[test]
    fn test_export_messages_update_state() {
        let mut app = editor_app();
        app.handle_message(AppMessage::ExportStarted(PathBuf::from("out.mp4")));
        assert!(app.exporting);
        app.handle_message(AppMessage::Progress(0.5, "Processing".to_string()));
        assert_eq!(app.progress, 0.5);
        app.handle_message(AppMessage::ExportFailed("ffmpeg exited\nbad crop".to_string()));
        assert!(!app.exporting);
        assert_eq!(app.logs.len(), 2);
        assert!(app.logs.iter().all(|l| l.level == LogLevel::Error));
    }
}
