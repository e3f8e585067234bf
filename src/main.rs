//! Video Cropper
//! A terminal tool to crop videos interactively with ffmpeg, with aspect-ratio
//! presets, cropped previews and background export.

mod config;
mod error;
mod export;
mod geometry;
mod preview;
mod tui;
mod types;
mod video;

use anyhow::{anyhow, Context, Result};
use config::AppConfig;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::layout::Rect;
use regex::Regex;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use export::ExportWorker;
use tui::{Action, App, AppMessage, LogLevel, PathPurpose, TuiSender};
use types::{AspectPreset, CropRect, Size, APP_NAME, APP_VERSION, SUPPORTED_EXTENSIONS};
use video::{ExportSpec, ProcessEvent, Tools};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Check and strip --debug flag
    let debug_mode = args.contains(&"--debug".to_string());
    if debug_mode {
        let _ = WriteLogger::init(
            LevelFilter::Debug,
            Config::default(),
            OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?,
        );
        log::info!("Starting {} v{} with debug logging", APP_NAME, APP_VERSION);
        log::debug!("Raw Args: {:?}", args);
    }

    let actual_args: Vec<String> = args.iter().filter(|a| *a != "--debug").cloned().collect();

    if actual_args.len() > 1 {
        return handle_cli_command(&actual_args).await;
    }

    run_tui_mode(None).await
}

/// Handle CLI commands (probe, preview, export, open)
async fn handle_cli_command(args: &[String]) -> Result<()> {
    let command = args[1].as_str();

    match command {
        "probe" => {
            if args.len() < 3 {
                eprintln!("Usage: {} probe <video_path>", args[0]);
                std::process::exit(1);
            }

            let config = AppConfig::load_or_create()?;
            let tools = Tools::from_config(&config);
            let path = Path::new(&args[2]);
            video::validate_input(path)?;
            let info = video::probe_video(&tools, path).await?;

            println!("🎬 {}", info.file_name());
            println!("   Resolution: {}x{}", info.width, info.height);
            println!("   Duration:   {}", video::format_timecode(info.duration));
            println!("   Frame rate: {:.3} fps", info.frame_rate);
            println!("   Codec:      {}", info.codec);
            println!("   Audio:      {}", if info.has_audio { "yes" } else { "no" });
            Ok(())
        }

        "preview" => {
            if args.len() < 4 {
                eprintln!(
                    "Usage: {} preview <video_path> <crop|preset> [output.png] [timestamp_seconds]",
                    args[0]
                );
                eprintln!("\nExample:");
                eprintln!("  {} preview video.mp4 1280:720:320:180", args[0]);
                eprintln!("  {} preview video.mp4 9:16 reel.png 5.5", args[0]);
                std::process::exit(1);
            }

            let config = AppConfig::load_or_create()?;
            let tools = Tools::from_config(&config);
            let path = Path::new(&args[2]);
            video::validate_input(path)?;
            let info = video::probe_video(&tools, path).await?;

            let crop = parse_crop_spec(&args[3], info.frame_size())?;
            let crop = video::sanitize_crop(&crop, &info, config.even_dimensions)?;
            let output = args
                .get(4)
                .map(PathBuf::from)
                .unwrap_or_else(|| sibling_path(path, "_preview", "png"));
            let timestamp = match args.get(5) {
                Some(s) => s
                    .parse::<f64>()
                    .with_context(|| format!("Invalid timestamp: {}", s))?,
                None => config.preview_timestamp,
            };
            let timestamp = video::clamp_timestamp(timestamp, info.duration);

            println!("🎬 Generating cropped preview...");
            println!("   Input: {}", path.display());
            println!("   Crop: {}", crop);
            println!("   Timestamp: {:.2}s", timestamp);

            video::extract_frame(&tools, path, &output, timestamp, Some(&crop)).await?;

            println!("✅ Preview saved to: {}", output.display());
            Ok(())
        }

        "export" => {
            if args.len() < 4 {
                eprintln!(
                    "Usage: {} export <video_path> <crop|preset> [output_path]",
                    args[0]
                );
                eprintln!("\nExample:");
                eprintln!("  {} export video.mp4 1080x1080+420+0", args[0]);
                eprintln!("  {} export video.mp4 tiktok vertical.mp4", args[0]);
                std::process::exit(1);
            }

            let config = AppConfig::load_or_create()?;
            let tools = Tools::from_config(&config);
            video::check_dependencies(&tools)?;

            let path = Path::new(&args[2]);
            video::validate_input(path)?;
            let info = video::probe_video(&tools, path).await?;
            let crop = parse_crop_spec(&args[3], info.frame_size())?;
            let destination = args
                .get(4)
                .map(PathBuf::from)
                .unwrap_or_else(|| default_export_path(path));

            println!("🎬 Cropping video...");
            println!("   Input: {}", path.display());
            println!("   Output: {}", destination.display());
            println!("   Crop: {}", crop);

            let cancellation_token = Arc::new(AtomicBool::new(false));
            let ctrl_c_token = cancellation_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_token.store(true, Ordering::Relaxed);
                }
            });

            let spec = ExportSpec {
                input: info,
                destination: destination.clone(),
                crop,
                even_dimensions: config.even_dimensions,
                encoder_args: config.encoder_args(),
            };
            let applied = video::export_cropped(&tools, &spec, cancellation_token, |event| {
                match event {
                    ProcessEvent::Progress { seconds, fraction } => {
                        let percent = fraction.map(|f| f * 100.0).unwrap_or(0.0);
                        print!(
                            "\r   ⏳ Processing timestamp: {} ({:>5.1}%)",
                            video::format_timecode(seconds),
                            percent
                        );
                        let _ = std::io::stdout().flush();
                    }
                    ProcessEvent::Line(line) => eprintln!("\n   ffmpeg: {}", line),
                    ProcessEvent::Complete => println!("\n   ffmpeg processing complete."),
                }
            })
            .await?;

            println!("✅ Saved {} crop to: {}", applied, destination.display());
            Ok(())
        }

        "open" => {
            if args.len() < 3 {
                eprintln!("Usage: {} open <video_path>", args[0]);
                std::process::exit(1);
            }
            run_tui_mode(Some(PathBuf::from(&args[2]))).await
        }

        "help" | "--help" | "-h" => {
            print_help(&args[0]);
            Ok(())
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            print_help(&args[0]);
            std::process::exit(1);
        }
    }
}

/// Print help message
fn print_help(program: &str) {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!();
    println!("USAGE:");
    println!(
        "  {}                                   Run TUI mode (interactive)",
        program
    );
    println!(
        "  {} open <video>                      Open a video in the TUI",
        program
    );
    println!(
        "  {} probe <video>                     Show resolution, duration and codec",
        program
    );
    println!(
        "  {} preview <video> <crop> [png] [t]  Save one cropped frame",
        program
    );
    println!(
        "  {} export <video> <crop> [out]       Crop the whole video",
        program
    );
    println!(
        "  {} help                              Show this help message",
        program
    );
    println!();
    println!("CROP FORMATS:");
    println!("  W:H:X:Y          e.g. 1280:720:320:180");
    println!("  WxH+X+Y          e.g. 1080x1080+420+0");
    println!("  <preset>         largest centered box: free, 2.39:1, 16:9, 9:16, tiktok, 1:1");
    println!();
    println!("OPTIONS:");
    println!("  --debug          Write a debug log to debug.log");
    println!();
    println!("CONFIGURATION:");
    match AppConfig::config_path() {
        Ok(path) => println!("  Settings file: {}", path.display()),
        Err(_) => println!("  Settings file: <config dir>/video-cropper/settings.json"),
    }
    println!("  - ffmpeg_path / ffprobe_path   Tool locations");
    println!("  - even_dimensions              Round crops to even sizes (default true)");
    println!("  - video_codec / crf            Encoder override for exports");
}

/// Parse a crop given as `W:H:X:Y`, `WxH+X+Y` or a preset name
fn parse_crop_spec(spec: &str, frame: Size) -> Result<CropRect> {
    let spec = spec.trim();

    let colon = Regex::new(r"^(\d+):(\d+):(\d+):(\d+)$")?;
    if let Some(caps) = colon.captures(spec) {
        return Ok(CropRect::new(
            caps[3].parse()?,
            caps[4].parse()?,
            caps[1].parse()?,
            caps[2].parse()?,
        ));
    }

    let plus_form = Regex::new(r"^(\d+)x(\d+)\+(\d+)\+(\d+)$")?;
    if let Some(caps) = plus_form.captures(spec) {
        return Ok(CropRect::new(
            caps[3].parse()?,
            caps[4].parse()?,
            caps[1].parse()?,
            caps[2].parse()?,
        ));
    }

    let preset = AspectPreset::from_name(spec)
        .ok_or_else(|| anyhow!("Invalid crop '{}'. Use W:H:X:Y, WxH+X+Y or a preset name", spec))?;
    Ok(match preset.ratio() {
        Some(ratio) => geometry::centered_for_ratio(frame, ratio),
        None => CropRect::full_frame(frame),
    })
}

/// `dir/name.ext` -> `dir/name{suffix}.{ext}`
fn sibling_path(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    path.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}

fn default_export_path(path: &Path) -> PathBuf {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    sibling_path(path, "_cropped", &ext)
}

/// Run the TUI mode
async fn run_tui_mode(initial: Option<PathBuf>) -> Result<()> {
    // Load config and check tools BEFORE setting up the terminal so that
    // messages land on the normal stdout
    let config = AppConfig::load_or_create()?;
    let tools = Tools::from_config(&config);
    if let Err(e) = video::check_dependencies(&tools) {
        eprintln!("\n❌ {}", e);
        eprintln!("\nPlease install the missing dependencies:");
        eprintln!("  • ffmpeg: https://ffmpeg.org/download.html");
        std::process::exit(1);
    }

    let mut terminal = tui::setup_terminal()?;

    let result = run_app(&mut terminal, config, tools, initial).await;

    tui::restore_terminal(&mut terminal)?;

    if let Err(ref e) = result {
        eprintln!("\n❌ Error: {}", e);
    }

    result
}

/// Long-lived state the event loop hands to each action
struct Session {
    tools: Tools,
    tx: TuiSender,
    worker: ExportWorker,
    work_dir: PathBuf,
}

async fn run_app(
    terminal: &mut ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>,
    config: AppConfig,
    tools: Tools,
    initial: Option<PathBuf>,
) -> Result<()> {
    let (tx, mut rx) = tui::create_channel();
    let session = Session {
        tools,
        tx,
        worker: ExportWorker::new(config.notify_on_complete),
        work_dir: std::env::temp_dir().join(format!("video-cropper-{}", std::process::id())),
    };

    let mut app = App::new(config);
    app.log(
        LogLevel::Info,
        format!("{} v{} ready. Press O to open a video.", APP_NAME, APP_VERSION),
    );

    if let Some(path) = initial {
        run_action(&mut app, &session, Action::Open(path));
    }

    // Main event loop
    loop {
        let size = terminal.size()?;
        app.viewport = Rect::new(0, 0, size.width, size.height);

        // Render UI
        terminal.draw(|frame| tui::render(frame, &app))?;

        // Handle messages from background tasks
        while let Ok(msg) = rx.try_recv() {
            if let Some(action) = app.handle_message(msg) {
                run_action(&mut app, &session, action);
            }
        }

        // Poll for events with timeout
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(action) = app.handle_key(key) {
                        run_action(&mut app, &session, action);
                    }
                }
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }

        // Check for quit
        if app.should_quit {
            if session.worker.cancel() {
                log::info!("Cancelling running export before exit");
                // Let the export kill ffmpeg and remove its partial file
                if !session.worker.wait_idle(Duration::from_secs(5)).await {
                    log::warn!("Export did not stop in time; exiting anyway");
                }
            }
            break;
        }
    }

    fs::remove_dir_all(&session.work_dir).ok();
    Ok(())
}

/// Start the work behind a UI action. Slow work runs on spawned tasks and
/// reports back through the message channel.
fn run_action(app: &mut App, session: &Session, action: Action) {
    log::debug!("Action: {:?}", action);
    match action {
        Action::OpenDialog => {
            let start_dir = app.config.last_directory.clone();
            spawn_dialog(session.tx.clone(), PathPurpose::Open, start_dir, None);
        }
        Action::Open(path) => open_video(app, session, path),
        Action::LoadFrame(timestamp) => load_frame(app, session, timestamp),
        Action::PreviewCrop => preview_crop(app, session),
        Action::SaveAsDialog => {
            let Some(default) = app.default_export_path() else {
                return;
            };
            let start_dir = default.parent().map(|d| d.to_string_lossy().to_string());
            let file_name = default
                .file_name()
                .map(|n| n.to_string_lossy().to_string());
            spawn_dialog(session.tx.clone(), PathPurpose::SaveAs, start_dir, file_name);
        }
        Action::Export(destination) => start_export(app, session, destination),
        Action::ExportOverwrite => {
            if let Some(path) = app.video.as_ref().map(|v| v.path.clone()) {
                start_export(app, session, path);
            }
        }
        Action::CancelExport => {
            if session.worker.cancel() {
                app.log(LogLevel::Warning, "Cancelling export...".to_string());
            } else {
                app.log(LogLevel::Info, "No export is running".to_string());
            }
        }
        Action::OpenLastExport => match app.last_export.clone() {
            Some(path) => {
                if let Err(e) = open::that(&path) {
                    app.log(LogLevel::Error, format!("Could not open {}: {}", path.display(), e));
                }
            }
            None => app.log(LogLevel::Info, "Nothing exported yet".to_string()),
        },
    }
}

/// Show a native file dialog off the UI thread
fn spawn_dialog(
    tx: TuiSender,
    purpose: PathPurpose,
    start_dir: Option<String>,
    file_name: Option<String>,
) {
    tokio::task::spawn_blocking(move || {
        let mut dialog = rfd::FileDialog::new().add_filter("Video files", &SUPPORTED_EXTENSIONS[..]);
        if let Some(dir) = start_dir {
            dialog = dialog.set_directory(dir);
        }
        let chosen = match purpose {
            PathPurpose::Open => dialog.set_title("Open Video").pick_file(),
            PathPurpose::SaveAs => {
                if let Some(name) = file_name {
                    dialog = dialog.set_file_name(name);
                }
                dialog.set_title("Save Cropped Video As").save_file()
            }
        };
        let _ = tx.send(AppMessage::DialogClosed(purpose, chosen));
    });
}

fn open_video(app: &mut App, session: &Session, path: PathBuf) {
    if let Err(e) = video::validate_input(&path) {
        app.log(LogLevel::Error, e.to_string());
        return;
    }

    app.status = format!("Opening {}...", path.display());
    let tools = session.tools.clone();
    let tx = session.tx.clone();
    tokio::spawn(async move {
        match video::probe_video(&tools, &path).await {
            Ok(info) => {
                let _ = tx.send(AppMessage::VideoLoaded(info));
            }
            Err(e) => {
                let _ = tx.send(AppMessage::Status("Ready".to_string()));
                let _ = tx.send(AppMessage::Error(format!("{:#}", e)));
            }
        }
    });
}

fn load_frame(app: &mut App, session: &Session, timestamp: f64) {
    let Some(info) = app.video.clone() else {
        return;
    };
    let timestamp = video::clamp_timestamp(timestamp, info.duration);
    let request = app.next_frame_request();
    let output = session.work_dir.join(format!("frame-{}.png", request));
    let tools = session.tools.clone();
    let tx = session.tx.clone();

    tokio::spawn(async move {
        let result = decode_frame(&tools, &info.path, &output, timestamp, None).await;
        match result {
            Ok(image) => {
                let _ = tx.send(AppMessage::FrameLoaded {
                    request,
                    timestamp,
                    image,
                });
            }
            Err(e) => {
                let _ = tx.send(AppMessage::Error(format!(
                    "Could not extract frame at {}: {:#}",
                    video::format_timecode(timestamp),
                    e
                )));
            }
        }
    });
}

fn preview_crop(app: &mut App, session: &Session) {
    let Some(info) = app.video.clone() else {
        return;
    };
    let crop = match video::sanitize_crop(&app.crop, &info, app.config.even_dimensions) {
        Ok(crop) => crop,
        Err(e) => {
            app.log(LogLevel::Error, e.to_string());
            return;
        }
    };
    let timestamp = video::clamp_timestamp(app.config.preview_timestamp, info.duration);
    let output = session.work_dir.join("cropped-preview.png");
    let tools = session.tools.clone();
    let tx = session.tx.clone();

    app.log(LogLevel::Info, format!("Generating cropped preview for {}", crop));
    tokio::spawn(async move {
        match decode_frame(&tools, &info.path, &output, timestamp, Some(crop)).await {
            Ok(image) => {
                let _ = tx.send(AppMessage::CroppedPreview(image));
            }
            Err(e) => {
                let _ = tx.send(AppMessage::Error(format!(
                    "Failed to generate preview: {:#}",
                    e
                )));
            }
        }
    });
}

/// Extract one frame with ffmpeg, decode it and remove the temporary image
async fn decode_frame(
    tools: &Tools,
    input: &Path,
    output: &Path,
    timestamp: f64,
    crop: Option<CropRect>,
) -> Result<image::RgbImage> {
    video::extract_frame(tools, input, output, timestamp, crop.as_ref()).await?;
    let path = output.to_path_buf();
    let image = tokio::task::spawn_blocking(move || {
        let image = preview::load_frame(&path);
        fs::remove_file(&path).ok();
        image
    })
    .await??;
    Ok(image)
}

fn start_export(app: &mut App, session: &Session, destination: PathBuf) {
    let Some(info) = app.video.clone() else {
        return;
    };
    if !video::is_supported_extension(&destination) {
        app.log(
            LogLevel::Error,
            format!(
                "Unsupported output format: {}. Use one of: {}",
                destination.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        );
        return;
    }
    if let Err(e) = app.crop.validate(info.frame_size()) {
        app.log(LogLevel::Error, e.to_string());
        return;
    }

    let spec = ExportSpec {
        input: info,
        destination,
        crop: app.crop,
        even_dimensions: app.config.even_dimensions,
        encoder_args: app.config.encoder_args(),
    };
    if let Err(e) = session
        .worker
        .start(session.tools.clone(), spec, session.tx.clone())
    {
        app.log(LogLevel::Warning, e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Size = Size {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_parse_crop_colon_form() {
        let crop = parse_crop_spec("1280:720:320:180", FRAME).unwrap();
        assert_eq!(crop, CropRect::new(320, 180, 1280, 720));
    }

    #[test]
    fn test_parse_crop_geometry_form() {
        let crop = parse_crop_spec(" 1080x1080+420+0 ", FRAME).unwrap();
        assert_eq!(crop, CropRect::new(420, 0, 1080, 1080));
    }

    #[test]
    fn test_parse_crop_presets() {
        assert_eq!(
            parse_crop_spec("square", FRAME).unwrap(),
            CropRect::new(420, 0, 1080, 1080)
        );
        assert_eq!(
            parse_crop_spec("free", FRAME).unwrap(),
            CropRect::full_frame(FRAME)
        );
        let reel = parse_crop_spec("9:16", FRAME).unwrap();
        assert!(reel.height >= 1079);
        assert!(reel.width >= 607 && reel.width <= 608);
        assert_eq!(reel.x, (1920 - reel.width) / 2);
    }

    #[test]
    fn test_parse_crop_rejects_garbage() {
        assert!(parse_crop_spec("12:34", FRAME).is_err());
        assert!(parse_crop_spec("wide", FRAME).is_err());
        assert!(parse_crop_spec("-5:10:0:0", FRAME).is_err());
    }

    #[test]
    fn test_default_output_paths() {
        assert_eq!(
            default_export_path(Path::new("/clips/trip.mov")),
            PathBuf::from("/clips/trip_cropped.mov")
        );
        assert_eq!(
            sibling_path(Path::new("/clips/trip.mov"), "_preview", "png"),
            PathBuf::from("/clips/trip_preview.png")
        );
    }
}
