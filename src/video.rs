//! Video processing module for Video Cropper
//! Handles ffprobe metadata, preview frames and cropped exports through ffmpeg

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::AppConfig;
use crate::error::CropperError;
use crate::types::{CropRect, VideoInfo, SUPPORTED_EXTENSIONS};

/// Executables used for probing and encoding
#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Tools {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// Incremental output of a running export
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// Encoded position in seconds, with the fraction done when the duration is known
    Progress { seconds: f64, fraction: Option<f64> },
    /// A diagnostic line printed by the tool
    Line(String),
    /// The tool reported the end of processing
    Complete,
}

/// Check if required external dependencies are available
pub fn check_dependencies(tools: &Tools) -> Result<()> {
    let mut missing = Vec::new();

    for tool in [&tools.ffmpeg, &tools.ffprobe] {
        let found = std::process::Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok();
        if !found {
            missing.push(tool.as_str());
        }
    }

    if !missing.is_empty() {
        let os = std::env::consts::OS;
        let mut msg = format!(
            "Missing required dependencies: {}.\nPlease install them first.",
            missing.join(", ")
        );

        if os == "linux" {
            msg.push_str("\n\nOn Linux (Ubuntu/Debian), try:\n  sudo apt update && sudo apt install ffmpeg");
        } else if os == "macos" {
            msg.push_str("\n\nOn macOS, try:\n  brew install ffmpeg");
        } else if os == "windows" {
            msg.push_str("\n\nOn Windows, ensure ffmpeg and ffprobe are in your PATH.");
        }

        return Err(anyhow!(msg));
    }

    Ok(())
}

/// Make sure a path is an existing file with an allow-listed extension
pub fn validate_input(path: &Path) -> Result<(), CropperError> {
    if !path.is_file() {
        return Err(CropperError::FileNotFound(path.to_path_buf()));
    }
    if !is_supported_extension(path) {
        return Err(CropperError::UnsupportedFormat(path.to_path_buf()));
    }
    Ok(())
}

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Read stream metadata with ffprobe
pub async fn probe_video(tools: &Tools, path: &Path) -> Result<VideoInfo> {
    validate_input(path)?;

    log::info!("Probing {}", path.display());
    let output = Command::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-show_streams",
            "-print_format",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(&tools.ffprobe, e))?;

    if !output.status.success() {
        return Err(CropperError::ToolFailed {
            tool: tools.ffprobe.clone(),
            code: output.status.code(),
            log: String::from_utf8_lossy(&output.stderr).to_string(),
        }
        .into());
    }

    let json = String::from_utf8_lossy(&output.stdout);
    Ok(parse_probe_output(path, &json)?)
}

/// Build a `VideoInfo` from ffprobe's JSON output
pub fn parse_probe_output(path: &Path, json: &str) -> Result<VideoInfo, CropperError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| CropperError::Probe(e.to_string()))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CropperError::Probe("no video stream found".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(CropperError::Probe("video stream has no dimensions".to_string())),
    };

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        duration,
        frame_rate,
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value > 0.0).then_some(value)
}

/// ffmpeg crop filter for a source-space rectangle
pub fn crop_filter(rect: &CropRect) -> String {
    format!("crop={}:{}:{}:{}", rect.width, rect.height, rect.x, rect.y)
}

/// Clamp a rectangle into the frame, optionally even-align it, and refuse
/// anything degenerate.
pub fn sanitize_crop(rect: &CropRect, info: &VideoInfo, even: bool) -> Result<CropRect, CropperError> {
    let frame = info.frame_size();
    // Nothing of the box overlaps the frame
    if rect.x >= frame.width || rect.y >= frame.height {
        return Err(CropperError::DegenerateCrop { rect: *rect, frame });
    }
    let mut crop = rect.clamp_to(frame);
    if even {
        crop = crop.align_even();
    }
    crop.validate(frame)?;
    Ok(crop)
}

/// Keep a seek position inside the video
pub fn clamp_timestamp(timestamp: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    if timestamp < duration {
        timestamp.max(0.0)
    } else {
        duration / 2.0
    }
}

/// Arguments for grabbing a single frame, optionally cropped
pub fn frame_args(
    input: &Path,
    output: &Path,
    timestamp: f64,
    crop: Option<&CropRect>,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", timestamp),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    if let Some(rect) = crop {
        args.push("-filter:v".to_string());
        args.push(crop_filter(rect));
    }

    args.push("-frames:v".to_string());
    args.push("1".to_string());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Arguments for the full cropped export. Audio is copied untouched.
pub fn export_args(
    input: &Path,
    output: &Path,
    rect: &CropRect,
    encoder_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-filter:v".to_string(),
        crop_filter(rect),
    ];

    args.extend(encoder_args.iter().cloned());

    args.extend(
        [
            "-c:a",
            "copy",
            "-progress",
            "pipe:1",
            "-nostats",
            "-loglevel",
            "error",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args.push(output.to_string_lossy().to_string());
    args
}

/// Extract one frame as an image. Succeeds only when the image exists afterwards.
pub async fn extract_frame(
    tools: &Tools,
    input: &Path,
    output: &Path,
    timestamp: f64,
    crop: Option<&CropRect>,
) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    // A stale image must not pass for fresh output
    if output.exists() {
        fs::remove_file(output)
            .with_context(|| format!("Failed to remove old preview {}", output.display()))?;
    }

    let args = frame_args(input, output, timestamp, crop);
    log::debug!("ffmpeg frame args: {:?}", args);

    let result = Command::new(&tools.ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(&tools.ffmpeg, e))?;

    if !result.status.success() {
        return Err(CropperError::ToolFailed {
            tool: tools.ffmpeg.clone(),
            code: result.status.code(),
            log: String::from_utf8_lossy(&result.stderr).to_string(),
        }
        .into());
    }

    if !output.is_file() {
        return Err(CropperError::MissingOutput {
            tool: tools.ffmpeg.clone(),
            path: output.to_path_buf(),
        }
        .into());
    }

    Ok(())
}

/// Everything needed to run one cropped export
#[derive(Debug, Clone)]
pub struct ExportSpec {
    pub input: VideoInfo,
    pub destination: PathBuf,
    pub crop: CropRect,
    pub even_dimensions: bool,
    pub encoder_args: Vec<String>,
}

/// Encode the cropped video, streaming tool output through `on_event`.
///
/// ffmpeg writes into a hidden sibling file that replaces `destination` only
/// after a successful run, so failures and cancellation leave nothing behind
/// and never clobber an existing file. Returns the crop actually applied.
pub async fn export_cropped<F>(
    tools: &Tools,
    spec: &ExportSpec,
    cancellation_token: Arc<AtomicBool>,
    on_event: F,
) -> Result<CropRect>
where
    F: Fn(ProcessEvent) + Send + Sync,
{
    validate_input(&spec.input.path)?;
    let crop = sanitize_crop(&spec.crop, &spec.input, spec.even_dimensions)?;
    if crop != spec.crop {
        on_event(ProcessEvent::Line(format!(
            "Adjusted crop from {} to {}",
            spec.crop, crop
        )));
    }

    if let Some(parent) = spec.destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = TempOutput::new(temp_output_path(&spec.destination));
    let temp_path = temp.path.clone();
    let args = export_args(&spec.input.path, &temp_path, &crop, &spec.encoder_args);
    log::info!(
        "Exporting {} -> {} with {}",
        spec.input.path.display(),
        spec.destination.display(),
        crop_filter(&crop)
    );
    log::debug!("ffmpeg export args: {:?}", args);

    run_export_process(
        tools,
        &args,
        spec.input.duration,
        &cancellation_token,
        &on_event,
    )
    .await?;

    let produced = fs::metadata(&temp_path).map(|m| m.len() > 0).unwrap_or(false);
    if !produced {
        return Err(CropperError::MissingOutput {
            tool: tools.ffmpeg.clone(),
            path: spec.destination.clone(),
        }
        .into());
    }

    replace_file(&temp_path, &spec.destination)?;
    drop(temp);

    Ok(crop)
}

/// Partial export output, removed when dropped unless it was renamed away.
/// Dropping the export future (e.g. on runtime shutdown) cleans up as well.
struct TempOutput {
    path: PathBuf,
}

impl TempOutput {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        remove_if_exists(&self.path);
    }
}

async fn run_export_process<F>(
    tools: &Tools,
    args: &[String],
    duration: f64,
    cancellation_token: &AtomicBool,
    on_event: &F,
) -> Result<()>
where
    F: Fn(ProcessEvent) + Send + Sync,
{
    let mut child = Command::new(&tools.ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(&tools.ffmpeg, e))?;

    let stdout = child.stdout.take().context("ffmpeg stdout was not captured")?;
    let stderr = child.stderr.take().context("ffmpeg stderr was not captured")?;
    let mut progress_lines = BufReader::new(stdout).lines();
    let mut log_lines = BufReader::new(stderr).lines();
    let (mut progress_open, mut log_open) = (true, true);

    let mut captured_log = String::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    while progress_open || log_open {
        tokio::select! {
            line = progress_lines.next_line(), if progress_open => match line {
                Ok(Some(line)) => {
                    if let Some(event) = parse_progress_line(&line, duration) {
                        on_event(event);
                    }
                }
                _ => progress_open = false,
            },
            line = log_lines.next_line(), if log_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        log::debug!("[ffmpeg] {}", line);
                        captured_log.push_str(&line);
                        captured_log.push('\n');
                        on_event(ProcessEvent::Line(line));
                    }
                }
                _ => log_open = false,
            },
            _ = ticker.tick() => {
                if cancellation_token.load(Ordering::Relaxed) {
                    child.kill().await.ok();
                    return Err(CropperError::Cancelled.into());
                }
            }
        }
    }

    let status = child.wait().await.context("Failed to wait for ffmpeg")?;
    if cancellation_token.load(Ordering::Relaxed) {
        return Err(CropperError::Cancelled.into());
    }
    if !status.success() {
        log::error!("ffmpeg export failed:\n{}", captured_log);
        return Err(CropperError::ToolFailed {
            tool: tools.ffmpeg.clone(),
            code: status.code(),
            log: captured_log,
        }
        .into());
    }

    Ok(())
}

/// Interpret one `-progress pipe:1` key=value line
pub fn parse_progress_line(line: &str, duration: f64) -> Option<ProcessEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is microseconds as well, despite its name
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.trim().parse().ok()?;
            let seconds = micros.max(0) as f64 / 1_000_000.0;
            let fraction = (duration > 0.0).then(|| (seconds / duration).clamp(0.0, 1.0));
            Some(ProcessEvent::Progress { seconds, fraction })
        }
        "progress" if value.trim() == "end" => Some(ProcessEvent::Complete),
        _ => None,
    }
}

/// Format seconds as HH:MM:SS.mmm
pub fn format_timecode(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) as f64 / 1000.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}

/// Hidden sibling path ffmpeg writes into before the final rename.
/// Keeps the extension so ffmpeg picks the same container.
pub fn temp_output_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = destination
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    destination.with_file_name(format!(
        ".{}.cropping-{}.{}",
        stem,
        std::process::id(),
        ext
    ))
}

fn replace_file(from: &Path, to: &Path) -> Result<()> {
    // rename() does not replace an existing file on Windows
    if cfg!(windows) && to.exists() {
        fs::remove_file(to).with_context(|| format!("Failed to replace {}", to.display()))?;
    }
    fs::rename(from, to)
        .with_context(|| format!("Failed to move export into {}", to.display()))?;
    Ok(())
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

fn spawn_error(tool: &str, err: io::Error) -> anyhow::Error {
    if err.kind() == io::ErrorKind::NotFound {
        CropperError::ToolMissing(tool.to_string()).into()
    } else {
        anyhow!(err).context(format!("Failed to run {}", tool))
    }
}

/// Stand-in ffmpeg that creates its output file and then hangs
#[cfg(all(test, unix))]
pub(crate) fn stalling_tools(dir: &Path) -> Tools {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("stalling-ffmpeg.sh");
    fs::write(
        &script,
        "#!/bin/sh\nfor last; do :; done\necho partial > \"$last\"\nexec sleep 30\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    let path = script.to_string_lossy().to_string();
    Tools {
        ffmpeg: path.clone(),
        ffprobe: path,
    }
}

/// Wait until `path` exists, giving up after a few seconds
#[cfg(test)]
pub(crate) async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
