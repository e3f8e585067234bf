//! Background export worker for Video Cropper
//! Runs at most one ffmpeg export at a time and relays its output to the TUI

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use log::{error, info};

use crate::error::CropperError;
use crate::tui::{AppMessage, LogLevel, TuiSender};
use crate::types::CropRect;
use crate::video::{self, ExportSpec, ProcessEvent, Tools};

/// Marks the worker busy for as long as it is alive
pub struct ExportSlot {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Owner of the single in-flight export job
pub struct ExportWorker {
    busy: Arc<AtomicBool>,
    cancellation_token: Arc<AtomicBool>,
    notify_on_complete: bool,
}

impl ExportWorker {
    pub fn new(notify_on_complete: bool) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            cancellation_token: Arc::new(AtomicBool::new(false)),
            notify_on_complete,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Reserve the worker. A second export while one runs is rejected.
    pub fn claim(&self) -> Result<ExportSlot, CropperError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CropperError::ExportInProgress)?;
        Ok(ExportSlot {
            busy: self.busy.clone(),
        })
    }

    /// Spawn the export on the tokio runtime. Progress, log lines and the
    /// final outcome arrive on `tx` in the order ffmpeg produced them.
    pub fn start(&self, tools: Tools, spec: ExportSpec, tx: TuiSender) -> Result<(), CropperError> {
        let slot = self.claim()?;

        // Reset token before starting
        self.cancellation_token.store(false, Ordering::Relaxed);
        let cancellation_token = self.cancellation_token.clone();
        let notify = self.notify_on_complete;

        let _ = tx.send(AppMessage::ExportStarted(spec.destination.clone()));
        let _ = tx.send(AppMessage::Log(
            LogLevel::Info,
            format!("Exporting to {}…", spec.destination.display()),
        ));

        tokio::spawn(async move {
            let events_tx = tx.clone();
            let result = video::export_cropped(&tools, &spec, cancellation_token, move |event| {
                forward_event(&events_tx, event)
            })
            .await;

            drop(slot);
            report_outcome(&tx, &spec.destination, result, notify);
        });

        Ok(())
    }

    /// Ask the running export to stop. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.cancellation_token.store(true, Ordering::Relaxed);
        true
    }

    /// Wait for the running export to finish its cleanup. Returns false if it
    /// is still busy after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.is_busy() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

fn forward_event(tx: &TuiSender, event: ProcessEvent) {
    let msg = match event {
        ProcessEvent::Progress { seconds, fraction } => AppMessage::Progress(
            fraction.unwrap_or(0.0),
            format!("Processing timestamp: {}", video::format_timecode(seconds)),
        ),
        ProcessEvent::Line(line) => AppMessage::Log(LogLevel::Warning, format!("ffmpeg: {}", line)),
        ProcessEvent::Complete => {
            AppMessage::Log(LogLevel::Info, "ffmpeg processing complete.".to_string())
        }
    };
    let _ = tx.send(msg);
}

fn report_outcome(
    tx: &TuiSender,
    destination: &Path,
    result: anyhow::Result<CropRect>,
    notify: bool,
) {
    match result {
        Ok(crop) => {
            info!("Export complete: {} ({})", destination.display(), crop);
            let _ = tx.send(AppMessage::Progress(1.0, "Done".to_string()));
            let _ = tx.send(AppMessage::ExportFinished(destination.to_path_buf()));
            if notify {
                use notify_rust::Notification;
                let _ = Notification::new()
                    .summary("Video Cropper")
                    .body(&format!("Saved cropped video to {}", destination.display()))
                    .show();
            }
        }
        Err(e) => {
            let cancelled = matches!(e.downcast_ref::<CropperError>(), Some(CropperError::Cancelled));
            if cancelled {
                info!("Export to {} cancelled", destination.display());
            } else {
                error!("Export to {} failed: {:#}", destination.display(), e);
            }
            let _ = tx.send(AppMessage::ExportFailed(format!("{:#}", e)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::create_channel;
    use crate::types::VideoInfo;
    use std::path::PathBuf;

    #[test]
    fn test_second_claim_is_rejected() {
        let worker = ExportWorker::new(false);
        let slot = worker.claim().unwrap();
        assert!(worker.is_busy());
        assert!(matches!(worker.claim(), Err(CropperError::ExportInProgress)));

        drop(slot);
        assert!(!worker.is_busy());
        assert!(worker.claim().is_ok());
    }

    #[test]
    fn test_cancel_when_idle() {
        let worker = ExportWorker::new(false);
        assert!(!worker.cancel());
    }

    #[tokio::test]
    async fn test_start_rejected_while_busy() {
        let worker = ExportWorker::new(false);
        let _slot = worker.claim().unwrap();
        let (tx, mut rx) = create_channel();

        let spec = ExportSpec {
            input: VideoInfo {
                path: PathBuf::from("in.mp4"),
                width: 640,
                height: 480,
                duration: 1.0,
                frame_rate: 25.0,
                codec: "h264".to_string(),
                has_audio: false,
            },
            destination: PathBuf::from("out.mp4"),
            crop: CropRect::new(0, 0, 320, 240),
            even_dimensions: true,
            encoder_args: Vec::new(),
        };
        assert!(matches!(
            worker.start(Tools::default(), spec, tx),
            Err(CropperError::ExportInProgress)
        ));
        // Nothing was announced for the rejected job
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_idle_when_nothing_runs() {
        let worker = ExportWorker::new(false);
        assert!(worker.wait_idle(Duration::from_millis(10)).await);

        let _slot = worker.claim().unwrap();
        assert!(!worker.wait_idle(Duration::from_millis(100)).await);
    }

    #[cfg(unix)]
    fn stalled_export(dir: &Path) -> (Tools, ExportSpec) {
        std::fs::create_dir_all(dir).unwrap();
        let input = dir.join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let spec = ExportSpec {
            input: VideoInfo {
                path: input,
                width: 640,
                height: 480,
                duration: 10.0,
                frame_rate: 25.0,
                codec: "h264".to_string(),
                has_audio: false,
            },
            destination: dir.join("out.mp4"),
            crop: CropRect::new(0, 0, 320, 240),
            even_dimensions: true,
            encoder_args: Vec::new(),
        };
        (video::stalling_tools(dir), spec)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_then_wait_removes_partial_output() {
        let dir = std::env::temp_dir().join(format!("video-cropper-quit-{}", std::process::id()));
        let (tools, spec) = stalled_export(&dir);
        let destination = spec.destination.clone();
        let temp = video::temp_output_path(&destination);

        let worker = ExportWorker::new(false);
        let (tx, mut rx) = create_channel();
        worker.start(tools, spec, tx).unwrap();
        assert!(video::wait_for_file(&temp).await);

        assert!(worker.cancel());
        assert!(worker.wait_idle(Duration::from_secs(10)).await);
        assert!(!temp.exists());
        assert!(!destination.exists());

        let mut failure = None;
        while let Some(msg) = rx.recv().await {
            if let AppMessage::ExportFailed(reason) = msg {
                failure = Some(reason);
                break;
            }
        }
        assert!(failure.unwrap().contains("cancelled"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_runtime_shutdown_mid_export_removes_partial_output() {
        let dir = std::env::temp_dir().join(format!("video-cropper-drop-{}", std::process::id()));
        let (tools, spec) = stalled_export(&dir);
        let destination = spec.destination.clone();
        let temp = video::temp_output_path(&destination);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let worker = ExportWorker::new(false);
        let (tx, _rx) = create_channel();
        runtime.block_on(async {
            worker.start(tools, spec, tx).unwrap();
            assert!(video::wait_for_file(&temp).await);
            worker.cancel();
        });
        // Shutting down drops the export task mid-flight
        drop(runtime);

        assert!(!temp.exists());
        assert!(!destination.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_export_reports_and_frees_worker() {
        let dir = std::env::temp_dir().join(format!("video-cropper-worker-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.mp4");
        std::fs::write(&input, b"x").unwrap();

        let worker = ExportWorker::new(false);
        let (tx, mut rx) = create_channel();
        let tools = Tools {
            ffmpeg: "video-cropper-no-such-ffmpeg".to_string(),
            ffprobe: "video-cropper-no-such-ffprobe".to_string(),
        };
        let spec = ExportSpec {
            input: VideoInfo {
                path: input,
                width: 640,
                height: 480,
                duration: 1.0,
                frame_rate: 25.0,
                codec: "h264".to_string(),
                has_audio: false,
            },
            destination: dir.join("out.mp4"),
            crop: CropRect::new(0, 0, 320, 240),
            even_dimensions: true,
            encoder_args: Vec::new(),
        };
        worker.start(tools, spec, tx).unwrap();

        let mut failure = None;
        while let Some(msg) = rx.recv().await {
            if let AppMessage::ExportFailed(reason) = msg {
                failure = Some(reason);
                break;
            }
        }
        let failure = failure.expect("worker should report the failure");
        assert!(failure.contains("not found"));
        assert!(!worker.is_busy());
        assert!(!dir.join("out.mp4").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
