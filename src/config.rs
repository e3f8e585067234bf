//! Configuration management for Video Cropper
//! Handles loading and saving settings to settings.json

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::AspectPreset;

/// Application configuration stored in settings.json
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// ffprobe executable (name on PATH or absolute path)
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Preset selected when a video is opened
    #[serde(default)]
    pub default_preset: AspectPreset,
    /// Timestamp (seconds) used for cropped preview frames
    #[serde(default = "default_preview_timestamp")]
    pub preview_timestamp: f64,
    /// Seconds moved by one seek step in the editor
    #[serde(default = "default_seek_step")]
    pub seek_step: f64,
    /// Round crop offsets and size to even values before exporting
    #[serde(default = "default_true")]
    pub even_dimensions: bool,
    /// Video encoder override, e.g. "libx264". ffmpeg picks one when unset.
    #[serde(default)]
    pub video_codec: Option<String>,
    /// Constant Rate Factor passed with the encoder override
    #[serde(default)]
    pub crf: Option<u32>,
    /// Encoder speed preset passed with the encoder override
    #[serde(default)]
    pub encoder_preset: Option<String>,
    /// Show a desktop notification when an export finishes
    #[serde(default = "default_true")]
    pub notify_on_complete: bool,
    /// Directory the file dialogs start in
    #[serde(default)]
    pub last_directory: Option<String>,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_preview_timestamp() -> f64 {
    1.0
}

fn default_seek_step() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            default_preset: AspectPreset::Freeform,
            preview_timestamp: default_preview_timestamp(),
            seek_step: default_seek_step(),
            even_dimensions: true,
            video_codec: None,
            crf: None,
            encoder_preset: None,
            notify_on_complete: true,
            last_directory: None,
        }
    }
}

impl AppConfig {
    /// Configuration file name
    const CONFIG_FILE: &'static str = "settings.json";

    /// Location of settings.json inside the user config directory
    pub fn config_path() -> Result<PathBuf> {
        let mut path =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        path.push("video-cropper");
        path.push(Self::CONFIG_FILE);
        Ok(path)
    }

    /// Load configuration from file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

        if config.ffmpeg_path.trim().is_empty() || config.ffprobe_path.trim().is_empty() {
            return Err(anyhow!(
                "ffmpeg_path and ffprobe_path must not be empty in {}",
                path.display()
            ));
        }

        Ok(config)
    }

    /// Load settings, creating a default file when none exists yet
    pub fn load_or_create() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = AppConfig::default();
            config.save_to(&path)?;
            log::info!("Created default settings at {}", path.display());
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Encoder arguments inserted before the output path
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref codec) = self.video_codec {
            args.push("-c:v".to_string());
            args.push(codec.clone());
            if let Some(crf) = self.crf {
                args.push("-crf".to_string());
                args.push(crf.to_string());
            }
            if let Some(ref preset) = self.encoder_preset {
                args.push("-preset".to_string());
                args.push(preset.clone());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            default_preset: AspectPreset::Square,
            video_codec: Some("libx264".to_string()),
            crf: Some(20),
            ..AppConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: AppConfig = serde_json::from_str(r#"{"seek_step": 5.0}"#).unwrap();
        assert_eq!(parsed.seek_step, 5.0);
        assert_eq!(parsed.ffmpeg_path, "ffmpeg");
        assert_eq!(parsed.preview_timestamp, 1.0);
        assert!(parsed.even_dimensions);
        assert!(parsed.notify_on_complete);
    }

    #[test]
    fn test_encoder_args() {
        assert!(AppConfig::default().encoder_args().is_empty());

        let config = AppConfig {
            video_codec: Some("libx264".to_string()),
            crf: Some(18),
            encoder_preset: Some("veryfast".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(
            config.encoder_args(),
            vec!["-c:v", "libx264", "-crf", "18", "-preset", "veryfast"]
        );

        // crf without a codec is ignored
        let config = AppConfig {
            crf: Some(18),
            ..AppConfig::default()
        };
        assert!(config.encoder_args().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("video-cropper-config-{}", std::process::id()));
        let path = dir.join("settings.json");
        let config = AppConfig {
            last_directory: Some("/videos".to_string()),
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.last_directory.as_deref(), Some("/videos"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_empty_tool_path() {
        let dir = std::env::temp_dir().join(format!("video-cropper-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"ffmpeg_path": "  "}"#).unwrap();
        assert!(AppConfig::load_from(&path).is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
