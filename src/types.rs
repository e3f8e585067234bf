//! Shared data types for Video Cropper

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pixel dimensions of a frame or canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A crop region in source-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering the whole frame
    pub fn full_frame(frame: Size) -> Self {
        Self::new(0, 0, frame.width, frame.height)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Named aspect ratio that constrains interactive resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectPreset {
    #[default]
    Freeform,
    CinemaScope,
    YouTube,
    InstagramReel,
    TikTok,
    Square,
}

impl AspectPreset {
    /// All presets in menu order
    pub const ALL: [AspectPreset; 6] = [
        AspectPreset::Freeform,
        AspectPreset::CinemaScope,
        AspectPreset::YouTube,
        AspectPreset::InstagramReel,
        AspectPreset::TikTok,
        AspectPreset::Square,
    ];

    /// Width / height ratio, `None` for freeform
    pub fn ratio(self) -> Option<f64> {
        match self {
            AspectPreset::Freeform => None,
            AspectPreset::CinemaScope => Some(2.39),
            AspectPreset::YouTube => Some(16.0 / 9.0),
            AspectPreset::InstagramReel | AspectPreset::TikTok => Some(9.0 / 16.0),
            AspectPreset::Square => Some(1.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectPreset::Freeform => "Freeform",
            AspectPreset::CinemaScope => "CinemaScope 2.39:1",
            AspectPreset::YouTube => "YouTube 16:9",
            AspectPreset::InstagramReel => "Instagram Reel 9:16",
            AspectPreset::TikTok => "TikTok 9:16",
            AspectPreset::Square => "Square 1:1",
        }
    }

    /// Parse a CLI name such as `16:9`, `square` or `tiktok`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "free" | "freeform" => Some(AspectPreset::Freeform),
            "2.39:1" | "cinemascope" | "scope" => Some(AspectPreset::CinemaScope),
            "16:9" | "youtube" => Some(AspectPreset::YouTube),
            "9:16" | "reel" | "instagram" => Some(AspectPreset::InstagramReel),
            "tiktok" => Some(AspectPreset::TikTok),
            "1:1" | "square" => Some(AspectPreset::Square),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Probed attributes of an opened video file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    /// Frames per second, 0.0 when unknown
    pub frame_rate: f64,
    pub codec: String,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn frame_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// One-line human readable summary
    pub fn describe(&self) -> String {
        format!(
            "{} • {}x{} • {:.2}s • {:.2} fps • {}{}",
            self.file_name(),
            self.width,
            self.height,
            self.duration,
            self.frame_rate,
            self.codec,
            if self.has_audio { " + audio" } else { "" }
        )
    }
}

/// File extensions accepted as video input
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    "mp4", "m4v", "mov", "mpg", "mpeg", "3gp", "mkv", "webm", "avi",
];

/// Application version constant
pub const APP_VERSION: &str = "0.3.2";

/// Application name constant
pub const APP_NAME: &str = "Video Cropper";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_ratios() {
        assert_eq!(AspectPreset::Freeform.ratio(), None);
        assert_eq!(AspectPreset::Square.ratio(), Some(1.0));
        assert_eq!(
            AspectPreset::TikTok.ratio(),
            AspectPreset::InstagramReel.ratio()
        );
    }

    #[test]
    fn test_preset_cycle_wraps() {
        assert_eq!(AspectPreset::Square.next(), AspectPreset::Freeform);
        assert_eq!(AspectPreset::Freeform.previous(), AspectPreset::Square);
        let mut preset = AspectPreset::Freeform;
        for _ in 0..AspectPreset::ALL.len() {
            preset = preset.next();
        }
        assert_eq!(preset, AspectPreset::Freeform);
    }

    #[test]
    fn test_preset_from_name() {
        assert_eq!(AspectPreset::from_name("1:1"), Some(AspectPreset::Square));
        assert_eq!(AspectPreset::from_name(" YouTube "), Some(AspectPreset::YouTube));
        assert_eq!(AspectPreset::from_name("4:3"), None);
    }

    #[test]
    fn test_crop_rect_edges() {
        let rect = CropRect::new(10, 20, 100, 50);
        assert_eq!(rect.right(), 110);
        assert_eq!(rect.bottom(), 70);
        assert!(!rect.is_degenerate());
        assert!(CropRect::new(0, 0, 0, 10).is_degenerate());
    }
}
