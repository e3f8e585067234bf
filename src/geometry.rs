//! Crop-box geometry for Video Cropper
//! Maps rectangles between the letterboxed preview canvas and source pixels

use crate::error::CropperError;
use crate::types::{CropRect, Size};

/// A rectangle in canvas coordinates. May start outside the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayRect {
    /// Normalized rectangle spanned by two corner points
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: a.0.abs_diff(b.0),
            height: a.1.abs_diff(b.1),
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }
}

/// How a source frame is scaled and centered inside a preview canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub source: Size,
    pub canvas: Size,
    pub display: Size,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Fit `source` inside `canvas` preserving its aspect ratio.
    /// Returns `None` when either size is empty.
    pub fn fit(source: Size, canvas: Size) -> Option<Self> {
        if source.is_empty() || canvas.is_empty() {
            return None;
        }

        let (sw, sh) = (source.width as u64, source.height as u64);
        let (cw, ch) = (canvas.width as u64, canvas.height as u64);

        // Integer cross-multiplication avoids float drift on equal ratios
        let display = if sw * ch > cw * sh {
            let height = (cw * sh / sw) as u32;
            Size::new(canvas.width, height.clamp(1, canvas.height))
        } else {
            let width = (ch * sw / sh) as u32;
            Size::new(width.clamp(1, canvas.width), canvas.height)
        };

        Some(Self {
            source,
            canvas,
            display,
            offset_x: (canvas.width - display.width) / 2,
            offset_y: (canvas.height - display.height) / 2,
        })
    }

    /// Source pixels per display unit, horizontally
    pub fn scale_x(&self) -> f64 {
        self.source.width as f64 / self.display.width as f64
    }

    /// Source pixels per display unit, vertically
    pub fn scale_y(&self) -> f64 {
        self.source.height as f64 / self.display.height as f64
    }

    /// Whether a canvas point lies on the displayed image
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let left = self.offset_x as i64;
        let top = self.offset_y as i64;
        let (x, y) = (x as i64, y as i64);
        x >= left
            && x < left + self.display.width as i64
            && y >= top
            && y < top + self.display.height as i64
    }

    /// Convert a canvas point to (fractional) source coordinates, clamping it
    /// onto the displayed image first.
    pub fn point_to_source(&self, x: i32, y: i32) -> (f64, f64) {
        let left = self.offset_x as i64;
        let top = self.offset_y as i64;
        let cx = (x as i64).clamp(left, left + self.display.width as i64) - left;
        let cy = (y as i64).clamp(top, top + self.display.height as i64) - top;

        let sx = (cx as f64 * self.scale_x()).min(self.source.width as f64);
        let sy = (cy as f64 * self.scale_y()).min(self.source.height as f64);
        (sx, sy)
    }

    /// Map a canvas rectangle to source pixels
    pub fn to_source(&self, rect: DisplayRect) -> CropRect {
        let (x0, y0) = self.point_to_source(rect.x, rect.y);
        let (x1, y1) = self.point_to_source(rect.right(), rect.bottom());

        let left = x0.round() as u32;
        let top = y0.round() as u32;
        let right = (x1.round() as u32).max(left);
        let bottom = (y1.round() as u32).max(top);

        CropRect::new(left, top, right - left, bottom - top).clamp_to(self.source)
    }

    /// Map a source rectangle to canvas coordinates for drawing
    pub fn to_display(&self, rect: &CropRect) -> DisplayRect {
        let x0 = (rect.x as f64 / self.scale_x()).round() as i32;
        let y0 = (rect.y as f64 / self.scale_y()).round() as i32;
        let x1 = (rect.right() as f64 / self.scale_x()).round() as i32;
        let y1 = (rect.bottom() as f64 / self.scale_y()).round() as i32;

        DisplayRect {
            x: self.offset_x as i32 + x0,
            y: self.offset_y as i32 + y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }

    /// Translate a drag gesture on the canvas into a source-space crop box.
    /// With a ratio the box is the largest of that ratio inside the dragged
    /// area, growing away from the anchor.
    pub fn rect_from_drag(
        &self,
        anchor: (i32, i32),
        current: (i32, i32),
        ratio: Option<f64>,
    ) -> CropRect {
        let anchor = self.point_to_source(anchor.0, anchor.1);
        let current = self.point_to_source(current.0, current.1);
        rect_from_points(self.source, anchor, current, ratio)
    }
}

/// Crop box spanned by two source-space points, optionally ratio-locked
pub fn rect_from_points(
    frame: Size,
    anchor: (f64, f64),
    current: (f64, f64),
    ratio: Option<f64>,
) -> CropRect {
    let Some(ratio) = ratio.filter(|r| *r > 0.0) else {
        let left = anchor.0.min(current.0).round() as u32;
        let top = anchor.1.min(current.1).round() as u32;
        let right = anchor.0.max(current.0).round() as u32;
        let bottom = anchor.1.max(current.1).round() as u32;
        return CropRect::new(left, top, right - left, bottom - top).clamp_to(frame);
    };

    let (width, height) = fit_ratio(
        (current.0 - anchor.0).abs(),
        (current.1 - anchor.1).abs(),
        ratio,
    );

    let ax = anchor.0.round() as u32;
    let ay = anchor.1.round() as u32;
    let x = if current.0 >= anchor.0 {
        ax
    } else {
        ax.saturating_sub(width)
    };
    let y = if current.1 >= anchor.1 {
        ay
    } else {
        ay.saturating_sub(height)
    };

    CropRect::new(x, y, width, height).clamp_to(frame)
}

/// Largest integer size with `width / height ≈ ratio` inside `max_w × max_h`
pub fn fit_ratio(max_w: f64, max_h: f64, ratio: f64) -> (u32, u32) {
    let max_w = max_w.max(0.0);
    let max_h = max_h.max(0.0);

    let floor = |v: f64| (v + 1e-9).floor();

    let mut width = floor(max_w.min(max_h * ratio));
    let mut height = (width / ratio).round();
    if height > floor(max_h) {
        height = floor(max_h);
        width = floor(height * ratio);
    }

    (width as u32, height as u32)
}

/// Largest centered crop box with the requested ratio
pub fn centered_for_ratio(frame: Size, ratio: f64) -> CropRect {
    let (width, height) = fit_ratio(frame.width as f64, frame.height as f64, ratio);
    CropRect::new(
        (frame.width - width) / 2,
        (frame.height - height) / 2,
        width,
        height,
    )
}

impl CropRect {
    /// Pull the rectangle back inside the frame, shrinking it if needed
    pub fn clamp_to(&self, frame: Size) -> CropRect {
        if frame.is_empty() {
            return CropRect::default();
        }
        let x = self.x.min(frame.width - 1);
        let y = self.y.min(frame.height - 1);
        CropRect::new(
            x,
            y,
            self.width.min(frame.width - x),
            self.height.min(frame.height - y),
        )
    }

    /// Refuse empty rectangles and rectangles that leave the frame
    pub fn validate(&self, frame: Size) -> Result<(), CropperError> {
        if self.is_degenerate() || self.right() > frame.width || self.bottom() > frame.height {
            return Err(CropperError::DegenerateCrop { rect: *self, frame });
        }
        Ok(())
    }

    /// Move by a pixel offset, keeping the size and staying inside the frame
    pub fn translate(&self, dx: i64, dy: i64, frame: Size) -> CropRect {
        let rect = self.clamp_to(frame);
        let max_x = (frame.width - rect.width) as i64;
        let max_y = (frame.height - rect.height) as i64;
        CropRect::new(
            (rect.x as i64 + dx).clamp(0, max_x) as u32,
            (rect.y as i64 + dy).clamp(0, max_y) as u32,
            rect.width,
            rect.height,
        )
    }

    /// Grow (positive) or shrink (negative) the width by `delta` pixels around
    /// the center. Height follows the ratio, or scales proportionally.
    pub fn resize_by(&self, delta: i64, ratio: Option<f64>, frame: Size) -> CropRect {
        if frame.is_empty() || self.is_degenerate() {
            return *self;
        }
        let center_x = self.x as f64 + self.width as f64 / 2.0;
        let center_y = self.y as f64 + self.height as f64 / 2.0;
        let target_w = (self.width as i64 + delta).max(2) as f64;

        let (width, height) = match ratio {
            Some(r) => fit_ratio(target_w.min(frame.width as f64), frame.height as f64, r),
            None => {
                let scale = target_w / self.width as f64;
                let h = (self.height as f64 * scale).round().clamp(1.0, frame.height as f64);
                (target_w.min(frame.width as f64) as u32, h as u32)
            }
        };
        if width == 0 || height == 0 {
            return *self;
        }

        let x = (center_x - width as f64 / 2.0)
            .round()
            .clamp(0.0, (frame.width - width) as f64);
        let y = (center_y - height as f64 / 2.0)
            .round()
            .clamp(0.0, (frame.height - height) as f64);

        CropRect::new(x as u32, y as u32, width, height)
    }

    /// Round offset and size down to even values, as 4:2:0 encoders require
    pub fn align_even(&self) -> CropRect {
        let even = |v: u32| v & !1;
        CropRect::new(
            even(self.x),
            even(self.y),
            even(self.width).max(2.min(self.width)),
            even(self.height).max(2.min(self.height)),
        )
    }
}
