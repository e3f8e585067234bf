//! Half-block rendering of preview frames inside the terminal
//! Each cell shows two vertical pixels using '▀' with separate fg/bg colors

use anyhow::{Context, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use std::path::Path;

use crate::geometry::{DisplayRect, Letterbox};
use crate::types::{CropRect, Size};

/// Largest size kept in memory for a decoded preview frame
const THUMBNAIL_BOUNDS: Size = Size {
    width: 640,
    height: 640,
};

/// Decode a frame written by ffmpeg and shrink it for terminal display
pub fn load_frame(path: &Path) -> Result<RgbImage> {
    let frame = image::open(path)
        .with_context(|| format!("Failed to decode preview image {}", path.display()))?
        .to_rgb8();

    let size = Size::new(frame.width(), frame.height());
    match Letterbox::fit(size, THUMBNAIL_BOUNDS) {
        Some(fit) if fit.display.width < size.width => Ok(image::imageops::thumbnail(
            &frame,
            fit.display.width,
            fit.display.height,
        )),
        _ => Ok(frame),
    }
}

/// Canvas resolution of a terminal area: one column by two half-rows per cell
pub fn canvas_size(area: Rect) -> Size {
    Size::new(area.width as u32, area.height as u32 * 2)
}

/// Map a terminal cell to a canvas point relative to `area`
pub fn cell_to_canvas(area: Rect, column: u16, row: u16) -> (i32, i32) {
    (
        column as i32 - area.x as i32,
        (row as i32 - area.y as i32) * 2,
    )
}

/// A frame letterboxed into a terminal area, with an optional crop box on top
pub struct PreviewCanvas<'a> {
    image: &'a RgbImage,
    source: Size,
    crop: Option<CropRect>,
    accent: Color,
}

impl<'a> PreviewCanvas<'a> {
    pub fn new(image: &'a RgbImage, source: Size) -> Self {
        Self {
            image,
            source,
            crop: None,
            accent: Color::Cyan,
        }
    }

    pub fn crop(mut self, crop: Option<CropRect>) -> Self {
        self.crop = crop;
        self
    }

    pub fn accent(mut self, accent: Color) -> Self {
        self.accent = accent;
        self
    }
}

impl Widget for PreviewCanvas<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(letterbox) = Letterbox::fit(self.source, canvas_size(area)) else {
            return;
        };
        let scaled = image::imageops::resize(
            self.image,
            letterbox.display.width,
            letterbox.display.height,
            FilterType::Triangle,
        );
        let overlay = self.crop.map(|c| letterbox.to_display(&c));

        let pixel = |x: i32, y: i32| -> Color {
            if !letterbox.contains(x, y) {
                return Color::Black;
            }
            if let Some(rect) = overlay {
                if on_border(&rect, x, y) {
                    return self.accent;
                }
            }
            let px = (x - letterbox.offset_x as i32) as u32;
            let py = (y - letterbox.offset_y as i32) as u32;
            let Rgb([r, g, b]) = *scaled.get_pixel(px, py);
            match overlay {
                Some(rect) if !inside(&rect, x, y) => Color::Rgb(r / 3, g / 3, b / 3),
                _ => Color::Rgb(r, g, b),
            }
        };

        for row in 0..area.height {
            for col in 0..area.width {
                let x = col as i32;
                let y = row as i32 * 2;
                if let Some(cell) = buf.cell_mut((area.x + col, area.y + row)) {
                    cell.set_char('▀')
                        .set_fg(pixel(x, y))
                        .set_bg(pixel(x, y + 1));
                }
            }
        }

        if let (Some(rect), Some(crop)) = (overlay, self.crop) {
            let label = format!(" {}x{} ", crop.width, crop.height);
            let col = area.x as i32 + rect.x + 1;
            let row = area.y as i32 + rect.y / 2 + 1;
            if col >= area.x as i32
                && row < (area.y + area.height) as i32
                && col + (label.len() as i32) < (area.x + area.width) as i32
            {
                buf.set_string(
                    col as u16,
                    row as u16,
                    label,
                    Style::default()
                        .fg(Color::White)
                        .bg(Color::Black)
                        .add_modifier(Modifier::BOLD),
                );
            }
        }
    }
}

fn inside(rect: &DisplayRect, x: i32, y: i32) -> bool {
    x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom()
}

fn on_border(rect: &DisplayRect, x: i32, y: i32) -> bool {
    if !inside(rect, x, y) {
        return false;
    }
    x == rect.x || x == rect.right() - 1 || y == rect.y || y == rect.bottom() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_canvas() {
        let area = Rect::new(2, 3, 40, 20);
        assert_eq!(cell_to_canvas(area, 2, 3), (0, 0));
        assert_eq!(cell_to_canvas(area, 12, 8), (10, 10));
        assert_eq!(cell_to_canvas(area, 0, 0), (-2, -6));
        assert_eq!(canvas_size(area), Size::new(40, 40));
    }

    #[test]
    fn test_border_detection() {
        let rect = DisplayRect {
            x: 2,
            y: 2,
            width: 4,
            height: 4,
        };
        assert!(on_border(&rect, 2, 3));
        assert!(on_border(&rect, 5, 5));
        assert!(!on_border(&rect, 3, 3));
        assert!(!on_border(&rect, 6, 3));
    }

    #[test]
    fn test_render_draws_crop_border() {
        let image = RgbImage::from_pixel(16, 9, Rgb([200, 100, 50]));
        let area = Rect::new(0, 0, 16, 9);
        let mut buf = Buffer::empty(area);
        PreviewCanvas::new(&image, Size::new(1600, 900))
            .crop(Some(CropRect::new(400, 200, 800, 400)))
            .render(area, &mut buf);

        // Canvas is 16x18, the frame fits exactly at 16x9 with 4.5 rows of bars
        let letterbox = Letterbox::fit(Size::new(1600, 900), canvas_size(area)).unwrap();
        let rect = letterbox.to_display(&CropRect::new(400, 200, 800, 400));
        let border_row = (rect.y / 2) as u16;
        let border_cell = &buf[(rect.x as u16, border_row)];
        let border_color = if rect.y % 2 == 0 {
            border_cell.fg
        } else {
            border_cell.bg
        };
        assert_eq!(border_color, Color::Cyan);

        // Letterbox bars stay black
        assert_eq!(buf[(0, 0)].fg, Color::Black);
    }

    #[test]
    fn test_load_frame_shrinks_large_images() {
        let dir = std::env::temp_dir().join(format!("video-cropper-preview-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.png");
        RgbImage::from_pixel(1920, 1080, Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let frame = load_frame(&path).unwrap();
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 360);
        std::fs::remove_dir_all(&dir).ok();
    }
}
