use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

use crate::settings::HexColor;

/// CPU drawing surface the renderer paints each frame into.
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self, color: HexColor) {
        self.pixmap
            .fill(Color::from_rgba8(color.r, color.g, color.b, 255));
    }

    pub fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: [u8; 4]) {
        if color[3] == 0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(x, y, radius) else {
            return;
        };
        let paint = solid_paint(color);
        self.pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
        if color[3] == 0 {
            return;
        }
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let paint = solid_paint(color);
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    /// Composites `mask` with its top-left corner at (`x`, `y`), using the
    /// mask value as coverage for `color`.
    pub fn blend_mask(&mut self, mask: &AlphaMask, x: i32, y: i32, color: [u8; 4]) {
        if color[3] == 0 {
            return;
        }
        let width = self.width() as i32;
        let height = self.height() as i32;
        let data = self.pixmap.data_mut();

        for row in 0..mask.height {
            let py = y + row as i32;
            if py < 0 || py >= height {
                continue;
            }
            for col in 0..mask.width {
                let px = x + col as i32;
                if px < 0 || px >= width {
                    continue;
                }
                let coverage = mask.data[row * mask.width + col];
                if coverage == 0 {
                    continue;
                }
                let alpha = ((u16::from(coverage) * u16::from(color[3]) + 127) / 255) as u8;
                let idx = ((py * width + px) * 4) as usize;
                blend_premultiplied(data, idx, [color[0], color[1], color[2], alpha]);
            }
        }
    }

    /// Straight-alpha RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    /// Raw frame bytes, row-major RGBA8. Frames drawn over an opaque
    /// background are identical in premultiplied and straight alpha.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = image::RgbaImage::from_raw(self.width(), self.height(), self.data().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match canvas size"))?;
        image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write png {}", path.display()))
    }
}

fn solid_paint(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn blend_premultiplied(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    let inv_alpha = 255_u16 - alpha;

    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    let dst_alpha = u16::from(frame[idx + 3]);
    frame[idx + 3] = (alpha + (dst_alpha * inv_alpha + 127) / 255).min(255) as u8;
}

/// Single-channel coverage buffer used for text, outlines and glows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|value| *value == 0)
    }

    /// Max-combines `bitmap` into the mask at (`x`, `y`), clipping at edges.
    pub fn stamp(&mut self, bitmap: &[u8], bitmap_width: usize, x: i32, y: i32) {
        if bitmap_width == 0 {
            return;
        }
        let bitmap_height = bitmap.len() / bitmap_width;
        for row in 0..bitmap_height {
            let my = y + row as i32;
            if my < 0 || my >= self.height as i32 {
                continue;
            }
            for col in 0..bitmap_width {
                let mx = x + col as i32;
                if mx < 0 || mx >= self.width as i32 {
                    continue;
                }
                let idx = my as usize * self.width + mx as usize;
                self.data[idx] = self.data[idx].max(bitmap[row * bitmap_width + col]);
            }
        }
    }

    /// Grows coverage outward by `radius` pixels (square structuring element).
    pub fn dilated(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let horizontal = self.sliding(radius, Axis::Horizontal, |window| {
            window.iter().copied().max().unwrap_or(0)
        });
        horizontal.sliding(radius, Axis::Vertical, |window| {
            window.iter().copied().max().unwrap_or(0)
        })
    }

    /// Approximates a gaussian blur with three box-blur passes per axis.
    pub fn blurred(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let box_radius = (radius / 3).max(1);
        let mean = |window: &[u8]| -> u8 {
            let sum = window.iter().map(|value| u32::from(*value)).sum::<u32>();
            (sum / window.len().max(1) as u32) as u8
        };

        let mut out = self.clone();
        for _ in 0..3 {
            out = out
                .sliding(box_radius, Axis::Horizontal, mean)
                .sliding(box_radius, Axis::Vertical, mean);
        }
        out
    }

    fn sliding(&self, radius: usize, axis: Axis, reduce: impl Fn(&[u8]) -> u8) -> Self {
        let mut out = Self::new(self.width, self.height);
        let full = 2 * radius + 1;
        let mut window = Vec::with_capacity(full);

        for y in 0..self.height {
            for x in 0..self.width {
                window.clear();
                let (pos, len) = match axis {
                    Axis::Horizontal => (x, self.width),
                    Axis::Vertical => (y, self.height),
                };
                for offset in 0..full {
                    let sample = (pos + offset).checked_sub(radius).filter(|p| *p < len);
                    let value = match (sample, axis) {
                        (Some(sx), Axis::Horizontal) => self.data[y * self.width + sx],
                        (Some(sy), Axis::Vertical) => self.data[sy * self.width + x],
                        (None, _) => 0,
                    };
                    window.push(value);
                }
                out.data[y * self.width + x] = reduce(&window);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_fills_every_pixel_opaque() {
        let mut canvas = Canvas::new(4, 3).expect("canvas");
        canvas.clear(HexColor::rgb(15, 23, 42));
        assert_eq!(canvas.pixel(0, 0), Some([15, 23, 42, 255]));
        assert_eq!(canvas.pixel(3, 2), Some([15, 23, 42, 255]));
        assert_eq!(canvas.data().len(), 4 * 3 * 4);
    }

    #[test]
    fn zero_size_canvas_is_rejected() {
        assert!(Canvas::new(0, 10).is_err());
    }

    #[test]
    fn translucent_circle_does_not_change_later_fills() {
        let mut canvas = Canvas::new(20, 20).expect("canvas");
        canvas.clear(HexColor::rgb(0, 0, 0));
        canvas.fill_circle(5.0, 5.0, 3.0, [255, 0, 0, 64]);
        canvas.fill_rect(12.0, 12.0, 4.0, 4.0, [0, 255, 0, 255]);

        let circle = canvas.pixel(5, 5).expect("pixel");
        assert!(circle[0] > 0 && circle[0] < 128, "circle is translucent");
        assert_eq!(canvas.pixel(14, 14), Some([0, 255, 0, 255]));
    }

    #[test]
    fn mask_blend_respects_coverage_and_clips() {
        let mut canvas = Canvas::new(4, 4).expect("canvas");
        canvas.clear(HexColor::rgb(0, 0, 0));
        let mut mask = AlphaMask::new(3, 3);
        mask.data[4] = 255;
        mask.data[0] = 128;

        canvas.blend_mask(&mask, -1, -1, [255, 255, 255, 255]);
        assert_eq!(canvas.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn dilation_grows_and_blur_spreads_coverage() {
        let mut mask = AlphaMask::new(9, 9);
        mask.data[4 * 9 + 4] = 255;

        let grown = mask.dilated(1);
        assert_eq!(grown.data[3 * 9 + 3], 255);
        assert_eq!(grown.data[2 * 9 + 2], 0);

        let blurred = mask.blurred(3);
        assert!(blurred.data[4 * 9 + 4] < 255);
        assert!(blurred.data[4 * 9 + 5] > 0);
        assert!(!blurred.is_blank());
    }

    #[test]
    fn stamp_max_combines() {
        let mut mask = AlphaMask::new(3, 1);
        mask.stamp(&[10, 200], 2, 0, 0);
        mask.stamp(&[50, 50], 2, 1, 0);
        assert_eq!(mask.data, vec![10, 200, 50]);
    }
}
