use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::Font;

use crate::canvas::{AlphaMask, Canvas};
use crate::font_assets::{load_font, supported_text};
use crate::settings::HexColor;

const MIN_DRAWABLE_SIZE: f32 = 1.0;
/// Largest pixel size rasterized; beat pulse and easing overshoot can push a
/// valid font size past `MAX_FONT_SIZE`.
pub const MAX_DRAWABLE_SIZE: f32 = 1500.0;
const GLYPH_CACHE_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    bitmap: Vec<u8>,
}

/// How one block of lyric text is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPaint {
    pub size: f32,
    pub fill: HexColor,
    pub opacity: f32,
    pub outline: Option<Outline>,
    pub glow: Option<Glow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    pub color: HexColor,
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub color: HexColor,
    pub radius: f32,
}

pub struct LyricPainter {
    font: Font,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl LyricPainter {
    pub fn new(font: Font) -> Self {
        Self {
            font,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn from_path(font_path: &Path) -> Result<Self> {
        Ok(Self::new(load_font(font_path)?))
    }

    /// Draws `text` as a block of centered lines whose middle sits at
    /// (`center_x`, `center_y`). Lines wrap at `max_width`.
    pub fn draw_centered(
        &mut self,
        canvas: &mut Canvas,
        text: &str,
        center_x: f32,
        center_y: f32,
        max_width: f32,
        paint: &TextPaint,
    ) {
        let opacity = if paint.opacity.is_finite() {
            paint.opacity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if opacity <= 0.0 {
            return;
        }
        let Some(size) = drawable_size(paint.size) else {
            return;
        };

        let outline_width = paint.outline.map_or(0, |outline| outline.width);
        let glow_radius = paint
            .glow
            .map_or(0, |glow| glow.radius.max(0.0).round() as usize);
        let pad = outline_width + glow_radius * 2 + 2;

        let Some((mask, block_width, block_height)) =
            self.rasterize_block(text, size, max_width, pad)
        else {
            return;
        };

        let origin_x = (center_x - block_width / 2.0).round() as i32 - pad as i32;
        let origin_y = (center_y - block_height / 2.0).round() as i32 - pad as i32;

        if let Some(glow) = paint.glow {
            let glow_mask = mask.dilated(outline_width.max(1)).blurred(glow_radius);
            canvas.blend_mask(&glow_mask, origin_x, origin_y, glow.color.with_alpha(opacity));
        }
        if let Some(outline) = paint.outline {
            let outline_mask = mask.dilated(outline.width);
            canvas.blend_mask(
                &outline_mask,
                origin_x,
                origin_y,
                outline.color.with_alpha(opacity),
            );
        }
        canvas.blend_mask(&mask, origin_x, origin_y, paint.fill.with_alpha(opacity));
    }

    /// Coverage mask of the laid-out text with `pad` empty pixels on every
    /// side, plus the unpadded block size.
    fn rasterize_block(
        &mut self,
        text: &str,
        size: f32,
        max_width: f32,
        pad: usize,
    ) -> Option<(AlphaMask, f32, f32)> {
        let text = supported_text(&self.font, text);
        if text.trim().is_empty() {
            return None;
        }

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: 0.0,
            y: 0.0,
            max_width: Some(max_width.max(size)),
            max_height: None,
            horizontal_align: HorizontalAlign::Center,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Word,
            wrap_hard_breaks: true,
        });
        layout.append(&[&self.font], &TextStyle::new(&text, size, 0));

        let block_width = max_width.max(size);
        let block_height = layout.height();
        let mask_width = block_width.ceil() as usize + pad * 2;
        let mask_height = block_height.ceil() as usize + pad * 2;
        let mut mask = AlphaMask::new(mask_width, mask_height);

        if self.glyph_cache.len() > GLYPH_CACHE_LIMIT {
            self.glyph_cache.clear();
        }
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.font;
            let bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    bitmap,
                }
            });
            mask.stamp(
                &bitmap.bitmap,
                bitmap.width,
                glyph.x.round() as i32 + pad as i32,
                glyph.y.round() as i32 + pad as i32,
            );
        }

        if mask.is_blank() {
            return None;
        }
        Some((mask, block_width, block_height))
    }
}

fn drawable_size(size: f32) -> Option<f32> {
    if !size.is_finite() || size < MIN_DRAWABLE_SIZE {
        return None;
    }
    Some(size.min(MAX_DRAWABLE_SIZE))
}
