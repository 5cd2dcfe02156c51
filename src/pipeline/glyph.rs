//! Glyph measurement and painting for the scrolling-text renderer.

use crate::error::Pdf2MediaError;
use fontdue::{Font, FontSettings};
use std::collections::HashMap;
use std::path::Path;

/// Measures and paints single-line text into a packed 3-byte-per-pixel frame.
pub trait TextPainter {
    /// Horizontal advance of `text` in whole pixels.
    fn text_width(&mut self, text: &str) -> u32;

    /// Height of a capital letter; used to centre the line vertically.
    fn cap_height(&mut self) -> u32;

    /// Paint `text` with its top-left corner at (`x`, `y`). Pixels outside
    /// the frame are clipped.
    fn draw(&mut self, frame: &mut [u8], width: u32, height: u32, x: i32, y: i32, text: &str, color: [u8; 3]);
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    xmin: i32,
    ymin: i32,
    width: usize,
    height: usize,
    advance: f32,
    bitmap: Vec<u8>,
}

/// [`TextPainter`] backed by a TrueType font rasterised with `fontdue`.
pub struct GlyphPainter {
    font: Font,
    font_size: f32,
    ascent: f32,
    glyph_cache: HashMap<char, GlyphBitmap>,
}

impl GlyphPainter {
    /// Load the font at `path` at `font_size` px.
    pub fn load(path: &Path, font_size: f32) -> Result<Self, Pdf2MediaError> {
        if !path.exists() {
            return Err(Pdf2MediaError::AssetMissing {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|e| Pdf2MediaError::AssetInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_bytes(bytes, font_size).map_err(|detail| Pdf2MediaError::AssetInvalid {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>, font_size: f32) -> Result<Self, String> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| e.to_string())?;
        let ascent = font
            .horizontal_line_metrics(font_size)
            .map(|m| m.ascent)
            .unwrap_or(font_size);
        Ok(Self {
            font,
            font_size,
            ascent,
            glyph_cache: HashMap::new(),
        })
    }

    fn glyph(&mut self, c: char) -> &GlyphBitmap {
        let font = &self.font;
        let size = self.font_size;
        self.glyph_cache.entry(c).or_insert_with(|| {
            let (metrics, bitmap) = font.rasterize(c, size);
            GlyphBitmap {
                xmin: metrics.xmin,
                ymin: metrics.ymin,
                width: metrics.width,
                height: metrics.height,
                advance: metrics.advance_width,
                bitmap,
            }
        })
    }
}

impl TextPainter for GlyphPainter {
    fn text_width(&mut self, text: &str) -> u32 {
        let total: f32 = text.chars().map(|c| self.glyph(c).advance).sum();
        total.round().max(0.0) as u32
    }

    fn cap_height(&mut self) -> u32 {
        self.glyph('A').height as u32
    }

    fn draw(&mut self, frame: &mut [u8], width: u32, height: u32, x: i32, y: i32, text: &str, color: [u8; 3]) {
        let baseline = y as f32 + self.ascent;
        let mut pen = x as f32;
        for c in text.chars() {
            let glyph = self.glyph(c);
            let gx = pen.round() as i32 + glyph.xmin;
            let gy = (baseline - (glyph.ymin + glyph.height as i32) as f32).round() as i32;
            blend_glyph(frame, width, height, gx, gy, glyph, color);
            pen += glyph.advance;
        }
    }
}

fn blend_glyph(frame: &mut [u8], frame_width: u32, frame_height: u32, x: i32, y: i32, glyph: &GlyphBitmap, color: [u8; 3]) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame_height as i32 {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame_width as i32 {
                continue;
            }
            let mask = glyph.bitmap[row * glyph.width + col];
            if mask == 0 {
                continue;
            }
            let idx = ((py as u32 * frame_width + px as u32) * 3) as usize;
            blend_pixel(&mut frame[idx..idx + 3], color, mask);
        }
    }
}

fn blend_pixel(dst: &mut [u8], src: [u8; 3], alpha: u8) {
    let a = u16::from(alpha);
    let inv = 255 - a;
    for (d, s) in dst.iter_mut().zip(src) {
        *d = ((u16::from(s) * a + u16::from(*d) * inv + 127) / 255) as u8;
    }
}
