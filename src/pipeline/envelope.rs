//! Envelope builders: extracted page data → per-mode control signal.
//!
//! Every builder fails with [`Pdf2MediaError::NoDataExtracted`] when the
//! document yields nothing usable, so no mode ever renders an empty or
//! garbage artifact.

use crate::config::ConversionMode;
use crate::error::Pdf2MediaError;
use crate::pipeline::extract::{csv_rows, digits_only, flatten_lines, strip_line_prefixes, three_digit_groups};
use crate::pipeline::TARGET_SECS;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use tracing::debug;

/// Interpolation steps between two consecutive RGB checkpoints.
pub const RGB_STEPS: usize = 3000;
/// Frame rate of the RGB and Clouds videos.
pub const VIDEO_FPS: u32 = 25;
/// Frames in a 12-minute 25 fps video.
pub const RGB_FRAMES: usize = (VIDEO_FPS * TARGET_SECS) as usize;
/// Days beyond this are dropped.
pub const MAX_WIND_DAYS: usize = 24;
/// Size every page raster is normalised to before stitching.
pub const CLOUD_PANEL: (u32, u32) = (750, 360);
/// Rasterisation zoom for cloud pages.
pub const CLOUD_ZOOM: f32 = 2.0;

fn no_data(path: &Path, mode: ConversionMode) -> Pdf2MediaError {
    Pdf2MediaError::NoDataExtracted {
        path: path.to_path_buf(),
        mode,
    }
}

// ── BPM ──────────────────────────────────────────────────────────────────

/// Beats-per-minute values in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpmEnvelope {
    /// All values, zeros included: zeros count toward the pulse scale but
    /// render nothing.
    pub values: Vec<u32>,
}

impl BpmEnvelope {
    pub fn from_pages(texts: &[String], prefix: usize, path: &Path) -> Result<Self, Pdf2MediaError> {
        let cleaned: String = texts.iter().map(|t| strip_line_prefixes(t, prefix)).collect();
        let values = three_digit_groups(&cleaned);
        if values.iter().all(|&v| v == 0) {
            return Err(no_data(path, ConversionMode::Bpm));
        }
        debug!("BPM envelope: {} values", values.len());
        Ok(Self { values })
    }

    /// `(720 s / N) * 1.0255`.
    pub fn pulse_duration(&self) -> f64 {
        (TARGET_SECS as f64 / self.values.len() as f64) * 1.0255
    }

    /// Number of pulses emitted for `bpm`.
    pub fn pulse_count(&self, bpm: u32) -> usize {
        ((bpm as f64 / 60.0) * self.pulse_duration()) as usize
    }

    /// Last non-zero value, used to pad an underrunning render.
    pub fn last_rate(&self) -> Option<u32> {
        self.values.iter().rev().copied().find(|&v| v > 0)
    }
}

// ── RGB ──────────────────────────────────────────────────────────────────

/// Colour keyframes in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbEnvelope {
    pub triples: Vec<[u8; 3]>,
}

impl RgbEnvelope {
    pub fn from_pages(texts: &[String], prefix: usize, path: &Path) -> Result<Self, Pdf2MediaError> {
        let cleaned: String = texts
            .iter()
            .map(|t| digits_only(&strip_line_prefixes(t, prefix)))
            .collect();
        let triples: Vec<[u8; 3]> = three_digit_groups(&cleaned)
            .chunks_exact(3)
            .map(|c| [clamp_channel(c[0]), clamp_channel(c[1]), clamp_channel(c[2])])
            .collect();
        if triples.is_empty() {
            return Err(no_data(path, ConversionMode::Rgb));
        }
        debug!("RGB envelope: {} keyframes", triples.len());
        Ok(Self { triples })
    }

    /// Length of the full interpolated curve before resampling.
    pub fn interpolated_len(&self) -> usize {
        self.triples.len().saturating_sub(1) * RGB_STEPS
    }

    /// Colour at position `j` of the interpolated curve.
    fn interpolated(&self, j: usize) -> [u8; 3] {
        let seg = j / RGB_STEPS;
        let step = (j % RGB_STEPS) as f64;
        let (a, b) = (self.triples[seg], self.triples[seg + 1]);
        let mut out = [0u8; 3];
        for ch in 0..3 {
            let delta = (b[ch] as f64 - a[ch] as f64) / RGB_STEPS as f64;
            out[ch] = (a[ch] as f64 + delta * step) as u8;
        }
        out
    }

    /// The curve resampled to exactly [`RGB_FRAMES`] colours by nearest
    /// index (`i * len / frames`). A single keyframe gives a constant colour.
    pub fn gradient(&self) -> Vec<[u8; 3]> {
        let len = self.interpolated_len();
        if len == 0 {
            return vec![self.triples[0]; RGB_FRAMES];
        }
        (0..RGB_FRAMES)
            .map(|i| self.interpolated(i * len / RGB_FRAMES))
            .collect()
    }
}

fn clamp_channel(v: u32) -> u8 {
    v.min(255) as u8
}

// ── Wind ─────────────────────────────────────────────────────────────────

/// Intensity checkpoints, one row per day.
#[derive(Debug, Clone, PartialEq)]
pub struct WindEnvelope {
    pub days: Vec<Vec<f32>>,
}

impl WindEnvelope {
    pub fn from_pages(texts: &[String], prefix: usize, path: &Path) -> Result<Self, Pdf2MediaError> {
        let mut days: Vec<Vec<f32>> = texts.iter().flat_map(|t| csv_rows(t, prefix)).collect();
        if days.is_empty() {
            return Err(no_data(path, ConversionMode::Wind));
        }
        if days.len() > MAX_WIND_DAYS {
            debug!("Dropping {} wind days beyond {}", days.len() - MAX_WIND_DAYS, MAX_WIND_DAYS);
            days.truncate(MAX_WIND_DAYS);
        }
        Ok(Self { days })
    }
}

// ── Clouds ───────────────────────────────────────────────────────────────

/// All pages stitched left to right into one strip.
#[derive(Debug, Clone)]
pub struct CloudStrip {
    pub image: RgbImage,
}

impl CloudStrip {
    /// Resize every page to [`CLOUD_PANEL`] and stitch them horizontally.
    ///
    /// `end_marker` appends one black panel (single-file selections).
    pub fn from_pages(
        pages: &[DynamicImage],
        end_marker: bool,
        path: &Path,
    ) -> Result<Self, Pdf2MediaError> {
        if pages.is_empty() {
            return Err(no_data(path, ConversionMode::Clouds));
        }
        let (pw, ph) = CLOUD_PANEL;
        let panels = pages.len() as u32 + u32::from(end_marker);
        let mut strip = RgbImage::from_pixel(pw * panels, ph, Rgb([0, 0, 0]));
        for (i, page) in pages.iter().enumerate() {
            let panel = imageops::resize(&page.to_rgb8(), pw, ph, FilterType::Triangle);
            imageops::replace(&mut strip, &panel, i as i64 * pw as i64, 0);
        }
        debug!("Cloud strip: {}x{} from {} pages", strip.width(), strip.height(), pages.len());
        Ok(Self { image: strip })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }
}

// ── Text ─────────────────────────────────────────────────────────────────

/// Fixed-size text chunks in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunks {
    pub chunks: Vec<String>,
}

impl TextChunks {
    /// Flatten each page and cut it into `size`-character chunks.
    ///
    /// Chunks never span pages; the last chunk of a page may be short.
    pub fn from_pages(texts: &[String], size: usize, path: &Path) -> Result<Self, Pdf2MediaError> {
        let size = size.max(1);
        let chunks: Vec<String> = texts
            .iter()
            .flat_map(|t| {
                let chars: Vec<char> = flatten_lines(t).chars().collect();
                chars
                    .chunks(size)
                    .map(|c| c.iter().collect::<String>())
                    .collect::<Vec<_>>()
            })
            .collect();
        if chunks.is_empty() {
            return Err(no_data(path, ConversionMode::Text));
        }
        Ok(Self { chunks })
    }
}
