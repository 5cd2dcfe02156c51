//! PDF extraction: per-page text and per-page rasters, plus the pure
//! cleaning rules that turn extracted text into numeric tokens.
//!
//! ## Why a trait?
//!
//! pdfium is a native library that may not be installed where the library
//! is tested or embedded. [`PdfBackend`] is the seam: the dispatcher only
//! ever asks for "text of every page" or "image of every page", and
//! [`PdfiumBackend`] is the production implementation. Tests inject an
//! in-memory fake through [`crate::config::ConversionConfigBuilder::pdf_backend`].
//!
//! All methods are blocking; the dispatcher calls them from
//! `spawn_blocking`.

use crate::error::Pdf2MediaError;
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of page text and page images.
pub trait PdfBackend: Send + Sync {
    /// Extracted text of every page, in page order.
    ///
    /// A page whose text cannot be read yields an empty string; it never
    /// aborts the document.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, Pdf2MediaError>;

    /// Every page rendered to an RGB raster at `zoom` × its natural size.
    fn page_images(
        &self,
        path: &Path,
        password: Option<&str>,
        zoom: f32,
    ) -> Result<Vec<DynamicImage>, Pdf2MediaError>;
}

/// [`PdfBackend`] backed by the pdfium C++ library.
///
/// Binds to `PDFIUM_LIB_PATH` when it points to an existing file, else to
/// the platform library found on the system search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    lib_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        let lib_path = std::env::var_os("PDFIUM_LIB_PATH")
            .map(PathBuf::from)
            .filter(|p| p.exists());
        Self { lib_path }
    }

    /// Bind to the library at `path` rather than consulting the environment.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            lib_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, Pdf2MediaError> {
        let bindings = match self.lib_path {
            Some(ref path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(path)
            }
            None => Pdfium::bind_to_system_library(),
        };
        bindings
            .map(Pdfium::new)
            .map_err(|e| Pdf2MediaError::PdfiumBindingFailed(e.to_string()))
    }
}

/// Map a pdfium load failure to the most specific error.
fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> Pdf2MediaError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            Pdf2MediaError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2MediaError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2MediaError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

impl PdfBackend for PdfiumBackend {
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, Pdf2MediaError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(path, password, e))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let texts = pages
            .iter()
            .enumerate()
            .map(|(idx, page)| match page.text() {
                Ok(text) => text.all(),
                Err(e) => {
                    warn!("No text on page {}: {:?}", idx + 1, e);
                    String::new()
                }
            })
            .collect();
        Ok(texts)
    }

    fn page_images(
        &self,
        path: &Path,
        password: Option<&str>,
        zoom: f32,
    ) -> Result<Vec<DynamicImage>, Pdf2MediaError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(path, password, e))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(zoom);

        let pages = document.pages();
        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2MediaError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }
        Ok(images)
    }
}

// ── Cleaning rules ───────────────────────────────────────────────────────

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]+").unwrap());

/// Drop the first `n` characters of every newline-delimited segment, join
/// the segments and remove spaces.
///
/// The extraction step prefixes each table line with layout markers; this
/// is what keeps the three-digit groups aligned.
pub fn strip_line_prefixes(text: &str, n: usize) -> String {
    text.split('\n')
        .flat_map(|line| line.chars().skip(n))
        .filter(|&c| c != ' ')
        .collect()
}

/// Keep ASCII digits only.
pub fn digits_only(text: &str) -> String {
    NON_DIGIT.replace_all(text, "").into_owned()
}

/// Consecutive three-character groups parsed as integers.
///
/// A trailing group shorter than three characters is dropped; groups that
/// are not integers are discarded.
pub fn three_digit_groups(text: &str) -> Vec<u32> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks_exact(3)
        .filter_map(|group| group.iter().collect::<String>().parse::<u32>().ok())
        .collect()
}

/// Per-line comma-separated floats.
///
/// Each line loses its first `n` characters, is split on `,`, and every
/// trimmed field that parses as a finite float is kept. Lines that yield
/// no numbers are omitted.
pub fn csv_rows(text: &str, n: usize) -> Vec<Vec<f32>> {
    text.lines()
        .map(|line| {
            let rest: String = line.chars().skip(n).collect();
            rest.split(',')
                .filter_map(|field| field.trim().parse::<f32>().ok())
                .filter(|v| v.is_finite())
                .collect::<Vec<f32>>()
        })
        .filter(|row| !row.is_empty())
        .collect()
}

/// Page text with line breaks flattened to spaces.
pub fn flatten_lines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
