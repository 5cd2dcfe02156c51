//! Error types for the pdf2media library.
//!
//! [`Pdf2MediaError`] is fatal for **one input**: the document could not be
//! read, produced no usable data, or the encoder refused it. It is returned
//! as `Err` from the single-file entry points. In directory mode the same
//! error is captured per input as [`crate::output::ItemStatus::Failed`] so a
//! bad document never stops its siblings from converting.

use crate::config::ConversionMode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2media library.
#[derive(Debug, Error)]
pub enum Pdf2MediaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A directory selection contained no `.pdf` children.
    #[error("No PDF documents found in '{path}'")]
    NoInputs { path: PathBuf },

    /// An image-folder mode was given a file instead of a directory.
    #[error("{mode} mode requires selecting a FOLDER of images, got '{path}'")]
    FolderRequired { path: PathBuf, mode: ConversionMode },

    /// An image-folder selection contained no `.png`/`.jpg`/`.jpeg` children.
    #[error("No PNG/JPG images found in '{path}'")]
    NoImages { path: PathBuf },

    /// An image in a folder selection could not be decoded.
    #[error("Image '{path}' could not be decoded: {detail}")]
    ImageDecodeFailed { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Data errors ───────────────────────────────────────────────────────
    /// The document yielded zero usable tokens for the selected mode.
    #[error("No data extracted from '{path}' for {mode} mode.\nThe document contains no usable values.")]
    NoDataExtracted { path: PathBuf, mode: ConversionMode },

    // ── Asset errors ──────────────────────────────────────────────────────
    /// A runtime asset (wind loop, font) is missing.
    #[error("Required asset not found: '{path}'")]
    AssetMissing { path: PathBuf },

    /// A runtime asset exists but could not be decoded.
    #[error("Asset '{path}' could not be loaded: {detail}")]
    AssetInvalid { path: PathBuf, detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Writing the raw intermediate failed.
    #[error("Rendering '{path}' failed: {detail}")]
    RenderFailed { path: PathBuf, detail: String },

    // ── Encoder errors ────────────────────────────────────────────────────
    /// The encoder binary could not be started.
    #[error("Failed to spawn encoder '{program}': {detail}\nInstall ffmpeg or pass --ffmpeg <PATH>.")]
    EncoderSpawnFailed { program: String, detail: String },

    /// The encoder exited with a non-zero status.
    #[error("Encoder exited with {status} while writing '{output}': {stderr}")]
    EncoderFailed {
        output: PathBuf,
        status: String,
        stderr: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, rename or delete a file in the output directory.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Control flow ──────────────────────────────────────────────────────
    /// The job was cancelled before this input finished.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2MediaError {
    /// Wrap an I/O error on `path` as [`Pdf2MediaError::OutputWriteFailed`].
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Pdf2MediaError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Wrap a renderer failure on `path`.
    pub fn render(path: impl Into<PathBuf>, detail: impl std::fmt::Display) -> Self {
        Pdf2MediaError::RenderFailed {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_display_names_mode() {
        let e = Pdf2MediaError::NoDataExtracted {
            path: PathBuf::from("16001.pdf"),
            mode: ConversionMode::Rgb,
        };
        let msg = e.to_string();
        assert!(msg.contains("16001.pdf"), "got: {msg}");
        assert!(msg.contains("rgb"), "got: {msg}");
    }

    #[test]
    fn folder_required_names_mode() {
        let e = Pdf2MediaError::FolderRequired {
            path: PathBuf::from("a.png"),
            mode: ConversionMode::Slideshow,
        };
        let msg = e.to_string();
        assert!(msg.starts_with("slideshow mode requires selecting a FOLDER"), "got: {msg}");
        assert!(msg.contains("a.png"));
    }

    #[test]
    fn encoder_failed_display() {
        let e = Pdf2MediaError::EncoderFailed {
            output: PathBuf::from("a.mp4"),
            status: "exit status: 1".into(),
            stderr: "Unknown encoder 'libx264'".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("libx264"));
    }

    #[test]
    fn write_helper_keeps_source() {
        use std::error::Error as _;
        let e = Pdf2MediaError::write(
            "out.wav",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(e.to_string().contains("out.wav"));
        assert!(e.source().is_some());
    }
}
