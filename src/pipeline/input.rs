//! Input resolution: turn a [`Selection`] into the list of sources to
//! convert, and derive every path one conversion touches.
//!
//! The output artifact doubles as the idempotence marker: if
//! [`ArtifactPaths::output`] exists the whole conversion for that input is
//! skipped. We validate the PDF magic bytes (`%PDF`) before rendering so
//! callers get a meaningful error rather than a pdfium crash.
//!
//! Image-folder modes (slideshow, stitched clouds) treat the whole
//! directory as one [`Source::ImageFolder`] and write one artifact named
//! after it.

use crate::config::ConversionMode;
use crate::error::Pdf2MediaError;
use crate::output::Selection;
use image::DynamicImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Recognised source-document extension.
pub const SOURCE_EXTENSION: &str = "pdf";

/// Image extensions read by the image-folder modes.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A PDF document.
    Pdf(PathBuf),
    /// A folder of images rendered into a single artifact.
    ImageFolder(PathBuf),
}

impl Source {
    pub fn path(&self) -> &Path {
        match self {
            Source::Pdf(p) | Source::ImageFolder(p) => p,
        }
    }

    /// Re-check the source right before rendering.
    pub fn validate(&self) -> Result<(), Pdf2MediaError> {
        match self {
            Source::Pdf(pdf) => validate_pdf(pdf),
            Source::ImageFolder(dir) => list_images(dir).map(|_| ()),
        }
    }
}

/// Resolve a selection to the ordered list of inputs.
///
/// `File` yields exactly its path (validated). `Directory` yields every
/// immediate child ending in `.pdf`, sorted by name; children are validated
/// later, one at a time, so a single bad file cannot abort the batch.
pub fn resolve_inputs(selection: &Selection) -> Result<Vec<PathBuf>, Pdf2MediaError> {
    match selection {
        Selection::File(path) => {
            validate_pdf(path)?;
            Ok(vec![path.clone()])
        }
        Selection::Directory(dir) => {
            let files = list_children(dir, has_source_extension)?;
            if files.is_empty() {
                return Err(Pdf2MediaError::NoInputs { path: dir.clone() });
            }
            debug!("Found {} PDFs in {}", files.len(), dir.display());
            Ok(files)
        }
    }
}

/// Resolve the selection of an image-folder mode to its directory.
///
/// A file selection is rejected with [`Pdf2MediaError::FolderRequired`]; a
/// directory must hold at least one image.
pub fn resolve_image_folder(selection: &Selection, mode: ConversionMode) -> Result<PathBuf, Pdf2MediaError> {
    match selection {
        Selection::File(path) if path.exists() => Err(Pdf2MediaError::FolderRequired {
            path: path.clone(),
            mode,
        }),
        Selection::File(path) => Err(Pdf2MediaError::FileNotFound { path: path.clone() }),
        Selection::Directory(dir) => {
            let images = list_images(dir)?;
            debug!("Found {} images in {}", images.len(), dir.display());
            // `.` and `..` have no name to give the artifact.
            if dir.file_name().is_none() {
                return dir.canonicalize().map_err(|_| Pdf2MediaError::FileNotFound { path: dir.clone() });
            }
            Ok(dir.clone())
        }
    }
}

/// Every `.png`/`.jpg`/`.jpeg` child of `dir` (any case), sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Pdf2MediaError> {
    let images = list_children(dir, has_image_extension)?;
    if images.is_empty() {
        return Err(Pdf2MediaError::NoImages {
            path: dir.to_path_buf(),
        });
    }
    Ok(images)
}

/// Decode one image from an image-folder selection.
pub fn open_image(path: &Path) -> Result<DynamicImage, Pdf2MediaError> {
    image::open(path).map_err(|e| Pdf2MediaError::ImageDecodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Immediate regular-file children of `dir` accepted by `keep`, sorted.
fn list_children(dir: &Path, keep: fn(&Path) -> bool) -> Result<Vec<PathBuf>, Pdf2MediaError> {
    if !dir.is_dir() {
        return Err(Pdf2MediaError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2MediaError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => Pdf2MediaError::FileNotFound {
            path: dir.to_path_buf(),
        },
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && keep(p))
        .collect();
    files.sort();
    Ok(files)
}

/// True if `path` ends in `.pdf` (any case).
pub fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// True if `path` ends in one of [`IMAGE_EXTENSIONS`] (any case).
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Validate existence, readability and PDF magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), Pdf2MediaError> {
    if !path.exists() {
        return Err(Pdf2MediaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(4);
            f.take(4).read_to_end(&mut head).map_err(|_| Pdf2MediaError::FileNotFound {
                path: path.to_path_buf(),
            })?;
            if head != b"%PDF" {
                // Short files are reported with the missing bytes zeroed.
                let mut magic = [0u8; 4];
                magic[..head.len()].copy_from_slice(&head);
                return Err(Pdf2MediaError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2MediaError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2MediaError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Every file one conversion reads or writes besides its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Base name shared by all artifacts (source stem unless overridden).
    pub name: String,
    /// Final deliverable: `<name>.mp3` / `<name>.mp4`.
    pub output: PathBuf,
    /// Raw render: `<name>.wav` / `<name>_raw.mp4`.
    pub intermediate: PathBuf,
    /// Encoder target, renamed onto `output` on success.
    pub partial: PathBuf,
}

impl ArtifactPaths {
    /// Derive the artifact paths for `input`.
    ///
    /// Artifacts go to `output_dir` when set, else next to the source.
    pub fn new(
        input: &Path,
        mode: ConversionMode,
        output_dir: Option<&Path>,
        name_override: Option<&str>,
    ) -> Self {
        let name = name_override
            .map(str::to_string)
            .unwrap_or_else(|| output_stem(input));
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::in_dir(name, &dir, mode)
    }

    /// Derive the artifact paths for an image folder.
    ///
    /// The artifact is named after the folder (`<folder>_slideshow` for the
    /// slideshow) and lands beside it unless `output_dir` is set.
    pub fn for_folder(
        folder: &Path,
        mode: ConversionMode,
        output_dir: Option<&Path>,
        name_override: Option<&str>,
    ) -> Self {
        let name = name_override.map(str::to_string).unwrap_or_else(|| {
            let base = folder
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string());
            match mode {
                ConversionMode::Slideshow => format!("{base}_slideshow"),
                _ => base,
            }
        });
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| folder.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::in_dir(name, &dir, mode)
    }

    /// Artifact paths for `source`.
    pub fn for_source(
        source: &Source,
        mode: ConversionMode,
        output_dir: Option<&Path>,
        name_override: Option<&str>,
    ) -> Self {
        match source {
            Source::Pdf(pdf) => Self::new(pdf, mode, output_dir, name_override),
            Source::ImageFolder(dir) => Self::for_folder(dir, mode, output_dir, name_override),
        }
    }

    fn in_dir(name: String, dir: &Path, mode: ConversionMode) -> Self {
        let ext = mode.output_extension();
        let intermediate = if mode.is_audio() {
            dir.join(format!("{name}.wav"))
        } else {
            dir.join(format!("{name}_raw.mp4"))
        };

        Self {
            output: dir.join(format!("{name}.{ext}")),
            partial: dir.join(format!("{name}.part.{ext}")),
            intermediate,
            name,
        }
    }

    /// The idempotence check: has this input already been converted?
    pub fn output_exists(&self) -> bool {
        self.output.exists()
    }
}

/// File stem of the source document (`/a/b/16001.pdf` → `16001`).
pub fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_pdf(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"%PDF-1.4\n").unwrap();
        p
    }

    #[test]
    fn artifact_names_for_audio_modes() {
        let a = ArtifactPaths::new(Path::new("/data/16001.pdf"), ConversionMode::Bpm, None, None);
        assert_eq!(a.name, "16001");
        assert_eq!(a.output, PathBuf::from("/data/16001.mp3"));
        assert_eq!(a.intermediate, PathBuf::from("/data/16001.wav"));
        assert_eq!(a.partial, PathBuf::from("/data/16001.part.mp3"));
    }

    #[test]
    fn artifact_names_for_video_modes_and_output_dir() {
        let a = ArtifactPaths::new(
            Path::new("/data/clouds.pdf"),
            ConversionMode::Clouds,
            Some(Path::new("/out")),
            None,
        );
        assert_eq!(a.output, PathBuf::from("/out/clouds.mp4"));
        assert_eq!(a.intermediate, PathBuf::from("/out/clouds_raw.mp4"));
    }

    #[test]
    fn name_override_wins() {
        let a = ArtifactPaths::new(
            Path::new("/data/x.pdf"),
            ConversionMode::Text,
            None,
            Some("reel"),
        );
        assert_eq!(a.output, PathBuf::from("/data/reel.mp4"));
    }

    #[test]
    fn directory_lists_only_pdfs_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        touch_pdf(tmp.path(), "b.pdf");
        touch_pdf(tmp.path(), "a.PDF");
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("nested.pdf")).unwrap();

        let files = resolve_inputs(&Selection::Directory(tmp.path().to_path_buf())).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_inputs(&Selection::Directory(tmp.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NoInputs { .. }));
    }

    #[test]
    fn rejects_non_pdf_magic() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("fake.pdf");
        std::fs::write(&p, b"PK\x03\x04zip").unwrap();
        let err = validate_pdf(&p).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[test]
    fn truncated_file_is_not_a_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("short.pdf");
        std::fs::write(&p, b"%P").unwrap();
        let err = validate_pdf(&p).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NotAPdf { magic, .. } if magic == [b'%', b'P', 0, 0]));

        std::fs::write(&p, b"").unwrap();
        assert!(matches!(validate_pdf(&p), Err(Pdf2MediaError::NotAPdf { magic: [0, 0, 0, 0], .. })));
    }

    #[test]
    fn folder_artifacts_are_named_after_the_folder() {
        let dir = Path::new("/data/drawings");
        let a = ArtifactPaths::for_folder(dir, ConversionMode::Slideshow, None, None);
        assert_eq!(a.name, "drawings_slideshow");
        assert_eq!(a.output, PathBuf::from("/data/drawings_slideshow.mp4"));
        assert_eq!(a.intermediate, PathBuf::from("/data/drawings_slideshow_raw.mp4"));

        let a = ArtifactPaths::for_source(
            &Source::ImageFolder(dir.to_path_buf()),
            ConversionMode::Clouds,
            Some(Path::new("/out")),
            None,
        );
        assert_eq!(a.output, PathBuf::from("/out/drawings.mp4"));
    }

    #[test]
    fn image_listing_is_sorted_and_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.PNG", "c.jpeg", "notes.txt", "scan.pdf"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(tmp.path().join("nested.png")).unwrap();
        let names: Vec<_> = list_images(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg", "c.jpeg"]);
    }

    #[test]
    fn image_folder_rejects_files_and_empty_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = touch_pdf(tmp.path(), "a.pdf");
        let err = resolve_image_folder(&Selection::File(pdf), ConversionMode::Slideshow).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::FolderRequired { mode: ConversionMode::Slideshow, .. }));

        let err = resolve_image_folder(&Selection::Directory(tmp.path().to_path_buf()), ConversionMode::Slideshow)
            .unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NoImages { .. }));
        assert!(err.to_string().contains("No PNG/JPG images found"));
    }

    #[test]
    fn undecodable_image_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("broken.png");
        std::fs::write(&p, b"not a png").unwrap();
        assert!(matches!(open_image(&p), Err(Pdf2MediaError::ImageDecodeFailed { .. })));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_inputs(&Selection::File(PathBuf::from("/nope/missing.pdf"))).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::FileNotFound { .. }));
    }
}
