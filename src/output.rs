//! Request and result types exchanged between the UI and the dispatcher.

use crate::config::ConversionMode;
use crate::progress::RenderStage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the user picked: one document, or a folder of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Exactly one PDF.
    File(PathBuf),
    /// Every immediate `.pdf` child of this directory.
    Directory(PathBuf),
}

impl Selection {
    /// Pick `File` or `Directory` by looking at the filesystem.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            Selection::Directory(path)
        } else {
            Selection::File(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Selection::File(p) | Selection::Directory(p) => p,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Selection::Directory(_))
    }
}

/// One submitted conversion: mode + selection (+ optional output name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub mode: ConversionMode,
    pub selection: Selection,
    /// Overrides the output base name. Honoured for [`Selection::File`] and
    /// for image-folder jobs, which produce a single artifact.
    pub output_name: Option<String>,
    /// Clouds only: treat a directory as page images stitched into one
    /// video instead of a batch of PDFs.
    #[serde(default)]
    pub stitch_images: bool,
}

impl ConversionRequest {
    pub fn new(mode: ConversionMode, selection: Selection) -> Self {
        Self {
            mode,
            selection,
            output_name: None,
            stitch_images: false,
        }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_stitch_images(mut self, stitch: bool) -> Self {
        self.stitch_images = stitch;
        self
    }

    /// True when the selection is one folder of images rendered into a
    /// single artifact (slideshow, or clouds with stitching).
    pub fn reads_image_folder(&self) -> bool {
        match self.mode {
            ConversionMode::Slideshow => true,
            ConversionMode::Clouds => self.stitch_images,
            _ => false,
        }
    }
}

/// Final status of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// A new artifact was written.
    Converted,
    /// The artifact already existed; nothing was rendered.
    Skipped,
    /// The input failed in `stage`.
    Failed { stage: RenderStage, reason: String },
}

/// Result for one input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: ItemStatus,
    /// Wall-clock time spent on this input.
    pub duration_ms: u64,
}

/// Per-input results of a whole job, in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobReport {
    pub mode: Option<ConversionMode>,
    pub items: Vec<ItemOutcome>,
    pub total_duration_ms: u64,
}

impl JobReport {
    pub fn converted(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Converted)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Skipped)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Failed { .. }))
            .count()
    }

    /// Collapse the per-input results into the tri-state the UI shows.
    ///
    /// Any failure wins; otherwise a job where every input was skipped is
    /// `Skipped`; otherwise `Success`.
    pub fn outcome(&self) -> JobOutcome {
        if let Some(first) = self.items.iter().find_map(|i| match &i.status {
            ItemStatus::Failed { reason, .. } => Some(format!("{}: {}", i.input.display(), reason)),
            _ => None,
        }) {
            return JobOutcome::Failed {
                failed: self.failed(),
                total: self.items.len(),
                first_error: first,
            };
        }
        if !self.items.is_empty() && self.skipped() == self.items.len() {
            return JobOutcome::Skipped;
        }
        JobOutcome::Success
    }
}

/// The tri-state signal surfaced after each job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success,
    /// Output already exists. Delete or rename it to regenerate.
    Skipped,
    Failed {
        failed: usize,
        total: usize,
        first_error: String,
    },
}

impl JobOutcome {
    /// The user-facing notification text.
    pub fn message(&self) -> String {
        match self {
            JobOutcome::Success => "Conversion finished.".to_string(),
            JobOutcome::Skipped => {
                "File exists, delete or rename it to regenerate.".to_string()
            }
            JobOutcome::Failed {
                failed,
                total,
                first_error,
            } => format!("{failed}/{total} inputs failed. First error: {first_error}"),
        }
    }
}
