use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::date::ParserChain;
use crate::exif::{CodecError, ImageContainer};
use crate::policy::{self, MutationDirectives, SkipReason, WriteDecision};
use crate::replace::AtomicReplacer;

/// Extensions of files that may carry EXIF, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff", "webp", "png"];

/// What happened to a single file.
///
/// # Example
///
/// ```rust
/// use exif_date_from_filename::pipeline::FileOutcome;
///
/// let outcome = FileOutcome::NoDate;
/// assert!(!outcome.is_write());
/// assert_eq!(serde_json::to_string(&outcome).unwrap(), r#"{"outcome":"no_date"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Capture date written.
    Updated { date: NaiveDateTime },
    /// Dry run: the date would have been written.
    WouldUpdate { date: NaiveDateTime },
    /// The file already has a capture date that must be kept.
    AlreadySet {
        existing: Option<String>,
        /// Written by an earlier run of this tool.
        owned: bool,
    },
    /// No parser produced a date; the file was not opened.
    NoDate,
    /// Not an image, or the file could not be read.
    Unreadable { reason: String },
    /// Encoding or replacing failed; the file is unchanged.
    Failed { reason: String },
}

impl FileOutcome {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub updated: usize,
    pub would_update: usize,
    pub already_set: usize,
    pub no_date: usize,
    pub unreadable: usize,
    pub failed: usize,
    /// Directories with at least one written file, sorted.
    pub updated_dirs: BTreeSet<PathBuf>,
}

impl BatchReport {
    pub fn record(&mut self, path: &Path, outcome: &FileOutcome) {
        self.processed += 1;
        match outcome {
            FileOutcome::Updated { .. } => {
                self.updated += 1;
                self.updated_dirs.insert(parent_dir(path).to_path_buf());
            }
            FileOutcome::WouldUpdate { .. } => self.would_update += 1,
            FileOutcome::AlreadySet { .. } => self.already_set += 1,
            FileOutcome::NoDate => self.no_date += 1,
            FileOutcome::Unreadable { .. } => self.unreadable += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively in file-name order, so repeated runs see files in the same
/// order. Symlinked directories are followed; symlinked files are skipped,
/// since replacing one would turn it into a regular file.
///
/// ```rust,no_run
/// use exif_date_from_filename::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("IMG-20200101-WA0001.jpg"), // single file
///     PathBuf::from("./photos/"),               // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if path.is_symlink() {
                log::warn!("Skipping symlink: {}", path.display());
            } else if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Cannot walk {}: {e}", path.display());
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
                    continue;
                }
                if entry.path_is_symlink() {
                    log::debug!("Skipping symlink: {}", entry.path().display());
                } else {
                    images.push(entry.into_path());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Infer a capture date for one file and write it if the policy allows.
///
/// 1. **Resolve**: run the parser chain on the path. No date, nothing opened.
/// 2. **Decide**: dry runs stop here. Otherwise the existing EXIF is read and
///    [`policy::decide`] says whether the date may be written.
/// 3. **Write**: the record is updated, re-encoded into the file's bytes and
///    swapped in with the [`AtomicReplacer`].
///
/// Never fails: every problem is reported as a [`FileOutcome`], and the file
/// is left untouched unless the outcome is [`FileOutcome::Updated`].
pub fn process_image(
    path: &Path,
    chain: &ParserChain,
    directives: &MutationDirectives,
    replacer: &AtomicReplacer,
) -> FileOutcome {
    let Some(date) = chain.resolve(path) else {
        log::debug!("Could not parse date from filename: {}", path.display());
        return FileOutcome::NoDate;
    };

    if directives.dry_run {
        log::info!("Would update EXIF date for {} to {date}", path.display());
        return FileOutcome::WouldUpdate { date };
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Error reading {}: {e}", path.display());
            return FileOutcome::Unreadable {
                reason: e.to_string(),
            };
        }
    };

    let container = match ImageContainer::open(bytes) {
        Ok(container) => container,
        Err(CodecError::UnrecognizedContainer) => {
            log::debug!("Skipping non-image file: {}", path.display());
            return FileOutcome::Unreadable {
                reason: CodecError::UnrecognizedContainer.to_string(),
            };
        }
        Err(e) => {
            log::warn!("Error opening {}: {e}", path.display());
            return FileOutcome::Unreadable {
                reason: e.to_string(),
            };
        }
    };

    let mut record = container.read_record();
    match policy::decide(&record, directives) {
        WriteDecision::Skip(reason) => {
            log::debug!("EXIF date already set for {} ({reason})", path.display());
            return FileOutcome::AlreadySet {
                existing: record
                    .date_time_original()
                    .and_then(|e| e.as_text())
                    .map(str::to_string),
                owned: reason == SkipReason::OwnedTimestamp,
            };
        }
        WriteDecision::Write(reason) => {
            log::debug!(
                "Writing {} EXIF date for {} ({reason})",
                container.kind(),
                path.display()
            );
        }
    }

    policy::apply(&mut record, date);
    let bytes = match container.into_bytes_with(&record) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Error encoding EXIF for {}: {e}", path.display());
            return FileOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    if let Err(e) = replacer.commit(path, &bytes) {
        log::warn!("{e}");
        return FileOutcome::Failed {
            reason: e.to_string(),
        };
    }

    log::info!("Updated EXIF date for {} to {date}", path.display());
    FileOutcome::Updated { date }
}

/// Run [`process_image`] over every path and total the outcomes.
/// `on_file` is called after each file, e.g. to advance a progress bar.
pub fn process_images<F>(
    images: &[PathBuf],
    chain: &ParserChain,
    directives: &MutationDirectives,
    replacer: &AtomicReplacer,
    mut on_file: F,
) -> BatchReport
where
    F: FnMut(&Path, &FileOutcome),
{
    let mut report = BatchReport::default();
    let mut current_dir: Option<&Path> = None;

    for path in images {
        let dir = parent_dir(path);
        if current_dir != Some(dir) {
            log::info!("Processing directory: {}", dir.display());
            current_dir = Some(dir);
        }
        log::debug!("Processing file: {}", path.display());

        let outcome = process_image(path, chain, directives, replacer);
        report.record(path, &outcome);
        on_file(path, &outcome);
    }

    report
}
