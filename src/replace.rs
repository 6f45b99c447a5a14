//! Crash-safe file replacement: write a sibling temp file, then rename it
//! over the original.
//!
//! The temp file lives in the target's directory so the rename never crosses
//! a filesystem. It is held by a [`NamedTempFile`] guard and deleted on every
//! path that does not end in a successful rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;

/// Temp files start with a dot and end in `.tmp`, so walks never pick them up.
pub const TEMP_PREFIX: &str = ".exif-date-";
pub const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("cannot stage replacement for {}: {source}", path.display())]
    Stage { path: PathBuf, source: io::Error },

    #[error("cannot replace {} after {attempts} attempt(s): {source}", path.display())]
    Rename {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },
}

/// How often and how patiently a blocked rename is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total rename attempts, first one included.
    pub attempts: u32,
    /// Wait before the second attempt; doubled for each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

/// Errors worth waiting out: another process (indexer, antivirus, viewer)
/// holding the file open.
fn is_transient(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(error.raw_os_error(), Some(32 | 33))
}

#[derive(Debug, Clone, Default)]
pub struct AtomicReplacer {
    pub retry: RetryPolicy,
}

impl AtomicReplacer {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Replace `target` with `bytes`. On error the original is untouched.
    pub fn commit(&self, target: &Path, bytes: &[u8]) -> Result<(), ReplaceError> {
        self.stage(target, bytes)?.persist(&self.retry)
    }

    /// Write `bytes` to a synced temp file next to `target`, carrying over its
    /// permissions. Nothing is renamed yet.
    pub fn stage(&self, target: &Path, bytes: &[u8]) -> Result<StagedReplacement, ReplaceError> {
        let stage_err = |source| ReplaceError::Stage {
            path: target.to_path_buf(),
            source,
        };

        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let permissions = fs::metadata(target).map_err(stage_err)?.permissions();

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)
            .map_err(stage_err)?;
        temp.write_all(bytes).map_err(stage_err)?;
        temp.flush().map_err(stage_err)?;
        temp.as_file().sync_all().map_err(stage_err)?;
        temp.as_file().set_permissions(permissions).map_err(stage_err)?;

        log::trace!("Staged {} bytes at {}", bytes.len(), temp.path().display());
        Ok(StagedReplacement {
            temp,
            target: target.to_path_buf(),
        })
    }
}

/// A fully written temp file waiting to be renamed over its target.
/// Dropping it removes the temp file and leaves the target as it was.
#[derive(Debug)]
pub struct StagedReplacement {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedReplacement {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn persist(self, retry: &RetryPolicy) -> Result<(), ReplaceError> {
        self.persist_with(retry, |temp, target| temp.persist(target).map(|_| ()))
    }

    fn persist_with<F>(self, retry: &RetryPolicy, mut rename: F) -> Result<(), ReplaceError>
    where
        F: FnMut(NamedTempFile, &Path) -> Result<(), PersistError>,
    {
        let Self { mut temp, target } = self;
        let attempts = retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match rename(temp, &target) {
                Ok(()) => return Ok(()),
                Err(PersistError { error, file }) => {
                    if attempt >= attempts || !is_transient(&error) {
                        drop(file);
                        return Err(ReplaceError::Rename {
                            path: target,
                            attempts: attempt,
                            source: error,
                        });
                    }
                    let delay = retry.delay_for(attempt - 1);
                    log::debug!(
                        "Replacing {} failed ({error}), retrying in {delay:?}",
                        target.display()
                    );
                    std::thread::sleep(delay);
                    temp = file;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("photo.jpg");
        fs::write(&target, b"original").unwrap();
        (dir, target)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn locked(file: NamedTempFile) -> PersistError {
        PersistError {
            error: io::Error::from(io::ErrorKind::PermissionDenied),
            file,
        }
    }

    // ── commit ───────────────────────────────────────────────────────

    #[test]
    fn commit_replaces_contents() {
        let (dir, target) = setup();
        AtomicReplacer::new(no_wait()).commit(&target, b"rewritten").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"rewritten");
        assert_eq!(entries(dir.path()), ["photo.jpg"]);
    }

    #[test]
    fn commit_to_missing_target_fails_at_stage() {
        let dir = TempDir::new().unwrap();
        let err = AtomicReplacer::default()
            .commit(&dir.path().join("gone.jpg"), b"x")
            .unwrap_err();
        assert!(matches!(err, ReplaceError::Stage { .. }));
        assert!(entries(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn commit_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, target) = setup();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o640)).unwrap();
        AtomicReplacer::new(no_wait()).commit(&target, b"rewritten").unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    // ── staging ──────────────────────────────────────────────────────

    #[test]
    fn staged_file_is_hidden_sibling() {
        let (dir, target) = setup();
        let staged = AtomicReplacer::default().stage(&target, b"new").unwrap();
        assert_eq!(staged.temp_path().parent(), Some(dir.path()));
        let name = staged.temp_path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX));
        assert_eq!(staged.target(), target);
    }

    #[test]
    fn dropped_stage_leaves_original_untouched() {
        let (dir, target) = setup();
        let staged = AtomicReplacer::default().stage(&target, b"never renamed").unwrap();
        assert_eq!(entries(dir.path()).len(), 2);
        drop(staged);
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert_eq!(entries(dir.path()), ["photo.jpg"]);
    }

    // ── retries ──────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
    }

    #[test]
    fn transient_lock_is_retried() {
        let (dir, target) = setup();
        let staged = AtomicReplacer::default().stage(&target, b"rewritten").unwrap();
        let mut calls = 0;
        staged
            .persist_with(&no_wait(), |file, target| {
                calls += 1;
                if calls < 3 {
                    Err(locked(file))
                } else {
                    file.persist(target).map(|_| ())
                }
            })
            .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(fs::read(&target).unwrap(), b"rewritten");
        assert_eq!(entries(dir.path()), ["photo.jpg"]);
    }

    #[test]
    fn exhausted_retries_keep_original() {
        let (dir, target) = setup();
        let staged = AtomicReplacer::default().stage(&target, b"rewritten").unwrap();
        let mut calls = 0;
        let err = staged
            .persist_with(&no_wait(), |file, _| {
                calls += 1;
                Err(locked(file))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, ReplaceError::Rename { attempts: 3, .. }));
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert_eq!(entries(dir.path()), ["photo.jpg"]);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let (dir, target) = setup();
        let staged = AtomicReplacer::default().stage(&target, b"rewritten").unwrap();
        let mut calls = 0;
        let err = staged
            .persist_with(&no_wait(), |file, _| {
                calls += 1;
                Err(PersistError {
                    error: io::Error::from(io::ErrorKind::NotFound),
                    file,
                })
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, ReplaceError::Rename { attempts: 1, .. }));
        assert_eq!(entries(dir.path()), ["photo.jpg"]);
    }
}
