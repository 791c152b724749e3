//! Advisory file lock guard.
//!
//! `try_lock_exclusive` maps to `flock(LOCK_EX | LOCK_NB)` on Unix and
//! `LockFileEx` on Windows. Both are a single non-blocking call whose result
//! is the ownership decision, both are scoped to the open file (so a second
//! open in the same process contends too), and both are dropped by the kernel
//! when the owning process exits for any reason.

use fs2::FileExt;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::api::models::{GuardError, Variant};
use crate::core::guard::{GuardHandle, GuardProvider, InstanceGuard};
use crate::types::constants::suffix;

/// Guard provider backed by `<dir>/peerlaunch-<variant>.lock`.
#[derive(Debug, Clone)]
pub struct LockFileProvider {
    dir: PathBuf,
}

impl LockFileProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Lock file location for `variant`.
    pub fn lock_path(&self, variant: &Variant) -> PathBuf {
        self.dir.join(lock_file_name(variant))
    }

    /// Opens the lock file, falling back to the temp directory when the
    /// configured directory is unusable.
    fn open(&self, variant: &Variant) -> Result<(File, PathBuf), GuardError> {
        let path = self.lock_path(variant);
        let err = match open_lock_file(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) => e,
        };

        let fallback = std::env::temp_dir().join(lock_file_name(variant));
        if fallback == path {
            return Err(GuardError::Create { path, source: err });
        }

        warn!(
            "Cannot create {} ({err}); falling back to {}",
            path.display(),
            fallback.display()
        );
        open_lock_file(&fallback)
            .map(|file| (file, fallback.clone()))
            .map_err(|source| GuardError::Create {
                path: fallback,
                source,
            })
    }
}

impl GuardProvider for LockFileProvider {
    fn acquire(&self, variant: &Variant) -> Result<GuardHandle, GuardError> {
        let (file, path) = self.open(variant)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                record_pid(&file);
                info!("Acquired instance lock {}", path.display());
                Ok(GuardHandle::new(LockFileGuard {
                    file: Some(file),
                    path,
                }))
            }
            Err(e) if is_contended(&e) => {
                info!("Instance lock {} is held by another process", path.display());
                Ok(GuardHandle::new(LockFileGuard { file: None, path }))
            }
            Err(e) => Err(GuardError::Unavailable(e)),
        }
    }
}

/// A resolved lock. Holds the locked file when this process won.
#[derive(Debug)]
struct LockFileGuard {
    file: Option<File>,
    path: PathBuf,
}

impl InstanceGuard for LockFileGuard {
    fn is_first(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!("Releasing instance lock {}", self.path.display());
        }
    }
}

fn lock_file_name(variant: &Variant) -> String {
    format!("{}.{}", variant.resource_name(), suffix::LOCK)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Never truncate on open: the loser must not wipe the winner's pid.
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Writes the owner pid into the lock file. Diagnostic only.
fn record_pid(mut file: &File) {
    let result = file
        .set_len(0)
        .and_then(|()| writeln!(file, "{}", std::process::id()))
        .and_then(|()| file.flush());

    if let Err(e) = result {
        debug!("Could not record pid in lock file: {e}");
    }
}
