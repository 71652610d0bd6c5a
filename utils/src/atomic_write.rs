//! Crash-safe file replacement.
//!
//! Bytes go to a temp file in the destination directory, are synced, then
//! renamed over the target. Where rename-over-existing fails (Windows), the
//! previous file is parked as `<name>.bak` for the duration of the swap and
//! restored if the swap fails. [`recover_backup`] finishes an interrupted swap.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Permission policy for the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Inherit the process umask.
    #[default]
    Inherit,
    /// Owner read/write only (0o600 on Unix). Ignored elsewhere.
    OwnerOnly,
}

impl FileMode {
    #[cfg(unix)]
    fn unix_mode(self) -> Option<u32> {
        match self {
            Self::Inherit => None,
            Self::OwnerOnly => Some(0o600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// `sync_all` the temp file before the rename.
    pub sync_file: bool,
    /// Best-effort `sync_all` on the parent directory after the rename.
    pub sync_dir: bool,
    pub mode: FileMode,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync_file: true,
            sync_dir: true,
            mode: FileMode::OwnerOnly,
        }
    }
}

/// Outcome of [`recover_backup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupRecovery {
    /// No interrupted swap was found.
    Clean,
    /// `<name>.bak` was moved back into place.
    Restored,
    /// A backup exists but could not be restored.
    Failed,
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Restore `<name>.bak` when the target is missing.
///
/// The target can only be missing with a backup present if the process died
/// between parking the old file and renaming the new one into place.
pub fn recover_backup(path: &Path) -> BackupRecovery {
    let backup = backup_path(path);
    if path.exists() || !backup.exists() {
        return BackupRecovery::Clean;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            warn!(path = %path.display(), "Restored backup left by interrupted write");
            BackupRecovery::Restored
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to restore backup: {e}");
            BackupRecovery::Failed
        }
    }
}

pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    write_atomic_with_options(path, bytes, WriteOptions::default())
}

pub fn write_atomic_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: WriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = parent_dir(path);

    let mut tmp = NamedTempFile::new_in(parent)?;
    apply_mode(tmp.path(), options.mode)?;
    tmp.write_all(bytes)?;
    if options.sync_file {
        tmp.as_file().sync_all()?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup = backup_path(path);
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;
        if let Err(second) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(second.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), "Failed to remove backup after write: {e}");
        }
    }

    apply_mode(path, options.mode)?;
    if options.sync_dir {
        sync_dir_best_effort(parent);
    }
    Ok(())
}

/// Create `dir` (and parents) and, on Unix, tighten it to 0o700 if it is
/// group or world accessible. Tightening is best-effort.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(dir)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                debug!(path = %dir.display(), "Could not tighten directory permissions: {e}");
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: FileMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(bits) = mode.unix_mode() {
        fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: FileMode) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_dir_best_effort(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(path = %dir.display(), "Directory sync failed (best-effort): {e}");
    }
}

#[cfg(not(unix))]
fn sync_dir_best_effort(_dir: &Path) {}
