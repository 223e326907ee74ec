//! Ownership-aware and lock-protected file writing.
//!
//! Two cooperating layers: [`write_file`] creates or truncates a single
//! file with the requested mode (and, under root, ownership), and
//! [`rewrite_locked`] wraps it in the advisory-lock + temp-file +
//! rename protocol that keeps concurrent writers from corrupting an
//! externally modified artifact. The advisory lock is per-path and
//! crosses process boundaries; it is independent of the engine's
//! in-memory mutex.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use nix::sys::stat::{fstat, stat, umask, Mode};
use nix::unistd::{chown, geteuid, Group, User};
use tracing::{debug, warn};

use crate::definition::FileMetadata;
use crate::error::{SettingsError, SettingsResult};
use crate::settings::Settings;

/// Mode used when a write has no explicit mode.
pub const DEFAULT_WRITE_MODE: u32 = 0o640;

/// Widens the process umask so nothing created inside the guard can be
/// group- or world-executable, restoring the previous mask on drop.
struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    fn deny_stray_exec() -> Self {
        let previous = umask(Mode::empty());
        umask(previous.union(Mode::from_bits_truncate(0o011)));
        Self { previous }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Writes `content` to `path`, creating the file if absent.
///
/// The mode comes from `metadata` (octal string) or
/// [`DEFAULT_WRITE_MODE`]. When the process runs as root the file is
/// chowned to the metadata's owner/group. Parent directories are never
/// created; realizing directories is the provisioning path's job.
pub fn write_file(path: &Path, content: &[u8], metadata: &FileMetadata) -> SettingsResult<()> {
    let mode = match &metadata.mode {
        Some(text) => u32::from_str_radix(text, 8).map_err(|_| {
            SettingsError::invalid_value(
                path.display().to_string(),
                format!("invalid mode `{text}`"),
            )
        })?,
        None => DEFAULT_WRITE_MODE,
    };

    let _umask = UmaskGuard::deny_stray_exec();
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| SettingsError::from_open(path, e))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if geteuid().is_root() {
        apply_ownership(path, metadata)?;
    } else if metadata.owner.is_some() || metadata.group.is_some() {
        debug!(path = %path.display(), "not root; skipping ownership change");
    }

    Ok(())
}

fn apply_ownership(path: &Path, metadata: &FileMetadata) -> SettingsResult<()> {
    let uid = match &metadata.owner {
        Some(owner) => Some(
            User::from_name(owner)
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?
                .ok_or_else(|| {
                    SettingsError::invalid_value(
                        path.display().to_string(),
                        format!("unknown user `{owner}`"),
                    )
                })?
                .uid,
        ),
        None => None,
    };
    let gid = match &metadata.group {
        Some(group) => Some(
            Group::from_name(group)
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?
                .ok_or_else(|| {
                    SettingsError::invalid_value(
                        path.display().to_string(),
                        format!("unknown group `{group}`"),
                    )
                })?
                .gid,
        ),
        None => None,
    };

    if uid.is_some() || gid.is_some() {
        chown(path, uid, gid).map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Rewrites `path` atomically under an exclusive advisory lock.
///
/// The target is opened (created if absent) and locked for the whole
/// read-modify-write span, serializing concurrent writers. `mutate`
/// receives the current content and returns the replacement, which is
/// written to `<path>.tmp` through [`write_file`] and renamed over the
/// target. A pre-existing temp file aborts the call: a concurrent or
/// crashed writer may be mid-flight, and the target must not be
/// touched. A failed write or rename removes the temp file and leaves
/// the target intact.
pub fn rewrite_locked<F>(path: &Path, metadata: &FileMetadata, mutate: F) -> SettingsResult<()>
where
    F: FnOnce(&[u8]) -> Vec<u8>,
{
    let _lock: Flock<File> = lock_current_inode(path)?;
    debug!(path = %path.display(), "holding exclusive lock for rewrite");

    let temp_path = temp_path_for(path);
    if temp_path.exists() {
        return Err(SettingsError::StaleTempFile { path: temp_path });
    }

    let current = fs::read(path).map_err(|e| SettingsError::from_open(path, e))?;
    let replacement = mutate(&current);

    if let Err(error) = write_file(&temp_path, &replacement, metadata) {
        remove_temp(&temp_path);
        return Err(error);
    }

    if let Err(error) = fs::rename(&temp_path, path) {
        remove_temp(&temp_path);
        return Err(SettingsError::Rename {
            path: path.to_path_buf(),
            source: error,
        });
    }

    Ok(())
}

/// Opens and exclusively locks the file currently at `path`.
///
/// A writer that waited on the lock may find the target was renamed
/// over in the meantime; a lock on the replaced inode serializes
/// nothing. Relock until the held fd and the path agree.
fn lock_current_inode(path: &Path) -> SettingsResult<Flock<File>> {
    use std::os::fd::AsRawFd;

    loop {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(DEFAULT_WRITE_MODE)
            .open(path)
            .map_err(|e| SettingsError::from_open(path, e))?;

        let locked = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| std::io::Error::from_raw_os_error(errno as i32))?;

        let held = fstat(locked.as_raw_fd())
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        match stat(path) {
            Ok(current)
                if current.st_dev == held.st_dev && current.st_ino == held.st_ino =>
            {
                return Ok(locked);
            }
            _ => continue,
        }
    }
}

fn remove_temp(temp_path: &Path) {
    if let Err(error) = fs::remove_file(temp_path) {
        warn!(path = %temp_path.display(), %error, "could not remove temporary file");
    }
}

impl Settings {
    /// The resolved path of a file/directory setting.
    ///
    /// # Errors
    /// Unknown names error (unlike [`Settings::value`], there is no
    /// meaningful write target to fall back to), as do settings that
    /// are not file-kinded or resolve to nothing.
    pub fn setting_file_path(
        &self,
        name: &str,
        environment: Option<&str>,
    ) -> SettingsResult<PathBuf> {
        let Some(definition) = self.definition(name) else {
            return Err(SettingsError::unknown_setting(name));
        };
        if !definition.is_file_kind() {
            return Err(SettingsError::invalid_value(
                name,
                "not a file or directory setting",
            ));
        }
        match self.value(name, environment)? {
            Some(value) if !value.coerce_to_string().is_empty() => {
                Ok(PathBuf::from(value.coerce_to_string()))
            }
            _ => Err(SettingsError::invalid_value(name, "no path is set")),
        }
    }

    /// Writes `content` to the file named by a file setting, honoring
    /// its effective owner/group/mode metadata.
    pub fn write_setting_file(
        &self,
        name: &str,
        environment: Option<&str>,
        content: &[u8],
    ) -> SettingsResult<()> {
        let path = self.setting_file_path(name, environment)?;
        let metadata = self.file_metadata(name).unwrap_or_default();
        write_file(&path, content, &metadata)
    }

    /// Atomically rewrites the file named by a file setting under an
    /// exclusive lock. See [`rewrite_locked`].
    pub fn rewrite_setting_file<F>(
        &self,
        name: &str,
        environment: Option<&str>,
        mutate: F,
    ) -> SettingsResult<()>
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        let path = self.setting_file_path(name, environment)?;
        let metadata = self.file_metadata(name).unwrap_or_default();
        rewrite_locked(&path, &metadata, mutate)
    }
}
