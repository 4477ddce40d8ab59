use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use regmirror_core::MirrorError;
use tracing::warn;

use crate::fs_utils::ensure_dir_with_retry;
use crate::MirrorLayout;

/// Exclusive claim on a mirror root for the duration of one run. The marker
/// file holds the run id and is removed when the lock is dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(
        layout: &MirrorLayout,
        run_id: &str,
        mkdir_attempts: u32,
    ) -> Result<Self, MirrorError> {
        ensure_dir_with_retry(&layout.state_dir(), mkdir_attempts)?;
        let path = layout.lock_path();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(MirrorError::RunLocked {
                    holder: Self::holder(layout).unwrap_or_else(|| "unknown run".to_string()),
                    path,
                });
            }
            Err(err) => return Err(MirrorError::filesystem("claim", &path, err)),
        };

        if let Err(err) = file
            .write_all(format!("{run_id}\n").as_bytes())
            .and_then(|()| file.flush())
        {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(MirrorError::filesystem("write", &path, err));
        }
        Ok(Self { path })
    }

    /// Run id recorded in an existing lock marker.
    pub fn holder(layout: &MirrorLayout) -> Option<String> {
        let raw = fs::read_to_string(layout.lock_path()).ok()?;
        let run_id = raw.trim();
        (!run_id.is_empty()).then(|| run_id.to_string())
    }

    /// Removes a marker left by a run that never released it (crash, kill,
    /// power loss). Returns the recorded holder, or `None` when the root was
    /// not locked. The caller must know no live run holds the root.
    pub fn break_stale(layout: &MirrorLayout) -> Result<Option<String>, MirrorError> {
        let path = layout.lock_path();
        let holder = Self::holder(layout).unwrap_or_else(|| "unknown run".to_string());
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), holder = %holder, "removed stale run lock");
                Ok(Some(holder))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(MirrorError::filesystem("remove", &path, err)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to release run lock");
            }
        }
    }
}
