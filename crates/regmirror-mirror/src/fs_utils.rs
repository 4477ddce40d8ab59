use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use regmirror_core::MirrorError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// `create_dir_all` that treats a directory created concurrently by someone
/// else as success and retries other failures a bounded number of times.
pub fn ensure_dir_with_retry(path: &Path, attempts: u32) -> Result<(), MirrorError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match fs::create_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(_) if path.is_dir() => return Ok(()),
            Err(err) if attempt < attempts => {
                debug!(path = %path.display(), attempt, error = %err, "retrying mkdir");
                thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                attempt += 1;
            }
            Err(err) => return Err(MirrorError::filesystem("create", path, err)),
        }
    }
}

pub fn remove_dir_if_exists(path: &Path) -> Result<(), MirrorError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(MirrorError::filesystem("remove", path, err)),
    }
}

/// Writes pretty JSON through a temporary sibling and a rename.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), MirrorError> {
    let mut body = serde_json::to_vec_pretty(value)
        .map_err(|err| MirrorError::filesystem("serialize", path, io::Error::from(err)))?;
    body.push(b'\n');

    let tmp = temp_sibling(path);
    fs::write(&tmp, body).map_err(|err| MirrorError::filesystem("write", &tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        MirrorError::filesystem("rename", path, err)
    })
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MirrorError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(MirrorError::filesystem("read", path, err)),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|err| MirrorError::Decode {
            url: path.display().to_string(),
            reason: err.to_string(),
        })
}

/// Copies `src` over `dst` so a reader of `dst` sees either the old or the
/// new content, never a partial file.
pub fn replace_file(src: &Path, dst: &Path) -> Result<(), MirrorError> {
    let tmp = temp_sibling(dst);
    fs::copy(src, &tmp).map_err(|err| MirrorError::filesystem("copy", src, err))?;
    fs::rename(&tmp, dst).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        MirrorError::filesystem("rename", dst, err)
    })
}

/// Every regular file under `root`, relative to it, deepest paths first.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, MirrorError> {
    let mut files = Vec::new();
    let mut queue = VecDeque::from([PathBuf::new()]);
    while let Some(relative) = queue.pop_front() {
        let dir = root.join(&relative);
        let entries = fs::read_dir(&dir).map_err(|err| MirrorError::filesystem("read", &dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::filesystem("read", &dir, err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| MirrorError::filesystem("stat", entry.path(), err))?;
            let child = relative.join(entry.file_name());
            if file_type.is_dir() {
                queue.push_back(child);
            } else if file_type.is_file() {
                files.push(child);
            }
        }
    }

    files.sort_by(|a, b| {
        let depth = |path: &PathBuf| path.components().count();
        depth(b).cmp(&depth(a)).then_with(|| a.cmp(b))
    });
    Ok(files)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file");
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}
