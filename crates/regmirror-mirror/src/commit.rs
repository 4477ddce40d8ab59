use std::path::PathBuf;

use regmirror_core::MirrorError;
use regmirror_security::{sha256_file_hex, sha256_hex};
use tracing::{debug, info};

use crate::fs_utils::{collect_files, ensure_dir_with_retry, replace_file};
use crate::MirrorLayout;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Committed paths, relative to the mirror root.
    pub files: Vec<PathBuf>,
    /// SHA-256 over the sorted `path` / file digest pairs.
    pub digest: String,
}

/// Additive merge of a verified staging tree into the live mirror root.
pub struct CommitManager {
    mkdir_attempts: u32,
}

impl CommitManager {
    pub fn new(mkdir_attempts: u32) -> Self {
        Self { mkdir_attempts }
    }

    /// Files in staging replace same-path files in the root; nothing in the
    /// root is removed. Files are placed deepest first, so a package index
    /// appears only after the version directories it lists.
    pub fn commit(
        &self,
        staging: &MirrorLayout,
        live: &MirrorLayout,
    ) -> Result<CommitSummary, MirrorError> {
        let files = collect_files(staging.root())?;
        let mut digests = Vec::with_capacity(files.len());

        for relative in &files {
            let src = staging.root().join(relative);
            let dst = live.root().join(relative);
            if let Some(parent) = dst.parent() {
                ensure_dir_with_retry(parent, self.mkdir_attempts)?;
            }

            let digest = sha256_file_hex(&src).map_err(|err| {
                MirrorError::filesystem("hash", &src, std::io::Error::other(format!("{err:#}")))
            })?;
            replace_file(&src, &dst)?;
            debug!(path = %relative.display(), "committed");
            digests.push(format!("{}\t{digest}\n", portable(relative)));
        }

        digests.sort();
        let summary = CommitSummary {
            digest: sha256_hex(digests.concat().as_bytes()),
            files,
        };
        info!(
            files = summary.files.len(),
            digest = %summary.digest,
            root = %live.root().display(),
            "commit complete"
        );
        Ok(summary)
    }
}

fn portable(path: &std::path::Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
