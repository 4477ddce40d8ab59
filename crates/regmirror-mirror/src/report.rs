use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use regmirror_core::MirrorError;
use regmirror_resolver::{ExternalRef, SkipRecord};
use serde::Serialize;

use crate::fs_utils::write_json_file;
use crate::MirrorLayout;

/// Written to `.regmirror/last-sync.json` after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub finished_at_unix: u64,
    pub packages: usize,
    pub versions: usize,
    pub downloaded: usize,
    pub reused: usize,
    pub committed_files: usize,
    pub digest: String,
    pub external: Vec<ExternalRef>,
    pub skipped: Vec<SkipRecord>,
}

impl SyncReport {
    pub fn write(&self, layout: &MirrorLayout) -> Result<PathBuf, MirrorError> {
        let path = layout.report_path();
        write_json_file(&path, self)?;
        Ok(path)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
