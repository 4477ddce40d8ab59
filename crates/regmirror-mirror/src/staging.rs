use rayon::prelude::*;
use rayon::ThreadPool;
use regmirror_core::{Graph, MirrorError};
use tracing::{debug, info};

use crate::fs_utils::{ensure_dir_with_retry, remove_dir_if_exists};
use crate::MirrorLayout;

/// Creates the private staging tree for one run, shaped like the graph.
pub struct StagingBuilder<'a> {
    live: &'a MirrorLayout,
    pool: &'a ThreadPool,
    mkdir_attempts: u32,
}

impl<'a> StagingBuilder<'a> {
    pub fn new(live: &'a MirrorLayout, pool: &'a ThreadPool, mkdir_attempts: u32) -> Self {
        Self {
            live,
            pool,
            mkdir_attempts,
        }
    }

    /// Purges leftovers from earlier runs (the caller holds the run lock, so
    /// nothing else is using them) and creates
    /// `staging/<run-id>/<package>/<version>` for every graph entry.
    pub fn prepare(&self, run_id: &str, graph: &Graph) -> Result<MirrorLayout, MirrorError> {
        let staging_dir = self.live.staging_dir();
        remove_dir_if_exists(&staging_dir)?;
        let run_dir = self.live.run_staging_dir(run_id);
        ensure_dir_with_retry(&run_dir, self.mkdir_attempts)?;

        let staging = MirrorLayout::new(run_dir);
        let entries = graph.entries();
        self.pool.install(|| {
            entries.par_iter().try_for_each(|entry| {
                let dir = staging.version_dir(&entry.name, &entry.version);
                debug!(path = %dir.display(), "staging directory");
                ensure_dir_with_retry(&dir, self.mkdir_attempts)
            })
        })?;

        info!(
            root = %staging.root().display(),
            packages = graph.package_count(),
            versions = entries.len(),
            "staging tree ready"
        );
        Ok(staging)
    }

    pub fn cleanup(&self, staging: &MirrorLayout) -> Result<(), MirrorError> {
        remove_dir_if_exists(staging.root())
    }
}
