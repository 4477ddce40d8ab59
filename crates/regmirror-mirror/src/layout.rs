use std::path::{Path, PathBuf};

use regmirror_core::{tarball_file_name, MIRROR_INDEX_FILE};
use semver::Version;

/// Paths of one mirror tree. The same shape is used for the live root and
/// for a run's staging tree, so staging can be merged into the root verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".regmirror")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn run_staging_dir(&self, run_id: &str) -> PathBuf {
        self.staging_dir().join(run_id)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("active")
    }

    pub fn report_path(&self) -> PathBuf {
        self.state_dir().join("last-sync.json")
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn version_dir(&self, name: &str, version: &Version) -> PathBuf {
        self.package_dir(name).join(version.to_string())
    }

    pub fn package_index_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(MIRROR_INDEX_FILE)
    }

    pub fn version_index_path(&self, name: &str, version: &Version) -> PathBuf {
        self.version_dir(name, version).join(MIRROR_INDEX_FILE)
    }

    pub fn tarball_path(&self, name: &str, version: &Version) -> PathBuf {
        self.version_dir(name, version)
            .join(tarball_file_name(name, version))
    }
}
