use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rayon::prelude::*;
use rayon::ThreadPool;
use regmirror_core::{
    conventional_tarball_url, rewritten_tarball_url, Graph, MirrorDist, MirrorError,
    MirrorRootIndex, MirrorVersionIndex, PackageVersion, VersionDoc,
};
use regmirror_registry::RegistryClient;
use semver::Version;
use tracing::{debug, info, warn};

use crate::fs_utils::{read_json_file, write_json_file};
use crate::MirrorLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub package: String,
    pub version: String,
    pub reason: String,
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}: {}", self.package, self.version, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: BTreeSet<PackageVersion>,
    pub reused: BTreeSet<PackageVersion>,
    pub failed: Vec<DownloadFailure>,
}

enum Fetched {
    Downloaded(u64),
    Reused,
    Failed(String),
}

/// Writes rewritten metadata and tarballs for a frozen graph into staging.
pub struct ArtifactDownloader<'a> {
    client: &'a RegistryClient,
    pool: &'a ThreadPool,
    live: &'a MirrorLayout,
    staging: &'a MirrorLayout,
    hostname: &'a str,
}

impl<'a> ArtifactDownloader<'a> {
    pub fn new(
        client: &'a RegistryClient,
        pool: &'a ThreadPool,
        live: &'a MirrorLayout,
        staging: &'a MirrorLayout,
        hostname: &'a str,
    ) -> Self {
        Self {
            client,
            pool,
            live,
            staging,
            hostname,
        }
    }

    /// Package indexes first, then every version. Per-version failures are
    /// reported, not returned; only filesystem and cancellation errors abort.
    pub fn run(&self, graph: &Graph) -> Result<DownloadReport, MirrorError> {
        let packages: Vec<(&str, &BTreeSet<Version>)> = graph.packages().collect();
        self.pool.install(|| {
            packages
                .par_iter()
                .try_for_each(|(name, versions)| self.write_package_index(name, versions))
        })?;

        let entries = graph.entries();
        let fetched: Vec<Result<Fetched, MirrorError>> = self.pool.install(|| {
            entries
                .par_iter()
                .map(|entry| self.fetch_version(entry))
                .collect()
        });

        let mut report = DownloadReport::default();
        for (entry, result) in entries.into_iter().zip(fetched) {
            match result? {
                Fetched::Downloaded(bytes) => {
                    debug!(package = %entry.name, version = %entry.version, bytes, "downloaded");
                    report.downloaded.insert(entry);
                }
                Fetched::Reused => {
                    report.reused.insert(entry);
                }
                Fetched::Failed(reason) => {
                    warn!(package = %entry.name, version = %entry.version, reason = %reason, "download failed");
                    report.failed.push(DownloadFailure {
                        package: entry.name,
                        version: entry.version.to_string(),
                        reason,
                    });
                }
            }
        }

        info!(
            downloaded = report.downloaded.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            "downloads finished"
        );
        Ok(report)
    }

    // Versions this run carries, plus versions an earlier run published whose
    // directories are still in the live tree.
    fn write_package_index(
        &self,
        name: &str,
        required: &BTreeSet<Version>,
    ) -> Result<(), MirrorError> {
        self.client.cancel_token().check()?;
        let upstream_name = match self.client.package_root(name) {
            Ok(doc) if !doc.name.is_empty() => doc.name.clone(),
            Ok(_) => name.to_string(),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(package = name, error = %err, "package document unavailable, indexing from graph");
                name.to_string()
            }
        };

        let mut versions: BTreeMap<Version, String> = BTreeMap::new();
        if let Some(published) =
            read_json_file::<MirrorRootIndex>(&self.live.package_index_path(name))?
        {
            for (raw, url) in published.versions {
                let Ok(version) = Version::parse(&raw) else {
                    continue;
                };
                if self.live.version_dir(name, &version).is_dir() {
                    versions.insert(version, url);
                }
            }
        }
        for version in required {
            versions.insert(
                version.clone(),
                rewritten_tarball_url(self.hostname, name, version),
            );
        }

        let mut dist_tags = BTreeMap::new();
        if let Some(latest) = versions.keys().next_back() {
            dist_tags.insert("latest".to_string(), latest.to_string());
        }
        let index = MirrorRootIndex {
            name: upstream_name.clone(),
            id: upstream_name,
            versions: versions
                .into_iter()
                .map(|(version, url)| (version.to_string(), url))
                .collect(),
            dist_tags,
        };
        write_json_file(&self.staging.package_index_path(name), &index)
    }

    fn fetch_version(&self, entry: &PackageVersion) -> Result<Fetched, MirrorError> {
        let cancel = self.client.cancel_token();
        cancel.check()?;

        // Tarballs are immutable upstream for a fixed name and version, so a
        // file an earlier run committed is trusted as is.
        if self.live.tarball_path(&entry.name, &entry.version).is_file() {
            debug!(package = %entry.name, version = %entry.version, "reusing published tarball");
            return Ok(Fetched::Reused);
        }

        let doc = match self.client.version_doc(&entry.name, &entry.version) {
            Ok(doc) => doc,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => return Ok(Fetched::Failed(err.to_string())),
        };

        let index = self.version_index(entry, &doc);
        write_json_file(
            &self.staging.version_index_path(&entry.name, &entry.version),
            &index,
        )?;

        let Some(dist) = doc.dist else {
            return Ok(Fetched::Failed(
                MirrorError::MissingDistMetadata {
                    package: entry.name.clone(),
                    version: entry.version.to_string(),
                }
                .to_string(),
            ));
        };
        let url = dist
            .tarball
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| {
                conventional_tarball_url(self.client.registry(), &entry.name, &entry.version)
            });

        let dest = self.staging.tarball_path(&entry.name, &entry.version);
        match self.client.download(&url, &dest) {
            Ok(bytes) => Ok(Fetched::Downloaded(bytes)),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => Ok(Fetched::Failed(err.to_string())),
        }
    }

    fn version_index(&self, entry: &PackageVersion, doc: &VersionDoc) -> MirrorVersionIndex {
        MirrorVersionIndex {
            name: entry.name.clone(),
            version: entry.version.to_string(),
            dependencies: doc.dependencies.clone(),
            dev_dependencies: doc.dev_dependencies.clone(),
            peer_dependencies: doc.peer_dependencies.clone(),
            dist: doc.dist.as_ref().map(|dist| MirrorDist {
                shasum: dist.shasum.clone(),
                tarball: rewritten_tarball_url(self.hostname, &entry.name, &entry.version),
            }),
        }
    }
}
