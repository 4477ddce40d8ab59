use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPool;
use regmirror_core::{
    Graph, MirrorError, MirrorVersionIndex, PackageVersion, VerificationFailure,
};
use regmirror_security::{checksums_match, sha1_file_hex};
use semver::Version;
use tracing::{info, warn};

use crate::fs_utils::read_json_file;
use crate::MirrorLayout;

/// Entries cleared for commit: checked in staging, or already published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedSet {
    pub verified: BTreeSet<PackageVersion>,
    pub reused: BTreeSet<PackageVersion>,
}

impl VerifiedSet {
    pub fn len(&self) -> usize {
        self.verified.len() + self.reused.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verified.is_empty() && self.reused.is_empty()
    }

    pub fn contains(&self, entry: &PackageVersion) -> bool {
        self.verified.contains(entry) || self.reused.contains(entry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub checked: usize,
    pub failures: Vec<VerificationFailure>,
}

pub struct IntegrityVerifier<'a> {
    pool: &'a ThreadPool,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(pool: &'a ThreadPool) -> Self {
        Self { pool }
    }

    /// Checks every graph entry that was not reused from the live mirror.
    ///
    /// Fail-closed: one bad entry fails the whole batch.
    pub fn verify(
        &self,
        staging: &MirrorLayout,
        graph: &Graph,
        reused: &BTreeSet<PackageVersion>,
    ) -> Result<VerifiedSet, MirrorError> {
        let mut failures: Vec<VerificationFailure> = graph
            .package_names()
            .filter_map(|name| {
                let path = staging.package_index_path(name);
                (!path.is_file()).then(|| VerificationFailure::MissingPackageIndex {
                    package: name.to_string(),
                    path,
                })
            })
            .collect();

        let pending: Vec<PackageVersion> = graph
            .entries()
            .into_iter()
            .filter(|entry| !reused.contains(entry))
            .collect();
        let results: Vec<Result<(), VerificationFailure>> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|entry| verify_entry(staging, entry))
                .collect()
        });

        let mut verified = BTreeSet::new();
        for (entry, result) in pending.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    verified.insert(entry);
                }
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                warn!(failure = %failure, "verification failed");
            }
            return Err(MirrorError::Verification { failures });
        }

        info!(
            verified = verified.len(),
            reused = reused.len(),
            "verification passed"
        );
        Ok(VerifiedSet {
            verified,
            reused: reused.clone(),
        })
    }

    /// Re-checks every tarball already published under `live`.
    pub fn audit(&self, live: &MirrorLayout) -> Result<AuditReport, MirrorError> {
        let entries = scan_published(live)?.entries();
        let results: Vec<Result<(), VerificationFailure>> = self.pool.install(|| {
            entries
                .par_iter()
                .map(|entry| verify_entry(live, entry))
                .collect()
        });

        Ok(AuditReport {
            checked: entries.len(),
            failures: results.into_iter().filter_map(Result::err).collect(),
        })
    }
}

fn verify_entry(layout: &MirrorLayout, entry: &PackageVersion) -> Result<(), VerificationFailure> {
    let package = entry.name.clone();
    let version = entry.version.to_string();

    let index_path = layout.version_index_path(&entry.name, &entry.version);
    let index: MirrorVersionIndex = match read_json_file(&index_path) {
        Ok(Some(index)) => index,
        Ok(None) => {
            return Err(VerificationFailure::MissingArtifact {
                package,
                version,
                path: index_path,
            })
        }
        Err(err) => {
            return Err(VerificationFailure::Unreadable {
                package,
                version,
                reason: err.to_string(),
            })
        }
    };

    let Some(expected) = index
        .dist
        .and_then(|dist| dist.shasum)
        .filter(|shasum| !shasum.trim().is_empty())
    else {
        return Err(VerificationFailure::MissingDistMetadata { package, version });
    };

    let tarball = layout.tarball_path(&entry.name, &entry.version);
    if !tarball.is_file() {
        return Err(VerificationFailure::MissingArtifact {
            package,
            version,
            path: tarball,
        });
    }
    let actual = sha1_file_hex(&tarball).map_err(|err| VerificationFailure::Unreadable {
        package: package.clone(),
        version: version.clone(),
        reason: format!("{err:#}"),
    })?;

    if !checksums_match(&expected, &actual) {
        return Err(VerificationFailure::ChecksumMismatch {
            package,
            version,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Every `(package, version)` with a version index under a mirror root.
/// Scoped packages live one directory deeper, under `@scope/`.
pub fn scan_published(layout: &MirrorLayout) -> Result<Graph, MirrorError> {
    let mut graph = Graph::new();
    for top in list_dirs(layout.root())? {
        if top.starts_with('.') {
            continue;
        }
        let names = if top.starts_with('@') {
            list_dirs(&layout.root().join(&top))?
                .into_iter()
                .map(|name| format!("{top}/{name}"))
                .collect()
        } else {
            vec![top]
        };

        for name in names {
            for raw in list_dirs(&layout.package_dir(&name))? {
                let Ok(version) = Version::parse(&raw) else {
                    continue;
                };
                if layout.version_index_path(&name, &version).is_file() {
                    graph.insert(PackageVersion::new(name.clone(), version));
                }
            }
        }
    }
    Ok(graph)
}

fn list_dirs(path: &Path) -> Result<Vec<String>, MirrorError> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(MirrorError::filesystem("read", path, err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| MirrorError::filesystem("read", path, err))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
