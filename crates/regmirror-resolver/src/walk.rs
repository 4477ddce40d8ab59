use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use rayon::prelude::*;
use rayon::ThreadPool;
use regmirror_core::{CancelToken, Graph, MirrorError, PackageVersion, SeedSet, VersionSpec};
use regmirror_registry::RegistryClient;
use tracing::{debug, info, warn};

use crate::resolve::SpecResolver;
use crate::types::{ExternalRef, Resolution, ResolvedSeeds, SkipReason, SkipRecord, WalkOutcome};

enum Discovery {
    Scheduled(PackageVersion),
    Duplicate,
    External(ExternalRef),
    Skipped(SkipRecord),
}

enum Expansion {
    Dependencies(Vec<(String, String)>),
    Dropped(SkipRecord),
}

// Everything concurrent tasks share during one walk. Held only for the
// test-and-insert and for building the next frontier at a round barrier.
#[derive(Default)]
struct Traversal {
    visited: Graph,
    requested: BTreeSet<(String, String)>,
}

/// Breadth-first fixpoint expansion of seed specs into the full dependency
/// graph, bounded by the run's worker pool.
pub struct GraphWalker<'a> {
    client: &'a RegistryClient,
    pool: &'a ThreadPool,
}

impl<'a> GraphWalker<'a> {
    pub fn new(client: &'a RegistryClient, pool: &'a ThreadPool) -> Self {
        Self { client, pool }
    }

    fn cancel(&self) -> &CancelToken {
        self.client.cancel_token()
    }

    /// Resolves every seed spec concurrently. Unlike transitive lookups, a
    /// fetch failure here aborts the run.
    pub fn resolve_seeds(&self, seeds: &SeedSet) -> Result<ResolvedSeeds, MirrorError> {
        let pairs: Vec<(String, String)> = seeds
            .entries()
            .map(|(name, spec)| (name.to_string(), spec.to_string()))
            .collect();
        let resolver = SpecResolver::new(self.client);

        let results: Vec<Result<(usize, Resolution), MirrorError>> = self.pool.install(|| {
            pairs
                .par_iter()
                .enumerate()
                .map(|(index, (package, spec))| {
                    self.cancel().check()?;
                    Ok((index, resolver.resolve(package, spec)?))
                })
                .collect()
        });

        let mut resolved = ResolvedSeeds::default();
        for result in results {
            let (index, resolution) = result?;
            let (package, spec) = &pairs[index];
            resolved.requested.insert((package.clone(), spec.clone()));
            match resolution {
                Resolution::Concrete(version) => {
                    resolved
                        .roots
                        .insert(PackageVersion::new(package.clone(), version));
                }
                Resolution::External { kind, reference } => {
                    resolved.external.insert(ExternalRef {
                        package: package.clone(),
                        kind,
                        reference,
                    });
                }
                Resolution::Skip(reason) => {
                    let record = SkipRecord {
                        package: package.clone(),
                        spec: spec.clone(),
                        reason,
                    };
                    warn!(package = %record.package, spec = %record.spec, reason = %record.reason, "skipping seed");
                    resolved.skipped.push(record);
                }
            }
        }

        info!(
            roots = resolved.roots.len(),
            external = resolved.external.len(),
            skipped = resolved.skipped.len(),
            "resolved seeds"
        );
        Ok(resolved)
    }

    /// Expands resolved seeds until a round discovers nothing new.
    ///
    /// Each round first expands the pairs scheduled by the previous round
    /// (fetching their version documents), then resolves the dependency specs
    /// those documents declare. A resolved pair is scheduled only by the task
    /// that inserts it into the visited set, so every pair is expanded at
    /// most once no matter how many parents reach it.
    pub fn walk(&self, seeds: ResolvedSeeds) -> Result<WalkOutcome, MirrorError> {
        let ResolvedSeeds {
            roots,
            requested,
            mut external,
            mut skipped,
        } = seeds;

        let traversal = Mutex::new(Traversal {
            visited: roots.iter().cloned().collect(),
            requested,
        });
        let mut dropped: BTreeSet<PackageVersion> = BTreeSet::new();
        let mut scheduled: Vec<PackageVersion> = roots.into_iter().collect();
        let mut rounds = 0;
        let mut expanded = 0;

        while !scheduled.is_empty() {
            self.cancel().check()?;
            rounds += 1;
            expanded += scheduled.len();
            debug!(round = rounds, scheduled = scheduled.len(), "expanding");

            let expansions: Vec<Result<(PackageVersion, Expansion), MirrorError>> =
                self.pool.install(|| {
                    scheduled
                        .par_iter()
                        .map(|entry| Ok((entry.clone(), self.expand(entry)?)))
                        .collect()
                });

            let mut declared: BTreeSet<(String, String)> = BTreeSet::new();
            for result in expansions {
                match result? {
                    (_, Expansion::Dependencies(dependencies)) => declared.extend(dependencies),
                    (entry, Expansion::Dropped(record)) => {
                        dropped.insert(entry);
                        skipped.push(record);
                    }
                }
            }

            let frontier = next_frontier(&mut lock(&traversal), declared);
            if frontier.is_empty() {
                break;
            }

            let discoveries: Vec<Result<Discovery, MirrorError>> = self.pool.install(|| {
                frontier
                    .par_iter()
                    .map(|(package, spec)| self.discover(&traversal, package, spec))
                    .collect()
            });

            scheduled = Vec::new();
            for discovery in discoveries {
                match discovery? {
                    Discovery::Scheduled(entry) => scheduled.push(entry),
                    Discovery::Duplicate => {}
                    Discovery::External(reference) => {
                        external.insert(reference);
                    }
                    Discovery::Skipped(record) => skipped.push(record),
                }
            }
            scheduled.sort();
        }

        let visited = traversal
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .visited;
        let graph: Graph = visited
            .entries()
            .into_iter()
            .filter(|entry| !dropped.contains(entry))
            .collect();

        info!(
            packages = graph.package_count(),
            versions = graph.version_count(),
            external = external.len(),
            skipped = skipped.len(),
            rounds,
            "dependency graph complete"
        );
        Ok(WalkOutcome {
            graph,
            external,
            skipped,
            rounds,
            expanded,
        })
    }

    /// Resolving followed by walking, as one call.
    pub fn discover_from(&self, seeds: &SeedSet) -> Result<WalkOutcome, MirrorError> {
        let resolved = self.resolve_seeds(seeds)?;
        self.walk(resolved)
    }

    fn expand(&self, entry: &PackageVersion) -> Result<Expansion, MirrorError> {
        self.cancel().check()?;
        match self.client.version_doc(&entry.name, &entry.version) {
            Ok(doc) => {
                let dependencies = doc
                    .dependency_specs()
                    .into_iter()
                    .flat_map(|(name, specs)| specs.into_iter().map(move |spec| (name.clone(), spec)))
                    .collect();
                Ok(Expansion::Dependencies(dependencies))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(package = %entry.name, version = %entry.version, error = %err, "dropping version");
                Ok(Expansion::Dropped(SkipRecord {
                    package: entry.name.clone(),
                    spec: entry.version.to_string(),
                    reason: SkipReason::VersionUnavailable {
                        cause: err.to_string(),
                    },
                }))
            }
        }
    }

    fn discover(
        &self,
        traversal: &Mutex<Traversal>,
        package: &str,
        spec: &str,
    ) -> Result<Discovery, MirrorError> {
        self.cancel().check()?;
        let resolution = match SpecResolver::new(self.client).resolve(package, spec) {
            Ok(resolution) => resolution,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => Resolution::Skip(SkipReason::FetchFailed {
                cause: err.to_string(),
            }),
        };

        Ok(match resolution {
            Resolution::Concrete(version) => {
                let entry = PackageVersion::new(package, version);
                if lock(traversal).visited.insert(entry.clone()) {
                    Discovery::Scheduled(entry)
                } else {
                    Discovery::Duplicate
                }
            }
            Resolution::External { kind, reference } => Discovery::External(ExternalRef {
                package: package.to_string(),
                kind,
                reference,
            }),
            Resolution::Skip(reason) => {
                warn!(package, spec, reason = %reason, "skipping dependency");
                Discovery::Skipped(SkipRecord {
                    package: package.to_string(),
                    spec: spec.to_string(),
                    reason,
                })
            }
        })
    }
}

// Keeps declared pairs that were never requested before and that no visited
// version of the package already satisfies.
fn next_frontier(
    traversal: &mut Traversal,
    declared: BTreeSet<(String, String)>,
) -> Vec<(String, String)> {
    let mut frontier = Vec::new();
    for (package, spec) in declared {
        if traversal.requested.contains(&(package.clone(), spec.clone())) {
            continue;
        }
        if satisfied_by_visited(&traversal.visited, &package, &spec) {
            continue;
        }
        traversal.requested.insert((package.clone(), spec.clone()));
        frontier.push((package, spec));
    }
    frontier
}

fn satisfied_by_visited(visited: &Graph, package: &str, spec: &str) -> bool {
    let Some(versions) = visited.versions(package) else {
        return false;
    };
    match VersionSpec::parse(spec) {
        Ok(VersionSpec::Exact(version)) => versions.contains(&version),
        Ok(VersionSpec::Range(range)) => versions.iter().any(|version| range.matches(version)),
        _ => false,
    }
}

fn lock(traversal: &Mutex<Traversal>) -> MutexGuard<'_, Traversal> {
    traversal
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
