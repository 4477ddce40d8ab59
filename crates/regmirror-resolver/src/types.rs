use std::collections::BTreeSet;
use std::fmt;

use regmirror_core::{ExternalKind, Graph, PackageVersion};
use semver::Version;
use serde::Serialize;

/// What one `(package, spec)` pair resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Concrete(Version),
    External { kind: ExternalKind, reference: String },
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Unresolvable,
    UnknownDistTag { tag: String },
    InvalidSpec { reason: String },
    InvalidName { reason: String },
    FetchFailed { cause: String },
    VersionUnavailable { cause: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolvable => f.write_str("no published version matches"),
            Self::UnknownDistTag { tag } => write!(f, "unknown dist-tag '{tag}'"),
            Self::InvalidSpec { reason } => write!(f, "invalid spec: {reason}"),
            Self::InvalidName { reason } => write!(f, "invalid name: {reason}"),
            Self::FetchFailed { cause } => write!(f, "fetch failed: {cause}"),
            Self::VersionUnavailable { cause } => write!(f, "version document unavailable: {cause}"),
        }
    }
}

/// A dependency declaration dropped during discovery, kept for the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub package: String,
    pub spec: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}: {}", self.package, self.spec, self.reason)
    }
}

/// A git, web or file dependency, recorded but never synced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExternalRef {
    pub package: String,
    pub kind: ExternalKind,
    pub reference: String,
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}: {})",
            self.package,
            self.kind.as_str(),
            self.reference
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSeeds {
    pub roots: BTreeSet<PackageVersion>,
    pub requested: BTreeSet<(String, String)>,
    pub external: BTreeSet<ExternalRef>,
    pub skipped: Vec<SkipRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    pub graph: Graph,
    pub external: BTreeSet<ExternalRef>,
    pub skipped: Vec<SkipRecord>,
    pub rounds: usize,
    pub expanded: usize,
}
