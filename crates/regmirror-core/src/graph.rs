use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::Version;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageVersion {
    pub name: String,
    pub version: Version,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The frozen result of traversal: package name -> required versions.
///
/// Nodes are plain `(name, version)` keys, so dependency cycles are just
/// repeated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    packages: BTreeMap<String, BTreeSet<Version>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PackageVersion) -> bool {
        self.packages
            .entry(entry.name)
            .or_default()
            .insert(entry.version)
    }

    pub fn contains(&self, name: &str, version: &Version) -> bool {
        self.packages
            .get(name)
            .is_some_and(|versions| versions.contains(version))
    }

    pub fn versions(&self, name: &str) -> Option<&BTreeSet<Version>> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &BTreeSet<Version>)> {
        self.packages
            .iter()
            .map(|(name, versions)| (name.as_str(), versions))
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn entries(&self) -> Vec<PackageVersion> {
        self.packages
            .iter()
            .flat_map(|(name, versions)| {
                versions
                    .iter()
                    .map(move |version| PackageVersion::new(name.clone(), version.clone()))
            })
            .collect()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn version_count(&self) -> usize {
        self.packages.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<PackageVersion> for Graph {
    fn from_iter<T: IntoIterator<Item = PackageVersion>>(iter: T) -> Self {
        let mut graph = Graph::new();
        for entry in iter {
            graph.insert(entry);
        }
        graph
    }
}
