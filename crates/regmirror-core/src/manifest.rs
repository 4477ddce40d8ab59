use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context};
use serde::Deserialize;

/// A `package.json`-shaped document whose dependencies seed a mirror run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeedManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(rename = "peerDependencies", default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(rename = "optionalDependencies", default)]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl SeedManifest {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse seed manifest")
    }
}

/// Package name -> raw specs requested by the seeds of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSet {
    specs: BTreeMap<String, BTreeSet<String>>,
}

impl SeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, spec: impl Into<String>) {
        self.specs
            .entry(name.into())
            .or_default()
            .insert(spec.into());
    }

    pub fn add_manifest(&mut self, manifest: &SeedManifest) {
        for section in [
            &manifest.dependencies,
            &manifest.dev_dependencies,
            &manifest.peer_dependencies,
            &manifest.optional_dependencies,
        ] {
            for (name, spec) in section {
                self.add(name.clone(), spec.clone());
            }
        }
    }

    /// Parses `name@spec`, `@scope/name@spec` or a bare name (meaning `latest`).
    pub fn add_entry(&mut self, entry: &str) -> anyhow::Result<()> {
        let entry = entry.trim();
        let search_from = usize::from(entry.starts_with('@') && entry.contains('/'));
        let (name, spec) = match entry[search_from..].find('@') {
            Some(index) => {
                let split = search_from + index;
                (&entry[..split], &entry[split + 1..])
            }
            None => (entry, "latest"),
        };

        if name.is_empty() {
            return Err(anyhow!("seed entry '{entry}' has no package name"));
        }
        self.add(name, if spec.is_empty() { "latest" } else { spec });
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.specs.iter().flat_map(|(name, specs)| {
            specs
                .iter()
                .map(move |spec| (name.as_str(), spec.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.specs.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
