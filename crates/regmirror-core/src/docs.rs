use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MIRROR_INDEX_FILE: &str = "index.json";

/// Upstream `GET {registry}/{package}` document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageRootDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionDoc>,
    #[serde(rename = "dist-tags", default, deserialize_with = "lenient_string_map")]
    pub dist_tags: BTreeMap<String, String>,
}

/// Upstream `GET {registry}/{package}/{version}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VersionDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "devDependencies",
        default,
        deserialize_with = "lenient_string_map"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "peerDependencies",
        default,
        deserialize_with = "lenient_string_map"
    )]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dist: Option<Dist>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub shasum: Option<String>,
    #[serde(default)]
    pub tarball: Option<String>,
}

impl VersionDoc {
    /// Dependencies to follow from this version: `dependencies` and
    /// `peerDependencies`. A published package's dev dependencies are never
    /// followed; they only enter a run through a seed manifest.
    pub fn dependency_specs(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut specs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for source in [&self.dependencies, &self.peer_dependencies] {
            for (name, spec) in source {
                specs.entry(name.clone()).or_default().insert(spec.clone());
            }
        }
        specs
    }
}

/// `root/<package>/index.json` as served by the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRootIndex {
    pub name: String,
    #[serde(rename = "_id")]
    pub id: String,
    pub versions: BTreeMap<String, String>,
    #[serde(rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
}

/// `root/<package>/<version>/index.json` as served by the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorVersionIndex {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(rename = "peerDependencies", default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<MirrorDist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorDist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    pub tarball: String,
}

// Old registry documents carry arrays, nulls or non-string values where a
// name -> spec map is expected; anything that is not a string entry is dropped.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Object(entries) = value else {
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(spec) => Some((key, spec)),
            _ => None,
        })
        .collect())
}
