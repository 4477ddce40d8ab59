use regmirror_core::{NpmRange, PackageRootDoc};
use semver::Version;

pub fn select_highest_compatible(doc: &PackageRootDoc, range: &NpmRange) -> Option<Version> {
    range.max_satisfying(doc.versions.keys().map(String::as_str))
}

/// The version a dist-tag points at, provided the document still lists it.
pub fn select_dist_tag(doc: &PackageRootDoc, tag: &str) -> Option<Version> {
    let target = doc.dist_tags.get(tag)?;
    if !doc.versions.contains_key(target) {
        return None;
    }
    Version::parse(target).ok()
}
