mod cancel;
mod docs;
mod error;
mod graph;
mod manifest;
mod name;
mod range;
mod spec;
mod urls;

pub use cancel::CancelToken;
pub use docs::{
    Dist, MirrorDist, MirrorRootIndex, MirrorVersionIndex, PackageRootDoc, VersionDoc,
    MIRROR_INDEX_FILE,
};
pub use error::{FetchError, MirrorError, VerificationFailure};
pub use graph::{Graph, PackageVersion};
pub use manifest::{SeedManifest, SeedSet};
pub use name::{tarball_basename, validate_package_name};
pub use range::NpmRange;
pub use spec::{ExternalKind, VersionSpec};
pub use urls::{
    conventional_tarball_url, package_url, rewritten_tarball_url, tarball_file_name, version_url,
};

#[cfg(test)]
mod tests;
