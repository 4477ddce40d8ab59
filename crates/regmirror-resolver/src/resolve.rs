use regmirror_core::{validate_package_name, MirrorError, VersionSpec};
use regmirror_registry::RegistryClient;
use tracing::debug;

use crate::select::{select_dist_tag, select_highest_compatible};
use crate::types::{Resolution, SkipReason};

/// Turns a raw dependency spec into a concrete registry version.
#[derive(Clone, Copy)]
pub struct SpecResolver<'a> {
    client: &'a RegistryClient,
}

impl<'a> SpecResolver<'a> {
    pub fn new(client: &'a RegistryClient) -> Self {
        Self { client }
    }

    /// Exact and external specs resolve without touching the network; ranges
    /// and dist-tags read the package root document through the fetch cache.
    ///
    /// Only fetch, decode and cancellation errors are returned as `Err`; every
    /// other way a spec can fail to resolve is a [`Resolution::Skip`].
    pub fn resolve(&self, package: &str, raw: &str) -> Result<Resolution, MirrorError> {
        if let Err(err) = validate_package_name(package) {
            return Ok(Resolution::Skip(SkipReason::InvalidName {
                reason: err.to_string(),
            }));
        }

        let spec = match VersionSpec::parse(raw) {
            Ok(spec) => spec,
            Err(reason) => return Ok(Resolution::Skip(SkipReason::InvalidSpec { reason })),
        };

        let resolution = match spec {
            VersionSpec::Exact(version) => Resolution::Concrete(version),
            VersionSpec::External { kind, reference } => Resolution::External { kind, reference },
            VersionSpec::Range(range) => {
                let doc = self.client.package_root(package)?;
                match select_highest_compatible(&doc, &range) {
                    Some(version) => Resolution::Concrete(version),
                    None => Resolution::Skip(SkipReason::Unresolvable),
                }
            }
            VersionSpec::DistTag(tag) => {
                let doc = self.client.package_root(package)?;
                match select_dist_tag(&doc, &tag) {
                    Some(version) => Resolution::Concrete(version),
                    None => Resolution::Skip(SkipReason::UnknownDistTag { tag }),
                }
            }
        };

        if let Resolution::Concrete(version) = &resolution {
            debug!(package, spec = raw, version = %version, "resolved");
        }
        Ok(resolution)
    }
}
