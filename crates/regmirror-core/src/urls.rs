use semver::Version;

use crate::name::tarball_basename;

/// `{registry}/{package}`; the scope separator is escaped the way npm registries expect.
pub fn package_url(registry: &str, package: &str) -> String {
    format!("{}/{}", trim_base(registry), encode_name(package))
}

pub fn version_url(registry: &str, package: &str, version: &Version) -> String {
    format!("{}/{version}", package_url(registry, package))
}

pub fn tarball_file_name(package: &str, version: &Version) -> String {
    format!("{}-{version}.tgz", tarball_basename(package))
}

/// `{hostname}/{package}/{version}/{package}-{version}.tgz`
pub fn rewritten_tarball_url(hostname: &str, package: &str, version: &Version) -> String {
    format!(
        "{}/{package}/{version}/{}",
        trim_base(hostname),
        tarball_file_name(package, version)
    )
}

/// The registry's conventional tarball location, used when `dist.tarball` is absent.
pub fn conventional_tarball_url(registry: &str, package: &str, version: &Version) -> String {
    format!(
        "{}/{package}/-/{}",
        trim_base(registry),
        tarball_file_name(package, version)
    )
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

fn encode_name(package: &str) -> String {
    package.replacen('/', "%2f", 1)
}
