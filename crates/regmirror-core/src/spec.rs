use std::fmt;

use semver::Version;
use serde::Serialize;

use crate::range::NpmRange;

const GIT_PREFIXES: [&str; 9] = [
    "git://",
    "git+ssh://",
    "git+http://",
    "git+https://",
    "git+file://",
    "github:",
    "gitlab:",
    "bitbucket:",
    "gist:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalKind {
    Git,
    Web,
    File,
}

impl ExternalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Web => "web",
            Self::File => "file",
        }
    }
}

/// A raw dependency declaration, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(Version),
    Range(NpmRange),
    DistTag(String),
    External { kind: ExternalKind, reference: String },
}

impl VersionSpec {
    /// Classifies a raw spec. Only range translation can fail.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || matches!(trimmed, "*" | "x" | "X") {
            return Ok(Self::Range(NpmRange::any()));
        }

        if let Some(kind) = external_kind(trimmed) {
            return Ok(Self::External {
                kind,
                reference: trimmed.to_string(),
            });
        }

        if let Some(version) = parse_exact(trimmed) {
            return Ok(Self::Exact(version));
        }

        if is_dist_tag(trimmed) {
            return Ok(Self::DistTag(trimmed.to_string()));
        }

        NpmRange::parse(trimmed).map(Self::Range)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(version) => write!(f, "{version}"),
            Self::Range(range) => write!(f, "{range}"),
            Self::DistTag(tag) => f.write_str(tag),
            Self::External { reference, .. } => f.write_str(reference),
        }
    }
}

pub fn is_git_url(spec: &str) -> bool {
    if GIT_PREFIXES.iter().any(|prefix| spec.starts_with(prefix)) {
        return true;
    }

    // `owner/repo` and `owner/repo#ref` GitHub shorthands.
    let repo = spec.split('#').next().unwrap_or(spec);
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None)
            if !owner.is_empty()
                && !name.is_empty()
                && !owner.starts_with('@')
                && !owner.starts_with('.')
                && !spec.contains(char::is_whitespace)
                && !spec.contains(':')
    )
}

pub fn is_web_url(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://")
}

fn is_file_reference(spec: &str) -> bool {
    spec.starts_with("file:")
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("~/")
}

fn external_kind(spec: &str) -> Option<ExternalKind> {
    if is_web_url(spec) {
        Some(ExternalKind::Web)
    } else if is_file_reference(spec) {
        Some(ExternalKind::File)
    } else if is_git_url(spec) {
        Some(ExternalKind::Git)
    } else {
        None
    }
}

fn parse_exact(spec: &str) -> Option<Version> {
    let bare = spec.strip_prefix('=').unwrap_or(spec).trim_start();
    let bare = bare.strip_prefix('v').unwrap_or(bare);
    Version::parse(bare).ok()
}

fn is_dist_tag(spec: &str) -> bool {
    let mut chars = spec.chars();
    let (Some(first), second) = (chars.next(), chars.next()) else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    // `v1.2`, `x.1` and friends are versions, not tags.
    let looks_like_version = match (first, second) {
        ('v' | 'V', Some(next)) => next.is_ascii_digit(),
        ('x' | 'X', None | Some('.')) => true,
        _ => false,
    };

    !looks_like_version
        && spec
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
}
