use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("GET {url} failed: {}", describe_fetch(.status, .cause))]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub cause: String,
}

impl FetchError {
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            cause: "unexpected status".to_string(),
        }
    }

    pub fn transport(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            status: None,
            cause: cause.to_string(),
        }
    }

    /// Transport failures, timeouts, throttling and server errors; a 404 is final.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 408 || status == 429 || status >= 500,
        }
    }
}

fn describe_fetch(status: &Option<u16>, cause: &str) -> String {
    match status {
        Some(status) => format!("HTTP {status} ({cause})"),
        None => cause.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("{package}@{version}: shasum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch {
        package: String,
        version: String,
        expected: String,
        actual: String,
    },
    #[error("{package}@{version}: no dist.shasum in version index")]
    MissingDistMetadata { package: String, version: String },
    #[error("{package}@{version}: missing {}", path.display())]
    MissingArtifact {
        package: String,
        version: String,
        path: PathBuf,
    },
    #[error("{package}: missing package index {}", path.display())]
    MissingPackageIndex { package: String, path: PathBuf },
    #[error("{package}@{version}: {reason}")]
    Unreadable {
        package: String,
        version: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("invalid package name '{name}': {reason}")]
    InvalidPackageName { name: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed decoding document from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("failed to {op} {}: {source}", path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{package}@{version}: upstream version document has no dist block")]
    MissingDistMetadata { package: String, version: String },
    #[error("verification failed for {} entries", failures.len())]
    Verification { failures: Vec<VerificationFailure> },
    #[error("mirror root is locked by another run ({holder}): {}", path.display())]
    RunLocked { path: PathBuf, holder: String },
    #[error("failed building worker pool: {0}")]
    WorkerPool(String),
    #[error("mirror run cancelled")]
    Cancelled,
}

impl MirrorError {
    pub fn filesystem(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
