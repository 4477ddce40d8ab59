mod commit;
mod download;
mod fs_utils;
mod layout;
mod lock;
mod report;
mod staging;
mod sync;
mod verify;

pub use commit::{CommitManager, CommitSummary};
pub use download::{ArtifactDownloader, DownloadFailure, DownloadReport};
pub use layout::MirrorLayout;
pub use lock::RunLock;
pub use report::SyncReport;
pub use staging::StagingBuilder;
pub use sync::{
    NoopObserver, RepairReport, SyncConfig, SyncManager, SyncObserver, SyncOutcome, SyncState,
    DEFAULT_REGISTRY,
};
pub use verify::{scan_published, AuditReport, IntegrityVerifier, VerifiedSet};
