use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rayon::{ThreadPool, ThreadPoolBuilder};
use regmirror_core::{CancelToken, MirrorError, SeedSet};
use regmirror_registry::{FetchCache, RegistryClient, RetryPolicy, Transport};
use regmirror_resolver::{GraphWalker, SkipRecord, WalkOutcome};
use tracing::{info, warn};

use crate::fs_utils::remove_dir_if_exists;
use crate::report::unix_now;
use crate::{
    ArtifactDownloader, AuditReport, CommitManager, CommitSummary, DownloadReport,
    IntegrityVerifier, MirrorLayout, RunLock, StagingBuilder, SyncReport, VerifiedSet,
};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Idle,
    Resolving,
    Walking,
    Staging,
    Downloading,
    Verifying,
    Committing,
    Done,
    Failed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Walking => "walking",
            Self::Staging => "staging",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callbacks from a running [`SyncManager`].
pub trait SyncObserver: Send + Sync {
    fn state_changed(&self, _state: SyncState) {}

    fn skipped(&self, _record: &SkipRecord) {}
}

pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub registry: String,
    pub hostname: String,
    pub root: PathBuf,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Per-request timeout for the HTTP transport.
    pub timeout: Duration,
    /// Whole-run deadline, measured from the start of each run.
    pub deadline: Option<Duration>,
    pub mkdir_attempts: u32,
    pub keep_staging: bool,
    /// Remove an existing run lock before claiming the root.
    pub break_lock: bool,
}

impl SyncConfig {
    pub fn new(hostname: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            hostname: hostname.into(),
            root: root.into(),
            concurrency: 16,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            deadline: None,
            mkdir_attempts: 5,
            keep_staging: false,
            break_lock: false,
        }
    }
}

/// What [`SyncManager::repair`] cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub stale_lock: Option<String>,
    pub staging_removed: bool,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub run_id: String,
    pub walk: WalkOutcome,
    pub downloads: DownloadReport,
    pub verified: VerifiedSet,
    pub commit: CommitSummary,
    pub report: SyncReport,
}

/// Runs the mirror pipeline one stage at a time:
/// `Idle -> Resolving -> Walking -> Staging -> Downloading -> Verifying ->
/// Committing -> Done`, or `Failed` from any stage.
///
/// Each stage fans out over the manager's worker pool and fully drains before
/// the next begins. Nothing under the mirror root outside `.regmirror/` is
/// written before `Committing`.
pub struct SyncManager {
    config: SyncConfig,
    layout: MirrorLayout,
    transport: Arc<dyn Transport>,
    pool: ThreadPool,
    cancel: CancelToken,
    observer: Arc<dyn SyncObserver>,
    history: Mutex<Vec<SyncState>>,
}

impl SyncManager {
    pub fn new(config: SyncConfig, transport: Arc<dyn Transport>) -> Result<Self, MirrorError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.concurrency.max(1))
            .thread_name(|index| format!("regmirror-worker-{index}"))
            .build()
            .map_err(|err| MirrorError::WorkerPool(err.to_string()))?;

        Ok(Self {
            layout: MirrorLayout::new(config.root.clone()),
            config,
            transport,
            pool,
            cancel: CancelToken::new(),
            observer: Arc::new(NoopObserver),
            history: Mutex::new(vec![SyncState::Idle]),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Aborts the current and any later run of this manager.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SyncState {
        self.lock_history()
            .last()
            .copied()
            .unwrap_or(SyncState::Idle)
    }

    pub fn history(&self) -> Vec<SyncState> {
        self.lock_history().clone()
    }

    pub fn run(&self, seeds: &SeedSet) -> Result<SyncOutcome, MirrorError> {
        self.reset();
        let run_id = new_run_id();
        info!(run_id = %run_id, root = %self.layout.root().display(), "sync started");

        let result = self
            .break_lock_if_requested()
            .and_then(|()| RunLock::acquire(&self.layout, &run_id, self.config.mkdir_attempts))
            .and_then(|lock| {
                let outcome = self.run_locked(&run_id, seeds);
                drop(lock);
                outcome
            });

        result.inspect_err(|err| {
            warn!(run_id = %run_id, error = %err, "sync failed");
            self.transition(SyncState::Failed);
        })
    }

    /// Resolving and walking only; never writes to disk.
    pub fn plan(&self, seeds: &SeedSet) -> Result<WalkOutcome, MirrorError> {
        self.reset();
        let client = self.client();
        let walker = GraphWalker::new(&client, &self.pool);

        match self.discover(&walker, seeds) {
            Ok(outcome) => {
                self.report_skips(&outcome);
                self.transition(SyncState::Done);
                Ok(outcome)
            }
            Err(err) => {
                self.transition(SyncState::Failed);
                Err(err)
            }
        }
    }

    /// Re-checks every published tarball against its version index.
    pub fn audit(&self) -> Result<AuditReport, MirrorError> {
        IntegrityVerifier::new(&self.pool).audit(&self.layout)
    }

    /// Clears what an interrupted run leaves behind: the run lock and every
    /// staging tree. The live mirror is not touched.
    pub fn repair(&self) -> Result<RepairReport, MirrorError> {
        let stale_lock = RunLock::break_stale(&self.layout)?;
        let staging_dir = self.layout.staging_dir();
        let staging_removed = fs::read_dir(&staging_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        remove_dir_if_exists(&staging_dir)?;
        info!(
            stale_lock = stale_lock.as_deref().unwrap_or("none"),
            staging_removed,
            "repair complete"
        );
        Ok(RepairReport {
            stale_lock,
            staging_removed,
        })
    }

    fn break_lock_if_requested(&self) -> Result<(), MirrorError> {
        if self.config.break_lock {
            RunLock::break_stale(&self.layout)?;
        }
        Ok(())
    }

    fn run_locked(&self, run_id: &str, seeds: &SeedSet) -> Result<SyncOutcome, MirrorError> {
        let client = self.client();
        let walker = GraphWalker::new(&client, &self.pool);
        let walk = self.discover(&walker, seeds)?;
        self.report_skips(&walk);

        self.transition(SyncState::Staging);
        let builder = StagingBuilder::new(&self.layout, &self.pool, self.config.mkdir_attempts);
        let result = builder
            .prepare(run_id, &walk.graph)
            .and_then(|staging| self.publish(&client, &staging, run_id, walk));

        let staging = MirrorLayout::new(self.layout.run_staging_dir(run_id));
        if self.config.keep_staging {
            info!(path = %staging.root().display(), "keeping staging tree");
        } else if let Err(err) = builder.cleanup(&staging) {
            warn!(error = %err, "failed to remove staging tree");
        }
        result
    }

    fn discover(
        &self,
        walker: &GraphWalker<'_>,
        seeds: &SeedSet,
    ) -> Result<WalkOutcome, MirrorError> {
        self.transition(SyncState::Resolving);
        let resolved = walker.resolve_seeds(seeds)?;
        self.transition(SyncState::Walking);
        walker.walk(resolved)
    }

    fn publish(
        &self,
        client: &RegistryClient,
        staging: &MirrorLayout,
        run_id: &str,
        walk: WalkOutcome,
    ) -> Result<SyncOutcome, MirrorError> {
        let cancel = client.cancel_token();

        self.transition(SyncState::Downloading);
        let downloads = ArtifactDownloader::new(
            client,
            &self.pool,
            &self.layout,
            staging,
            &self.config.hostname,
        )
        .run(&walk.graph)?;
        cancel.check()?;

        self.transition(SyncState::Verifying);
        let verified =
            IntegrityVerifier::new(&self.pool).verify(staging, &walk.graph, &downloads.reused)?;
        cancel.check()?;

        self.transition(SyncState::Committing);
        let commit = CommitManager::new(self.config.mkdir_attempts).commit(staging, &self.layout)?;

        let report = SyncReport {
            run_id: run_id.to_string(),
            finished_at_unix: unix_now(),
            packages: walk.graph.package_count(),
            versions: walk.graph.version_count(),
            downloaded: downloads.downloaded.len(),
            reused: downloads.reused.len(),
            committed_files: commit.files.len(),
            digest: commit.digest.clone(),
            external: walk.external.iter().cloned().collect(),
            skipped: walk.skipped.clone(),
        };
        if let Err(err) = report.write(&self.layout) {
            warn!(error = %err, "failed to write run report");
        }

        self.transition(SyncState::Done);
        info!(
            run_id,
            versions = report.versions,
            downloaded = report.downloaded,
            reused = report.reused,
            "sync complete"
        );
        Ok(SyncOutcome {
            run_id: run_id.to_string(),
            walk,
            downloads,
            verified,
            commit,
            report,
        })
    }

    fn client(&self) -> RegistryClient {
        let cancel = match self.config.deadline {
            Some(deadline) => self.cancel.deadline_after(deadline),
            None => self.cancel.clone(),
        };
        let cache = Arc::new(FetchCache::new(Arc::clone(&self.transport)));
        RegistryClient::new(self.config.registry.clone(), cache, self.config.retry, cancel)
    }

    fn report_skips(&self, walk: &WalkOutcome) {
        for record in &walk.skipped {
            self.observer.skipped(record);
        }
    }

    fn reset(&self) {
        *self.lock_history() = vec![SyncState::Idle];
    }

    fn transition(&self, state: SyncState) {
        self.lock_history().push(state);
        info!(state = %state, "sync state");
        self.observer.state_changed(state);
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<SyncState>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn new_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    format!("run-{nanos}-{}", std::process::id())
}
