use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use regmirror_core::{SeedManifest, SeedSet};
use regmirror_mirror::{SyncConfig, DEFAULT_REGISTRY};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "regmirror.toml";

/// `regmirror.toml`. Every key is optional; flags override it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub registry: Option<String>,
    pub hostname: Option<String>,
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub manifests: Vec<PathBuf>,
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub keep_staging: Option<bool>,
}

impl FileConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse config file")
    }

    /// Loads `explicit`, or `regmirror.toml` from the working directory when
    /// it exists. Returns the config and the directory relative paths in it
    /// are resolved against.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                return Ok((Self::default(), PathBuf::from(".")));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((config, base_dir))
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    /// Upstream registry base URL
    #[arg(long)]
    pub registry: Option<String>,
    /// Base URL the mirror is served from; tarball URLs are rewritten to it
    #[arg(long)]
    pub hostname: Option<String>,
    /// Mirror root directory
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// package.json whose dependencies seed the run (repeatable)
    #[arg(long = "manifest", value_name = "PATH")]
    pub manifests: Vec<PathBuf>,
    /// Seed package as NAME or NAME@SPEC (repeatable)
    #[arg(long = "package", value_name = "NAME@SPEC")]
    pub packages: Vec<String>,
    /// Concurrent fetches and downloads
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Attempts per request, including the first
    #[arg(long)]
    pub retries: Option<u32>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Abort the run after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,
    /// Leave the staging tree in place after the run
    #[arg(long)]
    pub keep_staging: bool,
    /// Remove a run lock left by a crashed run before starting
    #[arg(long)]
    pub break_lock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Sync,
    Plan,
    Verify,
    Repair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config: SyncConfig,
    pub seeds: SeedSet,
}

/// Flags over file values over built-in defaults.
pub fn resolve_settings(
    file: &FileConfig,
    base_dir: &Path,
    args: &SyncArgs,
    kind: CommandKind,
) -> Result<Settings> {
    let hostname = args.hostname.clone().or_else(|| file.hostname.clone());
    let root = args
        .root
        .clone()
        .or_else(|| file.root.as_ref().map(|root| base_dir.join(root)));

    let hostname = match (hostname, kind) {
        (Some(hostname), _) => hostname,
        (None, CommandKind::Sync) => {
            return Err(anyhow!(
                "mirror hostname is required (--hostname or `hostname` in {DEFAULT_CONFIG_FILE})"
            ));
        }
        (None, _) => String::new(),
    };
    let root = match (root, kind) {
        (Some(root), _) => root,
        (None, CommandKind::Sync | CommandKind::Verify | CommandKind::Repair) => {
            return Err(anyhow!(
                "mirror root is required (--root or `root` in {DEFAULT_CONFIG_FILE})"
            ));
        }
        (None, CommandKind::Plan) => PathBuf::from("."),
    };

    let mut config = SyncConfig::new(hostname, root);
    config.registry = args
        .registry
        .clone()
        .or_else(|| file.registry.clone())
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        config.concurrency = concurrency.max(1);
    }
    if let Some(retries) = args.retries.or(file.retries) {
        config.retry.attempts = retries.max(1);
    }
    if let Some(backoff) = file.retry_backoff_ms {
        config.retry.backoff = Duration::from_millis(backoff);
    }
    if let Some(timeout) = args.timeout_secs.or(file.timeout_secs) {
        config.timeout = Duration::from_secs(timeout);
    }
    config.deadline = args
        .deadline_secs
        .or(file.deadline_secs)
        .map(Duration::from_secs);
    config.keep_staging = args.keep_staging || file.keep_staging.unwrap_or(false);
    config.break_lock = args.break_lock;

    let seeds = match kind {
        CommandKind::Sync | CommandKind::Plan => collect_seeds(file, base_dir, args)?,
        CommandKind::Verify | CommandKind::Repair => SeedSet::new(),
    };
    Ok(Settings { config, seeds })
}

fn collect_seeds(file: &FileConfig, base_dir: &Path, args: &SyncArgs) -> Result<SeedSet> {
    let mut seeds = SeedSet::new();
    let manifests = file
        .manifests
        .iter()
        .map(|path| base_dir.join(path))
        .chain(args.manifests.iter().cloned());
    for path in manifests {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        let manifest = SeedManifest::from_json_str(&raw)
            .with_context(|| format!("invalid manifest: {}", path.display()))?;
        seeds.add_manifest(&manifest);
    }

    for (name, spec) in &file.packages {
        seeds.add(name.clone(), spec.clone());
    }
    for entry in &args.packages {
        seeds.add_entry(entry)?;
    }

    if seeds.is_empty() {
        return Err(anyhow!(
            "no seed packages: pass --manifest or --package, or list them in {DEFAULT_CONFIG_FILE}"
        ));
    }
    Ok(seeds)
}
