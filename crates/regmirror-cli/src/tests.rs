use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use regmirror_core::{MirrorError, VerificationFailure};
use regmirror_mirror::RepairReport;

use super::*;
use crate::render::{render_status_line, OutputStyle};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let root = std::env::temp_dir().join(format!(
        "regmirror-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&root).expect("must create test root");
    root
}

fn seed_entries(settings: &Settings) -> Vec<(String, String)> {
    settings
        .seeds
        .entries()
        .map(|(name, spec)| (name.to_string(), spec.to_string()))
        .collect()
}

#[test]
fn parses_full_config_file() {
    let config = FileConfig::from_toml_str(
        r#"
registry = "https://registry.example.test/"
hostname = "https://mirror.example.test/npm/"
root = "mirror"
manifests = ["package.json"]
concurrency = 8
retries = 5
retry_backoff_ms = 250
timeout_secs = 10
deadline_secs = 600
keep_staging = true

[packages]
left-pad = "^1.3.0"
"@scope/tool" = "latest"
"#,
    )
    .expect("config must parse");

    assert_eq!(config.registry.as_deref(), Some("https://registry.example.test/"));
    assert_eq!(config.root, Some(PathBuf::from("mirror")));
    assert_eq!(config.manifests, vec![PathBuf::from("package.json")]);
    assert_eq!(config.packages.len(), 2);
    assert_eq!(config.retries, Some(5));
    assert_eq!(config.keep_staging, Some(true));
}

#[test]
fn rejects_unknown_config_keys() {
    let err = FileConfig::from_toml_str("hostname = \"x\"\nmirror_root = \"y\"\n")
        .expect_err("unknown key must be rejected");
    assert!(format!("{err:#}").contains("mirror_root"));
}

#[test]
fn explicit_config_path_must_exist() {
    let root = test_root();
    let explicit = root.join("absent.toml");

    let err = FileConfig::load(Some(&explicit)).expect_err("explicit path must exist");
    assert!(err.to_string().contains("absent.toml"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn loads_config_relative_to_its_directory() {
    let root = test_root();
    fs::write(
        root.join("regmirror.toml"),
        "hostname = \"https://mirror.example.test/\"\nroot = \"public\"\nmanifests = [\"package.json\"]\n",
    )
    .expect("must write config");
    fs::write(
        root.join("package.json"),
        r#"{"dependencies": {"left-pad": "^1.0.0"}, "devDependencies": {"tap": "~12.0.0"}}"#,
    )
    .expect("must write manifest");

    let (file, base_dir) =
        FileConfig::load(Some(&root.join("regmirror.toml"))).expect("config must load");
    assert_eq!(base_dir, root);

    let settings = resolve_settings(&file, &base_dir, &SyncArgs::default(), CommandKind::Sync)
        .expect("settings must resolve");
    assert_eq!(settings.config.root, root.join("public"));
    assert_eq!(
        seed_entries(&settings),
        vec![
            ("left-pad".to_string(), "^1.0.0".to_string()),
            ("tap".to_string(), "~12.0.0".to_string()),
        ]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn flags_override_file_values() {
    let file = FileConfig {
        registry: Some("https://file.example.test/".to_string()),
        hostname: Some("https://file-host.example.test/".to_string()),
        root: Some(PathBuf::from("from-file")),
        concurrency: Some(2),
        retries: Some(2),
        retry_backoff_ms: Some(50),
        timeout_secs: Some(5),
        packages: [("react".to_string(), "^18.0.0".to_string())]
            .into_iter()
            .collect(),
        ..FileConfig::default()
    };
    let args = SyncArgs {
        hostname: Some("https://flag-host.example.test/".to_string()),
        root: Some(PathBuf::from("/srv/mirror")),
        concurrency: Some(32),
        retries: Some(4),
        deadline_secs: Some(90),
        packages: vec!["@scope/pkg@1.2.3".to_string()],
        keep_staging: true,
        ..SyncArgs::default()
    };

    let settings = resolve_settings(&file, Path::new("/etc/regmirror"), &args, CommandKind::Sync)
        .expect("settings must resolve");
    let config = &settings.config;
    assert_eq!(config.registry, "https://file.example.test/");
    assert_eq!(config.hostname, "https://flag-host.example.test/");
    assert_eq!(config.root, PathBuf::from("/srv/mirror"));
    assert_eq!(config.concurrency, 32);
    assert_eq!(config.retry.attempts, 4);
    assert_eq!(config.retry.backoff, Duration::from_millis(50));
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.deadline, Some(Duration::from_secs(90)));
    assert!(config.keep_staging);
    assert_eq!(
        seed_entries(&settings),
        vec![
            ("@scope/pkg".to_string(), "1.2.3".to_string()),
            ("react".to_string(), "^18.0.0".to_string()),
        ]
    );
}

#[test]
fn defaults_apply_when_nothing_is_set() {
    let args = SyncArgs {
        hostname: Some("https://mirror.example.test/".to_string()),
        root: Some(PathBuf::from("mirror")),
        packages: vec!["left-pad".to_string()],
        ..SyncArgs::default()
    };

    let settings = resolve_settings(
        &FileConfig::default(),
        Path::new("."),
        &args,
        CommandKind::Sync,
    )
    .expect("settings must resolve");
    assert_eq!(settings.config.registry, regmirror_mirror::DEFAULT_REGISTRY);
    assert_eq!(settings.config.concurrency, 16);
    assert_eq!(settings.config.deadline, None);
    assert!(!settings.config.keep_staging);
    assert_eq!(
        seed_entries(&settings),
        vec![("left-pad".to_string(), "latest".to_string())]
    );
}

#[test]
fn sync_requires_hostname_and_root() {
    let args = SyncArgs {
        packages: vec!["left-pad".to_string()],
        ..SyncArgs::default()
    };
    let err = resolve_settings(&FileConfig::default(), Path::new("."), &args, CommandKind::Sync)
        .expect_err("hostname is required");
    assert!(err.to_string().contains("hostname"));

    let args = SyncArgs {
        hostname: Some("https://mirror.example.test/".to_string()),
        ..args
    };
    let err = resolve_settings(&FileConfig::default(), Path::new("."), &args, CommandKind::Sync)
        .expect_err("root is required");
    assert!(err.to_string().contains("root"));
}

#[test]
fn plan_needs_only_seeds() {
    let args = SyncArgs {
        packages: vec!["left-pad@^1.0.0".to_string()],
        ..SyncArgs::default()
    };
    let settings = resolve_settings(&FileConfig::default(), Path::new("."), &args, CommandKind::Plan)
        .expect("plan settings must resolve");
    assert_eq!(settings.config.hostname, "");

    let err = resolve_settings(
        &FileConfig::default(),
        Path::new("."),
        &SyncArgs::default(),
        CommandKind::Plan,
    )
    .expect_err("seeds are required");
    assert!(err.to_string().contains("no seed packages"));
}

#[test]
fn verify_needs_root_but_no_seeds() {
    let args = SyncArgs {
        root: Some(PathBuf::from("mirror")),
        ..SyncArgs::default()
    };
    let settings = resolve_settings(
        &FileConfig::default(),
        Path::new("."),
        &args,
        CommandKind::Verify,
    )
    .expect("verify settings must resolve");
    assert!(settings.seeds.is_empty());
}

#[test]
fn unreadable_manifest_names_the_path() {
    let root = test_root();
    let manifest = root.join("broken.json");
    fs::write(&manifest, "{ not json").expect("must write manifest");
    let args = SyncArgs {
        manifests: vec![manifest],
        ..SyncArgs::default()
    };

    let err = resolve_settings(&FileConfig::default(), Path::new("."), &args, CommandKind::Plan)
        .expect_err("broken manifest must fail");
    assert!(err.to_string().contains("broken.json"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn render_status_line_plain_is_bare_message() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "mirror updated"),
        "mirror updated"
    );
}

#[test]
fn render_status_line_rich_adds_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "mirror updated"),
        "[OK] mirror updated"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "report not written"),
        "[WARN] report not written"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "err", "run failed"),
        "[ERR] run failed"
    );
}

#[test]
fn verification_errors_expand_to_one_line_per_failure() {
    let err = MirrorError::Verification {
        failures: vec![
            VerificationFailure::MissingDistMetadata {
                package: "a".to_string(),
                version: "1.0.0".to_string(),
            },
            VerificationFailure::ChecksumMismatch {
                package: "b".to_string(),
                version: "2.0.0".to_string(),
                expected: "aa".to_string(),
                actual: "bb".to_string(),
            },
        ],
    };

    let lines = render::format_error_lines(&err);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "verification failed for 2 entries");
    assert!(lines[2].contains("b@2.0.0"));
    assert_eq!(render::format_error_lines(&MirrorError::Cancelled).len(), 1);
}

#[test]
fn cli_parses_sync_flags() {
    let cli = Cli::try_parse_from([
        "regmirror",
        "-v",
        "sync",
        "--hostname",
        "https://mirror.example.test/",
        "--root",
        "mirror",
        "--package",
        "left-pad@^1.0.0",
        "--package",
        "react",
        "--manifest",
        "package.json",
        "--deadline-secs",
        "120",
        "--keep-staging",
    ])
    .expect("sync flags must parse");

    assert!(cli.verbose);
    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    assert_eq!(args.packages, vec!["left-pad@^1.0.0", "react"]);
    assert_eq!(args.manifests, vec![PathBuf::from("package.json")]);
    assert_eq!(args.deadline_secs, Some(120));
    assert!(args.keep_staging);
}

#[test]
fn cli_parses_verify_and_global_config() {
    let cli = Cli::try_parse_from(["regmirror", "verify", "--root", "mirror", "--config", "r.toml"])
        .expect("verify flags must parse");
    assert_eq!(cli.config, Some(PathBuf::from("r.toml")));
    assert!(matches!(
        cli.command,
        Commands::Verify { root: Some(ref root) } if root == Path::new("mirror")
    ));
}

#[test]
fn cli_rejects_verbose_with_quiet() {
    assert!(Cli::try_parse_from(["regmirror", "-v", "-q", "plan", "--package", "a"]).is_err());
}

#[test]
fn locked_root_error_points_at_repair() {
    let err = MirrorError::RunLocked {
        path: PathBuf::from("/srv/mirror/.regmirror/active"),
        holder: "run-1-99999".to_string(),
    };

    let lines = render::format_error_lines(&err);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("run-1-99999"));
    assert!(lines[1].contains("regmirror repair"));
    assert!(lines[1].contains("--break-lock"));
}

#[test]
fn repair_lines_describe_what_was_cleared() {
    let lines = render::format_repair_lines(&RepairReport {
        stale_lock: Some("run-1-99999".to_string()),
        staging_removed: true,
    });
    assert_eq!(
        lines,
        vec![
            "removed stale run lock held by run-1-99999",
            "removed leftover staging trees"
        ]
    );
}

#[test]
fn cli_parses_repair_and_break_lock() {
    let cli = Cli::try_parse_from(["regmirror", "repair", "--root", "mirror"])
        .expect("repair flags must parse");
    assert!(matches!(
        cli.command,
        Commands::Repair { root: Some(ref root) } if root == Path::new("mirror")
    ));

    let cli = Cli::try_parse_from(["regmirror", "sync", "--package", "a", "--break-lock"])
        .expect("break-lock must parse");
    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    let settings = resolve_settings(
        &FileConfig {
            hostname: Some("https://mirror.example.test/".to_string()),
            root: Some(PathBuf::from("mirror")),
            ..FileConfig::default()
        },
        Path::new("."),
        &args,
        CommandKind::Sync,
    )
    .expect("settings must resolve");
    assert!(settings.config.break_lock);
}

#[test]
fn repair_needs_root_but_no_seeds() {
    let err = resolve_settings(
        &FileConfig::default(),
        Path::new("."),
        &SyncArgs::default(),
        CommandKind::Repair,
    )
    .expect_err("root is required");
    assert!(err.to_string().contains("root"));
}
