use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regmirror_mirror::{SyncConfig, SyncManager, SyncOutcome};
use regmirror_registry::HttpTransport;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{resolve_settings, CommandKind, FileConfig, Settings, SyncArgs};
use render::{
    current_output_style, format_audit_lines, format_error_lines, format_plan_lines,
    format_repair_lines, format_sync_lines, ProgressObserver, TerminalRenderer,
};

#[derive(Parser, Debug)]
#[command(name = "regmirror", version, about = "Mirror npm registry packages to a static tree")]
struct Cli {
    /// Config file (defaults to ./regmirror.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve, download, verify and commit the dependency closure
    Sync(SyncArgs),
    /// Print the dependency closure without touching the mirror
    Plan(SyncArgs),
    /// Re-check every published tarball against its index
    Verify {
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Remove the run lock and staging trees left by an interrupted run
    Repair {
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let renderer = TerminalRenderer::from_style(current_output_style());
    match run_cli(cli, renderer) {
        Ok(code) => code,
        Err(err) => {
            renderer.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_cli(cli: Cli, renderer: TerminalRenderer) -> Result<ExitCode> {
    let (file, base_dir) = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync(args) => {
            let Settings { config, seeds } =
                resolve_settings(&file, &base_dir, &args, CommandKind::Sync)?;
            let manager = build_manager(config, renderer)?;
            match manager.run(&seeds) {
                Ok(outcome) => {
                    print_sync_outcome(renderer, &outcome);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    for line in format_error_lines(&err) {
                        renderer.print_error(&line);
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Plan(args) => {
            let Settings { config, seeds } =
                resolve_settings(&file, &base_dir, &args, CommandKind::Plan)?;
            let manager = build_manager(config, renderer)?;
            let walk = manager.plan(&seeds).context("planning failed")?;
            renderer.print_section("plan");
            renderer.print_lines(&format_plan_lines(&walk));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { root } => {
            let args = SyncArgs {
                root,
                ..SyncArgs::default()
            };
            let settings = resolve_settings(&file, &base_dir, &args, CommandKind::Verify)?;
            let manager = build_manager(settings.config, renderer)?;
            let report = manager.audit().context("audit failed")?;
            renderer.print_section("verify");
            renderer.print_lines(&format_audit_lines(&report));
            if report.failures.is_empty() {
                renderer.print_status("ok", "mirror verified");
                Ok(ExitCode::SUCCESS)
            } else {
                renderer.print_status("err", "mirror has integrity failures");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Repair { root } => {
            let args = SyncArgs {
                root,
                ..SyncArgs::default()
            };
            let settings = resolve_settings(&file, &base_dir, &args, CommandKind::Repair)?;
            let manager = build_manager(settings.config, renderer)?;
            let report = manager.repair().context("repair failed")?;
            renderer.print_lines(&format_repair_lines(&report));
            renderer.print_status("ok", "mirror root is ready");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_manager(
    config: SyncConfig,
    renderer: TerminalRenderer,
) -> Result<SyncManager> {
    debug!(
        registry = %config.registry,
        hostname = %config.hostname,
        root = %config.root.display(),
        concurrency = config.concurrency,
        "resolved settings"
    );
    let transport =
        HttpTransport::new(config.timeout).context("failed to build HTTP transport")?;
    let manager = SyncManager::new(config, Arc::new(transport))?
        .with_observer(Arc::new(ProgressObserver::new(renderer.style())));
    Ok(manager)
}

fn print_sync_outcome(renderer: TerminalRenderer, outcome: &SyncOutcome) {
    renderer.print_section("sync");
    renderer.print_lines(&format_sync_lines(outcome));
    renderer.print_status("ok", "mirror updated");
}

#[cfg(test)]
mod tests;
