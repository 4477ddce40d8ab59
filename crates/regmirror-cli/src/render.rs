use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use regmirror_core::MirrorError;
use regmirror_mirror::{AuditReport, RepairReport, SyncObserver, SyncOutcome, SyncState};
use regmirror_resolver::{SkipRecord, WalkOutcome};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub fn style(self) -> OutputStyle {
        self.style
    }

    pub fn print_status(self, status: &str, message: &str) {
        let line = render_status_line(self.style, status, message);
        match (self.style, status_style(status)) {
            (OutputStyle::Rich, Some(style)) => {
                let (badge, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                println!("{} {rest}", colorize(style, badge));
            }
            _ => println!("{line}"),
        }
    }

    pub fn print_error(self, message: &str) {
        let line = render_status_line(self.style, "err", message);
        match self.style {
            OutputStyle::Plain => eprintln!("error: {line}"),
            OutputStyle::Rich => {
                let (badge, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                eprintln!("{} {rest}", colorize(error_style(), badge));
            }
        }
    }

    pub fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

/// Rich output prefixes a status badge; plain output is the bare message so
/// it stays grep-friendly.
pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "OK",
        "warn" => "WARN",
        "err" => "ERR",
        "skip" => "SKIP",
        _ => "..",
    }
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

pub fn format_sync_lines(outcome: &SyncOutcome) -> Vec<String> {
    let report = &outcome.report;
    let mut lines = vec![
        format!("run: {}", outcome.run_id),
        format!(
            "mirrored {} versions of {} packages ({} downloaded, {} reused)",
            HumanCount(report.versions as u64),
            HumanCount(report.packages as u64),
            HumanCount(report.downloaded as u64),
            HumanCount(report.reused as u64),
        ),
        format!(
            "committed {} files, digest {}",
            HumanCount(report.committed_files as u64),
            report.digest
        ),
    ];
    lines.extend(format_walk_notes(&outcome.walk));
    lines
}

pub fn format_plan_lines(walk: &WalkOutcome) -> Vec<String> {
    let mut lines = walk
        .graph
        .entries()
        .into_iter()
        .map(|entry| entry.to_string())
        .collect::<Vec<_>>();
    lines.push(format!(
        "{} versions of {} packages in {} rounds",
        HumanCount(walk.graph.version_count() as u64),
        HumanCount(walk.graph.package_count() as u64),
        walk.rounds
    ));
    lines.extend(format_walk_notes(walk));
    lines
}

fn format_walk_notes(walk: &WalkOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    for external in &walk.external {
        lines.push(format!("external: {external}"));
    }
    for skip in &walk.skipped {
        lines.push(format!("skipped: {skip}"));
    }
    lines
}

pub fn format_audit_lines(report: &AuditReport) -> Vec<String> {
    let mut lines = report
        .failures
        .iter()
        .map(|failure| format!("failed: {failure}"))
        .collect::<Vec<_>>();
    lines.push(format!(
        "checked {} versions, {} failures",
        HumanCount(report.checked as u64),
        report.failures.len()
    ));
    lines
}

/// Expands a run error into one line per underlying failure.
pub fn format_error_lines(err: &MirrorError) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    match err {
        MirrorError::Verification { failures } => {
            lines.extend(failures.iter().map(|failure| format!("  {failure}")));
        }
        MirrorError::RunLocked { .. } => lines.push(
            "  if no other run is active, run `regmirror repair` or pass --break-lock".to_string(),
        ),
        _ => {}
    }
    lines
}

pub fn format_repair_lines(report: &RepairReport) -> Vec<String> {
    vec![
        match &report.stale_lock {
            Some(holder) => format!("removed stale run lock held by {holder}"),
            None => "no run lock present".to_string(),
        },
        if report.staging_removed {
            "removed leftover staging trees".to_string()
        } else {
            "no staging trees present".to_string()
        },
    ]
}

/// Drives a spinner from sync state transitions. Plain output gets one line
/// per state on stderr instead.
pub struct ProgressObserver {
    style: OutputStyle,
    progress_bar: Mutex<Option<ProgressBar>>,
    started_at: Instant,
}

impl ProgressObserver {
    pub fn new(style: OutputStyle) -> Self {
        let style = if std::io::stderr().is_terminal() {
            style
        } else {
            OutputStyle::Plain
        };
        Self {
            style,
            progress_bar: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    fn start_spinner(&self) -> ProgressBar {
        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg:<12} {elapsed}")
        {
            progress_bar.set_style(style.tick_chars("|/-\\ "));
        }
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        progress_bar
    }
}

impl SyncObserver for ProgressObserver {
    fn state_changed(&self, state: SyncState) {
        if self.style == OutputStyle::Plain {
            if state != SyncState::Idle {
                eprintln!("{}", render_state_line(state, self.started_at.elapsed()));
            }
            return;
        }

        let Ok(mut slot) = self.progress_bar.lock() else {
            return;
        };
        if state.is_terminal() || state == SyncState::Idle {
            if let Some(progress_bar) = slot.take() {
                progress_bar.finish_and_clear();
            }
            return;
        }
        let progress_bar = slot.get_or_insert_with(|| self.start_spinner());
        progress_bar.set_message(state.as_str());
    }

    fn skipped(&self, record: &SkipRecord) {
        let line = render_status_line(self.style, "skip", &record.to_string());
        let Ok(slot) = self.progress_bar.lock() else {
            return;
        };
        match slot.as_ref() {
            Some(progress_bar) => progress_bar.println(colorize(skip_style(), &line)),
            None => eprintln!("{line}"),
        }
    }
}

fn render_state_line(state: SyncState, elapsed: Duration) -> String {
    format!("{:<12} {}", state.as_str(), format_elapsed(elapsed))
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn status_style(status: &str) -> Option<Style> {
    match status {
        "ok" => Some(
            Style::new()
                .fg_color(Some(AnsiColor::BrightGreen.into()))
                .effects(Effects::BOLD),
        ),
        "warn" | "skip" => Some(skip_style()),
        "err" => Some(error_style()),
        _ => None,
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn skip_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into()))
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
