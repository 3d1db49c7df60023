use std::io::{self, Write};

use anyhow::Error;
use unicode_width::UnicodeWidthStr;

use crate::core::{StepOutcome, SystemSnapshot, WorkflowRun};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - re-run with `--verbose` for more detail");
    let _ = writeln!(stderr, "  - see `vmsweep --help` for commands and options");
}

pub fn print_snapshot_summary(snapshot: &SystemSnapshot, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let ghosts = snapshot.ghost_devices().count();
    let _ = writeln!(
        out,
        "inventory: devices={} (non-present={ghosts})  drivers={}  interfaces={}  guest-tools={}  disks={}",
        snapshot.devices.len(),
        snapshot.drivers.len(),
        snapshot.interfaces.len(),
        snapshot.packages.len(),
        snapshot.disks.len(),
    );
    if snapshot.partial {
        let _ = writeln!(out, "- capture was partial:");
        for err in &snapshot.section_errors {
            let _ = writeln!(out, "  - {err}");
        }
    }

    if cfg.verbose {
        for device in snapshot.ghost_devices() {
            let _ = writeln!(
                out,
                "- ghost device: {} ({})",
                device.instance_id, device.description
            );
        }
        for driver in &snapshot.drivers {
            let _ = writeln!(
                out,
                "- driver: {} ({}, {})",
                driver.published_name, driver.original_name, driver.provider
            );
        }
        for iface in &snapshot.interfaces {
            let _ = writeln!(
                out,
                "- interface: {} mac={} dhcp={} addrs={:?}",
                iface.name, iface.mac, iface.dhcp, iface.addresses
            );
        }
        for pkg in &snapshot.packages {
            let _ = writeln!(out, "- guest tools: {} {}", pkg.name, pkg.version);
        }
    }
}

/// The end-of-run summary: one line per outcome plus status, backup
/// location, and notes. Printed for every run, aborted ones included, so the
/// operator always knows what changed and where the undo path is.
pub fn print_run(run: &WorkflowRun, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();

    let status = paint(status_color(run), run.status.as_str(), cfg.color);
    let _ = writeln!(out, "{}: {status}", run.command);

    if !run.planned.is_empty() {
        let _ = writeln!(out, "would perform ({}):", run.planned.len());
        for action in &run.planned {
            let _ = writeln!(out, "  - {}", action.describe());
        }
    }

    if !run.results.is_empty() {
        let step_width = run
            .results
            .iter()
            .map(|r| r.step.width())
            .max()
            .unwrap_or(0);
        let target_width = run
            .results
            .iter()
            .map(|r| r.target.as_deref().unwrap_or("-").width())
            .max()
            .unwrap_or(1);

        let rows = cfg.max_table_rows.max(1);
        for result in run.results.iter().take(rows) {
            let outcome = paint(outcome_color(result.outcome), result.outcome.as_str(), cfg.color);
            let _ = writeln!(
                out,
                "  {}  {}  {outcome}  {}",
                pad(&result.step, step_width),
                pad(result.target.as_deref().unwrap_or("-"), target_width),
                first_line(&result.detail),
            );
        }
        if run.results.len() > rows {
            let omitted = run.results.len() - rows;
            let _ = writeln!(out, "  ... ({omitted} more, see the run log)");
        }
    }

    if let Some(backup) = &run.backup {
        let _ = writeln!(out, "backup: {backup}");
    }
    for note in &run.notes {
        let _ = writeln!(out, "- {note}");
    }
    if cfg.verbose {
        for result in &run.results {
            if result.outcome == StepOutcome::Failed {
                let _ = writeln!(out, "failure detail [{}]:", result.step);
                let _ = writeln!(out, "  {}", result.detail);
            }
        }
    }
}

pub fn print_backup_list(entries: &[(String, String)], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    if entries.is_empty() {
        let _ = writeln!(out, "no backups found");
        return;
    }
    let id_width = entries.iter().map(|(id, _)| id.width()).max().unwrap_or(0);
    for (id, path) in entries {
        let _ = writeln!(out, "{}  {path}", pad(id, id_width));
    }
}

fn pad(s: &str, width: usize) -> String {
    let w = s.width();
    let mut out = String::from(s);
    for _ in w..width {
        out.push(' ');
    }
    out
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn status_color(run: &WorkflowRun) -> &'static str {
    match run.exit_code() {
        0 => "32",
        2 => "31",
        _ => "33",
    }
}

fn outcome_color(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Success => "32",
        StepOutcome::SuccessRebootRequired => "33",
        StepOutcome::Skipped => "90",
        StepOutcome::Failed => "31",
    }
}

fn paint(code: &str, s: &str, enabled: bool) -> String {
    if !enabled {
        return s.to_string();
    }
    format!("\x1b[{code}m{s}\x1b[0m")
}
