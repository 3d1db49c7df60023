use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;

use crate::backup::BackupStore;
use crate::core::WorkflowRun;
use crate::gate::{AssumeYesGate, Confirm, StdinGate};
use crate::restore::{RestoreEngine, RestoreOptions};
use crate::sequencer::{Sequencer, SequencerOptions};
use crate::steps::{self, Matcher};
use crate::system::LiveSystem;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "vmsweep",
    version,
    about = "Clean up a VM after leaving VMware: remove ghost devices, stale guest drivers and tools, and repair network state, with backup and restore"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Where backup snapshots are stored.
    #[arg(long, global = true)]
    pub backup_dir: Option<PathBuf>,
    /// Where per-run JSON logs are written.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout: u64,
    /// Report what would be done; mutate nothing, take no backup.
    #[arg(long, global = true)]
    pub dry_run: bool,
    /// Bypass confirmation prompts (headless/unattended).
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture and report the current inventory without changing anything.
    Scan(ScanArgs),
    /// Remove non-present devices left over from the old hypervisor.
    CleanDevices,
    /// Delete stale guest driver packages from the driver store.
    CleanDrivers,
    /// Silently uninstall leftover guest tools.
    UninstallTools,
    /// Flush the DNS resolver cache.
    FlushDns,
    /// Reset the network stack (requires a reboot).
    ResetNetwork,
    /// Bring offline data disks online and clear read-only flags.
    RelabelDisks,
    /// Run the full cleanup runbook (devices, drivers, tools, DNS).
    Clean,
    /// Manage stored backups.
    Backups(BackupsArgs),
    /// Restore driver and (optionally) network state from a backup.
    Restore(RestoreArgs),
    /// Emit a shell completion script.
    Completion(CompletionArgs),
    /// Show the effective configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {}

#[derive(Debug, Args)]
pub struct BackupsArgs {
    #[command(subcommand)]
    pub command: BackupsCommand,
}

#[derive(Debug, Subcommand)]
pub enum BackupsCommand {
    List,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Backup id to restore from; defaults to the most recent one.
    #[arg(long)]
    pub backup: Option<String>,
    /// Also reapply per-interface network settings (higher risk).
    #[arg(long)]
    pub with_network: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<i32> {
    // Usage errors share the precondition exit code; --help/--version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            return Ok(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("VMSWEEP_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::precondition_err)?;

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;
    let ui_cfg = UiConfig {
        color,
        stdin_is_tty,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout = Duration::from_secs(cli.timeout);
    let backup_dir = cli
        .backup_dir
        .clone()
        .or_else(|| cfg.backup.dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| crate::config::default_backup_dir(&home_dir));
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| cfg.logs.dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| crate::config::default_log_dir(&home_dir));

    match &cli.command {
        Commands::Scan(_args) => {
            let system = LiveSystem::new(timeout);
            let spinner = scan_spinner(&ui_cfg, cli.json);
            let snapshot = crate::probe::capture(&system, &cfg.matching.guest_tools_packages);
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            if cli.json {
                write_json(&snapshot)?;
            } else {
                crate::ui::print_snapshot_summary(&snapshot, &ui_cfg);
            }
            Ok(0)
        }
        Commands::Backups(args) => match args.command {
            BackupsCommand::List => {
                let store = BackupStore::new(&backup_dir);
                let handles = store.list()?;
                if cli.json {
                    let entries: Vec<serde_json::Value> = handles
                        .iter()
                        .map(|h| {
                            serde_json::json!({
                                "id": h.id,
                                "path": h.path.display().to_string(),
                            })
                        })
                        .collect();
                    write_json(&entries)?;
                } else {
                    let entries: Vec<(String, String)> = handles
                        .into_iter()
                        .map(|h| (h.id, h.path.display().to_string()))
                        .collect();
                    crate::ui::print_backup_list(&entries, &ui_cfg);
                }
                Ok(0)
            }
        },
        Commands::Restore(args) => {
            let store = BackupStore::new(&backup_dir);
            let handle = match &args.backup {
                Some(id) => store.handle(id),
                None => store
                    .latest()?
                    .ok_or_else(|| {
                        crate::exit::precondition(format!(
                            "no backups found under {}",
                            store.root().display()
                        ))
                    })?,
            };
            // A missing or corrupt backup is a precondition failure; the
            // operator must pick another handle before anything mutates.
            store
                .verify(&handle)
                .map_err(|err| crate::exit::precondition_err(err.into()))?;

            ensure_mutation_allowed(&cli, &ui_cfg, timeout)?;

            let mut system = LiveSystem::new(timeout);
            let mut gate = make_gate(&cli);
            let mut engine = RestoreEngine {
                system: &mut system,
                gate: gate.as_mut(),
                backups: &store,
                opts: RestoreOptions {
                    include_network: args.with_network,
                    dry_run: cli.dry_run,
                    destructive_rounds: cfg.confirm.destructive_rounds,
                },
            };
            let run = engine.restore(&handle)?;
            finish_run(run, &cli, &ui_cfg, &log_dir)
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "vmsweep", &mut out);
            Ok(0)
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `vmsweep config --show`");
            }
            Ok(0)
        }
        Commands::CleanDevices => run_steps(
            "clean-devices",
            vec![steps::clean_devices_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::CleanDrivers => run_steps(
            "clean-drivers",
            vec![steps::clean_drivers_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::UninstallTools => run_steps(
            "uninstall-tools",
            vec![steps::uninstall_tools_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::FlushDns => run_steps(
            "flush-dns",
            vec![steps::flush_dns_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::ResetNetwork => run_steps(
            "reset-network",
            vec![steps::reset_network_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::RelabelDisks => run_steps(
            "relabel-disks",
            vec![steps::relabel_disks_step()],
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
        Commands::Clean => run_steps(
            "clean",
            steps::clean_steps(),
            &cli,
            &cfg,
            &ui_cfg,
            timeout,
            &backup_dir,
            &log_dir,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_steps(
    command: &str,
    step_list: Vec<crate::core::Step>,
    cli: &Cli,
    cfg: &crate::config::EffectiveConfig,
    ui_cfg: &UiConfig,
    timeout: Duration,
    backup_dir: &Path,
    log_dir: &Path,
) -> Result<i32> {
    ensure_mutation_allowed(cli, ui_cfg, timeout)?;

    let matcher =
        Matcher::from_config(&cfg.matching).map_err(crate::exit::precondition_err)?;
    let store = BackupStore::new(backup_dir);
    let mut system = LiveSystem::new(timeout);
    let mut gate = make_gate(cli);

    let mut sequencer = Sequencer {
        system: &mut system,
        gate: gate.as_mut(),
        backups: &store,
        matcher: &matcher,
        guest_tools: &cfg.matching.guest_tools_packages,
        opts: SequencerOptions {
            command: command.to_string(),
            dry_run: cli.dry_run,
            destructive_rounds: cfg.confirm.destructive_rounds,
            show_progress: ui_cfg.stderr_is_tty && !cli.quiet && !cli.json,
        },
    };
    let run = sequencer.run(&step_list)?;
    finish_run(run, cli, ui_cfg, log_dir)
}

fn finish_run(run: WorkflowRun, cli: &Cli, ui_cfg: &UiConfig, log_dir: &Path) -> Result<i32> {
    let log_path = crate::logs::write_run_log(log_dir, &run)?;

    if cli.json {
        write_json(&run)?;
    } else {
        crate::ui::print_run(&run, ui_cfg);
        if !ui_cfg.quiet {
            println!("log: {}", log_path.display());
        }
    }
    Ok(run.exit_code())
}

/// Preconditions for anything that mutates: a confirmation channel (TTY or
/// `--yes`) and elevation. Dry runs mutate nothing and skip both.
fn ensure_mutation_allowed(cli: &Cli, ui_cfg: &UiConfig, timeout: Duration) -> Result<()> {
    if cli.dry_run {
        return Ok(());
    }
    if !cli.yes && !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
        return Err(crate::exit::precondition(
            "confirmation requires a TTY (stdin and stdout); pass --yes for unattended runs",
        ));
    }
    if !crate::platform::is_elevated(timeout) {
        return Err(crate::exit::precondition(
            "administrative privileges are required for this command",
        ));
    }
    Ok(())
}

fn make_gate(cli: &Cli) -> Box<dyn Confirm> {
    if cli.yes {
        Box::new(AssumeYesGate)
    } else {
        Box::new(StdinGate)
    }
}

fn scan_spinner(ui_cfg: &UiConfig, json: bool) -> Option<indicatif::ProgressBar> {
    if !ui_cfg.stderr_is_tty || ui_cfg.quiet || json {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message("capturing system inventory...");
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::precondition(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}
