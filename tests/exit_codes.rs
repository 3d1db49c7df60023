use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

fn vmsweep_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vmsweep"));
    cmd.env("HOME", home);
    cmd.env_remove("VMSWEEP_CONFIG");
    cmd.env_remove("VMSWEEP_DEVICE_PATTERNS");
    cmd.env_remove("VMSWEEP_DRIVER_PROVIDERS");
    cmd.env_remove("VMSWEEP_DRIVER_NAME_CONTAINS");
    cmd.env_remove("VMSWEEP_GUEST_TOOLS_PACKAGES");
    cmd.env_remove("VMSWEEP_BACKUP_DIR");
    cmd.env_remove("VMSWEEP_LOG_DIR");
    cmd.env_remove("VMSWEEP_CONFIRM_ROUNDS");
    cmd.env_remove("VMSWEEP_UI_COLOR");
    cmd.env_remove("VMSWEEP_UI_MAX_TABLE_ROWS");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    vmsweep_cmd(home).args(args).output().expect("run vmsweep")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!("vmsweep-exit-test-{}-{seq}", std::process::id()));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

#[test]
fn completion_unknown_shell_exits_1() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn completion_bash_succeeds() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "bash"]);
    assert!(out.status.success());
    assert!(!out.stdout.is_empty());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn mutating_command_without_tty_or_yes_exits_1() {
    let home = make_temp_home();
    let out = run(&home, &["flush-dns"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("TTY"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn restore_with_unknown_backup_exits_1() {
    let home = make_temp_home();
    let out = run(&home, &["restore", "--backup", "20990101-000000"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not found"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn restore_with_no_backups_exits_1() {
    let home = make_temp_home();
    let out = run(&home, &["restore"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no backups"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn backups_list_on_empty_store_succeeds() {
    let home = make_temp_home();
    let out = run(&home, &["backups", "list"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("no backups found"), "stdout={stdout}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn scan_succeeds_without_elevation() {
    let home = make_temp_home();
    let out = run(&home, &["--quiet", "scan"]);
    assert!(out.status.success());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn dry_run_succeeds_without_tty_or_elevation() {
    let home = make_temp_home();
    let out = run(&home, &["--dry-run", "--quiet", "flush-dns"]);
    assert!(out.status.success());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_config_file_exits_1() {
    let home = make_temp_home();
    let cfg_dir = home.join(".config/vmsweep");
    std::fs::create_dir_all(&cfg_dir).expect("config dir");
    std::fs::write(cfg_dir.join("config.toml"), "not [valid toml").expect("write config");
    let out = run(&home, &["scan"]);
    assert_eq!(out.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn dry_run_writes_a_run_log() {
    let home = make_temp_home();
    let out = run(&home, &["--dry-run", "--quiet", "flush-dns"]);
    assert!(out.status.success());
    let log_dir = home.join(".config/vmsweep/logs");
    let entries: Vec<_> = std::fs::read_dir(&log_dir)
        .expect("log dir exists")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1, "one log per run");
    assert!(
        entries[0]
            .file_name()
            .to_string_lossy()
            .starts_with("flush-dns-")
    );
    let _ = std::fs::remove_dir_all(&home);
}
