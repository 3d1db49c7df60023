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

fn make_temp_home(tag: &str) -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home =
        std::env::temp_dir().join(format!("vmsweep-env-{tag}-{}-{seq}", std::process::id()));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn config_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("config --show --json output")
}

#[test]
fn defaults_apply_without_config_or_env() {
    let home = make_temp_home("defaults");
    let out = vmsweep_cmd(&home)
        .args(["--json", "config", "--show"])
        .output()
        .expect("run vmsweep");
    let v = config_json(&out);
    let patterns = v
        .pointer("/match/device_patterns")
        .and_then(|p| p.as_array())
        .expect("device_patterns");
    assert!(patterns.iter().any(|p| p.as_str() == Some("*vmxnet*")));
    assert_eq!(
        v.pointer("/confirm/destructive_rounds").and_then(|n| n.as_u64()),
        Some(2)
    );
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_file_overrides_defaults() {
    let home = make_temp_home("file");
    let cfg_dir = home.join(".config/vmsweep");
    std::fs::create_dir_all(&cfg_dir).expect("config dir");
    std::fs::write(
        cfg_dir.join("config.toml"),
        r#"
[match]
device_patterns = ["*custom-nic*"]

[confirm]
destructive_rounds = 1
"#,
    )
    .expect("write config");

    let out = vmsweep_cmd(&home)
        .args(["--json", "config", "--show"])
        .output()
        .expect("run vmsweep");
    let v = config_json(&out);
    assert_eq!(
        v.pointer("/match/device_patterns/0").and_then(|p| p.as_str()),
        Some("*custom-nic*")
    );
    assert_eq!(
        v.pointer("/confirm/destructive_rounds").and_then(|n| n.as_u64()),
        Some(1)
    );
    // Sections the file does not mention keep their defaults.
    let providers = v
        .pointer("/match/driver_providers")
        .and_then(|p| p.as_array())
        .expect("driver_providers");
    assert!(!providers.is_empty());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_overrides_beat_the_config_file() {
    let home = make_temp_home("env");
    let cfg_dir = home.join(".config/vmsweep");
    std::fs::create_dir_all(&cfg_dir).expect("config dir");
    std::fs::write(
        cfg_dir.join("config.toml"),
        "[match]\ndevice_patterns = [\"*from-file*\"]\n",
    )
    .expect("write config");

    let out = vmsweep_cmd(&home)
        .env("VMSWEEP_DEVICE_PATTERNS", "*from-env*,*second*")
        .args(["--json", "config", "--show"])
        .output()
        .expect("run vmsweep");
    let v = config_json(&out);
    let patterns = v
        .pointer("/match/device_patterns")
        .and_then(|p| p.as_array())
        .expect("device_patterns");
    let values: Vec<&str> = patterns.iter().filter_map(|p| p.as_str()).collect();
    assert_eq!(values, vec!["*from-env*", "*second*"]);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_confirm_rounds_env_exits_1() {
    let home = make_temp_home("rounds");
    let out = vmsweep_cmd(&home)
        .env("VMSWEEP_CONFIRM_ROUNDS", "5")
        .args(["config", "--show"])
        .output()
        .expect("run vmsweep");
    assert_eq!(out.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn backup_dir_env_redirects_the_store() {
    let home = make_temp_home("backupdir");
    let alt = home.join("alt-backups");
    std::fs::create_dir_all(&alt).expect("alt dir");
    let out = vmsweep_cmd(&home)
        .env("VMSWEEP_BACKUP_DIR", &alt)
        .args(["restore"])
        .output()
        .expect("run vmsweep");
    // Empty alternate store: no backups to restore from.
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("alt-backups"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}
