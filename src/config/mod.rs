use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    #[serde(rename = "match")]
    pub matching: MatchConfig,
    pub backup: BackupConfig,
    pub logs: LogsConfig,
    pub confirm: ConfirmConfig,
    pub ui: UiConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

/// The device/driver matching heuristics are data, not code: VMware's
/// driver-naming conventions change, and operators extend these lists.
#[derive(Debug, Clone, Serialize)]
pub struct MatchConfig {
    pub device_patterns: Vec<String>,
    pub driver_providers: Vec<String>,
    pub driver_name_contains: Vec<String>,
    pub guest_tools_packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmConfig {
    /// Confirmation rounds for destructive runs (1 or 2).
    pub destructive_rounds: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig {
                device_patterns: vec![
                    "*vmware*".to_string(),
                    "*vmxnet*".to_string(),
                    "*pvscsi*".to_string(),
                    "*vmci*".to_string(),
                ],
                driver_providers: vec!["VMware, Inc.".to_string(), "VMware".to_string()],
                driver_name_contains: vec![
                    "vmxnet".to_string(),
                    "pvscsi".to_string(),
                    "vmci".to_string(),
                    "vsock".to_string(),
                    "svga".to_string(),
                    "vmmouse".to_string(),
                    "vmusb".to_string(),
                    "vmhgfs".to_string(),
                ],
                guest_tools_packages: vec![
                    "VMware Tools".to_string(),
                    "open-vm-tools".to_string(),
                ],
            },
            backup: BackupConfig { dir: None },
            logs: LogsConfig { dir: None },
            confirm: ConfirmConfig {
                destructive_rounds: 2,
            },
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "match")]
    matching: Option<RawMatchConfig>,
    backup: Option<RawBackupConfig>,
    logs: Option<RawLogsConfig>,
    confirm: Option<RawConfirmConfig>,
    ui: Option<RawUiConfig>,
}

#[derive(Debug, Deserialize)]
struct RawMatchConfig {
    device_patterns: Option<Vec<String>>,
    driver_providers: Option<Vec<String>>,
    driver_name_contains: Option<Vec<String>>,
    guest_tools_packages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawBackupConfig {
    dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLogsConfig {
    dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfirmConfig {
    destructive_rounds: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/vmsweep/config.toml")
}

pub fn default_backup_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/vmsweep/backups")
}

pub fn default_log_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/vmsweep/logs")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s).context("failed to parse config file (TOML)")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(matching) = raw.matching {
        if let Some(device_patterns) = matching.device_patterns {
            cfg.matching.device_patterns = device_patterns;
        }
        if let Some(driver_providers) = matching.driver_providers {
            cfg.matching.driver_providers = driver_providers;
        }
        if let Some(driver_name_contains) = matching.driver_name_contains {
            cfg.matching.driver_name_contains = driver_name_contains;
        }
        if let Some(guest_tools_packages) = matching.guest_tools_packages {
            cfg.matching.guest_tools_packages = guest_tools_packages;
        }
    }

    if let Some(backup) = raw.backup {
        if let Some(dir) = backup.dir {
            cfg.backup.dir = Some(dir);
        }
    }

    if let Some(logs) = raw.logs {
        if let Some(dir) = logs.dir {
            cfg.logs.dir = Some(dir);
        }
    }

    if let Some(confirm) = raw.confirm {
        if let Some(rounds) = confirm.destructive_rounds {
            cfg.confirm.destructive_rounds = rounds;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("VMSWEEP_DEVICE_PATTERNS") {
        if let Some(parts) = parse_list(&v) {
            cfg.matching.device_patterns = parts;
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_DRIVER_PROVIDERS") {
        if let Some(parts) = parse_list(&v) {
            cfg.matching.driver_providers = parts;
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_DRIVER_NAME_CONTAINS") {
        if let Some(parts) = parse_list(&v) {
            cfg.matching.driver_name_contains = parts;
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_GUEST_TOOLS_PACKAGES") {
        if let Some(parts) = parse_list(&v) {
            cfg.matching.guest_tools_packages = parts;
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_BACKUP_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.backup.dir = Some(v.to_string());
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_LOG_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.logs.dir = Some(v.to_string());
        }
    }
    if let Ok(v) = std::env::var("VMSWEEP_CONFIRM_ROUNDS") {
        cfg.confirm.destructive_rounds = v
            .trim()
            .parse::<u8>()
            .with_context(|| "VMSWEEP_CONFIRM_ROUNDS")?;
    }
    if let Ok(v) = std::env::var("VMSWEEP_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "VMSWEEP_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("VMSWEEP_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "VMSWEEP_UI_MAX_TABLE_ROWS")?;
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if !(1..=2).contains(&cfg.confirm.destructive_rounds) {
        anyhow::bail!(
            "confirm.destructive_rounds must be 1 or 2 (got {})",
            cfg.confirm.destructive_rounds
        );
    }
    Ok(())
}

fn parse_list(s: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if parts.is_empty() { None } else { Some(parts) }
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}
