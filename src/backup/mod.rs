//! Durable, append-only snapshot storage. One directory per backup, named
//! from the capture time; handles are never overwritten. Loading separates
//! "not found" (a caller may fall back to an older handle) from "corrupt"
//! (the operator must be alerted).

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::{OsInfo, SystemSnapshot};

const SCHEMA_VERSION: &str = "1.0";
const MANIFEST_FILE: &str = "manifest.json";
pub const DRIVER_PAYLOAD_DIR: &str = "drivers";

const SECTIONS: [&str; 5] = [
    "devices.json",
    "drivers.json",
    "network.json",
    "packages.json",
    "disks.json",
];

#[derive(Debug)]
pub enum BackupError {
    NotFound(String),
    Corrupt { id: String, detail: String },
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::NotFound(id) => write!(f, "backup not found: {id}"),
            BackupError::Corrupt { id, detail } => {
                write!(f, "backup {id} is corrupt or unreadable: {detail}")
            }
        }
    }
}

impl std::error::Error for BackupError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    pub id: String,
    pub path: PathBuf,
}

impl BackupHandle {
    pub fn driver_payload_dir(&self) -> PathBuf {
        self.path.join(DRIVER_PAYLOAD_DIR)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    schema_version: String,
    tool_version: String,
    captured_at: String,
    os: OsInfo,
    partial: bool,
    section_errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(&self, snapshot: &SystemSnapshot) -> Result<BackupHandle> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!("failed to create backup directory: {}", self.root.display())
        })?;

        let handle = self.unique_handle()?;
        std::fs::create_dir(&handle.path).with_context(|| {
            format!("failed to create backup directory: {}", handle.path.display())
        })?;

        let manifest = Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            captured_at: snapshot.captured_at.clone(),
            os: snapshot.os.clone(),
            partial: snapshot.partial,
            section_errors: snapshot.section_errors.clone(),
        };
        write_json(&handle.path.join(MANIFEST_FILE), &manifest)?;
        write_json(&handle.path.join("devices.json"), &snapshot.devices)?;
        write_json(&handle.path.join("drivers.json"), &snapshot.drivers)?;
        write_json(&handle.path.join("network.json"), &snapshot.interfaces)?;
        write_json(&handle.path.join("packages.json"), &snapshot.packages)?;
        write_json(&handle.path.join("disks.json"), &snapshot.disks)?;

        Ok(handle)
    }

    pub fn handle(&self, id: &str) -> BackupHandle {
        BackupHandle {
            id: id.to_string(),
            path: self.root.join(id),
        }
    }

    pub fn list(&self) -> Result<Vec<BackupHandle>> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read backup directory: {}", self.root.display())
                });
            }
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if !entry.path().join(MANIFEST_FILE).exists() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            out.push(BackupHandle {
                path: self.root.join(&id),
                id,
            });
        }
        // Timestamp-derived names sort chronologically.
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    pub fn latest(&self) -> Result<Option<BackupHandle>> {
        Ok(self.list()?.into_iter().next_back())
    }

    pub fn load(&self, handle: &BackupHandle) -> std::result::Result<SystemSnapshot, BackupError> {
        if !handle.path.is_dir() {
            return Err(BackupError::NotFound(handle.id.clone()));
        }

        let manifest: Manifest = read_json(&handle.path.join(MANIFEST_FILE), &handle.id)?;
        let devices = read_json(&handle.path.join("devices.json"), &handle.id)?;
        let drivers = read_json(&handle.path.join("drivers.json"), &handle.id)?;
        let interfaces = read_json(&handle.path.join("network.json"), &handle.id)?;
        let packages = read_json(&handle.path.join("packages.json"), &handle.id)?;
        let disks = read_json(&handle.path.join("disks.json"), &handle.id)?;

        Ok(SystemSnapshot {
            captured_at: manifest.captured_at,
            os: manifest.os,
            devices,
            drivers,
            interfaces,
            packages,
            disks,
            partial: manifest.partial,
            section_errors: manifest.section_errors,
        })
    }

    /// Verifies every section is present and readable.
    pub fn verify(&self, handle: &BackupHandle) -> std::result::Result<(), BackupError> {
        self.load(handle).map(|_| ())
    }

    fn unique_handle(&self) -> Result<BackupHandle> {
        let fmt = format_description!("[year][month][day]-[hour][minute][second]");
        let base = OffsetDateTime::now_utc()
            .format(&fmt)
            .context("failed to format backup timestamp")?;

        let candidate = self.handle(&base);
        if !candidate.path.exists() {
            return Ok(candidate);
        }
        for i in 2..=1000u32 {
            let candidate = self.handle(&format!("{base}-{i}"));
            if !candidate.path.exists() {
                return Ok(candidate);
            }
        }
        anyhow::bail!("could not pick a unique backup name under {base}")
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let buf = serde_json::to_vec_pretty(value).context("failed to serialize backup section")?;
    std::fs::write(path, buf)
        .with_context(|| format!("failed to write backup file: {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    id: &str,
) -> std::result::Result<T, BackupError> {
    let bytes = std::fs::read(path).map_err(|err| BackupError::Corrupt {
        id: id.to_string(),
        detail: format!("{}: {err}", path.display()),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| BackupError::Corrupt {
        id: id.to_string(),
        detail: format!("{}: {err}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::core::{DeviceRecord, InterfaceRecord};

    fn make_temp_root(tag: &str) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let root =
            std::env::temp_dir().join(format!("vmsweep-backup-{tag}-{}-{seq}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        root
    }

    fn sample_snapshot() -> SystemSnapshot {
        SystemSnapshot {
            captured_at: "2026-02-03T04:05:06Z".to_string(),
            os: OsInfo {
                name: "Windows".to_string(),
                version: "10.0.20348".to_string(),
            },
            devices: vec![DeviceRecord {
                instance_id: "PCI\\VEN_15AD&DEV_07B0\\X".to_string(),
                class: "Net".to_string(),
                description: "vmxnet3 Ethernet Adapter".to_string(),
                present: false,
            }],
            drivers: vec![],
            interfaces: vec![InterfaceRecord {
                name: "Ethernet0".to_string(),
                mac: "00-50-56-9A-1B-2C".to_string(),
                dhcp: false,
                addresses: vec!["192.168.10.20/24".to_string()],
                gateway: Some("192.168.10.1".to_string()),
                dns: vec!["192.168.10.5".to_string()],
            }],
            packages: vec![],
            disks: vec![],
            partial: false,
            section_errors: vec![],
        }
    }

    #[test]
    fn save_then_load_round_trips_the_snapshot() {
        let root = make_temp_root("roundtrip");
        let store = BackupStore::new(&root);
        let snapshot = sample_snapshot();

        let handle = store.save(&snapshot).expect("save");
        let loaded = store.load(&handle).expect("load");
        assert_eq!(loaded, snapshot);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn save_never_overwrites_an_existing_handle() {
        let root = make_temp_root("unique");
        let store = BackupStore::new(&root);
        let snapshot = sample_snapshot();

        let first = store.save(&snapshot).expect("save 1");
        let second = store.save(&snapshot).expect("save 2");
        assert_ne!(first.id, second.id);
        assert!(first.path.is_dir());
        assert!(second.path.is_dir());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn latest_returns_most_recent_handle() {
        let root = make_temp_root("latest");
        let store = BackupStore::new(&root);
        assert!(store.latest().expect("latest on empty").is_none());

        let snapshot = sample_snapshot();
        let _ = store.save(&snapshot).expect("save 1");
        let second = store.save(&snapshot).expect("save 2");
        let latest = store.latest().expect("latest").expect("some");
        assert_eq!(latest.id, second.id);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn load_missing_handle_is_not_found() {
        let root = make_temp_root("missing");
        let store = BackupStore::new(&root);
        match store.load(&store.handle("20990101-000000")) {
            Err(BackupError::NotFound(id)) => assert_eq!(id, "20990101-000000"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn load_with_broken_section_is_corrupt_not_notfound() {
        let root = make_temp_root("corrupt");
        let store = BackupStore::new(&root);
        let handle = store.save(&sample_snapshot()).expect("save");
        std::fs::write(handle.path.join("network.json"), b"{ not json").expect("corrupt section");

        match store.load(&handle) {
            Err(BackupError::Corrupt { id, .. }) => assert_eq!(id, handle.id),
            other => panic!("expected Corrupt, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn list_ignores_stray_files_in_backup_root() {
        let root = make_temp_root("stray");
        let store = BackupStore::new(&root);
        let _ = store.save(&sample_snapshot()).expect("save");
        std::fs::write(root.join("README.txt"), b"not a backup").expect("stray file");
        std::fs::create_dir(root.join("no-manifest")).expect("stray dir");

        assert_eq!(store.list().expect("list").len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }
}
