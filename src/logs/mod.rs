//! One JSON log file per run, written after Reporting. The log is the full
//! `WorkflowRun`, so an auditor can reconstruct what was planned, what was
//! confirmed (or bypassed), what mutated, and where the backup lives.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;

use crate::core::WorkflowRun;

pub fn write_run_log(dir: &Path, run: &WorkflowRun) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = OffsetDateTime::now_utc().unix_timestamp_nanos();
    let file_name = format!("{}-{pid}-{ts}.json", run.command);
    let path = dir.join(file_name);

    let buf = serde_json::to_vec_pretty(run).context("failed to serialize run log (JSON)")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("failed to write run log: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::core::{OsInfo, RunState, RunStatus, StepOutcome, StepResult};

    fn make_temp_dir() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("vmsweep-log-test-{}-{seq}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn write_run_log_writes_parseable_json() {
        let dir = make_temp_dir();
        let run = WorkflowRun {
            schema_version: "1.0".to_string(),
            tool_version: "0.1.0".to_string(),
            os: OsInfo {
                name: "Windows".to_string(),
                version: "10.0".to_string(),
            },
            command: "clean-devices".to_string(),
            started_at: "2026-02-03T04:05:06Z".to_string(),
            finished_at: "2026-02-03T04:05:07Z".to_string(),
            dry_run: false,
            unattended: true,
            state: RunState::Done,
            status: RunStatus::CompletedWithErrors,
            backup: Some("20260203-040506".to_string()),
            reboot_required: true,
            planned: vec![],
            results: vec![StepResult {
                step: "clean-devices".to_string(),
                target: Some("PCI\\A".to_string()),
                outcome: StepOutcome::SuccessRebootRequired,
                detail: "restart pending".to_string(),
            }],
            notes: vec!["confirmation bypassed (--yes); run was unattended".to_string()],
        };

        let path = write_run_log(&dir, &run).expect("write log");
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("clean-devices-")),
            "path={path:?}"
        );

        let bytes = std::fs::read(&path).expect("read log");
        let v: serde_json::Value = serde_json::from_slice(&bytes).expect("parse json");
        assert_eq!(
            v.get("status").and_then(|s| s.as_str()),
            Some("COMPLETED_WITH_ERRORS")
        );
        assert_eq!(v.get("unattended").and_then(|b| b.as_bool()), Some(true));
        assert_eq!(
            v.get("backup").and_then(|s| s.as_str()),
            Some("20260203-040506")
        );
        assert_eq!(
            v.pointer("/results/0/outcome").and_then(|s| s.as_str()),
            Some("SUCCESS_REBOOT_REQUIRED")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
