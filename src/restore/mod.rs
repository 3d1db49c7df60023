//! Restores driver and (optionally) network state from a stored backup.
//! Interfaces map by MAC address first and name second; anything unmapped is
//! reported and left alone. The restore never creates an adapter.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use walkdir::WalkDir;

use crate::backup::{BackupHandle, BackupStore};
use crate::core::{
    InterfaceRecord, PlannedAction, PlannedActionKind, RunState, RunStatus, StepOutcome,
    StepResult, SystemSnapshot, WorkflowRun,
};
use crate::executor;
use crate::gate::{Confirm, Confirmation};
use crate::system::SystemInterface;

const SCHEMA_VERSION: &str = "1.0";
const DRIVERS_STEP: &str = "restore-drivers";
const NETWORK_STEP: &str = "restore-network";

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub include_network: bool,
    pub dry_run: bool,
    pub destructive_rounds: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceMapping {
    /// Matched a live interface (by MAC, or by name as fallback).
    Mapped { desired: InterfaceRecord, live_name: String },
    Unmapped { desired: InterfaceRecord },
}

/// Maps each snapshot interface onto at most one live interface. Every live
/// interface is claimed once; two snapshot records never restore onto the
/// same adapter.
pub fn map_interfaces(
    snapshot: &[InterfaceRecord],
    live: &[InterfaceRecord],
) -> Vec<InterfaceMapping> {
    let mut claimed = BTreeSet::new();
    let mut out = Vec::new();

    for desired in snapshot {
        let mac = desired.normalized_mac();
        let by_mac = if mac.is_empty() {
            None
        } else {
            live.iter()
                .find(|l| !claimed.contains(&l.name) && l.normalized_mac() == mac)
        };
        let matched = by_mac.or_else(|| {
            live.iter()
                .find(|l| !claimed.contains(&l.name) && l.name == desired.name)
        });

        match matched {
            Some(live_iface) => {
                claimed.insert(live_iface.name.clone());
                out.push(InterfaceMapping::Mapped {
                    desired: desired.clone(),
                    live_name: live_iface.name.clone(),
                });
            }
            None => out.push(InterfaceMapping::Unmapped {
                desired: desired.clone(),
            }),
        }
    }
    out
}

/// Enumerates exported driver payloads (inf files) under the backup's
/// `drivers/` directory.
pub fn driver_payloads(payload_dir: &Path) -> Vec<String> {
    if !payload_dir.is_dir() {
        return vec![];
    }
    let mut out: Vec<String> = WalkDir::new(payload_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("inf"))
        })
        .map(|entry| entry.path().display().to_string())
        .collect();
    out.sort();
    out
}

pub struct RestoreEngine<'a> {
    pub system: &'a mut dyn SystemInterface,
    pub gate: &'a mut dyn Confirm,
    pub backups: &'a BackupStore,
    pub opts: RestoreOptions,
}

impl RestoreEngine<'_> {
    pub fn restore(&mut self, handle: &BackupHandle) -> Result<WorkflowRun> {
        let started_at = now_rfc3339();
        let mut notes = Vec::new();

        let snapshot = self.backups.load(handle).map_err(anyhow::Error::from)?;
        notes.push(format!("restoring from backup {}", handle.id));
        if snapshot.partial {
            notes.push(
                "the backup snapshot was captured partially; restore covers what it holds"
                    .to_string(),
            );
        }

        let infs = driver_payloads(&handle.driver_payload_dir());
        if infs.is_empty() {
            notes.push("backup contains no exported driver payload; driver restore is a no-op".to_string());
        }

        let live = if self.opts.include_network {
            self.system.list_interfaces().unwrap_or_default()
        } else {
            vec![]
        };
        let mappings = if self.opts.include_network {
            map_interfaces(&snapshot.interfaces, &live)
        } else {
            vec![]
        };

        let mut planned = Vec::new();
        for inf in &infs {
            planned.push(PlannedAction {
                step_id: DRIVERS_STEP.to_string(),
                kind: PlannedActionKind::ImportDriverPackage {
                    inf_path: inf.clone(),
                },
            });
        }
        for mapping in &mappings {
            if let InterfaceMapping::Mapped { desired, live_name } = mapping {
                planned.push(PlannedAction {
                    step_id: NETWORK_STEP.to_string(),
                    kind: PlannedActionKind::ApplyInterfaceConfig {
                        name: desired.name.clone(),
                        mac: desired.mac.clone(),
                        live_name: live_name.clone(),
                    },
                });
            }
        }

        if planned.is_empty() && mappings.is_empty() {
            notes.push("nothing to restore".to_string());
            return Ok(self.finish(
                started_at,
                &snapshot,
                RunState::Done,
                RunStatus::NothingToDo,
                false,
                handle,
                vec![],
                vec![],
                notes,
            ));
        }

        if self.opts.dry_run {
            notes.push("dry-run: no changes were made".to_string());
            return Ok(self.finish(
                started_at,
                &snapshot,
                RunState::Done,
                RunStatus::Completed,
                false,
                handle,
                planned,
                vec![],
                notes,
            ));
        }

        // Network reapplication is the risky half; it gets the destructive
        // confirmation treatment.
        let rounds = if self.opts.include_network {
            self.opts.destructive_rounds
        } else {
            1
        };
        let question = confirmation_question(&planned);
        let mut unattended = false;
        match self.gate.confirm(&question, rounds)? {
            Confirmation::Denied => {
                notes.push("aborted by operator; no changes were made".to_string());
                return Ok(self.finish(
                    started_at,
                    &snapshot,
                    RunState::Aborted,
                    RunStatus::Aborted,
                    false,
                    handle,
                    vec![],
                    vec![],
                    notes,
                ));
            }
            Confirmation::GrantedUnattended => {
                unattended = true;
                notes.push("confirmation bypassed (--yes); run was unattended".to_string());
            }
            Confirmation::Granted => {}
        }

        let mut results = Vec::new();
        for inf in &infs {
            let action = PlannedAction {
                step_id: DRIVERS_STEP.to_string(),
                kind: PlannedActionKind::ImportDriverPackage {
                    inf_path: inf.clone(),
                },
            };
            results.push(executor::run_action(&action, self.system));
        }
        for mapping in &mappings {
            match mapping {
                InterfaceMapping::Mapped { desired, live_name } => {
                    results.push(executor::apply_interface(
                        NETWORK_STEP,
                        desired,
                        live_name,
                        self.system,
                    ));
                }
                InterfaceMapping::Unmapped { desired } => {
                    results.push(StepResult {
                        step: NETWORK_STEP.to_string(),
                        target: Some(desired.name.clone()),
                        outcome: StepOutcome::Skipped,
                        detail: format!(
                            "no live interface matches MAC {} or name '{}'; left untouched",
                            desired.mac, desired.name
                        ),
                    });
                }
            }
        }

        let unmapped = mappings
            .iter()
            .filter(|m| matches!(m, InterfaceMapping::Unmapped { .. }))
            .count();
        if unmapped > 0 {
            notes.push(format!(
                "{unmapped} interface(s) had no live match and need manual follow-up"
            ));
        }

        let status = if results.iter().any(|r| r.outcome == StepOutcome::Failed) {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        Ok(self.finish(
            started_at,
            &snapshot,
            RunState::Done,
            status,
            unattended,
            handle,
            vec![],
            results,
            notes,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        started_at: String,
        snapshot: &SystemSnapshot,
        state: RunState,
        status: RunStatus,
        unattended: bool,
        handle: &BackupHandle,
        planned: Vec<PlannedAction>,
        results: Vec<StepResult>,
        mut notes: Vec<String>,
    ) -> WorkflowRun {
        let reboot_required = results
            .iter()
            .any(|r| r.outcome == StepOutcome::SuccessRebootRequired);
        if reboot_required {
            notes.push("a restart is required for some changes to take effect".to_string());
        }
        notes.sort();
        notes.dedup();

        WorkflowRun {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            os: snapshot.os.clone(),
            command: "restore".to_string(),
            started_at,
            finished_at: now_rfc3339(),
            dry_run: self.opts.dry_run,
            unattended,
            state,
            status,
            backup: Some(handle.id.clone()),
            reboot_required,
            planned,
            results,
            notes,
        }
    }
}

fn confirmation_question(planned: &[PlannedAction]) -> String {
    use std::fmt::Write as _;

    let mut q = String::from("The following restore actions will be performed:\n");
    for action in planned {
        let _ = writeln!(q, "  - [{}] {}", action.step_id, action.describe());
    }
    q.push_str("Proceed?");
    q
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
