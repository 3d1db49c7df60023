//! The workflow state machine: Init -> Scanning -> AwaitingConfirmation ->
//! BackingUp -> Executing -> Reporting -> Done, with Aborted reachable from
//! the confirmation and backup phases. Destructive steps never execute
//! without a successful snapshot save for the run; dry runs mutate nothing
//! and take no backup.

use anyhow::{Result, anyhow};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::backup::BackupStore;
use crate::core::{
    PlannedAction, PlannedActionKind, RunState, RunStatus, Step, StepOutcome, StepResult,
    WorkflowRun,
};
use crate::executor;
use crate::gate::{Confirm, Confirmation};
use crate::probe;
use crate::steps::Matcher;
use crate::system::{SystemInterface, UtilityOutcome};
use crate::{exit, steps};

const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub command: String,
    pub dry_run: bool,
    pub destructive_rounds: u8,
    pub show_progress: bool,
}

pub struct Sequencer<'a> {
    pub system: &'a mut dyn SystemInterface,
    pub gate: &'a mut dyn Confirm,
    pub backups: &'a BackupStore,
    pub matcher: &'a Matcher,
    pub guest_tools: &'a [String],
    pub opts: SequencerOptions,
}

impl Sequencer<'_> {
    pub fn run(&mut self, steps: &[Step]) -> Result<WorkflowRun> {
        let started_at = now_rfc3339();
        let mut notes = Vec::new();

        // Init -> Scanning
        let spinner = self.spinner();
        let snapshot = probe::capture(self.system, self.guest_tools);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        if snapshot.partial {
            notes.push("inventory capture was partial; results may be incomplete".to_string());
            for err in &snapshot.section_errors {
                notes.push(format!("capture: {err}"));
            }
        }

        let plans: Vec<(Step, Vec<PlannedAction>)> = steps
            .iter()
            .map(|step| (step.clone(), steps::plan(step, &snapshot, self.matcher)))
            .collect();
        let planned_total: usize = plans.iter().map(|(_, p)| p.len()).sum();

        // Scanning -> Reporting -> Done: nothing applicable, so no backup
        // and no confirmation noise.
        if planned_total == 0 {
            notes.push("no applicable cleanup steps; nothing to do".to_string());
            return Ok(self.finish(
                started_at,
                &snapshot,
                RunState::Done,
                RunStatus::NothingToDo,
                false,
                None,
                vec![],
                vec![],
                notes,
            ));
        }

        let destructive = plans
            .iter()
            .any(|(step, plan)| step.destructive && !plan.is_empty());

        if self.opts.dry_run {
            let planned: Vec<PlannedAction> =
                plans.into_iter().flat_map(|(_, plan)| plan).collect();
            notes.push("dry-run: no changes were made and no backup was taken".to_string());
            return Ok(self.finish(
                started_at,
                &snapshot,
                RunState::Done,
                RunStatus::Completed,
                false,
                None,
                planned,
                vec![],
                notes,
            ));
        }

        // Scanning -> AwaitingConfirmation
        let rounds = if destructive {
            self.opts.destructive_rounds
        } else {
            1
        };
        let question = confirmation_question(&plans, destructive);
        let mut unattended = false;
        match self.gate.confirm(&question, rounds)? {
            Confirmation::Denied => {
                // AwaitingConfirmation -> Aborted
                notes.push("aborted by operator; no changes were made".to_string());
                return Ok(self.finish(
                    started_at,
                    &snapshot,
                    RunState::Aborted,
                    RunStatus::Aborted,
                    false,
                    None,
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

        // AwaitingConfirmation -> BackingUp (destructive runs only).
        // An unrecoverable save failure escalates: the sequencer refuses to
        // reach Executing without an undo path.
        let backup = if destructive {
            let handle = self
                .backups
                .save(&snapshot)
                .map_err(exit::backup_failed)?;
            self.export_driver_payload(&plans, &handle)
                .map_err(exit::backup_failed)?;
            notes.push(format!("backup saved: {}", handle.path.display()));
            Some(handle.id)
        } else {
            None
        };

        // BackingUp -> Executing: declared order, and a failed step never
        // stops the ones after it.
        let mut results = Vec::new();
        for (step, plan) in &plans {
            results.extend(executor::run_planned(step, plan, self.system));
        }

        // Executing -> Reporting -> Done
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
            backup,
            vec![],
            results,
            notes,
        ))
    }

    fn export_driver_payload(
        &mut self,
        plans: &[(Step, Vec<PlannedAction>)],
        handle: &crate::backup::BackupHandle,
    ) -> Result<()> {
        let payload_dir = handle.driver_payload_dir();
        for (_, plan) in plans {
            for action in plan {
                let PlannedActionKind::DeleteDriverPackage { published_name, .. } = &action.kind
                else {
                    continue;
                };
                match self.system.export_driver(published_name, &payload_dir)? {
                    UtilityOutcome::Ok | UtilityOutcome::RebootRequired => {}
                    UtilityOutcome::Failed { code, message } => {
                        return Err(anyhow!(
                            "driver export failed for {published_name} (code={code:?}): {message}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        started_at: String,
        snapshot: &crate::core::SystemSnapshot,
        state: RunState,
        status: RunStatus,
        unattended: bool,
        backup: Option<String>,
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
            command: self.opts.command.clone(),
            started_at,
            finished_at: now_rfc3339(),
            dry_run: self.opts.dry_run,
            unattended,
            state,
            status,
            backup,
            reboot_required,
            planned,
            results,
            notes,
        }
    }

    fn spinner(&self) -> Option<indicatif::ProgressBar> {
        use std::io::IsTerminal;

        if !self.opts.show_progress || !std::io::stderr().is_terminal() {
            return None;
        }
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("capturing system inventory...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    }
}

fn confirmation_question(plans: &[(Step, Vec<PlannedAction>)], destructive: bool) -> String {
    use std::fmt::Write as _;

    let mut q = String::from("The following actions will be performed:\n");
    for (step, plan) in plans {
        for action in plan {
            let _ = writeln!(q, "  - [{}] {}", step.id, action.describe());
        }
    }
    if destructive {
        q.push_str("A backup snapshot will be taken before any change.\n");
    }
    q.push_str("Proceed?");
    q
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
