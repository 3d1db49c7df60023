use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{OsInfo, PlannedAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Success,
    /// The mutation took effect but needs a restart to complete. Not a
    /// failure; callers must not treat it as one.
    SuccessRebootRequired,
    Skipped,
    Failed,
}

impl StepOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            StepOutcome::Success => "SUCCESS",
            StepOutcome::SuccessRebootRequired => "SUCCESS_REBOOT_REQUIRED",
            StepOutcome::Skipped => "SKIPPED",
            StepOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub outcome: StepOutcome,
    pub detail: String,
}

/// Terminal state of the sequencer's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    NothingToDo,
    Aborted,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
            RunStatus::NothingToDo => "NOTHING_TO_DO",
            RunStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub schema_version: String,
    pub tool_version: String,
    pub os: OsInfo,
    pub command: String,
    pub started_at: String,
    pub finished_at: String,
    pub dry_run: bool,
    /// True when confirmation was bypassed via `--yes`.
    pub unattended: bool,
    pub state: RunState,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    pub reboot_required: bool,
    /// "Would perform" entries; only populated for dry runs.
    pub planned: Vec<PlannedAction>,
    pub results: Vec<StepResult>,
    pub notes: Vec<String>,
}

impl WorkflowRun {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed | RunStatus::NothingToDo => 0,
            RunStatus::CompletedWithErrors => 2,
            RunStatus::Aborted => 3,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == StepOutcome::Failed)
            .count()
    }

    pub fn reboot_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == StepOutcome::SuccessRebootRequired)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_status(status: RunStatus) -> WorkflowRun {
        WorkflowRun {
            schema_version: "1.0".to_string(),
            tool_version: "0.0.0".to_string(),
            os: OsInfo {
                name: "test".to_string(),
                version: "0".to_string(),
            },
            command: "clean-devices".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: "2026-01-01T00:00:01Z".to_string(),
            dry_run: false,
            unattended: false,
            state: RunState::Done,
            status,
            backup: None,
            reboot_required: false,
            planned: vec![],
            results: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn exit_code_follows_status() {
        assert_eq!(run_with_status(RunStatus::Completed).exit_code(), 0);
        assert_eq!(run_with_status(RunStatus::NothingToDo).exit_code(), 0);
        assert_eq!(run_with_status(RunStatus::CompletedWithErrors).exit_code(), 2);
        assert_eq!(run_with_status(RunStatus::Aborted).exit_code(), 3);
    }

    #[test]
    fn outcome_counters_count_only_their_kind() {
        let mut run = run_with_status(RunStatus::CompletedWithErrors);
        run.results = vec![
            StepResult {
                step: "clean-devices".to_string(),
                target: Some("PCI\\A".to_string()),
                outcome: StepOutcome::SuccessRebootRequired,
                detail: String::new(),
            },
            StepResult {
                step: "clean-devices".to_string(),
                target: Some("PCI\\B".to_string()),
                outcome: StepOutcome::Failed,
                detail: "exit code 1".to_string(),
            },
        ];
        assert_eq!(run.failed_count(), 1);
        assert_eq!(run.reboot_count(), 1);
    }
}
