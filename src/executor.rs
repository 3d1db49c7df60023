//! Runs a step's planned actions against the live system. Exactly one
//! mutation attempt per action; retry policy belongs to the caller.

use std::path::Path;

use crate::core::{
    InstalledPackage, InterfaceRecord, PlannedAction, PlannedActionKind, Step, StepOutcome,
    StepResult, SystemSnapshot,
};
use crate::steps::{self, Matcher};
use crate::system::{SystemInterface, UtilityOutcome};

/// Plans and runs one step. An empty plan yields a single `Skipped` result,
/// which is also what makes idempotence observable: re-running a step over
/// already-cleaned state plans nothing.
pub fn run_step(
    step: &Step,
    snapshot: &SystemSnapshot,
    matcher: &Matcher,
    system: &mut dyn SystemInterface,
) -> Vec<StepResult> {
    let plan = steps::plan(step, snapshot, matcher);
    run_planned(step, &plan, system)
}

pub fn run_planned(
    step: &Step,
    plan: &[PlannedAction],
    system: &mut dyn SystemInterface,
) -> Vec<StepResult> {
    if plan.is_empty() {
        return vec![StepResult {
            step: step.id.clone(),
            target: None,
            outcome: StepOutcome::Skipped,
            detail: "nothing matched; no action taken".to_string(),
        }];
    }
    plan.iter()
        .map(|action| run_action(action, system))
        .collect()
}

pub fn run_action(action: &PlannedAction, system: &mut dyn SystemInterface) -> StepResult {
    let attempt = match &action.kind {
        PlannedActionKind::RemoveDevice { instance_id, .. } => system.remove_device(instance_id),
        PlannedActionKind::DeleteDriverPackage { published_name, .. } => {
            system.delete_driver(published_name)
        }
        PlannedActionKind::UninstallPackage {
            name,
            version,
            uninstall_key,
        } => system.uninstall_package(&InstalledPackage {
            name: name.clone(),
            version: version.clone(),
            uninstall_key: uninstall_key.clone(),
        }),
        PlannedActionKind::FlushDnsCache => system.flush_dns(),
        PlannedActionKind::ResetNetworkStack => system.reset_network_stack(),
        PlannedActionKind::OnlineDisk { number, .. } => system.online_disk(*number),
        PlannedActionKind::ImportDriverPackage { inf_path } => {
            system.import_driver(Path::new(inf_path))
        }
        PlannedActionKind::ApplyInterfaceConfig { .. } => Err(anyhow::anyhow!(
            "interface reconfiguration is driven by the restore engine"
        )),
    };
    result_from_attempt(action, attempt)
}

/// Applies a snapshot interface's settings to a mapped live interface.
pub fn apply_interface(
    step_id: &str,
    desired: &InterfaceRecord,
    live_name: &str,
    system: &mut dyn SystemInterface,
) -> StepResult {
    let action = PlannedAction {
        step_id: step_id.to_string(),
        kind: PlannedActionKind::ApplyInterfaceConfig {
            name: desired.name.clone(),
            mac: desired.mac.clone(),
            live_name: live_name.to_string(),
        },
    };
    let attempt = system.apply_interface(desired, live_name);
    result_from_attempt(&action, attempt)
}

fn result_from_attempt(
    action: &PlannedAction,
    attempt: anyhow::Result<UtilityOutcome>,
) -> StepResult {
    let (outcome, detail) = match attempt {
        Ok(UtilityOutcome::Ok) => (StepOutcome::Success, action.describe()),
        Ok(UtilityOutcome::RebootRequired) => (
            StepOutcome::SuccessRebootRequired,
            format!("{}; restart pending", action.describe()),
        ),
        Ok(UtilityOutcome::Failed { code, message }) => {
            let mut detail = match code {
                Some(code) => format!("exit code {code}"),
                None => "failed".to_string(),
            };
            if !message.is_empty() {
                detail.push_str(": ");
                detail.push_str(&message);
            }
            (StepOutcome::Failed, detail)
        }
        // Spawn failures and collaborator timeouts surface as a failed
        // result, not as an abort of the whole sequence.
        Err(err) => (StepOutcome::Failed, format!("{err:#}")),
    };

    StepResult {
        step: action.step_id.clone(),
        target: action.target(),
        outcome,
        detail,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::path::Path;

    use anyhow::Result;

    use crate::core::{
        DeviceRecord, DiskRecord, DriverPackageRecord, InstalledPackage, InterfaceRecord, OsInfo,
    };
    use crate::system::{SystemInterface, UtilityOutcome};

    /// In-memory collaborator for engine tests. Mutations actually change
    /// the fake state so a re-capture observes their effect.
    #[derive(Default)]
    pub struct FakeSystem {
        pub devices: Vec<DeviceRecord>,
        pub drivers: Vec<DriverPackageRecord>,
        pub interfaces: Vec<InterfaceRecord>,
        pub packages: Vec<InstalledPackage>,
        pub disks: Vec<DiskRecord>,
        /// Scripted outcomes keyed by target id; anything else succeeds.
        pub scripted: BTreeMap<String, UtilityOutcome>,
        pub mutation_count: usize,
        pub applied_interfaces: Vec<String>,
    }

    impl FakeSystem {
        fn scripted_or_ok(&mut self, key: &str) -> UtilityOutcome {
            self.mutation_count += 1;
            self.scripted
                .get(key)
                .cloned()
                .unwrap_or(UtilityOutcome::Ok)
        }
    }

    impl SystemInterface for FakeSystem {
        fn os_info(&self) -> OsInfo {
            OsInfo {
                name: "fake".to_string(),
                version: "1".to_string(),
            }
        }

        fn enumerate_devices(&self) -> Result<Vec<DeviceRecord>> {
            Ok(self.devices.clone())
        }

        fn remove_device(&mut self, instance_id: &str) -> Result<UtilityOutcome> {
            let outcome = self.scripted_or_ok(instance_id);
            if !matches!(outcome, UtilityOutcome::Failed { .. }) {
                self.devices.retain(|d| d.instance_id != instance_id);
            }
            Ok(outcome)
        }

        fn enumerate_drivers(&self) -> Result<Vec<DriverPackageRecord>> {
            Ok(self.drivers.clone())
        }

        fn delete_driver(&mut self, published_name: &str) -> Result<UtilityOutcome> {
            let outcome = self.scripted_or_ok(published_name);
            if !matches!(outcome, UtilityOutcome::Failed { .. }) {
                self.drivers.retain(|d| d.published_name != published_name);
            }
            Ok(outcome)
        }

        fn export_driver(&self, _published_name: &str, _dest: &Path) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn import_driver(&mut self, inf_path: &Path) -> Result<UtilityOutcome> {
            Ok(self.scripted_or_ok(&inf_path.display().to_string()))
        }

        fn list_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
            Ok(self.interfaces.clone())
        }

        fn apply_interface(
            &mut self,
            desired: &InterfaceRecord,
            live_name: &str,
        ) -> Result<UtilityOutcome> {
            let outcome = self.scripted_or_ok(live_name);
            if !matches!(outcome, UtilityOutcome::Failed { .. }) {
                self.applied_interfaces
                    .push(format!("{}<-{}", live_name, desired.name));
            }
            Ok(outcome)
        }

        fn flush_dns(&mut self) -> Result<UtilityOutcome> {
            Ok(self.scripted_or_ok("flush-dns"))
        }

        fn reset_network_stack(&mut self) -> Result<UtilityOutcome> {
            Ok(self.scripted_or_ok("reset-network"))
        }

        fn query_packages(&self, _names: &[String]) -> Result<Vec<InstalledPackage>> {
            Ok(self.packages.clone())
        }

        fn uninstall_package(&mut self, pkg: &InstalledPackage) -> Result<UtilityOutcome> {
            let key = pkg.uninstall_key.clone();
            let outcome = self.scripted_or_ok(&key);
            if !matches!(outcome, UtilityOutcome::Failed { .. }) {
                self.packages.retain(|p| p.uninstall_key != key);
            }
            Ok(outcome)
        }

        fn list_disks(&self) -> Result<Vec<DiskRecord>> {
            Ok(self.disks.clone())
        }

        fn online_disk(&mut self, number: u32) -> Result<UtilityOutcome> {
            let outcome = self.scripted_or_ok(&format!("disk-{number}"));
            if !matches!(outcome, UtilityOutcome::Failed { .. }) {
                for disk in &mut self.disks {
                    if disk.number == number {
                        disk.online = true;
                        disk.read_only = false;
                    }
                }
            }
            Ok(outcome)
        }
    }
}
