//! The step catalog and the planner. A step is applicable when planning it
//! against a snapshot yields at least one concrete action; the match lists
//! driving that decision come from configuration.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::MatchConfig;
use crate::core::{
    DeviceRecord, DriverPackageRecord, InstalledPackage, PlannedAction, PlannedActionKind, Step,
    StepKind, SystemSnapshot,
};

pub struct Matcher {
    device_patterns: GlobSet,
    driver_providers: Vec<String>,
    driver_name_contains: Vec<String>,
    guest_tools_packages: Vec<String>,
}

impl Matcher {
    pub fn from_config(cfg: &MatchConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &cfg.device_patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid device pattern: {pattern}"))?;
            builder.add(glob);
        }
        Ok(Self {
            device_patterns: builder.build().context("failed to compile device patterns")?,
            driver_providers: lowercased(&cfg.driver_providers),
            driver_name_contains: lowercased(&cfg.driver_name_contains),
            guest_tools_packages: lowercased(&cfg.guest_tools_packages),
        })
    }

    pub fn device_matches(&self, device: &DeviceRecord) -> bool {
        self.device_patterns.is_match(&device.description)
            || self.device_patterns.is_match(&device.instance_id)
    }

    pub fn driver_matches(&self, driver: &DriverPackageRecord) -> bool {
        let provider = driver.provider.trim().to_ascii_lowercase();
        if self.driver_providers.iter().any(|p| *p == provider) {
            return true;
        }
        let original = driver.original_name.to_ascii_lowercase();
        self.driver_name_contains
            .iter()
            .any(|needle| original.contains(needle))
    }

    pub fn package_matches(&self, pkg: &InstalledPackage) -> bool {
        let name = pkg.name.to_ascii_lowercase();
        self.guest_tools_packages
            .iter()
            .any(|needle| name.contains(needle))
    }
}

fn lowercased(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn clean_devices_step() -> Step {
    Step::new(
        "clean-devices",
        "Remove leftover non-present devices",
        true,
        StepKind::RemoveGhostDevices,
    )
}

pub fn clean_drivers_step() -> Step {
    Step::new(
        "clean-drivers",
        "Delete stale guest driver packages",
        true,
        StepKind::RemoveStaleDrivers,
    )
}

pub fn uninstall_tools_step() -> Step {
    Step::new(
        "uninstall-tools",
        "Uninstall leftover guest tools",
        true,
        StepKind::UninstallGuestTools,
    )
}

pub fn flush_dns_step() -> Step {
    Step::new(
        "flush-dns",
        "Flush the DNS resolver cache",
        false,
        StepKind::FlushDns,
    )
}

pub fn reset_network_step() -> Step {
    Step::new(
        "reset-network",
        "Reset the network stack",
        true,
        StepKind::ResetNetworkStack,
    )
}

pub fn relabel_disks_step() -> Step {
    Step::new(
        "relabel-disks",
        "Bring offline data disks online",
        true,
        StepKind::RelabelDisks,
    )
}

/// The composite runbook. Device removal must precede driver-package
/// deletion: a device still bound to a driver can block its removal.
pub fn clean_steps() -> Vec<Step> {
    vec![
        clean_devices_step(),
        clean_drivers_step(),
        uninstall_tools_step(),
        flush_dns_step(),
    ]
}

pub fn plan(step: &Step, snapshot: &SystemSnapshot, matcher: &Matcher) -> Vec<PlannedAction> {
    let mut out = Vec::new();
    match step.kind {
        StepKind::RemoveGhostDevices => {
            for device in snapshot.ghost_devices() {
                if matcher.device_matches(device) {
                    out.push(PlannedAction {
                        step_id: step.id.clone(),
                        kind: PlannedActionKind::RemoveDevice {
                            instance_id: device.instance_id.clone(),
                            description: device.description.clone(),
                        },
                    });
                }
            }
        }
        StepKind::RemoveStaleDrivers => {
            for driver in &snapshot.drivers {
                if matcher.driver_matches(driver) {
                    out.push(PlannedAction {
                        step_id: step.id.clone(),
                        kind: PlannedActionKind::DeleteDriverPackage {
                            published_name: driver.published_name.clone(),
                            original_name: driver.original_name.clone(),
                            provider: driver.provider.clone(),
                        },
                    });
                }
            }
        }
        StepKind::UninstallGuestTools => {
            for pkg in &snapshot.packages {
                if matcher.package_matches(pkg) {
                    out.push(PlannedAction {
                        step_id: step.id.clone(),
                        kind: PlannedActionKind::UninstallPackage {
                            name: pkg.name.clone(),
                            version: pkg.version.clone(),
                            uninstall_key: pkg.uninstall_key.clone(),
                        },
                    });
                }
            }
        }
        StepKind::FlushDns => {
            out.push(PlannedAction {
                step_id: step.id.clone(),
                kind: PlannedActionKind::FlushDnsCache,
            });
        }
        StepKind::ResetNetworkStack => {
            out.push(PlannedAction {
                step_id: step.id.clone(),
                kind: PlannedActionKind::ResetNetworkStack,
            });
        }
        StepKind::RelabelDisks => {
            for disk in &snapshot.disks {
                if !disk.online || disk.read_only {
                    out.push(PlannedAction {
                        step_id: step.id.clone(),
                        kind: PlannedActionKind::OnlineDisk {
                            number: disk.number,
                            friendly_name: disk.friendly_name.clone(),
                        },
                    });
                }
            }
        }
    }
    out
}
