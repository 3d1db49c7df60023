use serde::{Deserialize, Serialize};

/// What a step does. Steps are stateless value descriptors; the match lists
/// that drive their planning live in configuration, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    RemoveGhostDevices,
    RemoveStaleDrivers,
    UninstallGuestTools,
    FlushDns,
    ResetNetworkStack,
    RelabelDisks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    /// Destructive steps require a backup snapshot and double confirmation.
    pub destructive: bool,
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: &str, title: &str, destructive: bool, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            destructive,
            kind,
        }
    }
}

/// A single concrete mutation the executor will attempt. Planning expands an
/// applicable step into one of these per device/driver/package/disk, so each
/// utility invocation gets its own reported outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum PlannedActionKind {
    #[serde(rename = "REMOVE_DEVICE")]
    RemoveDevice {
        instance_id: String,
        description: String,
    },
    #[serde(rename = "DELETE_DRIVER_PACKAGE")]
    DeleteDriverPackage {
        published_name: String,
        original_name: String,
        provider: String,
    },
    #[serde(rename = "UNINSTALL_PACKAGE")]
    UninstallPackage {
        name: String,
        version: String,
        uninstall_key: String,
    },
    #[serde(rename = "FLUSH_DNS_CACHE")]
    FlushDnsCache,
    #[serde(rename = "RESET_NETWORK_STACK")]
    ResetNetworkStack,
    #[serde(rename = "ONLINE_DISK")]
    OnlineDisk { number: u32, friendly_name: String },
    #[serde(rename = "IMPORT_DRIVER_PACKAGE")]
    ImportDriverPackage { inf_path: String },
    #[serde(rename = "APPLY_INTERFACE_CONFIG")]
    ApplyInterfaceConfig {
        name: String,
        mac: String,
        live_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub step_id: String,
    #[serde(flatten)]
    pub kind: PlannedActionKind,
}

impl PlannedAction {
    /// Short label for result rows and summaries.
    pub fn target(&self) -> Option<String> {
        match &self.kind {
            PlannedActionKind::RemoveDevice { instance_id, .. } => Some(instance_id.clone()),
            PlannedActionKind::DeleteDriverPackage { published_name, .. } => {
                Some(published_name.clone())
            }
            PlannedActionKind::UninstallPackage { name, .. } => Some(name.clone()),
            PlannedActionKind::FlushDnsCache | PlannedActionKind::ResetNetworkStack => None,
            PlannedActionKind::OnlineDisk { number, .. } => Some(format!("disk {number}")),
            PlannedActionKind::ImportDriverPackage { inf_path } => Some(inf_path.clone()),
            PlannedActionKind::ApplyInterfaceConfig { name, .. } => Some(name.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            PlannedActionKind::RemoveDevice {
                instance_id,
                description,
            } => format!("remove non-present device {instance_id} ({description})"),
            PlannedActionKind::DeleteDriverPackage {
                published_name,
                original_name,
                provider,
            } => format!("delete driver package {published_name} ({original_name}, {provider})"),
            PlannedActionKind::UninstallPackage { name, version, .. } => {
                format!("uninstall {name} {version}")
            }
            PlannedActionKind::FlushDnsCache => "flush the DNS resolver cache".to_string(),
            PlannedActionKind::ResetNetworkStack => {
                "reset the network stack (reboot required)".to_string()
            }
            PlannedActionKind::OnlineDisk {
                number,
                friendly_name,
            } => format!("bring disk {number} ({friendly_name}) online and clear read-only"),
            PlannedActionKind::ImportDriverPackage { inf_path } => {
                format!("reinstall driver package from {inf_path}")
            }
            PlannedActionKind::ApplyInterfaceConfig {
                name, live_name, ..
            } => format!("reapply network settings of '{name}' to interface '{live_name}'"),
        }
    }
}
