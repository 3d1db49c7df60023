use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
}

/// A device instance known to the OS configuration. `present` is false for
/// ghost devices: hardware the configuration remembers but that is no longer
/// attached (the usual leftovers after a hypervisor migration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub instance_id: String,
    pub class: String,
    pub description: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPackageRecord {
    /// Published name in the driver store (e.g. `oem42.inf`).
    pub published_name: String,
    /// The vendor's original inf name (e.g. `vmxnet3.inf`).
    pub original_name: String,
    pub provider: String,
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub mac: String,
    pub dhcp: bool,
    /// `address/prefix` entries.
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub dns: Vec<String>,
}

impl InterfaceRecord {
    pub fn normalized_mac(&self) -> String {
        normalize_mac(&self.mac)
    }
}

/// Canonical MAC form for matching: hex digits only, uppercase. Separator
/// style differs between utilities (`00-50-56-...` vs `00:50:56:...`).
pub fn normalize_mac(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    /// Whatever the platform's uninstall mechanism needs: an MSI product
    /// code on Windows, the package name on Linux.
    pub uninstall_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub number: u32,
    pub friendly_name: String,
    pub online: bool,
    pub read_only: bool,
}

/// Point-in-time inventory of the machine. Immutable once captured; the
/// backup store persists it verbatim and the restore engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub captured_at: String,
    pub os: OsInfo,
    pub devices: Vec<DeviceRecord>,
    pub drivers: Vec<DriverPackageRecord>,
    pub interfaces: Vec<InterfaceRecord>,
    pub packages: Vec<InstalledPackage>,
    pub disks: Vec<DiskRecord>,
    /// True when one or more sections could not be captured; the failed
    /// sections are listed in `section_errors` and left empty.
    pub partial: bool,
    pub section_errors: Vec<String>,
}

impl SystemSnapshot {
    pub fn ghost_devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter().filter(|d| !d.present)
    }
}
