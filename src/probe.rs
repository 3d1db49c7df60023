//! Inventory capture. Read-only: a failing sub-query leaves its section
//! empty and flags the snapshot partial instead of aborting the capture.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::SystemSnapshot;
use crate::system::SystemInterface;

pub fn capture(system: &dyn SystemInterface, guest_tools: &[String]) -> SystemSnapshot {
    let mut partial = false;
    let mut section_errors = Vec::new();

    let devices = match system.enumerate_devices() {
        Ok(v) => v,
        Err(err) => {
            partial = true;
            section_errors.push(format!("devices: {err:#}"));
            vec![]
        }
    };
    let drivers = match system.enumerate_drivers() {
        Ok(v) => v,
        Err(err) => {
            partial = true;
            section_errors.push(format!("drivers: {err:#}"));
            vec![]
        }
    };
    let interfaces = match system.list_interfaces() {
        Ok(v) => v,
        Err(err) => {
            partial = true;
            section_errors.push(format!("network: {err:#}"));
            vec![]
        }
    };
    let packages = match system.query_packages(guest_tools) {
        Ok(v) => v,
        Err(err) => {
            partial = true;
            section_errors.push(format!("packages: {err:#}"));
            vec![]
        }
    };
    let disks = match system.list_disks() {
        Ok(v) => v,
        Err(err) => {
            partial = true;
            section_errors.push(format!("disks: {err:#}"));
            vec![]
        }
    };

    let captured_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    SystemSnapshot {
        captured_at,
        os: system.os_info(),
        devices,
        drivers,
        interfaces,
        packages,
        disks,
        partial,
        section_errors,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;

    use super::*;
    use crate::core::{
        DeviceRecord, DiskRecord, DriverPackageRecord, InstalledPackage, InterfaceRecord, OsInfo,
    };
    use crate::system::UtilityOutcome;

    struct FlakySystem;

    impl SystemInterface for FlakySystem {
        fn os_info(&self) -> OsInfo {
            OsInfo {
                name: "test".to_string(),
                version: "0".to_string(),
            }
        }

        fn enumerate_devices(&self) -> Result<Vec<DeviceRecord>> {
            Ok(vec![DeviceRecord {
                instance_id: "PCI\\A".to_string(),
                class: "Net".to_string(),
                description: "vmxnet3 Ethernet Adapter".to_string(),
                present: false,
            }])
        }

        fn remove_device(&mut self, _: &str) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn enumerate_drivers(&self) -> Result<Vec<DriverPackageRecord>> {
            anyhow::bail!("driver store unreadable")
        }

        fn delete_driver(&mut self, _: &str) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn export_driver(&self, _: &str, _: &Path) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn import_driver(&mut self, _: &Path) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn list_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
            Ok(vec![])
        }

        fn apply_interface(&mut self, _: &InterfaceRecord, _: &str) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn flush_dns(&mut self) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn reset_network_stack(&mut self) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn query_packages(&self, _: &[String]) -> Result<Vec<InstalledPackage>> {
            Ok(vec![])
        }

        fn uninstall_package(&mut self, _: &InstalledPackage) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }

        fn list_disks(&self) -> Result<Vec<DiskRecord>> {
            Ok(vec![])
        }

        fn online_disk(&mut self, _: u32) -> Result<UtilityOutcome> {
            Ok(UtilityOutcome::Ok)
        }
    }

    #[test]
    fn capture_records_partial_sections_instead_of_aborting() {
        let snapshot = capture(&FlakySystem, &[]);
        assert_eq!(snapshot.devices.len(), 1);
        assert!(snapshot.drivers.is_empty());
        assert!(snapshot.partial);
        assert_eq!(snapshot.section_errors.len(), 1);
        assert!(snapshot.section_errors[0].starts_with("drivers:"));
    }
}
