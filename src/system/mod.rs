//! The OS management surface, behind one narrow boundary. The engine core
//! only ever sees typed records and `UtilityOutcome`; all utility-specific
//! invocation and text parsing stays on the live side of this trait.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::core::{
    DeviceRecord, DiskRecord, DriverPackageRecord, InstalledPackage, InterfaceRecord, OsInfo,
};
use crate::platform::{self, CommandOutput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtilityOutcome {
    Ok,
    /// The utility's "restart required" sentinel. A normal outcome.
    RebootRequired,
    Failed { code: Option<i32>, message: String },
}

impl UtilityOutcome {
    /// Classifies a raw utility exit. `reboot_code` is the platform's
    /// restart-pending sentinel, when the utility has one.
    pub fn from_exit(output: &CommandOutput, reboot_code: Option<i32>) -> Self {
        if output.exit_code == 0 {
            return UtilityOutcome::Ok;
        }
        if Some(output.exit_code) == reboot_code {
            return UtilityOutcome::RebootRequired;
        }
        let mut message = output.stderr.trim().to_string();
        if message.is_empty() {
            message = output.stdout.trim().to_string();
        }
        UtilityOutcome::Failed {
            code: Some(output.exit_code),
            message: platform::truncate_output(&message),
        }
    }
}

pub trait SystemInterface {
    fn os_info(&self) -> OsInfo;

    fn enumerate_devices(&self) -> Result<Vec<DeviceRecord>>;
    fn remove_device(&mut self, instance_id: &str) -> Result<UtilityOutcome>;

    fn enumerate_drivers(&self) -> Result<Vec<DriverPackageRecord>>;
    fn delete_driver(&mut self, published_name: &str) -> Result<UtilityOutcome>;
    fn export_driver(&self, published_name: &str, dest: &Path) -> Result<UtilityOutcome>;
    fn import_driver(&mut self, inf_path: &Path) -> Result<UtilityOutcome>;

    fn list_interfaces(&self) -> Result<Vec<InterfaceRecord>>;
    /// Applies the snapshot interface's settings to the live interface
    /// `live_name`. Never creates an interface.
    fn apply_interface(
        &mut self,
        desired: &InterfaceRecord,
        live_name: &str,
    ) -> Result<UtilityOutcome>;
    fn flush_dns(&mut self) -> Result<UtilityOutcome>;
    fn reset_network_stack(&mut self) -> Result<UtilityOutcome>;

    /// Installed packages whose display name contains one of `names`
    /// (case-insensitive).
    fn query_packages(&self, names: &[String]) -> Result<Vec<InstalledPackage>>;
    fn uninstall_package(&mut self, pkg: &InstalledPackage) -> Result<UtilityOutcome>;

    fn list_disks(&self) -> Result<Vec<DiskRecord>>;
    fn online_disk(&mut self, number: u32) -> Result<UtilityOutcome>;
}

pub struct LiveSystem {
    timeout: Duration,
}

impl LiveSystem {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[cfg(windows)]
impl SystemInterface for LiveSystem {
    fn os_info(&self) -> OsInfo {
        platform::windows::os_info(self.timeout)
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceRecord>> {
        let output = platform::windows::pnputil_enum_devices(self.timeout)?;
        if output.exit_code != 0 {
            anyhow::bail!("pnputil /enum-devices failed (exit_code={})", output.exit_code);
        }
        Ok(platform::pnputil::parse_enum_devices(&output.stdout))
    }

    fn remove_device(&mut self, instance_id: &str) -> Result<UtilityOutcome> {
        let output = platform::windows::pnputil_remove_device(instance_id, self.timeout)?;
        Ok(UtilityOutcome::from_exit(
            &output,
            Some(platform::pnputil::REBOOT_REQUIRED_EXIT_CODE),
        ))
    }

    fn enumerate_drivers(&self) -> Result<Vec<DriverPackageRecord>> {
        let output = platform::windows::pnputil_enum_drivers(self.timeout)?;
        if output.exit_code != 0 {
            anyhow::bail!("pnputil /enum-drivers failed (exit_code={})", output.exit_code);
        }
        Ok(platform::pnputil::parse_enum_drivers(&output.stdout))
    }

    fn delete_driver(&mut self, published_name: &str) -> Result<UtilityOutcome> {
        let output = platform::windows::pnputil_delete_driver(published_name, self.timeout)?;
        Ok(UtilityOutcome::from_exit(
            &output,
            Some(platform::pnputil::REBOOT_REQUIRED_EXIT_CODE),
        ))
    }

    fn export_driver(&self, published_name: &str, dest: &Path) -> Result<UtilityOutcome> {
        std::fs::create_dir_all(dest)?;
        let output = platform::windows::pnputil_export_driver(published_name, dest, self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn import_driver(&mut self, inf_path: &Path) -> Result<UtilityOutcome> {
        let output = platform::windows::pnputil_add_driver(inf_path, self.timeout)?;
        Ok(UtilityOutcome::from_exit(
            &output,
            Some(platform::pnputil::REBOOT_REQUIRED_EXIT_CODE),
        ))
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
        let output = platform::windows::ipconfig_all(self.timeout)?;
        if output.exit_code != 0 {
            anyhow::bail!("ipconfig /all failed (exit_code={})", output.exit_code);
        }
        Ok(platform::netparse::parse_ipconfig_all(&output.stdout))
    }

    fn apply_interface(
        &mut self,
        desired: &InterfaceRecord,
        live_name: &str,
    ) -> Result<UtilityOutcome> {
        if desired.dhcp {
            let output = platform::windows::netsh_set_dhcp(live_name, self.timeout)?;
            if output.exit_code != 0 {
                return Ok(UtilityOutcome::from_exit(&output, None));
            }
            let output = platform::windows::netsh_set_dns(live_name, &[], self.timeout)?;
            return Ok(UtilityOutcome::from_exit(&output, None));
        }

        for addr in &desired.addresses {
            let (address, prefix) = match addr.split_once('/') {
                Some((a, p)) => (a, p.parse::<u8>().unwrap_or(24)),
                None => (addr.as_str(), 24),
            };
            let mask = platform::netparse::prefix_to_mask(prefix)
                .unwrap_or_else(|| "255.255.255.0".to_string());
            let output = platform::windows::netsh_set_static_address(
                live_name,
                address,
                &mask,
                desired.gateway.as_deref(),
                self.timeout,
            )?;
            if output.exit_code != 0 {
                return Ok(UtilityOutcome::from_exit(&output, None));
            }
        }
        let output = platform::windows::netsh_set_dns(live_name, &desired.dns, self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn flush_dns(&mut self) -> Result<UtilityOutcome> {
        let output = platform::windows::ipconfig_flushdns(self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn reset_network_stack(&mut self) -> Result<UtilityOutcome> {
        let winsock = platform::windows::netsh_winsock_reset(self.timeout)?;
        if winsock.exit_code != 0 {
            return Ok(UtilityOutcome::from_exit(&winsock, None));
        }
        let ip = platform::windows::netsh_int_ip_reset(self.timeout)?;
        match UtilityOutcome::from_exit(&ip, None) {
            // A stack reset always needs a restart to take effect.
            UtilityOutcome::Ok => Ok(UtilityOutcome::RebootRequired),
            other => Ok(other),
        }
    }

    fn query_packages(&self, names: &[String]) -> Result<Vec<InstalledPackage>> {
        let output = platform::windows::query_uninstall_entries(self.timeout)?;
        if output.exit_code != 0 {
            anyhow::bail!(
                "uninstall registry query failed (exit_code={})",
                output.exit_code
            );
        }
        let all = platform::psjson::parse_uninstall_entries(&output.stdout)?;
        Ok(all
            .into_iter()
            .filter(|pkg| {
                let name = pkg.name.to_ascii_lowercase();
                names
                    .iter()
                    .any(|n| !n.trim().is_empty() && name.contains(&n.trim().to_ascii_lowercase()))
            })
            .collect())
    }

    fn uninstall_package(&mut self, pkg: &InstalledPackage) -> Result<UtilityOutcome> {
        let output = platform::windows::msiexec_uninstall(&pkg.uninstall_key, self.timeout)?;
        Ok(UtilityOutcome::from_exit(
            &output,
            Some(platform::pnputil::REBOOT_REQUIRED_EXIT_CODE),
        ))
    }

    fn list_disks(&self) -> Result<Vec<DiskRecord>> {
        let output = platform::windows::query_disks(self.timeout)?;
        if output.exit_code != 0 {
            anyhow::bail!("Get-Disk failed (exit_code={})", output.exit_code);
        }
        platform::psjson::parse_get_disk(&output.stdout)
    }

    fn online_disk(&mut self, number: u32) -> Result<UtilityOutcome> {
        let output = platform::windows::online_disk(number, self.timeout)?;
        if output.exit_code == 0 {
            return Ok(UtilityOutcome::Ok);
        }
        // Hosts without the storage module fall back to diskpart.
        let fallback = platform::windows::diskpart_online_disk(number, self.timeout)?;
        Ok(UtilityOutcome::from_exit(&fallback, None))
    }
}

#[cfg(not(windows))]
impl SystemInterface for LiveSystem {
    fn os_info(&self) -> OsInfo {
        platform::linux::os_info(self.timeout)
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(vec![])
    }

    fn remove_device(&mut self, _instance_id: &str) -> Result<UtilityOutcome> {
        Ok(unsupported("device removal"))
    }

    fn enumerate_drivers(&self) -> Result<Vec<DriverPackageRecord>> {
        Ok(vec![])
    }

    fn delete_driver(&mut self, _published_name: &str) -> Result<UtilityOutcome> {
        Ok(unsupported("driver store deletion"))
    }

    fn export_driver(&self, _published_name: &str, _dest: &Path) -> Result<UtilityOutcome> {
        Ok(unsupported("driver store export"))
    }

    fn import_driver(&mut self, _inf_path: &Path) -> Result<UtilityOutcome> {
        Ok(unsupported("driver store import"))
    }

    fn list_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
        platform::linux::list_interfaces(self.timeout)
    }

    fn apply_interface(
        &mut self,
        desired: &InterfaceRecord,
        live_name: &str,
    ) -> Result<UtilityOutcome> {
        if desired.dhcp {
            // DHCP leases renew on their own; nothing to reapply.
            return Ok(UtilityOutcome::Ok);
        }
        let output = platform::linux::apply_static_address(
            live_name,
            &desired.addresses,
            desired.gateway.as_deref(),
            self.timeout,
        )?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn flush_dns(&mut self) -> Result<UtilityOutcome> {
        let output = platform::linux::flush_dns(self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn reset_network_stack(&mut self) -> Result<UtilityOutcome> {
        let output = platform::linux::restart_network_manager(self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn query_packages(&self, names: &[String]) -> Result<Vec<InstalledPackage>> {
        platform::linux::query_packages(names, self.timeout)
    }

    fn uninstall_package(&mut self, pkg: &InstalledPackage) -> Result<UtilityOutcome> {
        let output = platform::linux::uninstall_package(&pkg.uninstall_key, self.timeout)?;
        Ok(UtilityOutcome::from_exit(&output, None))
    }

    fn list_disks(&self) -> Result<Vec<DiskRecord>> {
        Ok(vec![])
    }

    fn online_disk(&mut self, _number: u32) -> Result<UtilityOutcome> {
        Ok(unsupported("disk management"))
    }
}

#[cfg(not(windows))]
fn unsupported(what: &str) -> UtilityOutcome {
    UtilityOutcome::Failed {
        code: None,
        message: format!("{what} is not available on this platform"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn from_exit_maps_zero_to_ok() {
        assert_eq!(
            UtilityOutcome::from_exit(&output(0, "done", ""), Some(3010)),
            UtilityOutcome::Ok
        );
    }

    #[test]
    fn from_exit_maps_sentinel_to_reboot_required() {
        assert_eq!(
            UtilityOutcome::from_exit(&output(3010, "", ""), Some(3010)),
            UtilityOutcome::RebootRequired
        );
    }

    #[test]
    fn from_exit_without_sentinel_treats_3010_as_failure() {
        match UtilityOutcome::from_exit(&output(3010, "", ""), None) {
            UtilityOutcome::Failed { code, .. } => assert_eq!(code, Some(3010)),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn from_exit_preserves_raw_message() {
        match UtilityOutcome::from_exit(&output(5, "", "Access is denied."), Some(3010)) {
            UtilityOutcome::Failed { code, message } => {
                assert_eq!(code, Some(5));
                assert_eq!(message, "Access is denied.");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn from_exit_falls_back_to_stdout_message() {
        match UtilityOutcome::from_exit(&output(1, "boom", ""), None) {
            UtilityOutcome::Failed { message, .. } => assert_eq!(message, "boom"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
