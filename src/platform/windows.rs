//! Windows utility invocations. Every function shells out through
//! `run_command` and returns the raw `CommandOutput`; exit-code
//! classification happens at the collaborator boundary.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::OsInfo;
use crate::platform::{CommandOutput, run_command};

pub fn os_info(timeout: Duration) -> OsInfo {
    match run_command("cmd", &["/c", "ver"], timeout) {
        Ok(output) if output.exit_code == 0 => OsInfo {
            name: "Windows".to_string(),
            version: output.stdout.trim().to_string(),
        },
        _ => OsInfo {
            name: "Windows".to_string(),
            version: "unknown".to_string(),
        },
    }
}

pub fn pnputil_enum_devices(timeout: Duration) -> Result<CommandOutput> {
    run_command("pnputil", &["/enum-devices"], timeout)
}

pub fn pnputil_remove_device(instance_id: &str, timeout: Duration) -> Result<CommandOutput> {
    run_command("pnputil", &["/remove-device", instance_id], timeout)
}

pub fn pnputil_enum_drivers(timeout: Duration) -> Result<CommandOutput> {
    run_command("pnputil", &["/enum-drivers"], timeout)
}

pub fn pnputil_delete_driver(published_name: &str, timeout: Duration) -> Result<CommandOutput> {
    run_command(
        "pnputil",
        &["/delete-driver", published_name, "/uninstall", "/force"],
        timeout,
    )
}

pub fn pnputil_export_driver(
    published_name: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let dest = dest.display().to_string();
    run_command(
        "pnputil",
        &["/export-driver", published_name, dest.as_str()],
        timeout,
    )
}

pub fn pnputil_add_driver(inf_path: &Path, timeout: Duration) -> Result<CommandOutput> {
    let inf = inf_path.display().to_string();
    run_command("pnputil", &["/add-driver", inf.as_str(), "/install"], timeout)
}

pub fn ipconfig_all(timeout: Duration) -> Result<CommandOutput> {
    run_command("ipconfig", &["/all"], timeout)
}

pub fn ipconfig_flushdns(timeout: Duration) -> Result<CommandOutput> {
    run_command("ipconfig", &["/flushdns"], timeout)
}

pub fn netsh_set_static_address(
    interface: &str,
    address: &str,
    mask: &str,
    gateway: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let name = format!("name={interface}");
    let mut args = vec![
        "interface",
        "ipv4",
        "set",
        "address",
        name.as_str(),
        "static",
        address,
        mask,
    ];
    if let Some(gw) = gateway {
        args.push(gw);
    }
    run_command("netsh", &args, timeout)
}

pub fn netsh_set_dhcp(interface: &str, timeout: Duration) -> Result<CommandOutput> {
    let name = format!("name={interface}");
    run_command(
        "netsh",
        &["interface", "ipv4", "set", "address", name.as_str(), "dhcp"],
        timeout,
    )
}

pub fn netsh_set_dns(
    interface: &str,
    servers: &[String],
    timeout: Duration,
) -> Result<CommandOutput> {
    let name = format!("name={interface}");
    let Some(first) = servers.first() else {
        return run_command(
            "netsh",
            &["interface", "ipv4", "set", "dnsservers", name.as_str(), "dhcp"],
            timeout,
        );
    };
    let output = run_command(
        "netsh",
        &[
            "interface",
            "ipv4",
            "set",
            "dnsservers",
            name.as_str(),
            "static",
            first.as_str(),
            "primary",
        ],
        timeout,
    )?;
    if output.exit_code != 0 {
        return Ok(output);
    }
    let mut last = output;
    for (i, server) in servers.iter().enumerate().skip(1) {
        let index = (i + 1).to_string();
        let index_arg = format!("index={index}");
        last = run_command(
            "netsh",
            &[
                "interface",
                "ipv4",
                "add",
                "dnsservers",
                name.as_str(),
                server.as_str(),
                index_arg.as_str(),
            ],
            timeout,
        )?;
        if last.exit_code != 0 {
            return Ok(last);
        }
    }
    Ok(last)
}

pub fn netsh_winsock_reset(timeout: Duration) -> Result<CommandOutput> {
    run_command("netsh", &["winsock", "reset"], timeout)
}

pub fn netsh_int_ip_reset(timeout: Duration) -> Result<CommandOutput> {
    run_command("netsh", &["int", "ip", "reset"], timeout)
}

pub fn msiexec_uninstall(product_code: &str, timeout: Duration) -> Result<CommandOutput> {
    run_command(
        "msiexec",
        &["/x", product_code, "/qn", "/norestart"],
        timeout,
    )
}

const UNINSTALL_QUERY: &str = r"Get-ItemProperty `
  'HKLM:\Software\Microsoft\Windows\CurrentVersion\Uninstall\*', `
  'HKLM:\Software\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall\*' `
  -ErrorAction SilentlyContinue | Select-Object DisplayName,DisplayVersion,PSChildName | ConvertTo-Json";

pub fn query_uninstall_entries(timeout: Duration) -> Result<CommandOutput> {
    powershell(UNINSTALL_QUERY, timeout)
}

const GET_DISK_QUERY: &str =
    "Get-Disk | Select-Object Number,FriendlyName,OperationalStatus,IsReadOnly | ConvertTo-Json";

/// Preferred path: the storage management cmdlets.
pub fn query_disks(timeout: Duration) -> Result<CommandOutput> {
    powershell(GET_DISK_QUERY, timeout)
}

pub fn online_disk(number: u32, timeout: Duration) -> Result<CommandOutput> {
    let script = format!(
        "Set-Disk -Number {number} -IsOffline $false; Set-Disk -Number {number} -IsReadOnly $false"
    );
    powershell(&script, timeout)
}

/// Legacy path for hosts without the storage module: drive `diskpart` with a
/// generated script file.
pub fn diskpart_online_disk(number: u32, timeout: Duration) -> Result<CommandOutput> {
    let script = format!(
        "select disk {number}\nattributes disk clear readonly\nonline disk noerr\nexit\n"
    );
    diskpart_script(&script, timeout)
}

fn diskpart_script(script: &str, timeout: Duration) -> Result<CommandOutput> {
    let path = std::env::temp_dir().join(format!("vmsweep-diskpart-{}.txt", std::process::id()));
    std::fs::write(&path, script)
        .with_context(|| format!("failed to write diskpart script: {}", path.display()))?;
    let path_s = path.display().to_string();
    let result = run_command("diskpart", &["/s", path_s.as_str()], timeout);
    let _ = std::fs::remove_file(&path);
    result
}

fn powershell(script: &str, timeout: Duration) -> Result<CommandOutput> {
    run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        timeout,
    )
}
