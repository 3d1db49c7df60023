//! Linux utility invocations. The Windows driver store has no analogue here;
//! device and driver-store operations are reported unsupported and the probe
//! records those sections empty.

use std::time::Duration;

use anyhow::Result;

use crate::core::{InstalledPackage, InterfaceRecord, OsInfo};
use crate::platform::{CommandOutput, netparse, run_command};

pub fn os_info(timeout: Duration) -> OsInfo {
    let _ = timeout;
    let name = "Linux".to_string();
    let Ok(release) = std::fs::read_to_string("/etc/os-release") else {
        return OsInfo {
            name,
            version: "unknown".to_string(),
        };
    };
    let version = release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .unwrap_or_else(|| "unknown".to_string());
    OsInfo { name, version }
}

pub fn list_interfaces(timeout: Duration) -> Result<Vec<InterfaceRecord>> {
    let links = run_command("ip", &["-o", "link", "show"], timeout)?;
    if links.exit_code != 0 {
        anyhow::bail!("ip link show failed (exit_code={})", links.exit_code);
    }
    let addrs = run_command("ip", &["-o", "-4", "addr", "show"], timeout)?;
    let routes = run_command("ip", &["route", "show", "default"], timeout)?;

    let addr_map = netparse::parse_ip_addr(&addrs.stdout);
    let route_map = netparse::parse_default_routes(&routes.stdout);
    let dns = std::fs::read_to_string("/etc/resolv.conf")
        .map(|text| netparse::parse_resolv_conf(&text))
        .unwrap_or_default();

    let mut out = Vec::new();
    for (name, mac) in netparse::parse_ip_link(&links.stdout) {
        if name == "lo" {
            continue;
        }
        let (addresses, dynamic) = addr_map.get(&name).cloned().unwrap_or_default();
        out.push(InterfaceRecord {
            gateway: route_map.get(&name).cloned(),
            name,
            mac,
            dhcp: dynamic,
            addresses,
            dns: dns.clone(),
        });
    }
    Ok(out)
}

pub fn apply_static_address(
    interface: &str,
    addresses: &[String],
    gateway: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let flushed = run_command("ip", &["addr", "flush", "dev", interface], timeout)?;
    if flushed.exit_code != 0 {
        return Ok(flushed);
    }
    let mut last = flushed;
    for addr in addresses {
        last = run_command("ip", &["addr", "add", addr.as_str(), "dev", interface], timeout)?;
        if last.exit_code != 0 {
            return Ok(last);
        }
    }
    if let Some(gw) = gateway {
        last = run_command(
            "ip",
            &["route", "replace", "default", "via", gw, "dev", interface],
            timeout,
        )?;
    }
    Ok(last)
}

pub fn flush_dns(timeout: Duration) -> Result<CommandOutput> {
    run_command("resolvectl", &["flush-caches"], timeout)
}

pub fn restart_network_manager(timeout: Duration) -> Result<CommandOutput> {
    run_command("systemctl", &["restart", "NetworkManager"], timeout)
}

/// Probes for the named packages via dpkg first, rpm second.
pub fn query_packages(names: &[String], timeout: Duration) -> Result<Vec<InstalledPackage>> {
    let mut out = Vec::new();
    for name in names {
        // Registry display names ("VMware Tools") are not Linux package
        // names; query the lowercase hyphenated form.
        let pkg = name.trim().to_ascii_lowercase().replace(' ', "-");
        if pkg.is_empty() {
            continue;
        }
        if let Ok(output) = run_command(
            "dpkg-query",
            &["-W", "-f", "${Package} ${Version}", pkg.as_str()],
            timeout,
        ) {
            if output.exit_code == 0 {
                let mut parts = output.stdout.trim().splitn(2, ' ');
                let found = parts.next().unwrap_or(&pkg).to_string();
                let version = parts.next().unwrap_or_default().to_string();
                out.push(InstalledPackage {
                    name: found.clone(),
                    version,
                    uninstall_key: found,
                });
                continue;
            }
        }
        if let Ok(output) = run_command(
            "rpm",
            &["-q", "--qf", "%{NAME} %{VERSION}", pkg.as_str()],
            timeout,
        ) {
            if output.exit_code == 0 {
                let mut parts = output.stdout.trim().splitn(2, ' ');
                let found = parts.next().unwrap_or(&pkg).to_string();
                let version = parts.next().unwrap_or_default().to_string();
                out.push(InstalledPackage {
                    name: found.clone(),
                    version,
                    uninstall_key: found,
                });
            }
        }
    }
    Ok(out)
}

pub fn uninstall_package(key: &str, timeout: Duration) -> Result<CommandOutput> {
    // Prefer the package manager that knows the package.
    if let Ok(output) = run_command("dpkg-query", &["-W", key], timeout) {
        if output.exit_code == 0 {
            return run_command("apt-get", &["-y", "purge", key], timeout);
        }
    }
    run_command("rpm", &["-e", key], timeout)
}
