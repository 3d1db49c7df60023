//! Parsers for network configuration output: `ipconfig /all` on Windows,
//! `ip -o` and `/etc/resolv.conf` on Linux. Pure text handling, no process
//! invocation.

use std::collections::BTreeMap;

use crate::core::InterfaceRecord;

/// Parses `ipconfig /all`. Adapter sections start at column zero with
/// `... adapter <name>:`; settings are indented `Key . . . : value` lines,
/// with bare continuation lines extending list values (DNS servers).
pub fn parse_ipconfig_all(stdout: &str) -> Vec<InterfaceRecord> {
    let mut out = Vec::new();
    let mut current: Option<InterfaceRecord> = None;
    let mut pending_mask: Option<String> = None;
    let mut last_key = String::new();

    for line in stdout.lines() {
        if let Some(name) = adapter_heading(line) {
            finish_adapter(&mut out, current.take(), pending_mask.take());
            current = Some(InterfaceRecord {
                name,
                mac: String::new(),
                dhcp: false,
                addresses: vec![],
                gateway: None,
                dns: vec![],
            });
            last_key.clear();
            continue;
        }

        let Some(iface) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((key, value)) = split_setting(trimmed) {
            last_key = key.clone();
            match key.as_str() {
                "physical address" => iface.mac = value,
                "dhcp enabled" => iface.dhcp = value.eq_ignore_ascii_case("yes"),
                "ipv4 address" | "ip address" => {
                    let addr = strip_suffix_paren(&value);
                    if !addr.is_empty() {
                        iface.addresses.push(addr);
                    }
                }
                "subnet mask" => pending_mask = Some(value),
                "default gateway" => {
                    if !value.is_empty() {
                        iface.gateway = Some(value);
                    }
                }
                "dns servers" => {
                    if !value.is_empty() {
                        iface.dns.push(value);
                    }
                }
                _ => {}
            }
        } else if last_key == "dns servers" && !trimmed.is_empty() {
            iface.dns.push(trimmed.to_string());
        } else if last_key == "default gateway" && iface.gateway.is_none() {
            iface.gateway = Some(trimmed.to_string());
        }
    }
    finish_adapter(&mut out, current.take(), pending_mask.take());

    out
}

fn finish_adapter(
    out: &mut Vec<InterfaceRecord>,
    iface: Option<InterfaceRecord>,
    mask: Option<String>,
) {
    let Some(mut iface) = iface else { return };
    // ipconfig reports a dotted mask; the snapshot stores address/prefix.
    if let Some(mask) = mask {
        if let Some(prefix) = mask_to_prefix(&mask) {
            for addr in &mut iface.addresses {
                if !addr.contains('/') {
                    addr.push_str(&format!("/{prefix}"));
                }
            }
        }
    }
    out.push(iface);
}

fn adapter_heading(line: &str) -> Option<String> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let idx = line.find(" adapter ")?;
    let rest = &line[idx + " adapter ".len()..];
    let name = rest.trim().trim_end_matches(':').trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

fn split_setting(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .trim()
        .to_ascii_lowercase();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim().to_string()))
}

fn strip_suffix_paren(value: &str) -> String {
    match value.find('(') {
        Some(idx) => value[..idx].trim().to_string(),
        None => value.trim().to_string(),
    }
}

/// `255.255.255.0` -> `24`. Rejects non-contiguous masks.
pub fn mask_to_prefix(mask: &str) -> Option<u8> {
    let mut bits: u32 = 0;
    let mut octets = 0;
    for part in mask.split('.') {
        let octet: u8 = part.trim().parse().ok()?;
        bits = (bits << 8) | u32::from(octet);
        octets += 1;
    }
    if octets != 4 {
        return None;
    }
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return None;
    }
    Some(prefix as u8)
}

/// `24` -> `255.255.255.0`; used when a utility wants a dotted mask back.
pub fn prefix_to_mask(prefix: u8) -> Option<String> {
    if prefix > 32 {
        return None;
    }
    let bits: u32 = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    Some(format!(
        "{}.{}.{}.{}",
        (bits >> 24) & 0xff,
        (bits >> 16) & 0xff,
        (bits >> 8) & 0xff,
        bits & 0xff
    ))
}

/// Parses `ip -o link show`: extracts interface name and MAC per line.
pub fn parse_ip_link(stdout: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let Some(_idx) = parts.next() else { continue };
        let Some(name) = parts.next() else { continue };
        let name = name.trim_end_matches(':');
        // Drop the VLAN/master suffix (`eth0@if2`).
        let name = name.split('@').next().unwrap_or(name).to_string();
        let mut mac = String::new();
        let mut rest = parts.peekable();
        while let Some(tok) = rest.next() {
            if tok.starts_with("link/") {
                if let Some(addr) = rest.peek() {
                    mac = (*addr).to_string();
                }
                break;
            }
        }
        out.push((name, mac));
    }
    out
}

/// Parses `ip -o -4 addr show`: per interface, collects `addr/prefix` plus
/// whether any address is flagged `dynamic` (DHCP-assigned).
pub fn parse_ip_addr(stdout: &str) -> BTreeMap<String, (Vec<String>, bool)> {
    let mut out: BTreeMap<String, (Vec<String>, bool)> = BTreeMap::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let Some(_idx) = parts.next() else { continue };
        let Some(name) = parts.next() else { continue };
        let Some(family) = parts.next() else { continue };
        if family != "inet" {
            continue;
        }
        let Some(addr) = parts.next() else { continue };
        let dynamic = line.split_whitespace().any(|t| t == "dynamic");
        let entry = out.entry(name.to_string()).or_default();
        entry.0.push(addr.to_string());
        entry.1 |= dynamic;
    }
    out
}

/// Parses `ip route show default`: maps device name to gateway address.
pub fn parse_default_routes(stdout: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in stdout.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&"default") {
            continue;
        }
        let via = tokens
            .iter()
            .position(|t| *t == "via")
            .and_then(|i| tokens.get(i + 1));
        let dev = tokens
            .iter()
            .position(|t| *t == "dev")
            .and_then(|i| tokens.get(i + 1));
        if let (Some(via), Some(dev)) = (via, dev) {
            out.entry((*dev).to_string())
                .or_insert_with(|| (*via).to_string());
        }
    }
    out
}

pub fn parse_resolv_conf(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("nameserver") {
            let addr = rest.trim();
            if !addr.is_empty() {
                out.push(addr.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPCONFIG_ALL: &str = "\
Windows IP Configuration

   Host Name . . . . . . . . . . . . : WEB01
   Primary Dns Suffix  . . . . . . . :

Ethernet adapter Ethernet0:

   Connection-specific DNS Suffix  . : corp.example
   Description . . . . . . . . . . . : vmxnet3 Ethernet Adapter
   Physical Address. . . . . . . . . : 00-50-56-9A-1B-2C
   DHCP Enabled. . . . . . . . . . . : No
   IPv4 Address. . . . . . . . . . . : 192.168.10.20(Preferred)
   Subnet Mask . . . . . . . . . . . : 255.255.255.0
   Default Gateway . . . . . . . . . : 192.168.10.1
   DNS Servers . . . . . . . . . . . : 192.168.10.5
                                       192.168.10.6

Ethernet adapter Ethernet1:

   Description . . . . . . . . . . . : Hyper-V Network Adapter
   Physical Address. . . . . . . . . : 00-15-5D-00-01-02
   DHCP Enabled. . . . . . . . . . . : Yes
   IPv4 Address. . . . . . . . . . . : 10.0.0.7(Preferred)
   Subnet Mask . . . . . . . . . . . : 255.255.0.0
   Default Gateway . . . . . . . . . :
";

    #[test]
    fn parse_ipconfig_all_reads_static_adapter() {
        let ifaces = parse_ipconfig_all(IPCONFIG_ALL);
        assert_eq!(ifaces.len(), 2);

        let eth0 = &ifaces[0];
        assert_eq!(eth0.name, "Ethernet0");
        assert_eq!(eth0.mac, "00-50-56-9A-1B-2C");
        assert!(!eth0.dhcp);
        assert_eq!(eth0.addresses, vec!["192.168.10.20/24".to_string()]);
        assert_eq!(eth0.gateway.as_deref(), Some("192.168.10.1"));
        assert_eq!(eth0.dns, vec!["192.168.10.5", "192.168.10.6"]);
    }

    #[test]
    fn parse_ipconfig_all_reads_dhcp_adapter_without_gateway() {
        let ifaces = parse_ipconfig_all(IPCONFIG_ALL);
        let eth1 = &ifaces[1];
        assert!(eth1.dhcp);
        assert_eq!(eth1.addresses, vec!["10.0.0.7/16".to_string()]);
        assert!(eth1.gateway.is_none());
    }

    #[test]
    fn mask_prefix_conversions_round_trip() {
        assert_eq!(mask_to_prefix("255.255.255.0"), Some(24));
        assert_eq!(mask_to_prefix("255.255.0.0"), Some(16));
        assert_eq!(mask_to_prefix("255.0.255.0"), None);
        assert_eq!(prefix_to_mask(24).as_deref(), Some("255.255.255.0"));
        assert_eq!(prefix_to_mask(0).as_deref(), Some("0.0.0.0"));
        assert_eq!(prefix_to_mask(33), None);
    }

    #[test]
    fn parse_ip_link_extracts_name_and_mac() {
        let out = parse_ip_link(
            "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq state UP mode DEFAULT group default qlen 1000\\    link/ether 52:54:00:12:34:56 brd ff:ff:ff:ff:ff:ff\n",
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "eth0");
        assert_eq!(out[0].1, "52:54:00:12:34:56");
    }

    #[test]
    fn parse_ip_addr_collects_addresses_and_dynamic_flag() {
        let out = parse_ip_addr(
            "2: eth0    inet 192.168.1.10/24 brd 192.168.1.255 scope global dynamic noprefixroute eth0\\       valid_lft 85031sec preferred_lft 85031sec\n3: eth1    inet 10.0.0.2/8 scope global eth1\\       valid_lft forever preferred_lft forever\n",
        );
        let eth0 = out.get("eth0").expect("eth0");
        assert_eq!(eth0.0, vec!["192.168.1.10/24".to_string()]);
        assert!(eth0.1);
        let eth1 = out.get("eth1").expect("eth1");
        assert!(!eth1.1);
    }

    #[test]
    fn parse_default_routes_maps_dev_to_gateway() {
        let out = parse_default_routes(
            "default via 192.168.1.1 dev eth0 proto dhcp metric 100\ndefault via 10.0.0.1 dev eth1\n",
        );
        assert_eq!(out.get("eth0").map(String::as_str), Some("192.168.1.1"));
        assert_eq!(out.get("eth1").map(String::as_str), Some("10.0.0.1"));
    }

    #[test]
    fn parse_resolv_conf_reads_nameservers() {
        let out = parse_resolv_conf("# comment\nnameserver 1.1.1.1\nsearch corp\nnameserver 8.8.8.8\n");
        assert_eq!(out, vec!["1.1.1.1", "8.8.8.8"]);
    }
}
