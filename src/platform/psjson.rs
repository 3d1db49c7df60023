//! Parsers for PowerShell `ConvertTo-Json` output used by the Windows
//! collaborator (uninstall registry entries, `Get-Disk`). PowerShell emits a
//! bare object for a single result and an array otherwise; both are accepted.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::core::{DiskRecord, InstalledPackage};

pub fn parse_uninstall_entries(json: &str) -> Result<Vec<InstalledPackage>> {
    let mut out = Vec::new();
    for item in parse_items(json).context("uninstall registry query returned invalid JSON")? {
        let Some(name) = string_field(&item, "DisplayName") else {
            continue;
        };
        let version = string_field(&item, "DisplayVersion").unwrap_or_default();
        let Some(key) = string_field(&item, "PSChildName") else {
            continue;
        };
        out.push(InstalledPackage {
            name,
            version,
            uninstall_key: key,
        });
    }
    Ok(out)
}

pub fn parse_get_disk(json: &str) -> Result<Vec<DiskRecord>> {
    let mut out = Vec::new();
    for item in parse_items(json).context("Get-Disk returned invalid JSON")? {
        let Some(number) = item.get("Number").and_then(Value::as_u64) else {
            continue;
        };
        let friendly_name = string_field(&item, "FriendlyName").unwrap_or_default();
        let online = string_field(&item, "OperationalStatus")
            .is_some_and(|s| s.eq_ignore_ascii_case("online"));
        let read_only = item
            .get("IsReadOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        out.push(DiskRecord {
            number: number as u32,
            friendly_name,
            online,
            read_only,
        });
    }
    Ok(out)
}

fn parse_items(json: &str) -> Result<Vec<Value>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    let s = item.get(key)?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}
