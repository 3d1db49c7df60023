//! Parsers for `pnputil` block output. Pure functions so they compile and
//! test on every platform; the cfg-gated invokers live in `windows.rs`.

use crate::core::{DeviceRecord, DriverPackageRecord};

/// `ERROR_SUCCESS_REBOOT_REQUIRED`: the operation succeeded but a restart is
/// pending. Distinct from failure.
pub const REBOOT_REQUIRED_EXIT_CODE: i32 = 3010;

/// Parses `pnputil /enum-devices` output: one blank-line-separated block per
/// device, `Key: value` lines within a block.
pub fn parse_enum_devices(stdout: &str) -> Vec<DeviceRecord> {
    let mut out = Vec::new();

    let mut instance_id = None::<String>;
    let mut description = None::<String>;
    let mut class = None::<String>;
    let mut status = None::<String>;

    let mut flush =
        |instance_id: &mut Option<String>,
         description: &mut Option<String>,
         class: &mut Option<String>,
         status: &mut Option<String>| {
            if let Some(id) = instance_id.take() {
                out.push(DeviceRecord {
                    instance_id: id,
                    class: class.take().unwrap_or_default(),
                    description: description.take().unwrap_or_default(),
                    present: status
                        .take()
                        .is_none_or(|s| !s.eq_ignore_ascii_case("disconnected")),
                });
            } else {
                description.take();
                class.take();
                status.take();
            }
        };

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut instance_id, &mut description, &mut class, &mut status);
            continue;
        }
        let Some((key, value)) = split_field(trimmed) else {
            continue;
        };
        match key.as_str() {
            "instance id" => {
                // A new block can start without a separating blank line.
                if instance_id.is_some() {
                    flush(&mut instance_id, &mut description, &mut class, &mut status);
                }
                instance_id = Some(value);
            }
            "device description" => description = Some(value),
            "class name" => class = Some(value),
            "status" => status = Some(value),
            _ => {}
        }
    }
    flush(&mut instance_id, &mut description, &mut class, &mut status);

    out
}

/// Parses `pnputil /enum-drivers` output into driver-store packages.
pub fn parse_enum_drivers(stdout: &str) -> Vec<DriverPackageRecord> {
    let mut out = Vec::new();

    let mut published = None::<String>;
    let mut original = None::<String>;
    let mut provider = None::<String>;
    let mut class = None::<String>;

    let mut flush = |published: &mut Option<String>,
                     original: &mut Option<String>,
                     provider: &mut Option<String>,
                     class: &mut Option<String>| {
        if let Some(name) = published.take() {
            out.push(DriverPackageRecord {
                published_name: name,
                original_name: original.take().unwrap_or_default(),
                provider: provider.take().unwrap_or_default(),
                class: class.take().unwrap_or_default(),
            });
        } else {
            original.take();
            provider.take();
            class.take();
        }
    };

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut published, &mut original, &mut provider, &mut class);
            continue;
        }
        let Some((key, value)) = split_field(trimmed) else {
            continue;
        };
        match key.as_str() {
            "published name" => {
                if published.is_some() {
                    flush(&mut published, &mut original, &mut provider, &mut class);
                }
                published = Some(value);
            }
            "original name" => original = Some(value),
            "provider name" => provider = Some(value),
            "class name" => class = Some(value),
            _ => {}
        }
    }
    flush(&mut published, &mut original, &mut provider, &mut class);

    out
}

fn split_field(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    Some((
        key.trim().to_ascii_lowercase(),
        value.trim().to_string(),
    ))
}
