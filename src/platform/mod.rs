use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::core::OsInfo;

pub mod netparse;
pub mod pnputil;
pub mod psjson;

#[cfg(windows)]
pub mod windows;

#[cfg(not(windows))]
pub mod linux;

const MAX_OUTPUT_DETAIL_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn process: {cmd}"))?;

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("failed to wait for process: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("timed out after {timeout:?}: {cmd}"));
        }
    };

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    let mut stderr = String::new();
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

pub fn effective_home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home));
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(profile));
    }
    Err(anyhow!("neither HOME nor USERPROFILE is set"))
}

/// Whether the process can perform device/driver/network mutations.
pub fn is_elevated(timeout: Duration) -> bool {
    #[cfg(unix)]
    {
        let _ = timeout;
        return unsafe { libc::geteuid() == 0 };
    }

    #[cfg(windows)]
    {
        // `net session` succeeds only from an elevated shell.
        return match run_command("net", &["session"], timeout) {
            Ok(output) => output.exit_code == 0,
            Err(_) => false,
        };
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout;
        return false;
    }
}

pub fn os_info(timeout: Duration) -> OsInfo {
    #[cfg(windows)]
    {
        return crate::platform::windows::os_info(timeout);
    }

    #[cfg(not(windows))]
    {
        return crate::platform::linux::os_info(timeout);
    }
}

/// Bound utility output before it lands in a result detail or a log entry.
pub fn truncate_output(s: &str) -> String {
    truncate_to(s, MAX_OUTPUT_DETAIL_BYTES)
}

fn truncate_to(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}\n...(truncated, total={} bytes)", s.len())
}
