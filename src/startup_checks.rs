//! Startup requirement validation for mc-inspector.
//!
//! Copying another process's memory needs ptrace access to it. This module
//! checks for that before any scan buffer is allocated.

use mc_inspector::process::{maps_path, read_regions_from};
use nix::unistd::geteuid;
use std::fs;
use tracing::{debug, info, warn};

const PTRACE_SCOPE: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Returns whether we run as root; errors when ptrace is disabled outright.
pub fn check_ptrace_privileges() -> Result<bool, ValidationError> {
    let scope = fs::read_to_string(PTRACE_SCOPE)
        .ok()
        .and_then(|s| s.trim().parse::<u8>().ok());
    debug!("ptrace_scope: {:?}", scope);

    if scope == Some(3) {
        return Err(ValidationError::PtraceDisabled);
    }

    if geteuid().is_root() {
        info!("✅ Running as root (uid=0)");
        Ok(true)
    } else {
        warn!("⚠️  Not running as root - reading memcached memory may be denied");
        warn!("   Recommendation: run as root or grant cap_sys_ptrace");
        Ok(false)
    }
}

/// Reads the target's memory map and returns the number of heap regions.
pub fn check_maps_access(pid: i32) -> Result<usize, ValidationError> {
    let path = maps_path(pid);
    if !path.exists() {
        return Err(ValidationError::NoSuchProcess(pid));
    }
    let regions =
        read_regions_from(&path).map_err(|e| ValidationError::InsufficientPermissions(e.to_string()))?;
    if regions.is_empty() {
        warn!("⚠️  pid {} has no heap regions of interest", pid);
    }
    Ok(regions.len())
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("No such process: {0}")]
    NoSuchProcess(i32),

    #[error("ptrace is disabled system-wide (kernel.yama.ptrace_scope = 3)")]
    PtraceDisabled,
}
