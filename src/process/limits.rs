//! Self-imposed resource ceilings.

use nix::sys::resource::{getrlimit, setrlimit, Resource};
use tracing::{debug, warn};

/// Caps this process's address space at `bytes` (soft and hard limit).
///
/// Must run before the scan buffer is allocated.
pub fn limit_address_space(bytes: u64) -> nix::Result<()> {
    match getrlimit(Resource::RLIMIT_AS) {
        Ok((soft, hard)) => debug!("Current RLIMIT_AS soft={} hard={}", soft, hard),
        Err(e) => warn!("Failed to read RLIMIT_AS: {}", e),
    }
    setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    debug!("RLIMIT_AS set to {} bytes", bytes);
    Ok(())
}
