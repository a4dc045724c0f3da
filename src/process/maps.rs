//! Heap region discovery from `/proc/<pid>/maps`.
//!
//! Only private, writable, anonymous mappings of at least
//! [`MIN_REGION_BYTES`] are kept. That is where memcached's slab pages live.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mappings smaller than this are never slab pages.
pub const MIN_REGION_BYTES: u64 = 128 * 1024;

/// A contiguous range `[low, high)` in the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRegion {
    pub low: u64,
    pub high: u64,
}

impl AddressRegion {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn size(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    /// True when this region lies entirely before `other` starts.
    pub fn precedes(&self, other: &AddressRegion) -> bool {
        self.low < other.low && self.high <= other.low
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapsError {
    #[error("cannot open memory map {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parses a single maps line, returning the region when it looks like heap.
///
/// Format: `7f7f14000000-7f7f17ffa000 rw-p 00000000 00:00 0`
pub fn parse_maps_line(line: &str) -> Option<AddressRegion> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    if parts[1] != "rw-p" || parts[4] != "0" {
        return None;
    }

    let (lo, hi) = parts[0].split_once('-')?;
    let low = u64::from_str_radix(lo, 16).ok()?;
    let high = u64::from_str_radix(hi, 16).ok()?;
    if high <= low {
        return None;
    }

    let region = AddressRegion::new(low, high);
    if region.size() < MIN_REGION_BYTES {
        return None;
    }
    Some(region)
}

/// Reads heap-like regions from any maps-formatted file, sorted by `low`.
pub fn read_regions_from(path: &Path) -> Result<Vec<AddressRegion>, MapsError> {
    let file = fs::File::open(path).map_err(|source| MapsError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut regions: Vec<AddressRegion> = reader
        .lines()
        .map_while(Result::ok)
        .filter_map(|l| parse_maps_line(&l))
        .collect();
    regions.sort_by_key(|r| r.low);
    Ok(regions)
}

pub fn maps_path(pid: i32) -> PathBuf {
    PathBuf::from(format!("/proc/{}/maps", pid))
}

/// Lists the heap regions of a live process.
///
/// A vanished or unreadable target yields an empty list so the scan loop
/// winds down instead of failing.
pub fn enumerate_heap_regions(pid: i32) -> Vec<AddressRegion> {
    match read_regions_from(&maps_path(pid)) {
        Ok(regions) => regions,
        Err(e) => {
            debug!("No regions for pid {}: {}", pid, e);
            Vec::new()
        }
    }
}
