//! The scan loop: enumerate, copy one block, detect, dispatch, repeat.
//!
//! Everything runs on the calling thread. The loop ends when no heap region
//! remains past the resume cursor, or once the key limit is reached.

use crate::memcached::{ItemDetector, ItemLayout, ServerSnapshot, StatsError};
use crate::process::{AddressRegion, MapsError, RemoteMemory, RemoteMemoryReader};
use crate::processors::{ProcessorError, ProcessorKind, ProcessorPipeline, ScanContext};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Failures that prevent a scan from starting or reporting.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{kind}: {source}")]
    Processor {
        kind: &'static str,
        #[source]
        source: ProcessorError,
    },

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Maps(#[from] MapsError),

    #[error("cannot limit address space to {bytes} bytes: {source}")]
    AddressLimit {
        bytes: u64,
        #[source]
        source: nix::Error,
    },

    #[error("cannot write report: {0}")]
    Report(#[from] std::io::Error),
}

impl ScanError {
    pub fn processor(kind: ProcessorKind, source: ProcessorError) -> Self {
        ScanError::Processor {
            kind: kind.name(),
            source,
        }
    }

    /// Process exit code: 2 when the target can't be reached, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::Stats(_) | ScanError::Maps(_) => 2,
            _ => 1,
        }
    }
}

/// Knobs of a single scan run.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Stop once this many items have been detected.
    pub keys_limit: Option<u64>,
    /// Byte splitting a key's category prefix from the rest.
    pub delimiter: u8,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            keys_limit: None,
            delimiter: b':',
        }
    }
}

/// Totals reported when the scan ends.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub iterations: u64,
    pub bytes_read: u64,
    pub keys_found: u64,
    /// `curr_items` from the stats snapshot.
    pub keys_known: u64,
    pub copy_time: Duration,
    pub detect_time: Duration,
    /// Server relative clock at the last tick.
    pub last_now: u32,
}

impl ScanSummary {
    /// Detected keys as a percentage of the keys the server reported.
    pub fn found_percent(&self) -> f64 {
        if self.keys_known == 0 {
            0.0
        } else {
            self.keys_found as f64 * 100.0 / self.keys_known as f64
        }
    }
}

/// Runs the scan to completion.
///
/// `regions` is called at the top of every iteration since the target's map
/// can change while we scan. `clock` returns the current unix time.
pub fn run_scan<M, R, C>(
    snapshot: &ServerSnapshot,
    reader: &mut RemoteMemoryReader<M>,
    mut regions: R,
    mut clock: C,
    pipeline: &mut ProcessorPipeline,
    settings: &ScanSettings,
) -> ScanSummary
where
    M: RemoteMemory,
    R: FnMut() -> Vec<AddressRegion>,
    C: FnMut() -> i64,
{
    let layout = ItemLayout::new(snapshot.cas_enabled);
    let detector = ItemDetector::new(layout, settings.delimiter, &snapshot.slabs);
    let mut summary = ScanSummary {
        keys_known: snapshot.curr_items,
        last_now: snapshot.relative_time(clock()),
        ..Default::default()
    };

    loop {
        let regions = regions();
        let heap_bytes: u64 = regions.iter().map(|r| r.size()).sum();

        let started = Instant::now();
        let Some(batch) = reader.read_next(&regions) else {
            debug!("No region past {:#x}, scan complete", reader.cursor());
            break;
        };
        summary.copy_time += started.elapsed();
        summary.iterations += 1;
        summary.bytes_read = reader.total_read();

        info!(
            "read {} KBytes ({:.1}%)",
            batch.bytes_copied / 1024,
            if heap_bytes == 0 {
                0.0
            } else {
                reader.total_read() as f64 * 100.0 / heap_bytes as f64
            }
        );
        debug!(
            "{} chunks requested, cursor now {:#x}",
            batch.chunks.len(),
            batch.cursor
        );

        let started = Instant::now();
        let now = snapshot.relative_time(clock());
        summary.last_now = now;
        let ctx = ScanContext {
            now,
            slabs: &snapshot.slabs,
        };
        for item in detector.scan(reader.data(), now) {
            summary.keys_found += 1;
            pipeline.dispatch(&item, &ctx);
        }
        summary.detect_time += started.elapsed();

        if let Some(limit) = settings.keys_limit {
            if summary.keys_found >= limit {
                info!("Key limit {} reached, stopping scan", limit);
                break;
            }
        }
    }

    summary
}
