//! Inspect command implementation.
//!
//! Scans the heap of the memcached process named in the stats file and
//! hands every detected item to the selected processors.

use std::io::{self, Write};
use std::path::Path;

use anyhow::bail;
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::startup_checks::check_ptrace_privileges;
use mc_inspector::memcached::load_stats;
use mc_inspector::process::{
    enumerate_heap_regions, limit_address_space, maps_path, read_regions_from, ProcessVm,
    RemoteMemoryReader,
};
use mc_inspector::processors::{ProcessorPipeline, ScanContext};
use mc_inspector::{run_scan, ScanError, ScanSummary};

/// Runs a full scan and prints the report to stdout.
///
/// Target failures exit with status 2, configuration failures with 1.
pub fn command_inspect(config: &Config) -> anyhow::Result<()> {
    let Some(stats_file) = config.stats_file.as_deref() else {
        bail!("--stats-file is required");
    };
    check_ptrace_privileges()?;
    let mut pipeline = config.build_pipeline()?;

    match scan(stats_file, config, &mut pipeline) {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn scan(
    stats_file: &Path,
    config: &Config,
    pipeline: &mut ProcessorPipeline,
) -> Result<ScanSummary, ScanError> {
    pipeline
        .initialize()
        .map_err(|(kind, e)| ScanError::processor(kind, e))?;

    let snapshot = load_stats(stats_file)?;
    info!(
        "memcached pid={} cas_enabled={} curr_items={} uptime={}s",
        snapshot.pid, snapshot.cas_enabled, snapshot.curr_items, snapshot.uptime
    );

    // Fail early if the target is gone or its map is off limits
    let regions = read_regions_from(&maps_path(snapshot.pid))?;
    info!(
        "{} heap regions, {} MBytes",
        regions.len(),
        regions.iter().map(|r| r.size()).sum::<u64>() >> 20
    );

    let limit = config.mem_limit_bytes();
    limit_address_space(limit)
        .map_err(|source| ScanError::AddressLimit { bytes: limit, source })?;

    let mut reader = RemoteMemoryReader::new(
        ProcessVm::new(snapshot.pid),
        config.scan_block_bytes() as usize,
    );
    let pid = snapshot.pid;
    let summary = run_scan(
        &snapshot,
        &mut reader,
        || enumerate_heap_regions(pid),
        || Utc::now().timestamp(),
        pipeline,
        &config.scan_settings(),
    );

    let ctx = ScanContext {
        now: summary.last_now,
        slabs: &snapshot.slabs,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    pipeline.finish(&ctx, &mut out)?;
    out.flush()?;

    Ok(summary)
}

fn print_summary(summary: &ScanSummary) {
    info!(
        "Time spent: copying {}us, detecting {}us",
        summary.copy_time.as_micros(),
        summary.detect_time.as_micros()
    );
    info!(
        "Scanned {} KBytes in {} iterations",
        summary.bytes_read / 1024,
        summary.iterations
    );
    info!(
        "Detected {} keys, {:.2}% of {} known by the server",
        summary.keys_found,
        summary.found_percent(),
        summary.keys_known
    );
}
