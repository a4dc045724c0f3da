//! mc-inspector library
//!
//! Inspects a running memcached's item store without stopping it. The heap
//! is copied out of the server process in bounded blocks, items are
//! reconstructed heuristically from the raw bytes, and each one is handed
//! to a set of processors.
//!
//! # Pipeline
//!
//! - [`process`]: heap region discovery and budgeted remote copies
//! - [`memcached`]: item layout, slab table, stats snapshot, item detection
//! - [`processors`]: aggregation and dump outputs
//! - [`scan`]: the loop tying them together
//!
//! # Usage
//!
//! ```no_run
//! use mc_inspector::memcached::load_stats;
//! use mc_inspector::process::{enumerate_heap_regions, ProcessVm, RemoteMemoryReader};
//! use mc_inspector::processors::{ProcessorKind, ProcessorPipeline, ScanContext};
//! use mc_inspector::scan::{run_scan, ScanSettings};
//! use std::path::Path;
//!
//! let snapshot = load_stats(Path::new("stats.txt")).unwrap();
//! let mut pipeline = ProcessorPipeline::from_kinds(&[ProcessorKind::ItemAggregator]);
//! pipeline.initialize().unwrap();
//!
//! let mut reader = RemoteMemoryReader::new(ProcessVm::new(snapshot.pid), 64 << 20);
//! let pid = snapshot.pid;
//! let summary = run_scan(
//!     &snapshot,
//!     &mut reader,
//!     || enumerate_heap_regions(pid),
//!     || chrono::Utc::now().timestamp(),
//!     &mut pipeline,
//!     &ScanSettings::default(),
//! );
//!
//! let ctx = ScanContext { now: summary.last_now, slabs: &snapshot.slabs };
//! pipeline.finish(&ctx, &mut std::io::stdout()).unwrap();
//! ```

pub mod memcached;
pub mod process;
pub mod processors;
pub mod scan;

// Re-export main types for convenience
pub use memcached::{DetectedItem, ServerSnapshot, SlabTable};
pub use processors::{ProcessorKind, ProcessorPipeline};
pub use scan::{run_scan, ScanError, ScanSettings, ScanSummary};
