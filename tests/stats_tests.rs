//! Integration test: a stats dump on disk configures a complete scan.

mod common;

use common::{heap, FakeHeap, Record};
use mc_inspector::memcached::{load_stats, ItemLayout};
use mc_inspector::processors::{ProcessorKind, ProcessorPipeline};
use mc_inspector::scan::{run_scan, ScanSettings};
use std::fs;

#[test]
fn test_stats_file_drives_scan() {
    let dir = tempfile::tempdir().unwrap();
    let stats = dir.path().join("stats.txt");
    fs::write(
        &stats,
        "STAT pid 3245\r\n\
         STAT uptime 500\r\n\
         STAT time 1700000000\r\n\
         STAT curr_items 4\r\n\
         END\r\n\
         STAT 1:chunk_size 96\r\n\
         STAT 1:total_chunks 10922\r\n\
         STAT 3:chunk_size 152\r\n\
         END\r\n\
         STAT items:1:age 480\r\n\
         END\r\n\
         STAT cas_enabled no\r\n\
         END\r\n",
    )
    .unwrap();

    let snap = load_stats(&stats).unwrap();
    assert!(!snap.cas_enabled);
    assert_eq!(snap.slabs.unit_size(3), 152);

    // the layout must follow the dump's cas setting
    let layout = ItemLayout::new(snap.cas_enabled);
    let bytes = heap(
        layout,
        &[
            Record::new("feed:1"),
            Record {
                class: 3,
                nbytes: 120,
                ..Record::new("feed:2")
            },
        ],
    );
    let target = FakeHeap::new(0x1000, bytes);
    let regions = vec![target.region()];
    let mut reader = mc_inspector::process::RemoteMemoryReader::new(target, 1 << 16);
    let mut pipeline = ProcessorPipeline::from_kinds(&[ProcessorKind::ItemAggregator]);

    let summary = run_scan(
        &snap,
        &mut reader,
        || regions.clone(),
        || 1_700_000_000,
        &mut pipeline,
        &ScanSettings::default(),
    );
    assert_eq!(summary.last_now, 500);
    assert_eq!(summary.keys_found, 2);
    assert_eq!(summary.found_percent(), 50.0);
}
