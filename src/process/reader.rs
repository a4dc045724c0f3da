//! Budget-bounded, resumable copying of a target's heap.
//!
//! Each call to [`RemoteMemoryReader::read_next`] packs as many
//! `(address, length)` chunks as fit into the scan budget, starting at the
//! resume cursor, and copies them with a single scatter-gather call. The
//! cursor only ever moves forward.

use crate::process::maps::AddressRegion;
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;
use std::io::IoSliceMut;
use tracing::{debug, warn};

/// Upper bound on remote descriptors per copy (the kernel's IOV_MAX).
pub const MAX_CHUNKS_PER_READ: usize = 1024;

/// Consecutive zero-byte reads at one cursor before the region is skipped.
pub const MAX_STALLED_READS: u32 = 3;

/// One remote `(address, length)` descriptor of a batched copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteChunk {
    pub address: u64,
    pub len: u64,
}

/// Source of remote bytes.
pub trait RemoteMemory {
    /// Copies `chunks` in order into `local` and returns the bytes copied.
    /// Failures of any kind report zero.
    fn copy_into(&self, local: &mut [u8], chunks: &[RemoteChunk]) -> usize;
}

/// Live process accessed through `process_vm_readv(2)`.
pub struct ProcessVm {
    pid: Pid,
}

impl ProcessVm {
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }
}

impl RemoteMemory for ProcessVm {
    fn copy_into(&self, local: &mut [u8], chunks: &[RemoteChunk]) -> usize {
        let remote: Vec<RemoteIoVec> = chunks
            .iter()
            .map(|c| RemoteIoVec {
                base: c.address as usize,
                len: c.len as usize,
            })
            .collect();
        let mut local_iov = [IoSliceMut::new(local)];

        match process_vm_readv(self.pid, &mut local_iov, &remote) {
            Ok(n) => n,
            Err(e) => {
                debug!("process_vm_readv on pid {} failed: {}", self.pid, e);
                0
            }
        }
    }
}

/// Index of the first region that does not lie entirely before `cursor`.
pub fn first_region_at_or_after(regions: &[AddressRegion], cursor: u64) -> Option<usize> {
    let needle = AddressRegion::new(cursor, cursor);
    let idx = regions.partition_point(|r| r.precedes(&needle));
    (idx < regions.len()).then_some(idx)
}

/// Greedily packs chunks from `cursor` onward until `budget` bytes are
/// requested or the regions run out.
pub fn plan_batch(regions: &[AddressRegion], cursor: u64, budget: u64) -> Vec<RemoteChunk> {
    let mut chunks = Vec::new();
    let Some(first) = first_region_at_or_after(regions, cursor) else {
        return chunks;
    };

    let mut requested = 0u64;
    for (n, region) in regions[first..].iter().enumerate() {
        if requested >= budget || chunks.len() >= MAX_CHUNKS_PER_READ {
            break;
        }
        let start = if n == 0 {
            region.low.max(cursor)
        } else {
            region.low
        };
        let len = (budget - requested).min(region.high.saturating_sub(start));
        if len == 0 {
            continue;
        }
        chunks.push(RemoteChunk {
            address: start,
            len,
        });
        requested += len;
    }
    chunks
}

/// Walks the requested chunks in order, consuming `copied` bytes, and
/// returns the address right after the last byte actually copied.
pub fn advance_cursor(chunks: &[RemoteChunk], copied: u64) -> Option<u64> {
    let mut left = copied;
    let mut cursor = None;
    for chunk in chunks {
        if chunk.len >= left {
            cursor = Some(chunk.address + left);
            break;
        }
        cursor = Some(chunk.address + chunk.len);
        left -= chunk.len;
    }
    cursor
}

/// Result of one batched copy.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    pub bytes_copied: usize,
    pub cursor: u64,
    pub chunks: Vec<RemoteChunk>,
}

/// Copies a target's heap block by block into one reusable buffer.
pub struct RemoteMemoryReader<M> {
    memory: M,
    buffer: Vec<u8>,
    copied: usize,
    cursor: u64,
    total_read: u64,
    stalled: u32,
}

impl<M: RemoteMemory> RemoteMemoryReader<M> {
    /// Allocates the local buffer, sized exactly to `budget` bytes.
    pub fn new(memory: M, budget: usize) -> Self {
        Self {
            memory,
            buffer: vec![0u8; budget.max(1)],
            copied: 0,
            cursor: 0,
            total_read: 0,
            stalled: 0,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    pub fn budget(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes copied by the most recent [`read_next`](Self::read_next).
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.copied]
    }

    /// Copies the next block. `None` means no region remains at or after
    /// the cursor, which ends the scan.
    pub fn read_next(&mut self, regions: &[AddressRegion]) -> Option<ReadBatch> {
        let chunks = plan_batch(regions, self.cursor, self.buffer.len() as u64);
        if chunks.is_empty() {
            self.copied = 0;
            return None;
        }

        let copied = self
            .memory
            .copy_into(&mut self.buffer, &chunks)
            .min(self.buffer.len());
        self.copied = copied;
        self.total_read += copied as u64;

        if let Some(next) = advance_cursor(&chunks, copied as u64) {
            self.cursor = self.cursor.max(next);
        }

        if copied == 0 {
            self.note_stall(regions);
        } else {
            self.stalled = 0;
        }

        Some(ReadBatch {
            bytes_copied: copied,
            cursor: self.cursor,
            chunks,
        })
    }

    fn note_stall(&mut self, regions: &[AddressRegion]) {
        self.stalled += 1;
        if self.stalled < MAX_STALLED_READS {
            return;
        }
        self.stalled = 0;
        if let Some(idx) = first_region_at_or_after(regions, self.cursor) {
            let region = regions[idx];
            warn!(
                "No progress at {:#x} after {} reads, skipping region {:#x}-{:#x}",
                self.cursor, MAX_STALLED_READS, region.low, region.high
            );
            self.cursor = self.cursor.max(region.high);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> Vec<AddressRegion> {
        vec![
            AddressRegion::new(0x1000, 0x2000),
            AddressRegion::new(0x5000, 0x5800),
            AddressRegion::new(0x9000, 0xa000),
        ]
    }

    #[test]
    fn test_first_region_lookup() {
        let r = regions();
        assert_eq!(first_region_at_or_after(&r, 0), Some(0));
        assert_eq!(first_region_at_or_after(&r, 0x1800), Some(0));
        // a region ending exactly at the cursor is behind it
        assert_eq!(first_region_at_or_after(&r, 0x2000), Some(1));
        assert_eq!(first_region_at_or_after(&r, 0x3000), Some(1));
        assert_eq!(first_region_at_or_after(&r, 0xa000), None);
    }

    #[test]
    fn test_plan_batch_spans_regions() {
        let chunks = plan_batch(&regions(), 0x1800, 0x1000);
        assert_eq!(
            chunks,
            vec![
                RemoteChunk {
                    address: 0x1800,
                    len: 0x800
                },
                RemoteChunk {
                    address: 0x5000,
                    len: 0x800
                },
            ]
        );
    }

    #[test]
    fn test_plan_batch_truncates_to_budget() {
        let chunks = plan_batch(&regions(), 0, 0x400);
        assert_eq!(
            chunks,
            vec![RemoteChunk {
                address: 0x1000,
                len: 0x400
            }]
        );
    }

    #[test]
    fn test_advance_cursor_partial_chunk() {
        let chunks = plan_batch(&regions(), 0, 0x10000);
        assert_eq!(advance_cursor(&chunks, 0x1000), Some(0x2000));
        assert_eq!(advance_cursor(&chunks, 0x1100), Some(0x5100));
        assert_eq!(advance_cursor(&chunks, 0), Some(0x1000));
        assert_eq!(advance_cursor(&chunks, 0x2800), Some(0xa000));
    }

    #[test]
    fn test_advance_cursor_stops_on_chunk_end() {
        let chunks = plan_batch(&regions(), 0, 0x10000);
        // a copy ending on a chunk boundary must not jump to the next chunk
        assert_eq!(advance_cursor(&chunks, 0x1800), Some(0x5800));
        assert_eq!(advance_cursor(&chunks, 0x1000), Some(0x2000));
    }
}
