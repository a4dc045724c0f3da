//! Shared fixtures: synthetic memcached items and an in-memory target heap.

#![allow(dead_code)]

use mc_inspector::memcached::{ItemHeader, ItemLayout, ServerSnapshot, SlabTable};
use mc_inspector::process::{AddressRegion, RemoteChunk, RemoteMemory};

/// Zero bytes placed around synthetic records.
pub const PAD: usize = 16;

/// One item as memcached would lay it out in a slab chunk.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    pub key: &'a str,
    pub time: u32,
    pub exptime: u32,
    /// Payload length including "\r\n".
    pub nbytes: u32,
    pub class: u8,
    pub cas: u64,
    /// Overrides the header's key length.
    pub nkey: Option<u8>,
}

impl<'a> Record<'a> {
    pub fn new(key: &'a str) -> Self {
        Self {
            key,
            time: 100,
            exptime: 0,
            nbytes: 10,
            class: 1,
            cas: 0,
            nkey: None,
        }
    }

    pub fn bytes(&self, layout: ItemLayout) -> Vec<u8> {
        let data_len = self.nbytes.saturating_sub(2) as usize;
        let suffix = format!(" 0 {}\r\n", data_len);
        let header = ItemHeader {
            time: self.time,
            exptime: self.exptime,
            nbytes: self.nbytes,
            nsuffix: suffix.len() as u8,
            slabs_clsid: self.class,
            nkey: self.nkey.unwrap_or(self.key.len() as u8),
            cas: self.cas,
        };

        let mut out = header.to_bytes(layout);
        out.extend_from_slice(self.key.as_bytes());
        out.push(0);
        out.extend_from_slice(suffix.as_bytes());
        out.extend(std::iter::repeat(b'v').take(data_len));
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Concatenates records with zero padding before, between and after them.
pub fn heap(layout: ItemLayout, records: &[Record<'_>]) -> Vec<u8> {
    let mut out = vec![0u8; PAD];
    for r in records {
        out.extend(r.bytes(layout));
        out.extend(std::iter::repeat(0u8).take(PAD));
    }
    out
}

pub fn slabs() -> SlabTable {
    let mut table = SlabTable::new();
    table.get_mut(1).unwrap().unit_size = 96;
    table.get_mut(2).unwrap().unit_size = 120;
    table
}

/// Snapshot whose relative clock reads `now` at unix time `1_000_000`.
pub fn snapshot(cas_enabled: bool, now: u32) -> ServerSnapshot {
    ServerSnapshot {
        pid: 4242,
        cas_enabled,
        time: 1_000_000,
        uptime: now as i64,
        curr_items: 10,
        slabs: slabs(),
    }
}

pub const CLOCK: i64 = 1_000_000;

/// Target memory backed by a local vector mapped at `base`.
pub struct FakeHeap {
    pub base: u64,
    pub bytes: Vec<u8>,
    /// Caps the bytes copied per call, simulating partial reads.
    pub max_per_call: Option<usize>,
}

impl FakeHeap {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes,
            max_per_call: None,
        }
    }

    pub fn region(&self) -> AddressRegion {
        AddressRegion::new(self.base, self.base + self.bytes.len() as u64)
    }
}

impl RemoteMemory for FakeHeap {
    fn copy_into(&self, local: &mut [u8], chunks: &[RemoteChunk]) -> usize {
        let cap = self.max_per_call.unwrap_or(usize::MAX).min(local.len());
        let mut written = 0usize;
        for chunk in chunks {
            let Some(start) = chunk.address.checked_sub(self.base) else {
                break;
            };
            let start = start as usize;
            if start >= self.bytes.len() {
                break;
            }
            let n = (chunk.len as usize)
                .min(self.bytes.len() - start)
                .min(cap - written);
            local[written..written + n].copy_from_slice(&self.bytes[start..start + n]);
            written += n;
            if n < chunk.len as usize || written == cap {
                break;
            }
        }
        written
    }
}

/// Target whose every copy fails.
pub struct DeadTarget;

impl RemoteMemory for DeadTarget {
    fn copy_into(&self, _local: &mut [u8], _chunks: &[RemoteChunk]) -> usize {
        0
    }
}
