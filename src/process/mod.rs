//! Access to the target process.
//!
//! This module provides:
//! - `maps`: Heap region discovery from /proc/<pid>/maps
//! - `reader`: Budgeted scatter-gather copies of remote memory
//! - `limits`: Address-space ceiling for the inspector itself

pub mod limits;
pub mod maps;
pub mod reader;

// Re-export commonly used types
pub use limits::limit_address_space;
pub use maps::{
    enumerate_heap_regions, maps_path, read_regions_from, AddressRegion, MapsError,
    MIN_REGION_BYTES,
};
pub use reader::{
    advance_cursor, plan_batch, ProcessVm, ReadBatch, RemoteChunk, RemoteMemory,
    RemoteMemoryReader, MAX_CHUNKS_PER_READ, MAX_STALLED_READS,
};
