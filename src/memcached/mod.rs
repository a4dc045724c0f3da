//! Knowledge about the target server: item layout, slab classes, the stats
//! snapshot and item detection.
//!
//! This module provides:
//! - `layout`: Fixed byte layout of an item header
//! - `slabs`: Per-size-class metadata table
//! - `stats`: Parser for captured `stats` console output
//! - `detector`: Item reconstruction from copied heap bytes

pub mod detector;
pub mod layout;
pub mod slabs;
pub mod stats;

// Re-export commonly used types
pub use detector::{category_of, DetectedItem, ItemDetector, ItemScanner, UNKNOWN_CATEGORY};
pub use layout::{ItemHeader, ItemLayout};
pub use slabs::{SlabClassInfo, SlabTable, SLAB_TABLE_SIZE};
pub use stats::{load_stats, parse_stats, ServerSnapshot, StatsError};
