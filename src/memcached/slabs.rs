//! Per-size-class layout of the target's slab allocator.

/// Highest slab class id the target allocates.
pub const MAX_SLAB_CLASS_ID: usize = 63;

/// Table length: every class id up to [`MAX_SLAB_CLASS_ID`] plus a sentinel.
pub const SLAB_TABLE_SIZE: usize = MAX_SLAB_CLASS_ID + 1;

/// Metadata for one size class, as reported by `stats slabs` / `stats items`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabClassInfo {
    /// Chunk size in bytes (`chunk_size`).
    pub unit_size: u64,
    /// Number of chunks (`total_chunks`).
    pub slot_count: u64,
    /// Bytes requested by stored items (`mem_requested`).
    pub allocated_size: u64,
    /// Seconds since the oldest item in the class was touched (`age`).
    pub oldest_age: u32,
}

/// Read-only after the stats snapshot has been loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabTable {
    classes: [SlabClassInfo; SLAB_TABLE_SIZE],
}

impl Default for SlabTable {
    fn default() -> Self {
        Self {
            classes: [SlabClassInfo::default(); SLAB_TABLE_SIZE],
        }
    }
}

impl SlabTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the class, or `None` for ids beyond the table.
    pub fn get(&self, id: usize) -> Option<&SlabClassInfo> {
        self.classes.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut SlabClassInfo> {
        self.classes.get_mut(id)
    }

    /// Chunk size of a class; unknown classes have size 0 so nothing fits.
    pub fn unit_size(&self, id: usize) -> u64 {
        self.get(id).map(|c| c.unit_size).unwrap_or(0)
    }

    /// Classes that have a chunk size, in id order.
    pub fn populated(&self) -> impl Iterator<Item = (usize, &SlabClassInfo)> {
        self.classes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.unit_size > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_class_has_no_room() {
        let table = SlabTable::new();
        assert_eq!(table.unit_size(1), 0);
        assert_eq!(table.unit_size(SLAB_TABLE_SIZE), 0);
        assert!(table.get(SLAB_TABLE_SIZE).is_none());
    }

    #[test]
    fn test_populated_skips_empty_classes() {
        let mut table = SlabTable::new();
        table.get_mut(1).unwrap().unit_size = 96;
        table.get_mut(5).unwrap().unit_size = 240;
        let ids: Vec<usize> = table.populated().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 5]);
    }
}
