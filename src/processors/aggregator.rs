//! Per-category summary of the item store.

use crate::memcached::{DetectedItem, SLAB_TABLE_SIZE};
use crate::processors::{parse_u64, ItemProcessor, OptionDoc, ProcessorError, ProcessorKind, ScanContext};
use ahash::AHashMap as HashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;

pub const DEFAULT_MIN_CAT_REC_NUM: u64 = 100;
pub const DEFAULT_MIN_CAT_SIZE_BYTES: u64 = 1024 * 1024;

/// The percentile set always admits this many ages.
const TOP_AGES_MIN_RETAINED: usize = 10;

const FIVE_MINUTES: u64 = 5 * 60;
const ONE_HOUR: u64 = 60 * 60;
const ONE_DAY: u64 = 24 * 60 * 60;

pub(crate) const OPTIONS: &[OptionDoc] = &[
    OptionDoc {
        key: "min-cat-rec-num",
        help: "Minimum number of keys in a category to be shown",
        default: "100",
    },
    OptionDoc {
        key: "min-cat-size-mb",
        help: "Minimum total size of a category to be shown, in MB",
        default: "1 (MB)",
    },
];

/// Largest 5% of touch ages seen so far, kept in a min-heap.
///
/// The heap's minimum approximates the 95th percentile of the ages.
#[derive(Debug, Clone, Default)]
pub struct TopAges {
    retained: BinaryHeap<Reverse<u64>>,
}

impl TopAges {
    /// Offers `age`; `seen` is the number of ages observed including this one.
    pub fn observe(&mut self, age: u64, seen: u64) {
        let floor = TOP_AGES_MIN_RETAINED.max((seen * 5 / 100) as usize);
        if self.retained.len() < floor {
            self.retained.push(Reverse(age));
            return;
        }
        if let Some(&Reverse(min)) = self.retained.peek() {
            if age > min {
                self.retained.pop();
                self.retained.push(Reverse(age));
            }
        }
    }

    /// Approximate 95th percentile age.
    pub fn threshold(&self) -> Option<u64> {
        self.retained.peek().map(|r| r.0)
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}

/// Running totals for one category.
#[derive(Debug, Clone, Default)]
pub struct CategoryStats {
    pub key_count: u64,
    pub raw_key_bytes: u64,
    pub raw_value_bytes: u64,
    /// Sum of the chunk sizes holding the items.
    pub mem_used: u64,
    pub touched_5min: u64,
    pub touched_1h: u64,
    pub touched_1d: u64,
    pub since_last_touch_total: u64,
    pub ttl_total: u64,
    pub expired_count: u64,
    pub top_ages: TopAges,
}

impl CategoryStats {
    pub fn record(&mut self, item: &DetectedItem, now: u32, unit_size: u64) {
        self.key_count += 1;
        self.raw_key_bytes += item.key.len() as u64;
        self.raw_value_bytes += item.payload_size as u64;
        self.mem_used += unit_size;

        let touch = item.last_touch as u64;
        let now64 = now as u64;
        if touch + FIVE_MINUTES >= now64 {
            self.touched_5min += 1;
        }
        if touch + ONE_HOUR >= now64 {
            self.touched_1h += 1;
        }
        if touch + ONE_DAY >= now64 {
            self.touched_1d += 1;
        }

        // server clock may run slightly ahead of ours
        let age = item.secs_since_touch(now).max(0) as u64;
        self.since_last_touch_total += age;
        self.top_ages.observe(age, self.key_count);

        if now < item.expire_time {
            self.ttl_total += (item.expire_time - now) as u64;
        } else if item.expire_time != 0 {
            self.expired_count += 1;
        }
    }

    fn percent(&self, n: u64) -> f64 {
        n as f64 * 100.0 / self.key_count as f64
    }

    fn row(&self, category: &str) -> String {
        let cnt = self.key_count.max(1);
        format!(
            "CATEGORY {}\t{}\t{:.1}\t{:.1}\t{}\t{:.1}\t{:.1}\t{:.1}\t{}\t{}\t{}\t{:.1}",
            category,
            self.key_count,
            self.raw_key_bytes as f64 / cnt as f64,
            self.raw_value_bytes as f64 / cnt as f64,
            self.mem_used,
            self.percent(self.touched_5min),
            self.percent(self.touched_1h),
            self.percent(self.touched_1d),
            self.since_last_touch_total / cnt,
            self.top_ages.threshold().unwrap_or(0),
            self.ttl_total / (self.key_count - self.expired_count + 1),
            self.percent(self.expired_count),
        )
    }
}

/// Builds the per-category report printed at shutdown.
pub struct ItemAggregator {
    stats: HashMap<String, CategoryStats>,
    oldest_seen: Vec<u64>,
    min_cat_rec_num: u64,
    min_cat_size: u64,
}

impl Default for ItemAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemAggregator {
    pub fn new() -> Self {
        Self {
            stats: HashMap::new(),
            oldest_seen: vec![0; SLAB_TABLE_SIZE],
            min_cat_rec_num: DEFAULT_MIN_CAT_REC_NUM,
            min_cat_size: DEFAULT_MIN_CAT_SIZE_BYTES,
        }
    }

    pub fn category(&self, name: &str) -> Option<&CategoryStats> {
        self.stats.get(name)
    }

    pub fn categories(&self) -> usize {
        self.stats.len()
    }

    /// Oldest touch age observed for a slab class.
    pub fn oldest_seen(&self, class: usize) -> u64 {
        self.oldest_seen.get(class).copied().unwrap_or(0)
    }

    fn is_reported(&self, stats: &CategoryStats) -> bool {
        stats.key_count >= self.min_cat_rec_num || stats.mem_used >= self.min_cat_size
    }

    /// Writes the category and slab tables.
    pub fn write_report(&self, ctx: &ScanContext<'_>, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "key\tCount\tavg_key_size\tavg_val_size\tmem_used_total\t%_touched_in_5min\t\
             %_touched_in_1h\t%_touched_in_1d\tavg_since_last_touched\tp95_age\tavg_ttl\t%_of_expired"
        )?;

        let mut names: Vec<&String> = self.stats.keys().collect();
        names.sort();
        for name in names {
            let stats = &self.stats[name];
            if self.is_reported(stats) {
                writeln!(out, "{}", stats.row(name))?;
            }
        }

        writeln!(out, "\nOldest item touched per slab: ")?;
        writeln!(
            out,
            "slab_id\tslot_size\tslot_count\ttotal_size\toldest_touched_secs_ago\toldest_seen_secs_ago"
        )?;
        for (id, class) in ctx.slabs.populated() {
            writeln!(
                out,
                "SLAB {}\t{}\t{}\t{}\t{}\t{}",
                id,
                class.unit_size,
                class.slot_count,
                class.allocated_size,
                class.oldest_age,
                self.oldest_seen(id)
            )?;
        }
        Ok(())
    }
}

impl ItemProcessor for ItemAggregator {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ItemAggregator
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<bool, ProcessorError> {
        match key {
            "min-cat-rec-num" => self.min_cat_rec_num = parse_u64(key, value)?,
            "min-cat-size-mb" => {
                self.min_cat_size = parse_u64(key, value)?
                    .checked_mul(1024 * 1024)
                    .ok_or_else(|| ProcessorError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn process(&mut self, item: &DetectedItem, ctx: &ScanContext<'_>) {
        if item.category.is_empty() {
            return;
        }

        let unit_size = ctx.slabs.unit_size(item.slab_class);
        // get_mut first: avoids allocating the key for known categories
        match self.stats.get_mut(&item.category) {
            Some(stats) => stats.record(item, ctx.now, unit_size),
            None => {
                let mut stats = CategoryStats::default();
                stats.record(item, ctx.now, unit_size);
                self.stats.insert(item.category.clone(), stats);
            }
        }

        let age = item.secs_since_touch(ctx.now).max(0) as u64;
        if let Some(oldest) = self.oldest_seen.get_mut(item.slab_class) {
            *oldest = (*oldest).max(age);
        }
    }

    fn finish(&mut self, ctx: &ScanContext<'_>, out: &mut dyn Write) -> std::io::Result<()> {
        self.write_report(ctx, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memcached::SlabTable;

    fn item(category: &str, key: &str, touch: u32, exp: u32) -> DetectedItem {
        DetectedItem {
            key: key.to_string(),
            category: category.to_string(),
            last_touch: touch,
            expire_time: exp,
            payload_size: 10,
            slab_class: 1,
            cas: 0,
        }
    }

    fn slabs() -> SlabTable {
        let mut t = SlabTable::new();
        t.get_mut(1).unwrap().unit_size = 96;
        t
    }

    #[test]
    fn test_top_ages_tracks_upper_tail() {
        let mut top = TopAges::default();
        // ages 1..=1000: top 5% is 951..=1000
        for (n, age) in (1..=1000u64).enumerate() {
            top.observe(age, n as u64 + 1);
        }
        assert_eq!(top.len(), 50);
        assert_eq!(top.threshold(), Some(951));
    }

    #[test]
    fn test_top_ages_is_order_sensitive() {
        let mut top = TopAges::default();
        for (n, age) in (1..=1000u64).rev().enumerate() {
            top.observe(age, n as u64 + 1);
        }
        // growing the floor admits whatever arrives, here the youngest age
        assert_eq!(top.len(), 50);
        assert_eq!(top.threshold(), Some(1));
    }

    #[test]
    fn test_top_ages_small_sample() {
        let mut top = TopAges::default();
        for (n, age) in [30u64, 10, 20].iter().enumerate() {
            top.observe(*age, n as u64 + 1);
        }
        assert_eq!(top.threshold(), Some(10));
    }

    #[test]
    fn test_touch_buckets_and_expiry() {
        let table = slabs();
        let ctx = ScanContext {
            now: 100_000,
            slabs: &table,
        };
        let mut agg = ItemAggregator::new();
        agg.process(&item("c", "c:1", 100_000 - 60, 0), &ctx);
        agg.process(&item("c", "c:2", 100_000 - 1_000, 100_500), &ctx);
        agg.process(&item("c", "c:3", 100_000 - 10_000, 99_000), &ctx);
        agg.process(&item("c", "c:4", 100_000 - 90_000, 0), &ctx);

        let s = agg.category("c").unwrap();
        assert_eq!(s.key_count, 4);
        assert_eq!(s.touched_5min, 1);
        assert_eq!(s.touched_1h, 2);
        assert_eq!(s.touched_1d, 3);
        assert_eq!(s.ttl_total, 500);
        assert_eq!(s.expired_count, 1);
        assert_eq!(s.mem_used, 4 * 96);
        assert_eq!(s.since_last_touch_total, 60 + 1_000 + 10_000 + 90_000);
        assert_eq!(agg.oldest_seen(1), 90_000);
    }

    #[test]
    fn test_empty_category_ignored() {
        let table = slabs();
        let ctx = ScanContext {
            now: 100,
            slabs: &table,
        };
        let mut agg = ItemAggregator::new();
        agg.process(&item("", ":k1", 90, 0), &ctx);
        assert_eq!(agg.categories(), 0);
    }

    #[test]
    fn test_report_thresholds() {
        let table = slabs();
        let ctx = ScanContext {
            now: 100,
            slabs: &table,
        };
        let mut agg = ItemAggregator::new();
        agg.set_option("min-cat-rec-num", "2").unwrap();
        agg.process(&item("big", "big:1", 90, 0), &ctx);
        agg.process(&item("big", "big:2", 90, 0), &ctx);
        agg.process(&item("small", "small:1", 90, 0), &ctx);

        let mut out = Vec::new();
        agg.write_report(&ctx, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("CATEGORY big\t2\t"));
        assert!(!report.contains("CATEGORY small"));
        assert!(report.contains("SLAB 1\t96\t0\t0\t0\t10"));
    }
    #[test]
    fn test_min_cat_size_overflow_rejected() {
        let mut agg = ItemAggregator::new();
        assert!(agg.set_option("min-cat-size-mb", "2").unwrap());
        assert_eq!(agg.min_cat_size, 2 * 1024 * 1024);

        let err = agg
            .set_option("min-cat-size-mb", &u64::MAX.to_string())
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidValue { .. }));
        // a rejected value leaves the previous one in place
        assert_eq!(agg.min_cat_size, 2 * 1024 * 1024);
    }
}
