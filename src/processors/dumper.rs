//! Dump of item metadata, filtered by category, CAS and size.

use crate::memcached::DetectedItem;
use crate::processors::{
    parse_u64, DumpFile, ItemProcessor, OptionDoc, ProcessorError, ProcessorKind, ScanContext,
};
use ahash::AHashSet as HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_MAX_ITEM_SIZE: u64 = 16 * 1024 * 1024;

pub(crate) const OPTIONS: &[OptionDoc] = &[
    OptionDoc {
        key: "category-to-dump",
        help: "category filter, multiple of this arguments is allowed",
        default: "(ALL IF NOT SPECIFIED)",
    },
    OptionDoc {
        key: "category-to-dump-list",
        help: "category filter from file while each line is a category",
        default: "(NOT SPECIFIED)",
    },
    OptionDoc {
        key: "category-dump-file",
        help: "file name to dump into",
        default: "(REQUIRED)",
    },
    OptionDoc {
        key: "dump-cas-min",
        help: "Min CAS version of items to be dumped",
        default: "0",
    },
    OptionDoc {
        key: "dump-cas-max",
        help: "Max CAS version of items to be dumped",
        default: "uint64_max",
    },
    OptionDoc {
        key: "dump-size-min",
        help: "Min size(key len + val len) of items to be dumped",
        default: "0",
    },
    OptionDoc {
        key: "dump-size-max",
        help: "Max size(key len + val len) of items to be dumped",
        default: "16777216",
    },
];

/// Conjunction of the category, CAS and size filters.
#[derive(Debug, Clone)]
pub struct DumpFilter {
    /// Empty means every category.
    pub categories: HashSet<String>,
    pub cas_min: u64,
    pub cas_max: u64,
    pub size_min: u64,
    pub size_max: u64,
}

impl Default for DumpFilter {
    fn default() -> Self {
        Self {
            categories: HashSet::new(),
            cas_min: 0,
            cas_max: u64::MAX,
            size_min: 0,
            size_max: DEFAULT_MAX_ITEM_SIZE,
        }
    }
}

impl DumpFilter {
    pub fn accepts(&self, item: &DetectedItem) -> bool {
        let category_ok =
            self.categories.is_empty() || self.categories.contains(item.category.as_str());
        let size = item.total_size();
        category_ok
            && (self.cas_min..=self.cas_max).contains(&item.cas)
            && (self.size_min..=self.size_max).contains(&size)
    }
}

/// Formats one dump line.
pub fn format_item_line(item: &DetectedItem, now: u32) -> String {
    format!(
        "{} keysize: {} valsize: {} expire_in_secs: {} last_touch_secs_ago: {} cas: {}",
        item.key,
        item.key.len(),
        item.payload_size,
        item.secs_until_expiry(now),
        item.secs_since_touch(now),
        item.cas
    )
}

/// Writes accepted items to `--category-dump-file`.
#[derive(Default)]
pub struct ItemDumper {
    filter: DumpFilter,
    path: Option<PathBuf>,
    category_list: Option<PathBuf>,
    output: Option<DumpFile>,
}

impl ItemDumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &DumpFilter {
        &self.filter
    }

    fn load_category_list(&mut self) -> Result<(), ProcessorError> {
        let Some(path) = &self.category_list else {
            return Ok(());
        };
        let content = fs::read_to_string(path).map_err(|source| ProcessorError::CategoryList {
            path: path.display().to_string(),
            source,
        })?;
        self.filter.categories.extend(
            content
                .lines()
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
        Ok(())
    }
}

impl ItemProcessor for ItemDumper {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ItemDumper
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<bool, ProcessorError> {
        match key {
            "category-dump-file" => self.path = Some(PathBuf::from(value)),
            "category-to-dump" => {
                self.filter.categories.insert(value.to_string());
            }
            "category-to-dump-list" => self.category_list = Some(PathBuf::from(value)),
            "dump-cas-min" => self.filter.cas_min = parse_u64(key, value)?,
            "dump-cas-max" => self.filter.cas_max = parse_u64(key, value)?,
            "dump-size-min" => self.filter.size_min = parse_u64(key, value)?,
            "dump-size-max" => self.filter.size_max = parse_u64(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn initialize(&mut self) -> Result<(), ProcessorError> {
        let path = match &self.path {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => return Err(ProcessorError::MissingOutput("category_dump_file")),
        };
        // a bad list must not truncate an existing dump
        self.load_category_list()?;
        self.output = Some(DumpFile::create(&path)?);
        Ok(())
    }

    fn process(&mut self, item: &DetectedItem, ctx: &ScanContext<'_>) {
        if !self.filter.accepts(item) {
            return;
        }
        if let Some(out) = self.output.as_mut() {
            out.write_line(&format_item_line(item, ctx.now));
        }
    }

    fn finish(&mut self, _ctx: &ScanContext<'_>, _out: &mut dyn Write) -> std::io::Result<()> {
        if let Some(out) = self.output.as_mut() {
            out.finish()?;
            info!("Dumped {} items to {}", out.lines(), out.path().display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, cas: u64, payload: u32) -> DetectedItem {
        DetectedItem {
            key: format!("{}:key", category),
            category: category.to_string(),
            last_touch: 40,
            expire_time: 160,
            payload_size: payload,
            slab_class: 1,
            cas,
        }
    }

    #[test]
    fn test_empty_allow_list_accepts_all_categories() {
        let filter = DumpFilter::default();
        assert!(filter.accepts(&item("a", 1, 10)));
        assert!(filter.accepts(&item("b", 1, 10)));
    }

    #[test]
    fn test_filters_compose_as_and() {
        let mut filter = DumpFilter {
            cas_min: 5,
            cas_max: 10,
            size_min: 10,
            size_max: 20,
            ..Default::default()
        };
        filter.categories.insert("a".to_string());

        // "a:key" is 5 bytes
        assert!(filter.accepts(&item("a", 7, 10)));
        assert!(!filter.accepts(&item("b", 7, 10)));
        assert!(!filter.accepts(&item("a", 4, 10)));
        assert!(!filter.accepts(&item("a", 11, 10)));
        assert!(!filter.accepts(&item("a", 7, 4)));
        assert!(!filter.accepts(&item("a", 7, 16)));
        // bounds are inclusive
        assert!(filter.accepts(&item("a", 5, 5)));
        assert!(filter.accepts(&item("a", 10, 15)));
    }

    #[test]
    fn test_format_item_line() {
        let line = format_item_line(&item("cat", 42, 10), 100);
        assert_eq!(
            line,
            "cat:key keysize: 7 valsize: 10 expire_in_secs: 60 last_touch_secs_ago: 60 cas: 42"
        );
    }

    #[test]
    fn test_initialize_requires_output() {
        let mut dumper = ItemDumper::new();
        assert!(matches!(
            dumper.initialize(),
            Err(ProcessorError::MissingOutput(_))
        ));

        dumper.set_option("category-dump-file", "").unwrap();
        assert!(matches!(
            dumper.initialize(),
            Err(ProcessorError::MissingOutput(_))
        ));
    }

    #[test]
    fn test_category_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("cats.txt");
        std::fs::write(&list, "alpha\r\nbeta\n\n").unwrap();

        let mut dumper = ItemDumper::new();
        dumper
            .set_option("category-dump-file", dir.path().join("out").to_str().unwrap())
            .unwrap();
        dumper
            .set_option("category-to-dump-list", list.to_str().unwrap())
            .unwrap();
        dumper.set_option("category-to-dump", "gamma").unwrap();
        dumper.initialize().unwrap();

        let cats = &dumper.filter().categories;
        assert_eq!(cats.len(), 3);
        assert!(cats.contains("alpha") && cats.contains("beta") && cats.contains("gamma"));
    }

    #[test]
    fn test_unreadable_category_list() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::write(&out, "previous run\n").unwrap();

        let mut dumper = ItemDumper::new();
        dumper
            .set_option("category-dump-file", out.to_str().unwrap())
            .unwrap();
        dumper
            .set_option("category-to-dump-list", "/nonexistent/cats.txt")
            .unwrap();
        assert!(matches!(
            dumper.initialize(),
            Err(ProcessorError::CategoryList { .. })
        ));
        // the earlier dump is left untouched
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous run\n");
    }
}
