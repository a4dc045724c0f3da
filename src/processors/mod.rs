//! Item processors and the pipeline that fans detected items out to them.
//!
//! This module provides:
//! - `aggregator`: Per-category statistics report
//! - `dumper`: Filtered dump of item metadata
//! - `expired`: Dump of keys that already expired
//! - `output`: Buffered line-oriented dump files

pub mod aggregator;
pub mod dumper;
pub mod expired;
pub mod output;

use crate::memcached::{DetectedItem, SlabTable};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub use aggregator::{CategoryStats, ItemAggregator};
pub use dumper::{DumpFilter, ItemDumper};
pub use expired::ExpiredItemDumper;
pub use output::DumpFile;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("{0} can not be empty")]
    MissingOutput(&'static str),

    #[error("file open failed: {path}: {source}")]
    OpenOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read category list {path}: {source}")]
    CategoryList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for --{key}")]
    InvalidValue { key: String, value: String },

    #[error("unknown option: --{0}")]
    UnknownOption(String),
}

/// Processor variants selectable with `--processor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    ItemAggregator,
    ItemDumper,
    ExpiredDumper,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 3] = [
        ProcessorKind::ItemAggregator,
        ProcessorKind::ItemDumper,
        ProcessorKind::ExpiredDumper,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProcessorKind::ItemAggregator => "item-aggregator",
            ProcessorKind::ItemDumper => "item-dumper",
            ProcessorKind::ExpiredDumper => "expired-dumper",
        }
    }

    /// Creates an unconfigured processor of this kind.
    pub fn create(&self) -> Box<dyn ItemProcessor> {
        match self {
            ProcessorKind::ItemAggregator => Box::new(ItemAggregator::new()),
            ProcessorKind::ItemDumper => Box::new(ItemDumper::new()),
            ProcessorKind::ExpiredDumper => Box::new(ExpiredItemDumper::new()),
        }
    }

    /// Options accepted by this kind, for usage text.
    pub fn options(&self) -> &'static [OptionDoc] {
        match self {
            ProcessorKind::ItemAggregator => aggregator::OPTIONS,
            ProcessorKind::ItemDumper => dumper::OPTIONS,
            ProcessorKind::ExpiredDumper => expired::OPTIONS,
        }
    }
}

/// Usage entry of a processor option.
#[derive(Debug, Clone, Copy)]
pub struct OptionDoc {
    pub key: &'static str,
    pub help: &'static str,
    pub default: &'static str,
}

/// Read-only state shared with processors for one scan tick.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    /// Server relative clock.
    pub now: u32,
    pub slabs: &'a SlabTable,
}

/// Capability every processor implements.
pub trait ItemProcessor {
    fn kind(&self) -> ProcessorKind;

    /// Applies `--key=value`. Returns `Ok(false)` if the key is not ours.
    fn set_option(&mut self, key: &str, value: &str) -> Result<bool, ProcessorError>;

    /// Acquires output resources. Called once before scanning.
    fn initialize(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&mut self, item: &DetectedItem, ctx: &ScanContext<'_>);

    /// Emits results and releases resources at shutdown.
    fn finish(&mut self, _ctx: &ScanContext<'_>, _out: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn parse_u64(key: &str, value: &str) -> Result<u64, ProcessorError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProcessorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Ordered set of active processors.
#[derive(Default)]
pub struct ProcessorPipeline {
    processors: Vec<Box<dyn ItemProcessor>>,
}

impl ProcessorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one processor per distinct kind, in first-seen order.
    pub fn from_kinds(kinds: &[ProcessorKind]) -> Self {
        let mut pipeline = Self::new();
        for kind in kinds {
            if !pipeline.contains(*kind) {
                pipeline.push(kind.create());
            }
        }
        pipeline
    }

    pub fn push(&mut self, processor: Box<dyn ItemProcessor>) {
        self.processors.push(processor);
    }

    pub fn contains(&self, kind: ProcessorKind) -> bool {
        self.processors.iter().any(|p| p.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn kinds(&self) -> Vec<ProcessorKind> {
        self.processors.iter().map(|p| p.kind()).collect()
    }

    /// Offers an option to every processor; fails if none takes it.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<(), ProcessorError> {
        let mut accepted = false;
        for p in self.processors.iter_mut() {
            accepted |= p.set_option(key, value)?;
        }
        if accepted {
            Ok(())
        } else {
            Err(ProcessorError::UnknownOption(key.to_string()))
        }
    }

    /// Applies a `key=value` option string.
    pub fn apply_option_str(&mut self, option: &str) -> Result<(), ProcessorError> {
        let option = option.trim_start_matches("--");
        let (key, value) = option.split_once('=').unwrap_or((option, ""));
        self.apply_option(key, value)
    }

    pub fn initialize(&mut self) -> Result<(), (ProcessorKind, ProcessorError)> {
        for p in self.processors.iter_mut() {
            let kind = p.kind();
            p.initialize().map_err(|e| (kind, e))?;
        }
        Ok(())
    }

    pub fn dispatch(&mut self, item: &DetectedItem, ctx: &ScanContext<'_>) {
        for p in self.processors.iter_mut() {
            p.process(item, ctx);
        }
    }

    pub fn finish(&mut self, ctx: &ScanContext<'_>, out: &mut dyn Write) -> std::io::Result<()> {
        for p in self.processors.iter_mut() {
            p.finish(ctx, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kinds_dedupes() {
        let pipeline = ProcessorPipeline::from_kinds(&[
            ProcessorKind::ItemAggregator,
            ProcessorKind::ExpiredDumper,
            ProcessorKind::ItemAggregator,
        ]);
        assert_eq!(
            pipeline.kinds(),
            vec![ProcessorKind::ItemAggregator, ProcessorKind::ExpiredDumper]
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut pipeline = ProcessorPipeline::from_kinds(&[ProcessorKind::ItemAggregator]);
        assert!(pipeline.apply_option_str("--min-cat-rec-num=5").is_ok());
        let err = pipeline
            .apply_option_str("--expired-dump-file=/tmp/x")
            .unwrap_err();
        assert!(matches!(err, ProcessorError::UnknownOption(k) if k == "expired-dump-file"));
    }

    #[test]
    fn test_invalid_option_value() {
        let mut pipeline = ProcessorPipeline::from_kinds(&[ProcessorKind::ItemAggregator]);
        let err = pipeline.apply_option("min-cat-rec-num", "many").unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidValue { .. }));
    }

    #[test]
    fn test_kind_names_match_value_enum() {
        use clap::ValueEnum;
        for kind in ProcessorKind::ALL {
            let pv = kind.to_possible_value().unwrap();
            assert_eq!(pv.get_name(), kind.name());
        }
    }
}
