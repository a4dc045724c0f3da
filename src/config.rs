//! Configuration management for mc-inspector.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use anyhow::{bail, Context};
use mc_inspector::processors::{ProcessorKind, ProcessorPipeline};
use mc_inspector::ScanSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_MEM_LIMIT_MB: u64 = 256;
pub const DEFAULT_SCAN_BLOCK_SIZE_MB: u64 = 64;
pub const DEFAULT_CATEGORY_DELIMITER: char = ':';

const MB: u64 = 1024 * 1024;

/// Effective inspector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Target
    #[serde(alias = "stats-file")]
    pub stats_file: Option<PathBuf>,

    // Scan tuning
    #[serde(alias = "keys-limit")]
    pub keys_limit: Option<u64>,
    #[serde(alias = "mem-limit-mb")]
    pub mem_limit_mb: Option<u64>,
    #[serde(alias = "mem-scan-block-size-mb")]
    pub mem_scan_block_size_mb: Option<u64>,
    #[serde(alias = "category-delimiter")]
    pub category_delimiter: Option<char>,

    // Processors
    pub processors: Option<Vec<ProcessorKind>>,
    /// `key=value` pairs handed to the processors, e.g. `min-cat-rec-num=10`
    #[serde(alias = "processor-options")]
    pub processor_options: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_file: None,
            keys_limit: None,
            mem_limit_mb: Some(DEFAULT_MEM_LIMIT_MB),
            mem_scan_block_size_mb: Some(DEFAULT_SCAN_BLOCK_SIZE_MB),
            category_delimiter: Some(DEFAULT_CATEGORY_DELIMITER),
            processors: None,
            processor_options: None,
        }
    }
}

/// Converts a megabyte count to bytes, `None` on overflow.
fn mb_to_bytes(mb: u64) -> Option<u64> {
    mb.checked_mul(MB)
}

impl Config {
    /// Default file written by the `config` subcommand: defaults plus an
    /// aggregator so the result is runnable as is.
    pub fn example() -> Self {
        Self {
            processors: Some(vec![ProcessorKind::ItemAggregator]),
            ..Self::default()
        }
    }

    pub fn mem_limit_bytes(&self) -> u64 {
        mb_to_bytes(self.mem_limit_mb.unwrap_or(DEFAULT_MEM_LIMIT_MB)).unwrap_or(u64::MAX)
    }

    pub fn scan_block_bytes(&self) -> u64 {
        mb_to_bytes(
            self.mem_scan_block_size_mb
                .unwrap_or(DEFAULT_SCAN_BLOCK_SIZE_MB),
        )
        .unwrap_or(u64::MAX)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        let delimiter = self
            .category_delimiter
            .unwrap_or(DEFAULT_CATEGORY_DELIMITER);
        ScanSettings {
            keys_limit: self.keys_limit,
            // validated to be ASCII
            delimiter: delimiter as u8,
        }
    }

    /// Builds the processor pipeline and applies every processor option.
    pub fn build_pipeline(&self) -> anyhow::Result<ProcessorPipeline> {
        let kinds = self.processors.as_deref().unwrap_or_default();
        let mut pipeline = ProcessorPipeline::from_kinds(kinds);
        for option in self.processor_options.iter().flatten() {
            pipeline.apply_option_str(option).with_context(|| {
                format!(
                    "processor option '{}'\n{}",
                    option,
                    processor_usage(&pipeline.kinds())
                )
            })?;
        }
        Ok(pipeline)
    }
}

/// Lists the options of the given processors, one per line.
pub fn processor_usage(kinds: &[ProcessorKind]) -> String {
    let mut usage = String::from("Options of the selected processors:");
    for kind in kinds {
        usage.push_str(&format!("\n  {}:", kind.name()));
        for doc in kind.options() {
            usage.push_str(&format!(
                "\n    --{:<24} default: {:<20} {}",
                doc.key, doc.default, doc.help
            ));
        }
    }
    usage
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.processors.as_ref().map_or(true, |p| p.is_empty()) {
        bail!("At least one processor must be selected with --processor");
    }

    if let Some(delimiter) = cfg.category_delimiter {
        if !delimiter.is_ascii() || delimiter.is_ascii_whitespace() {
            bail!(
                "category_delimiter '{}' must be a single printable ASCII character",
                delimiter
            );
        }
    }

    let block_mb = cfg
        .mem_scan_block_size_mb
        .unwrap_or(DEFAULT_SCAN_BLOCK_SIZE_MB);
    let limit_mb = cfg.mem_limit_mb.unwrap_or(DEFAULT_MEM_LIMIT_MB);
    if block_mb == 0 {
        bail!("mem_scan_block_size_mb must be greater than 0");
    }
    if mb_to_bytes(limit_mb).is_none() {
        bail!("mem_limit_mb ({}) is too large", limit_mb);
    }
    // the scan buffer is allocated in one piece
    if mb_to_bytes(block_mb).map_or(true, |bytes| usize::try_from(bytes).is_err()) {
        bail!("mem_scan_block_size_mb ({}) is too large", block_mb);
    }
    if block_mb >= limit_mb {
        bail!(
            "mem_scan_block_size_mb ({}) must be below mem_limit_mb ({})",
            block_mb,
            limit_mb
        );
    }

    // Unknown or malformed processor options are fatal too
    cfg.build_pipeline()?;

    Ok(())
}

/// Collects processor flags given on the command line as `key=value` pairs.
fn processor_options_from_args(args: &Args) -> Vec<String> {
    let mut options = Vec::new();
    let mut push = |key: &str, value: String| options.push(format!("{}={}", key, value));

    if let Some(n) = args.aggregator.min_cat_rec_num {
        push("min-cat-rec-num", n.to_string());
    }
    if let Some(n) = args.aggregator.min_cat_size_mb {
        push("min-cat-size-mb", n.to_string());
    }

    for category in &args.dumper.category_to_dump {
        push("category-to-dump", category.clone());
    }
    if let Some(path) = &args.dumper.category_to_dump_list {
        push("category-to-dump-list", path.display().to_string());
    }
    if let Some(path) = &args.dumper.category_dump_file {
        push("category-dump-file", path.display().to_string());
    }
    if let Some(n) = args.dumper.dump_cas_min {
        push("dump-cas-min", n.to_string());
    }
    if let Some(n) = args.dumper.dump_cas_max {
        push("dump-cas-max", n.to_string());
    }
    if let Some(n) = args.dumper.dump_size_min {
        push("dump-size-min", n.to_string());
    }
    if let Some(n) = args.dumper.dump_size_max {
        push("dump-size-max", n.to_string());
    }

    if let Some(path) = &args.expired.expired_dump_file {
        push("expired-dump-file", path.display().to_string());
    }

    options
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(path) = &args.stats_file {
        config.stats_file = Some(path.clone());
    }
    if args.keys_limit.is_some() {
        config.keys_limit = args.keys_limit;
    }
    if args.mem_limit_mb.is_some() {
        config.mem_limit_mb = args.mem_limit_mb;
    }
    if args.mem_scan_block_size_mb.is_some() {
        config.mem_scan_block_size_mb = args.mem_scan_block_size_mb;
    }
    if args.category_delimiter.is_some() {
        config.category_delimiter = args.category_delimiter;
    }

    // Processor list: CLI replaces the file's list when given
    if !args.processors.is_empty() {
        config.processors = Some(args.processors.clone());
    }

    // Processor options: CLI values are applied after the file's, so they win
    let cli_options = processor_options_from_args(args);
    if !cli_options.is_empty() {
        config
            .processor_options
            .get_or_insert_with(Vec::new)
            .extend(cli_options);
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/mc-inspector/mc-inspector.yaml",
            "/etc/mc-inspector/mc-inspector.yml",
            "/etc/mc-inspector/mc-inspector.json",
            "./mc-inspector.yaml",
            "./mc-inspector.yml",
            "./mc-inspector.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        // Default to YAML
        _ => serde_yaml::from_str(&content)?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Serializes configuration in the requested format
pub fn render_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<()> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
