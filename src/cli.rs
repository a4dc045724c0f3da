//! CLI arguments and subcommands for mc-inspector.
//!
//! This module defines the command-line interface structure using the clap library,
//! including global scan flags, per-processor flags, and subcommands.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use mc_inspector::ProcessorKind;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "mc-inspector",
    about = "Inspect a live memcached item store without stopping it",
    long_about = "Inspect a live memcached item store without stopping it.\n\n\
                  Copies the server's heap out of process, reconstructs items from the raw \
                  bytes and feeds them to one or more processors. Needs ptrace access to the \
                  memcached process (root or CAP_SYS_PTRACE).",
    version,
    propagate_version = true,
    after_help = "The stats file can be generated with:\n  \
                  printf \"stats\\nstats slabs\\nstats items\\nstats settings\\n\" | nc 127.0.0.1 11211 > $STATS_FILE"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Stats file generated from the memcached console
    #[arg(short = 's', long)]
    pub stats_file: Option<PathBuf>,

    /// Processor to run on each detected item (repeatable)
    #[arg(long = "processor", value_enum)]
    pub processors: Vec<ProcessorKind>,

    /// Stop the inspector after seeing this number of keys
    #[arg(long)]
    pub keys_limit: Option<u64>,

    /// Address-space hard limit of this inspector, in MB
    #[arg(long)]
    pub mem_limit_mb: Option<u64>,

    /// Memory scan batch size, in MB
    #[arg(long)]
    pub mem_scan_block_size_mb: Option<u64>,

    /// Prefix delimiter splitting the category from the key
    #[arg(long, alias = "category-delimitor")]
    pub category_delimiter: Option<char>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    #[command(flatten)]
    pub aggregator: AggregatorArgs,

    #[command(flatten)]
    pub dumper: DumperArgs,

    #[command(flatten)]
    pub expired: ExpiredArgs,
}

/// Options of --processor=item-aggregator
#[derive(ClapArgs, Debug, Default)]
#[command(next_help_heading = "item-aggregator: summary of all items in the pool")]
pub struct AggregatorArgs {
    /// Minimum number of keys in a category to be shown [default: 100]
    #[arg(long)]
    pub min_cat_rec_num: Option<u64>,

    /// Minimum total size of a category to be shown, in MB [default: 1]
    #[arg(long)]
    pub min_cat_size_mb: Option<u64>,
}

/// Options of --processor=item-dumper
#[derive(ClapArgs, Debug, Default)]
#[command(next_help_heading = "item-dumper: keys and meta info filtered by category, CAS or size")]
pub struct DumperArgs {
    /// Category filter, repeatable [default: all]
    #[arg(long)]
    pub category_to_dump: Vec<String>,

    /// Category filter file, one category per line
    #[arg(long)]
    pub category_to_dump_list: Option<PathBuf>,

    /// File name to dump into (required by item-dumper)
    #[arg(long)]
    pub category_dump_file: Option<PathBuf>,

    /// Min CAS version of items to be dumped [default: 0]
    #[arg(long)]
    pub dump_cas_min: Option<u64>,

    /// Max CAS version of items to be dumped [default: u64 max]
    #[arg(long)]
    pub dump_cas_max: Option<u64>,

    /// Min size (key len + val len) of items to be dumped [default: 0]
    #[arg(long)]
    pub dump_size_min: Option<u64>,

    /// Max size (key len + val len) of items to be dumped [default: 16777216]
    #[arg(long)]
    pub dump_size_max: Option<u64>,
}

/// Options of --processor=expired-dumper
#[derive(ClapArgs, Debug, Default)]
#[command(next_help_heading = "expired-dumper: keys of expired items wasting space")]
pub struct ExpiredArgs {
    /// File name to dump into (required by expired-dumper)
    #[arg(long)]
    pub expired_dump_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check privileges and access to the memcached process
    Check {
        /// PID of memcached (defaults to the pid in --stats-file)
        #[arg(long)]
        pid: Option<i32>,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Purge expired keys from memcached by sending 'get' commands
    Clean {
        /// File of expired keys, as written by expired-dumper
        #[arg(long)]
        expired_keys_file: PathBuf,

        /// Port of the localhost memcached
        #[arg(long, default_value_t = 11211)]
        mc_port: u16,

        /// Number of keys in a 'get' batch command
        #[arg(long, default_value_t = 1000)]
        clean_batch: usize,

        /// Milliseconds to sleep between batches
        #[arg(long, default_value_t = 50)]
        sleep_interval: u64,
    },
}
