//! CLI command implementations for mc-inspector.
//!
//! This module provides implementations for the scan and all CLI subcommands:
//! - `inspect`: Heap scan (default when no subcommand is given)
//! - `check`: Privilege and target validation
//! - `config`: Configuration file generation
//! - `clean`: Purge of expired keys through the text protocol

pub mod check;
pub mod clean;
pub mod config;
pub mod inspect;

// Re-export command functions
pub use check::command_check;
pub use clean::command_clean;
pub use config::command_config;
pub use inspect::command_inspect;
