//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::example();
    let output = output.unwrap_or_else(|| PathBuf::from("mc-inspector.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# mc-inspector Configuration
# ===========================
#
# Target
# ------
# stats_file: null             # Output of: printf "stats\nstats slabs\nstats items\nstats settings\n" | nc 127.0.0.1 11211
#
# Scan Tuning
# -----------
# keys_limit: null             # Stop after detecting this many keys (null = whole heap)
# mem_limit_mb: 256            # Address-space hard limit of the inspector
# mem_scan_block_size_mb: 64   # Bytes copied from memcached per iteration
# category_delimiter: ":"      # Key prefix before this byte is the category
#
# Processors
# ----------
# processors:                  # item-aggregator, item-dumper, expired-dumper
#   - item-aggregator
# processor_options:           # key=value, same names as the CLI flags
#   - min-cat-rec-num=100      # item-aggregator: min keys per shown category
#   - min-cat-size-mb=1        # item-aggregator: min MB per shown category
#   - category-dump-file=/tmp/items.txt      # item-dumper (required)
#   - category-to-dump=user    # item-dumper: repeatable, all if absent
#   - category-to-dump-list=/tmp/cats.txt    # item-dumper: one category per line
#   - dump-cas-min=0           # item-dumper
#   - dump-cas-max=18446744073709551615      # item-dumper
#   - dump-size-min=0          # item-dumper: key len + value len
#   - dump-size-max=16777216   # item-dumper
#   - expired-dump-file=/tmp/expired.txt     # expired-dumper (required)
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_yaml_still_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mc-inspector.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# mc-inspector Configuration"));
        let cfg: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(cfg.mem_limit_mb, Some(256));
        assert_eq!(cfg.processors.map(|p| p.len()), Some(1));
    }
}
