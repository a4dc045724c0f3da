//! Parser for a captured memcached stats dump.
//!
//! The dump is produced by piping `stats`, `stats slabs`, `stats items` and
//! `stats settings` through the text protocol, e.g.
//!
//! ```text
//! printf "stats\nstats slabs\nstats items\nstats settings\n" | nc 127.0.0.1 11211 > stats.txt
//! ```

use crate::memcached::slabs::SlabTable;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("cannot read stats file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stats file has no usable '{0}' value")]
    MissingField(&'static str),
}

/// What the inspector needs to know about the target server.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub pid: i32,
    /// Items carry an 8-byte CAS field (`cas_enabled yes`).
    pub cas_enabled: bool,
    /// Server wall clock when the dump was taken (`time`).
    pub time: i64,
    /// Seconds since the server started (`uptime`).
    pub uptime: i64,
    /// Items the server reports holding (`curr_items`).
    pub curr_items: u64,
    pub slabs: SlabTable,
}

impl ServerSnapshot {
    /// Unix time at which the server's relative clock reads zero.
    pub fn server_start_time(&self) -> i64 {
        self.time - self.uptime
    }

    /// The server's relative clock at unix time `now`.
    pub fn relative_time(&self, now: i64) -> u32 {
        (now - self.server_start_time()).clamp(0, u32::MAX as i64) as u32
    }
}

#[derive(Default)]
struct SnapshotBuilder {
    pid: Option<i32>,
    cas_enabled: Option<bool>,
    time: Option<i64>,
    uptime: Option<i64>,
    curr_items: u64,
    slabs: SlabTable,
}

impl SnapshotBuilder {
    fn set_slab_field(&mut self, id: &str, key: &str, value: &str) {
        let Ok(id) = id.parse::<usize>() else {
            return;
        };
        let Some(class) = self.slabs.get_mut(id) else {
            return;
        };
        match key {
            "age" => class.oldest_age = value.parse().unwrap_or(0),
            "chunk_size" => class.unit_size = value.parse().unwrap_or(0),
            "total_chunks" => class.slot_count = value.parse().unwrap_or(0),
            "mem_requested" => class.allocated_size = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    fn feed(&mut self, line: &str) {
        // "STAT items:1:age 12" and "STAT 1:chunk_size 96" both split on ':'
        let normalized = line.replace(':', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.len() < 3 || tokens[0] != "STAT" {
            return;
        }

        match tokens[1] {
            "pid" => self.pid = tokens[2].parse().ok(),
            "cas_enabled" => self.cas_enabled = Some(tokens[2] == "yes"),
            "time" => self.time = tokens[2].parse().ok(),
            "uptime" => self.uptime = tokens[2].parse().ok(),
            "curr_items" => self.curr_items = tokens[2].parse().unwrap_or(0),
            "items" if tokens.len() >= 5 => self.set_slab_field(tokens[2], tokens[3], tokens[4]),
            k if k.starts_with(|c: char| c.is_ascii_digit()) && tokens.len() >= 4 => {
                self.set_slab_field(tokens[1], tokens[2], tokens[3])
            }
            _ => {}
        }
    }

    fn build(self) -> Result<ServerSnapshot, StatsError> {
        let pid = self.pid.filter(|p| *p > 0).ok_or(StatsError::MissingField("pid"))?;
        let time = self.time.filter(|t| *t > 0).ok_or(StatsError::MissingField("time"))?;
        let uptime = self
            .uptime
            .filter(|u| *u > 0)
            .ok_or(StatsError::MissingField("uptime"))?;

        Ok(ServerSnapshot {
            pid,
            cas_enabled: self.cas_enabled.unwrap_or(true),
            time,
            uptime,
            curr_items: self.curr_items,
            slabs: self.slabs,
        })
    }
}

/// Parses a stats dump from any line source.
pub fn parse_stats<R: BufRead>(reader: R) -> Result<ServerSnapshot, StatsError> {
    let mut builder = SnapshotBuilder::default();
    for line in reader.lines().map_while(Result::ok) {
        builder.feed(&line);
    }
    builder.build()
}

/// Loads and parses a stats dump file.
pub fn load_stats(path: &Path) -> Result<ServerSnapshot, StatsError> {
    let file = fs::File::open(path).map_err(|source| StatsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let snapshot = parse_stats(BufReader::new(file))?;
    debug!(
        "Stats snapshot: pid={} cas_enabled={} time={} uptime={} curr_items={}",
        snapshot.pid, snapshot.cas_enabled, snapshot.time, snapshot.uptime, snapshot.curr_items
    );
    Ok(snapshot)
}
