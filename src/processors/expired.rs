//! Dump of keys that expired but still occupy memory.
//!
//! The output feeds `mc-inspector clean`, which fetches each key so the
//! server reclaims it.

use crate::memcached::DetectedItem;
use crate::processors::{DumpFile, ItemProcessor, OptionDoc, ProcessorError, ProcessorKind, ScanContext};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

pub(crate) const OPTIONS: &[OptionDoc] = &[OptionDoc {
    key: "expired-dump-file",
    help: "file name to dump into",
    default: "(REQUIRED)",
}];

#[derive(Default)]
pub struct ExpiredItemDumper {
    path: Option<PathBuf>,
    output: Option<DumpFile>,
}

impl ExpiredItemDumper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemProcessor for ExpiredItemDumper {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ExpiredDumper
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<bool, ProcessorError> {
        if key != "expired-dump-file" {
            return Ok(false);
        }
        self.path = Some(PathBuf::from(value));
        Ok(true)
    }

    fn initialize(&mut self) -> Result<(), ProcessorError> {
        match &self.path {
            Some(p) if !p.as_os_str().is_empty() => {
                self.output = Some(DumpFile::create(p)?);
                Ok(())
            }
            _ => Err(ProcessorError::MissingOutput("expired_dump_file")),
        }
    }

    fn process(&mut self, item: &DetectedItem, ctx: &ScanContext<'_>) {
        if !item.is_expired(ctx.now) {
            return;
        }
        if let Some(out) = self.output.as_mut() {
            out.write_line(&item.key);
        }
    }

    fn finish(&mut self, _ctx: &ScanContext<'_>, _out: &mut dyn Write) -> std::io::Result<()> {
        if let Some(out) = self.output.as_mut() {
            out.finish()?;
            info!("Dumped {} expired keys to {}", out.lines(), out.path().display());
        }
        Ok(())
    }
}
