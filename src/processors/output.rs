//! Line-oriented dump files.

use crate::processors::ProcessorError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Write buffer per dump file.
pub const DUMP_BUFFER_BYTES: usize = 256 * 1024;

/// A buffered output file receiving one record per line.
///
/// Buffered contents are flushed on [`finish`](Self::finish) or on drop.
pub struct DumpFile {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
    failed: bool,
}

impl DumpFile {
    pub fn create(path: &Path) -> Result<Self, ProcessorError> {
        let file = File::create(path).map_err(|source| ProcessorError::OpenOutput {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(DUMP_BUFFER_BYTES, file),
            lines: 0,
            failed: false,
        })
    }

    /// Appends `line` and a newline. The first write error is logged and
    /// later lines are dropped.
    pub fn write_line(&mut self, line: &str) {
        if self.failed {
            return;
        }
        let res = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"));
        match res {
            Ok(()) => self.lines += 1,
            Err(e) => {
                warn!("Write to {} failed, dropping further lines: {}", self.path.display(), e);
                self.failed = true;
            }
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_newline_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut dump = DumpFile::create(&path).unwrap();
        dump.write_line("a:1");
        dump.write_line("b:2");
        dump.finish().unwrap();

        assert_eq!(dump.lines(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a:1\nb:2\n");
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let err = DumpFile::create(Path::new("/nonexistent/dir/out.txt")).err().unwrap();
        assert!(matches!(err, ProcessorError::OpenOutput { .. }));
    }
}
