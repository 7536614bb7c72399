//! Rolling JSONL output across fixed-size batch files.

use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default number of records per batch file
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Writes one JSON document per line into `dir/00.jsonl`, `dir/01.jsonl`, ...
/// A new file is opened once the current one holds `batch_size` records.
pub struct BatchWriter {
    dir: PathBuf,
    batch_size: usize,
    current: Option<BufWriter<File>>,
    file_index: usize,
    in_batch: usize,
    written: u64,
}

impl BatchWriter {
    pub fn create(dir: &Path, batch_size: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            batch_size: batch_size.max(1),
            current: None,
            file_index: 0,
            in_batch: 0,
            written: 0,
        })
    }

    pub fn batch_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("{:02}.jsonl", index))
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        if self.in_batch == self.batch_size {
            self.roll()?;
        }
        let mut out = match self.current.take() {
            Some(out) => out,
            None => {
                let path = Self::batch_path(&self.dir, self.file_index);
                debug!(path = %path.display(), "Opening batch file");
                BufWriter::new(File::create(path)?)
            }
        };
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
        self.current = Some(out);
        self.in_batch += 1;
        self.written += 1;
        Ok(())
    }

    fn roll(&mut self) -> Result<()> {
        if let Some(mut out) = self.current.take() {
            out.flush()?;
        }
        info!(batch = self.file_index, records = self.in_batch, "Batch file complete");
        self.file_index += 1;
        self.in_batch = 0;
        Ok(())
    }

    /// Flush the last batch. Returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(mut out) = self.current.take() {
            out.flush()?;
        }
        info!(records = self.written, files = self.files(), "Batch output finished");
        Ok(self.written)
    }

    fn files(&self) -> usize {
        if self.written == 0 {
            0
        } else {
            self.file_index + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_rolls_after_batch_size() -> Result<()> {
        let dir = TempDir::new()?;
        let mut writer = BatchWriter::create(dir.path(), 2)?;
        for i in 0..5 {
            writer.write(&json!({ "n": i }))?;
        }
        assert_eq!(writer.finish()?, 5);

        let first = std::fs::read_to_string(BatchWriter::batch_path(dir.path(), 0))?;
        assert_eq!(first, "{\"n\":0}\n{\"n\":1}\n");
        let last = std::fs::read_to_string(BatchWriter::batch_path(dir.path(), 2))?;
        assert_eq!(last, "{\"n\":4}\n");
        assert!(!BatchWriter::batch_path(dir.path(), 3).exists());
        Ok(())
    }

    #[test]
    fn test_exact_multiple_opens_no_empty_file() -> Result<()> {
        let dir = TempDir::new()?;
        let mut writer = BatchWriter::create(dir.path(), 2)?;
        for i in 0..4 {
            writer.write(&json!(i))?;
        }
        writer.finish()?;
        assert!(BatchWriter::batch_path(dir.path(), 1).exists());
        assert!(!BatchWriter::batch_path(dir.path(), 2).exists());
        Ok(())
    }
}
