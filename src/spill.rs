//! Run spilling.

use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use rayon::slice::ParallelSliceMut;
use tempfile;

use crate::buffer::RunBuffer;
use crate::record::LineEnding;
use crate::registry::TempRegistry;
use crate::source::{DiskSource, MemorySource};

/// Sorts runs and persists them into temporary files.
#[derive(Clone, Debug)]
pub struct SpillWriter {
    /// Directory spill files are created in.
    dir: PathBuf,
    /// Registry every created file is reported to.
    registry: TempRegistry,
    /// Spill file read/write buffer size.
    buf_size: Option<usize>,
}

impl SpillWriter {
    pub fn new(dir: &Path, registry: TempRegistry, buf_size: Option<usize>) -> Self {
        SpillWriter {
            dir: dir.to_path_buf(),
            registry,
            buf_size,
        }
    }

    /// Sorts the run and writes it to a new temporary file.
    /// Returns a source positioned at the first record of the spilled run.
    pub fn sort_and_spill(&self, mut run: RunBuffer) -> io::Result<DiskSource> {
        sort_run(&mut run);

        let tmp_file = tempfile::Builder::new()
            .prefix("run-")
            .suffix(".txt")
            .tempfile_in(&self.dir)?;
        let path = tmp_file.path().to_path_buf();
        self.registry.register(&path);

        log::debug!("spilling {} records to {}", run.len(), path.display());
        if let Err(err) = self.dump(tmp_file.as_file(), run) {
            // the file itself is removed when `tmp_file` is dropped
            self.registry.unregister(&path);
            return Err(err);
        }

        return DiskSource::open(tmp_file.into_temp_path(), self.registry.clone(), self.buf_size);
    }

    /// Sorts the last run and keeps it in memory.
    pub fn keep_resident(&self, mut run: RunBuffer) -> MemorySource {
        sort_run(&mut run);
        log::debug!("keeping {} records in memory", run.len());

        return MemorySource::new(run.into_records());
    }

    fn dump(&self, file: &fs::File, run: RunBuffer) -> io::Result<()> {
        let mut writer = match self.buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        for record in run {
            record.write_to(&mut writer, LineEnding::Lf)?;
        }

        return writer.flush();
    }
}

/// Sorts run records in place using the current rayon thread pool.
pub fn sort_run(run: &mut RunBuffer) {
    run.par_sort_unstable();
}
