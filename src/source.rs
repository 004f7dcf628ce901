//! Merge sources.
//!
//! A merge source is a cursor over one sorted run. Runs spilled to disk are read back line by line,
//! the last run is merged straight from memory.

use std::fs;
use std::io;
use std::mem;
use std::path::Path;

use tempfile::TempPath;

use crate::reader::LineReader;
use crate::record::Record;
use crate::registry::TempRegistry;

/// Cursor over a sorted run.
pub enum MergeSource {
    Disk(DiskSource),
    Memory(MemorySource),
}

impl MergeSource {
    /// Record the cursor is positioned at, [`None`] if the source is exhausted.
    pub fn current(&self) -> Option<&Record> {
        match self {
            MergeSource::Disk(source) => source.current.as_ref(),
            MergeSource::Memory(source) => source.current.as_ref(),
        }
    }

    /// Moves the current record out of the source. The source stays at the same position.
    pub fn take_current(&mut self) -> Option<Record> {
        match self {
            MergeSource::Disk(source) => source.current.take(),
            MergeSource::Memory(source) => source.current.take(),
        }
    }

    /// Moves the cursor to the next record. Returns `false` if the source is exhausted.
    pub fn advance(&mut self) -> io::Result<bool> {
        match self {
            MergeSource::Disk(source) => source.advance(),
            MergeSource::Memory(source) => Ok(source.advance()),
        }
    }

    /// Releases resources held by the source: the temporary file of a disk source is closed and
    /// deleted, the records of a memory source are dropped.
    pub fn release(&mut self) -> io::Result<()> {
        match self {
            MergeSource::Disk(source) => source.release(),
            MergeSource::Memory(source) => {
                source.release();
                Ok(())
            }
        }
    }

    pub fn is_disk(&self) -> bool {
        matches!(self, MergeSource::Disk(_))
    }
}

impl From<DiskSource> for MergeSource {
    fn from(source: DiskSource) -> Self {
        MergeSource::Disk(source)
    }
}

impl From<MemorySource> for MergeSource {
    fn from(source: MemorySource) -> Self {
        MergeSource::Memory(source)
    }
}

/// Source reading a spilled run back from its temporary file.
///
/// The source owns the file: it is deleted exactly once, either by [`DiskSource::release`] or
/// when the source is dropped.
pub struct DiskSource {
    reader: Option<LineReader<io::BufReader<fs::File>>>,
    path: Option<TempPath>,
    registry: TempRegistry,
    current: Option<Record>,
    line: Vec<u8>,
}

impl DiskSource {
    /// Opens a spilled run and positions the cursor at its first record.
    /// The path is expected to be registered in `registry`.
    pub fn open(path: TempPath, registry: TempRegistry, buf_size: Option<usize>) -> io::Result<Self> {
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                registry.unregister(&path);
                return Err(err);
            }
        };

        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        let mut source = DiskSource {
            reader: Some(LineReader::new(reader)),
            path: Some(path),
            registry,
            current: None,
            line: Vec::new(),
        };
        source.advance()?;

        return Ok(source);
    }

    /// Path of the backing file, [`None`] once released.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn advance(&mut self) -> io::Result<bool> {
        self.current = None;

        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(false),
        };

        while reader.read_line(&mut self.line)? {
            if !self.line.is_empty() {
                self.current = Some(Record::parse(mem::take(&mut self.line)));
                return Ok(true);
            }
        }

        return Ok(false);
    }

    fn release(&mut self) -> io::Result<()> {
        self.current = None;
        self.reader = None;

        if let Some(path) = self.path.take() {
            self.registry.unregister(&path);
            log::debug!("removing spilled run {}", path.display());
            path.close()?;
        }

        return Ok(());
    }
}

impl Drop for DiskSource {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("spilled run not removed: {}", err);
        }
    }
}

/// Source over the resident last run.
pub struct MemorySource {
    records: std::vec::IntoIter<Record>,
    current: Option<Record>,
}

impl MemorySource {
    /// Creates a source over already sorted records, positioned at the first one.
    pub fn new(records: Vec<Record>) -> Self {
        let mut records = records.into_iter();
        let current = records.next();

        MemorySource { records, current }
    }

    /// Records left including the current one.
    pub fn remaining(&self) -> usize {
        self.records.len() + self.current.is_some() as usize
    }

    fn advance(&mut self) -> bool {
        self.current = self.records.next();
        self.current.is_some()
    }

    fn release(&mut self) {
        self.current = None;
        self.records = Vec::new().into_iter();
    }
}
