//! Run buffers.

use std::io::{self, prelude::*};
use std::mem;

use rayon;

use crate::reader::LineReader;
use crate::record::Record;

/// Record size assumed when deriving the run count limit from the memory limit.
pub const ASSUMED_RECORD_SIZE: usize = 32;

const MAX_PREALLOCATED: usize = 4096;

/// Run buffer builder. Holds the run limits and fills new runs from a line stream.
#[derive(Clone, Debug)]
pub struct RunBuilder {
    mem_limit: usize,
    count_limit: usize,
}

impl RunBuilder {
    /// Creates a builder limiting runs by both memory and records count.
    pub fn new(mem_limit: usize, count_limit: usize) -> Self {
        RunBuilder {
            mem_limit: mem_limit.max(1),
            count_limit: count_limit.max(1),
        }
    }

    /// Creates a builder with the count limit derived from the memory limit.
    pub fn with_memory_limit(mem_limit: usize) -> Self {
        RunBuilder::new(mem_limit, mem_limit / ASSUMED_RECORD_SIZE)
    }

    pub fn mem_limit(&self) -> usize {
        self.mem_limit
    }

    pub fn count_limit(&self) -> usize {
        self.count_limit
    }

    /// Creates a new empty buffer.
    pub fn build(&self) -> RunBuffer {
        RunBuffer::new(self.mem_limit, self.count_limit)
    }

    /// Reads records until the buffer is full or the stream is exhausted. Blank lines are skipped.
    ///
    /// Returns the filled buffer and a flag telling whether the stream has been exhausted, that is
    /// the returned run is the last one.
    pub fn fill<R: BufRead>(&self, reader: &mut LineReader<R>) -> io::Result<(RunBuffer, bool)> {
        let mut buffer = self.build();
        let mut line = Vec::new();

        loop {
            if buffer.is_full() {
                let last = reader.is_eof()?;
                return Ok((buffer, last));
            }
            if !reader.read_line(&mut line)? {
                return Ok((buffer, true));
            }
            if line.is_empty() {
                continue;
            }
            buffer.push(Record::parse(mem::take(&mut line)));
        }
    }
}

impl Default for RunBuilder {
    fn default() -> Self {
        RunBuilder {
            mem_limit: usize::MAX,
            count_limit: usize::MAX,
        }
    }
}

/// Buffer limited by approximate consumed memory and by records count.
#[derive(Debug)]
pub struct RunBuffer {
    mem_limit: usize,
    count_limit: usize,
    mem_size: usize,
    inner: Vec<Record>,
}

impl RunBuffer {
    pub fn new(mem_limit: usize, count_limit: usize) -> Self {
        RunBuffer {
            mem_limit,
            count_limit,
            mem_size: 0,
            inner: Vec::with_capacity(count_limit.min(MAX_PREALLOCATED)),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: Record) {
        self.mem_size += record.mem_size();
        self.inner.push(record);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached either of the limits.
    pub fn is_full(&self) -> bool {
        self.mem_size >= self.mem_limit || self.inner.len() >= self.count_limit
    }

    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    pub fn into_records(self) -> Vec<Record> {
        self.inner
    }
}

impl IntoIterator for RunBuffer {
    type Item = Record;
    type IntoIter = <Vec<Record> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Record> for RunBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Record] {
        self.inner.as_mut_slice()
    }
}
