//! `ext-line-sort` sorts text files much larger than the available memory.
//!
//! Every line of the input has the form `<number>. <text>`. Lines are ordered by the text part
//! (byte-wise) and, when texts are equal, by the number. Lines without the `. ` separator are
//! treated as text with the number 0, number parts that are not integers count as 0 but are
//! written back unchanged. Blank lines are dropped.
//!
//! # Overview
//!
//! Sorting is done in two passes, see [External Sorting](https://en.wikipedia.org/wiki/External_sorting):
//!
//! * **Run generation:**
//!   the input is read into runs limited by approximate memory consumption and records count.
//!   Every run but the last one is sorted and spilled to a temporary file by a background task
//!   while the next run is being read. At most one spill task is outstanding, so no more than two
//!   runs are held in memory at any time.
//! * **Merge:**
//!   spilled runs and the last run, which never leaves memory, are merged by a binary heap into a
//!   single sorted stream. Temporary files are removed as soon as their runs are exhausted, or on
//!   failure.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use ext_line_sort::LineSorterBuilder;
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter = LineSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_limit(512 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort(input_reader, output_writer).unwrap();
//!     println!("{} lines sorted", summary.records);
//! }
//! ```

pub mod buffer;
#[cfg(feature = "generator")]
pub mod generator;
pub mod merger;
pub mod reader;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod sort;
pub mod source;
pub mod spill;

pub use buffer::{RunBuffer, RunBuilder};
pub use merger::RunMerger;
pub use record::{LineEnding, Record, SEPARATOR};
pub use registry::TempRegistry;
pub use sort::{LineSorter, LineSorterBuilder, SortError, SortSummary};
pub use source::{DiskSource, MemorySource, MergeSource};
pub use spill::SpillWriter;
