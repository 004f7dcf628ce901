//! Line record.

use std::cmp::Ordering;
use std::fmt;
use std::io::{self, prelude::*};
use std::str;

/// Separator between the number and the text parts of a line.
pub const SEPARATOR_STR: &str = ". ";
pub const SEPARATOR: &[u8] = SEPARATOR_STR.as_bytes();

/// Approximate per-record bookkeeping cost added to the record memory estimate.
pub const RECORD_OVERHEAD: usize = 24;

/// Line terminator convention. One convention applies to a whole output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        LineEnding::Lf
    }
}

/// A single `<number>. <text>` line.
///
/// The original line bytes are kept verbatim so the record is re-emitted exactly as it was read,
/// including number parts that are not valid integers. Records are ordered by the text part
/// (byte-wise) and then by the parsed number.
#[derive(Clone)]
pub struct Record {
    line: Vec<u8>,
    /// Offset of the text part. Zero if the line has no separator.
    text_start: usize,
    number: i32,
}

impl Record {
    /// Parses a line (without its terminator). Never fails: a line without a separator is all
    /// text with the number 0, an unparsable number is 0 as well.
    pub fn parse(line: impl Into<Vec<u8>>) -> Self {
        let line = line.into();

        match find_separator(&line) {
            Some(pos) => {
                let number = parse_number(&line[..pos]);
                Record {
                    line,
                    text_start: pos + SEPARATOR.len(),
                    number,
                }
            }
            None => Record {
                line,
                text_start: 0,
                number: 0,
            },
        }
    }

    /// Literal number part, empty if the line has no separator.
    pub fn number_text(&self) -> &[u8] {
        if self.text_start == 0 {
            &[]
        } else {
            &self.line[..self.text_start - SEPARATOR.len()]
        }
    }

    /// Parsed number part. Numbers outside the `i32` range count as 0.
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn text(&self) -> &[u8] {
        &self.line[self.text_start..]
    }

    pub fn has_separator(&self) -> bool {
        self.text_start != 0
    }

    /// Whole line without terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.line
    }

    /// Approximate memory consumed by the record.
    pub fn mem_size(&self) -> usize {
        2 * self.line.len() + RECORD_OVERHEAD
    }

    /// Writes the record followed by the line terminator.
    ///
    /// The line is written exactly as it was read: a line without a separator is not given an
    /// empty number part, so the sorted output is a permutation of the input lines.
    pub fn write_to<W: Write>(&self, writer: &mut W, ending: LineEnding) -> io::Result<()> {
        writer.write_all(&self.line)?;
        writer.write_all(ending.as_bytes())
    }
}

fn find_separator(line: &[u8]) -> Option<usize> {
    line.windows(SEPARATOR.len()).position(|window| window == SEPARATOR)
}

fn parse_number(number_text: &[u8]) -> i32 {
    str::from_utf8(number_text)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(0)
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text()
            .cmp(other.text())
            .then_with(|| self.number.cmp(&other.number))
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows the ordering: `01. a` and `1. a` are equal keys.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:?})", String::from_utf8_lossy(&self.line))
    }
}
