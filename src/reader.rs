//! Line reader.

use std::io::{self, prelude::*};

use crate::record::LineEnding;

/// Reads raw lines of any length from a buffered stream.
///
/// Line terminators (`\n` or `\r\n`) are stripped. The terminator of the first terminated line is
/// remembered as the stream line ending. Later lines with the other terminator do not change it,
/// so a sorted mixed-terminator input is written with the first line's terminator throughout.
pub struct LineReader<R> {
    inner: R,
    line_ending: Option<LineEnding>,
    lines_read: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader {
            inner,
            line_ending: None,
            lines_read: 0,
        }
    }

    /// Reads the next line into `buf` (cleared first). Returns `false` at the end of the stream.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        if self.inner.read_until(b'\n', buf)? == 0 {
            return Ok(false);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            let ending = if buf.last() == Some(&b'\r') {
                buf.pop();
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            };
            self.line_ending.get_or_insert(ending);
        }
        self.lines_read += 1;

        return Ok(true);
    }

    /// Checks whether the stream is exhausted without consuming anything.
    pub fn is_eof(&mut self) -> io::Result<bool> {
        Ok(self.inner.fill_buf()?.is_empty())
    }

    /// Line ending detected so far, [`LineEnding::Lf`] if no terminated line has been seen.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending.unwrap_or_default()
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::new();
        match self.read_line(&mut buf) {
            Ok(true) => Some(Ok(buf)),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
