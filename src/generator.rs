//! Test data generator.
//!
//! Produces files of `<number>. <text>` lines suitable as sorter input. Numbers follow an
//! exponential distribution, texts are random words of latin letters. A small share of texts is
//! repeated on purpose so that the output contains lines differing only by their numbers.

use std::io::{self, prelude::*};

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::record::SEPARATOR_STR;

/// Minimum text length.
pub const MIN_TEXT_LENGTH: usize = 5;
/// Maximum line length (without terminator).
pub const MAX_LINE_LENGTH: usize = 1024;
/// Probability of a text being reused, and of a new text entering the duplicates bag.
pub const DUPLICATE_CHANCE: f64 = 0.02;
/// Number of texts kept for reuse.
pub const DUPLICATES_BAG_SIZE: usize = 5;

/// Generated data statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub lines: u64,
    /// Bytes written including line terminators.
    pub bytes: u64,
}

/// Random line generator.
pub struct LineGenerator<R> {
    rng: R,
    duplicates: Vec<String>,
}

impl LineGenerator<ThreadRng> {
    pub fn new() -> Self {
        LineGenerator::with_rng(rand::thread_rng())
    }
}

impl<R: Rng> LineGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        LineGenerator {
            rng,
            duplicates: Vec::with_capacity(DUPLICATES_BAG_SIZE),
        }
    }

    /// Writes lines until at least `target_size` bytes of line content are written.
    pub fn generate<W: Write>(&mut self, writer: &mut W, target_size: u64) -> io::Result<GenerateSummary> {
        let mut summary = GenerateSummary::default();
        let mut content_size = 0;

        while content_size < target_size {
            let line = self.next_line();
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;

            content_size += line.len() as u64;
            summary.lines += 1;
            summary.bytes += line.len() as u64 + 1;
        }
        writer.flush()?;

        return Ok(summary);
    }

    /// Generates a single line without terminator.
    pub fn next_line(&mut self) -> String {
        let mut line = self.next_number().to_string();
        line.push_str(SEPARATOR_STR);

        let text = self.next_text(MAX_LINE_LENGTH - line.len());
        line.push_str(&text);

        return line;
    }

    fn next_number(&mut self) -> i32 {
        let uniform: f64 = self.rng.gen();
        (10000.0 * -uniform.ln()) as i32
    }

    fn next_text(&mut self, max_length: usize) -> String {
        let roll: f64 = self.rng.gen();
        if roll < DUPLICATE_CHANCE && self.duplicates.len() >= DUPLICATES_BAG_SIZE {
            let idx = self.rng.gen_range(0..self.duplicates.len());
            return self.duplicates[idx].clone();
        }

        let length = self.rng.gen_range(MIN_TEXT_LENGTH..max_length);
        let mut text = String::with_capacity(length);
        text.push(self.rng.gen_range(b'A'..=b'Z') as char);

        let mut previous_is_space = true;
        for i in 1..length {
            // spaces are never doubled and never end the text
            let c = if previous_is_space || i == length - 1 {
                self.rng.gen_range(b'a'..=b'z')
            } else {
                match self.rng.gen_range(0..30u8) {
                    n if n < 26 => b'a' + n,
                    _ => b' ',
                }
            };
            previous_is_space = c == b' ';
            text.push(c as char);
        }

        if roll < DUPLICATE_CHANCE {
            self.duplicates.push(text.clone());
        } else if roll > 1.0 - DUPLICATE_CHANCE && self.duplicates.len() == DUPLICATES_BAG_SIZE {
            let idx = self.rng.gen_range(0..DUPLICATES_BAG_SIZE);
            self.duplicates[idx] = text.clone();
        }

        return text;
    }
}
