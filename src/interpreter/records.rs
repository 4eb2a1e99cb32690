use std::io::{self, BufRead};
use std::mem;

use regex::Regex;

use crate::record::RecordSeparator;

/// Splits a byte stream into records. The separator is passed on every
/// read so that assignments to RS take effect on the next record.
pub struct RecordReader<R> {
    reader: R,
    buffer: String,
    eof: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            eof: false,
        }
    }

    /// Next record without its terminator, or `None` at end of input
    pub fn read_record(&mut self, separator: &RecordSeparator) -> io::Result<Option<String>> {
        match separator {
            RecordSeparator::Char(c) => self.read_until_char(*c),
            RecordSeparator::Paragraph => self.read_paragraph(),
            RecordSeparator::Regex(re) => self.read_until_regex(re),
        }
    }

    /// Append one more line of input to the buffer. Invalid UTF-8 is
    /// replaced rather than rejected.
    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes)? == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.buffer.push_str(&String::from_utf8_lossy(&bytes));
        Ok(true)
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.buffer))
        }
    }

    fn split_off(&mut self, start: usize, end: usize) -> String {
        let record = self.buffer[..start].to_string();
        self.buffer.drain(..end);
        record
    }

    fn read_until_char(&mut self, separator: char) -> io::Result<Option<String>> {
        let mut searched = 0;
        loop {
            if let Some(pos) = self.buffer[searched..].find(separator) {
                let pos = searched + pos;
                return Ok(Some(self.split_off(pos, pos + separator.len_utf8())));
            }
            searched = self.buffer.len();
            if !self.fill()? {
                return Ok(self.take_rest());
            }
        }
    }

    fn read_paragraph(&mut self) -> io::Result<Option<String>> {
        loop {
            let blank = self.buffer.len() - self.buffer.trim_start_matches('\n').len();
            self.buffer.drain(..blank);
            if !self.buffer.is_empty() {
                break;
            }
            if !self.fill()? {
                return Ok(None);
            }
        }

        let mut searched = 0;
        loop {
            if let Some(pos) = self.buffer[searched..].find("\n\n") {
                let pos = searched + pos;
                return Ok(Some(self.split_off(pos, pos + 2)));
            }
            // A blank line may start at the last newline already buffered
            searched = self.buffer.rfind('\n').unwrap_or(self.buffer.len());
            if !self.fill()? {
                return Ok(self.take_rest().map(|mut rest| {
                    rest.truncate(rest.trim_end_matches('\n').len());
                    rest
                }));
            }
        }
    }

    fn read_until_regex(&mut self, re: &Regex) -> io::Result<Option<String>> {
        loop {
            let found = re
                .find_iter(&self.buffer)
                .find(|m| !m.as_str().is_empty())
                .map(|m| (m.start(), m.end()));
            if let Some((start, end)) = found {
                // A match touching the end of the buffer might grow with more input
                if self.eof || end < self.buffer.len() {
                    return Ok(Some(self.split_off(start, end)));
                }
            }
            if !self.fill()? && found.is_none() {
                return Ok(self.take_rest());
            }
        }
    }
}
