//! The current input record and the rules for splitting it into fields.

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Largest field index or NF a program may set or reference
pub const MAX_FIELDS: usize = 1_000_000;

/// How a record (or a `split` argument) is divided into fields
#[derive(Debug, Clone)]
pub enum FieldSplitter {
    /// FS = " ": runs of blanks, tabs and newlines; leading/trailing ignored
    Whitespace,
    /// FS = "": one field per character
    Chars,
    /// Any other single character, matched literally
    Literal(char),
    /// Everything else is a regular expression
    Regex(Regex),
}

impl FieldSplitter {
    pub fn new(fs: &str, ignore_case: bool) -> Result<Self> {
        let mut chars = fs.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(FieldSplitter::Chars),
            (Some(' '), None) => Ok(FieldSplitter::Whitespace),
            (Some(c), None) if !(ignore_case && c.is_alphabetic()) && c != '\\' => {
                Ok(FieldSplitter::Literal(c))
            }
            _ => {
                let pattern = if fs.chars().count() == 1 {
                    regex::escape(fs)
                } else {
                    fs.to_string()
                };
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(ignore_case)
                    .build()
                    .map_err(|e| Error::runtime(format!("invalid field separator {:?}: {}", fs, e)))?;
                Ok(FieldSplitter::Regex(re))
            }
        }
    }

    /// Split `text` into fields. Empty text has no fields.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        match self {
            FieldSplitter::Whitespace => text
                .split([' ', '\t', '\n'])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            FieldSplitter::Chars => text.chars().map(String::from).collect(),
            FieldSplitter::Literal(c) => text.split(*c).map(str::to_string).collect(),
            FieldSplitter::Regex(re) => re.split(text).map(str::to_string).collect(),
        }
    }

    /// Paragraph mode: a newline always separates fields, in addition to FS
    pub fn split_paragraph(&self, text: &str) -> Vec<String> {
        match self {
            FieldSplitter::Whitespace => self.split(text),
            _ => text.split('\n').flat_map(|line| self.split(line)).collect(),
        }
    }
}

impl Default for FieldSplitter {
    fn default() -> Self {
        FieldSplitter::Whitespace
    }
}

/// How the input stream is divided into records, derived from RS
#[derive(Debug, Clone)]
pub enum RecordSeparator {
    /// A single character, newline by default
    Char(char),
    /// RS = "": records are separated by one or more blank lines
    Paragraph,
    /// RS longer than one character is a regular expression
    Regex(Regex),
}

impl RecordSeparator {
    pub fn new(rs: &str) -> Result<Self> {
        let mut chars = rs.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(RecordSeparator::Paragraph),
            (Some(c), None) => Ok(RecordSeparator::Char(c)),
            _ => Regex::new(rs)
                .map(RecordSeparator::Regex)
                .map_err(|e| Error::runtime(format!("invalid record separator {:?}: {}", rs, e))),
        }
    }

    pub fn is_paragraph(&self) -> bool {
        matches!(self, RecordSeparator::Paragraph)
    }
}

impl Default for RecordSeparator {
    fn default() -> Self {
        RecordSeparator::Char('\n')
    }
}

/// Field 0 plus the split fields 1..NF
#[derive(Debug, Clone, Default)]
pub struct Record {
    text: String,
    fields: Vec<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn nf(&self) -> usize {
        self.fields.len()
    }

    /// Field `index`; 0 is the whole record, anything past NF is empty
    pub fn field(&self, index: usize) -> &str {
        if index == 0 {
            &self.text
        } else {
            self.fields.get(index - 1).map(String::as_str).unwrap_or("")
        }
    }

    /// Replace the whole record and re-split it
    pub fn set_text(&mut self, text: String, fields: Vec<String>) {
        self.text = text;
        self.fields = fields;
    }

    /// Assign field `index >= 1`, growing the record with empty fields as
    /// needed, then rebuild field 0 from the fields joined by `ofs`.
    pub fn set_field(&mut self, index: usize, value: String, ofs: &str) {
        debug_assert!(index >= 1);
        if index > self.fields.len() {
            self.fields.resize(index, String::new());
        }
        self.fields[index - 1] = value;
        self.rebuild(ofs);
    }

    /// Truncate or extend to `nf` fields and rebuild field 0
    pub fn set_nf(&mut self, nf: usize, ofs: &str) {
        self.fields.resize(nf, String::new());
        self.rebuild(ofs);
    }

    fn rebuild(&mut self, ofs: &str) {
        self.text = self.fields.join(ofs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, fs: &str) -> Record {
        let splitter = FieldSplitter::new(fs, false).unwrap();
        let mut record = Record::new();
        record.set_text(text.to_string(), splitter.split(text));
        record
    }

    #[test]
    fn test_whitespace_splitting() {
        let r = record("  alpha \t beta\tgamma  ", " ");
        assert_eq!(r.fields(), ["alpha", "beta", "gamma"]);
        assert_eq!(r.nf(), 3);
        assert_eq!(r.field(0), "  alpha \t beta\tgamma  ");
    }

    #[test]
    fn test_empty_record_has_no_fields() {
        assert_eq!(record("", " ").nf(), 0);
        assert_eq!(record("", ",").nf(), 0);
        assert_eq!(record("   ", " ").nf(), 0);
    }

    #[test]
    fn test_literal_splitting_keeps_empty_fields() {
        let r = record("a,,b,", ",");
        assert_eq!(r.fields(), ["a", "", "b", ""]);
        assert_eq!(record("x|y", "|").fields(), ["x", "y"]);
        assert_eq!(record("x\ty z", "\t").fields(), ["x", "y z"]);
    }

    #[test]
    fn test_regex_splitting() {
        assert_eq!(record("a1b22c", "[0-9]+").fields(), ["a", "b", "c"]);
        assert_eq!(record("a, b,c", ", *").fields(), ["a", "b", "c"]);
    }

    #[test]
    fn test_char_splitting() {
        assert_eq!(record("héllo", "").fields(), ["h", "é", "l", "l", "o"]);
    }

    #[test]
    fn test_ignore_case_letter_separator() {
        let splitter = FieldSplitter::new("x", true).unwrap();
        assert_eq!(splitter.split("aXbxc"), ["a", "b", "c"]);
        let splitter = FieldSplitter::new("x", false).unwrap();
        assert_eq!(splitter.split("aXbxc"), ["aXb", "c"]);
    }

    #[test]
    fn test_invalid_regex_separator() {
        assert!(FieldSplitter::new("[", false).is_ok());
        assert!(FieldSplitter::new("a(", false).is_err());
    }

    #[test]
    fn test_paragraph_split_adds_newline() {
        let splitter = FieldSplitter::new(":", false).unwrap();
        assert_eq!(splitter.split_paragraph("a:b\nc"), ["a", "b", "c"]);
    }

    #[test]
    fn test_record_separator_modes() {
        assert!(matches!(RecordSeparator::new("\n"), Ok(RecordSeparator::Char('\n'))));
        assert!(matches!(RecordSeparator::new(";"), Ok(RecordSeparator::Char(';'))));
        assert!(RecordSeparator::new("").unwrap().is_paragraph());
        assert!(matches!(RecordSeparator::new("\n+"), Ok(RecordSeparator::Regex(_))));
        assert!(RecordSeparator::new("(").is_ok());
        assert!(RecordSeparator::new("((").is_err());
    }

    #[test]
    fn test_field_access_beyond_nf() {
        let r = record("a b", " ");
        assert_eq!(r.field(1), "a");
        assert_eq!(r.field(5), "");
    }

    #[test]
    fn test_set_field_rebuilds_record() {
        let mut r = record("a b c", " ");
        r.set_field(2, "X".to_string(), "-");
        assert_eq!(r.text(), "a-X-c");

        r.set_field(5, "e".to_string(), " ");
        assert_eq!(r.nf(), 5);
        assert_eq!(r.text(), "a X c  e");
    }

    #[test]
    fn test_set_field_then_resplit_round_trip() {
        let mut r = record("one two three", " ");
        r.set_field(4, "four".to_string(), " ");
        let again = record(r.text(), " ");
        assert_eq!(again.field(4), "four");
        assert_eq!(again.nf(), 4);
    }

    #[test]
    fn test_set_nf() {
        let mut r = record("a b c d", " ");
        r.set_nf(2, ",");
        assert_eq!(r.text(), "a,b");
        r.set_nf(4, ",");
        assert_eq!(r.text(), "a,b,,");
    }
}
