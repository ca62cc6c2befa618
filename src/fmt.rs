// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Diagnostic formatting helpers
//!
//! - [`escape`] renders untrusted strings (PV names, string values) with
//!   non-printable bytes escaped.
//! - [`IndentWriter`] wraps any [`fmt::Write`] and prefixes each line with the
//!   current indentation. Depth and verbosity are changed through scoped guards
//!   that restore the previous value when dropped.
//!
//! ```
//! use std::fmt::Write;
//! use pvcore::fmt::IndentWriter;
//!
//! let mut out = IndentWriter::new(String::new());
//! writeln!(out, "root").unwrap();
//! {
//!     let mut child = out.indent();
//!     writeln!(child, "leaf").unwrap();
//! }
//! assert_eq!(out.into_inner(), "root\n    leaf\n");
//! ```

use std::fmt::{self, Write};
use std::ops::{Deref, DerefMut};

const INDENT: &str = "    ";

/// Display adapter escaping non-printable bytes
#[derive(Clone, Copy, Debug)]
pub struct Escaped<'a> {
    bytes: &'a [u8],
}

/// Escape a string for display.
///
/// Short escapes are used for the usual control characters and quotes.
/// Everything else outside printable ASCII becomes a two digit hex escape,
/// so `"\xabcase"` has to be split by hand before reuse as C source.
pub fn escape(s: &str) -> Escaped<'_> {
    Escaped {
        bytes: s.as_bytes(),
    }
}

/// Escape a raw byte slice for display
pub fn escape_bytes(bytes: &[u8]) -> Escaped<'_> {
    Escaped { bytes }
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.bytes {
            match b {
                0x07 => f.write_str("\\a")?,
                0x08 => f.write_str("\\b")?,
                0x0c => f.write_str("\\f")?,
                b'\n' => f.write_str("\\n")?,
                b'\r' => f.write_str("\\r")?,
                b'\t' => f.write_str("\\t")?,
                0x0b => f.write_str("\\v")?,
                b'\\' => f.write_str("\\\\")?,
                b'\'' => f.write_str("\\'")?,
                b'"' => f.write_str("\\\"")?,
                0x20..=0x7e => f.write_char(b as char)?,
                _ => write!(f, "\\x{b:02x}")?,
            }
        }
        Ok(())
    }
}

/// Line-indenting writer with a verbosity level
#[derive(Debug)]
pub struct IndentWriter<W> {
    inner: W,
    depth: usize,
    level: u32,
    at_line_start: bool,
}

impl<W: fmt::Write> IndentWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            depth: 0,
            level: 0,
            at_line_start: true,
        }
    }

    /// Current indentation depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current verbosity level, 0 unless raised by [`IndentWriter::detailed`]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Indent by one level until the guard is dropped
    pub fn indent(&mut self) -> Indent<'_, W> {
        self.indent_by(1)
    }

    pub fn indent_by(&mut self, by: usize) -> Indent<'_, W> {
        self.depth += by;
        Indent { writer: self, by }
    }

    /// Use verbosity `level` until the guard is dropped
    pub fn detailed(&mut self, level: u32) -> Detail<'_, W> {
        let prev = std::mem::replace(&mut self.level, level);
        Detail { writer: self, prev }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: fmt::Write> fmt::Write for IndentWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for line in s.split_inclusive('\n') {
            // Blank lines stay blank
            if self.at_line_start && line != "\n" {
                for _ in 0..self.depth {
                    self.inner.write_str(INDENT)?;
                }
            }
            self.inner.write_str(line)?;
            self.at_line_start = line.ends_with('\n');
        }
        Ok(())
    }
}

/// Scoped indentation, see [`IndentWriter::indent`]
pub struct Indent<'a, W: fmt::Write> {
    writer: &'a mut IndentWriter<W>,
    by: usize,
}

impl<W: fmt::Write> Deref for Indent<'_, W> {
    type Target = IndentWriter<W>;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl<W: fmt::Write> DerefMut for Indent<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}

impl<W: fmt::Write> fmt::Write for Indent<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.writer.write_str(s)
    }
}

impl<W: fmt::Write> Drop for Indent<'_, W> {
    fn drop(&mut self) {
        self.writer.depth -= self.by;
    }
}

/// Scoped verbosity, see [`IndentWriter::detailed`]
pub struct Detail<'a, W: fmt::Write> {
    writer: &'a mut IndentWriter<W>,
    prev: u32,
}

impl<W: fmt::Write> Deref for Detail<'_, W> {
    type Target = IndentWriter<W>;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl<W: fmt::Write> DerefMut for Detail<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}

impl<W: fmt::Write> fmt::Write for Detail<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.writer.write_str(s)
    }
}

impl<W: fmt::Write> Drop for Detail<'_, W> {
    fn drop(&mut self) {
        self.writer.level = self.prev;
    }
}

/// Multi-line diagnostic rendering honouring indentation and verbosity
pub trait Describe {
    fn describe<W: fmt::Write>(&self, out: &mut IndentWriter<W>) -> fmt::Result;
}

/// Render `value` into a fresh string at verbosity `level`
pub fn describe_to_string<D: Describe + ?Sized>(value: &D, level: u32) -> String {
    let mut out = IndentWriter::new(String::new());
    {
        let mut detail = out.detailed(level);
        // Writing into a String cannot fail
        let _ = value.describe(&mut *detail);
    }
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_short_forms() {
        let s = escape("this \"is a test\"\n").to_string();
        assert_eq!(s, "this \\\"is a test\\\"\\n");
        assert_eq!(escape("tab\there").to_string(), "tab\\there");
        assert_eq!(escape("back\\slash 'q'").to_string(), "back\\\\slash \\'q\\'");
    }

    #[test]
    fn test_escape_hex_always_two_digits() {
        assert_eq!(escape_bytes(&[0x01, b'A', 0xab]).to_string(), "\\x01A\\xab");
        assert_eq!(escape("\u{7f}").to_string(), "\\x7f");
        // Multi-byte UTF-8 escapes each byte
        assert_eq!(escape("é").to_string(), "\\xc3\\xa9");
    }

    #[test]
    fn test_escape_fixed_length_prefix() {
        let raw = b"this \"is a test\"";
        assert_eq!(escape_bytes(&raw[..6]).to_string(), "this \\\"");
    }

    #[test]
    fn test_indent_guards_nest_and_restore() {
        let mut out = IndentWriter::new(String::new());
        writeln!(out, "a").unwrap();
        {
            let mut one = out.indent();
            writeln!(one, "b").unwrap();
            {
                let mut two = one.indent();
                write!(two, "c\n\nd\n").unwrap();
                assert_eq!(two.depth(), 2);
            }
            writeln!(one, "e").unwrap();
        }
        writeln!(out, "f").unwrap();
        assert_eq!(out.depth(), 0);
        assert_eq!(
            out.into_inner(),
            "a\n    b\n        c\n\n        d\n    e\nf\n"
        );
    }

    #[test]
    fn test_partial_lines_indent_once() {
        let mut out = IndentWriter::new(String::new());
        {
            let mut g = out.indent_by(2);
            write!(g, "x").unwrap();
            write!(g, "y\n").unwrap();
        }
        assert_eq!(out.into_inner(), "        xy\n");
    }

    #[test]
    fn test_detail_guard_restores_level() {
        let mut out = IndentWriter::new(String::new());
        assert_eq!(out.level(), 0);
        {
            let mut d = out.detailed(2);
            assert_eq!(d.level(), 2);
            {
                let d3 = d.detailed(3);
                assert_eq!(d3.level(), 3);
            }
            assert_eq!(d.level(), 2);
        }
        assert_eq!(out.level(), 0);
    }
}
