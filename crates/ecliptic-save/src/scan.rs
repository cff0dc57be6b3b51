//! Low-level stream reading for the decoder.
//!
//! The grammar is strictly structured (explicit counts and `;` terminators),
//! so the scanner never searches ahead unboundedly. Whitespace between tokens
//! carries no meaning and is skipped. Every failure carries the line and
//! column at which it was detected.

use crate::error::DecodeError;

/// Escape text for a quoted or stringified token: `\`, `"` and `;` are the
/// only characters with wire meaning.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            ';' => out.push_str("\\;"),
            other => out.push(other),
        }
    }
    out
}

pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    pub fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    pub(crate) fn end_of_input(&self, expected: &str) -> DecodeError {
        DecodeError::UnexpectedEnd {
            expected: expected.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    pub(crate) fn malformed(&self, expected: &str, found: impl Into<String>) -> DecodeError {
        DecodeError::MalformedToken {
            expected: expected.to_string(),
            found: found.into(),
            line: self.line,
            column: self.column,
        }
    }

    /// Read everything up to `delim`, consuming the delimiter.
    pub fn read_until(&mut self, delim: char, expected: &str) -> Result<String, DecodeError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == delim => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.end_of_input(expected)),
            }
        }
    }

    /// Read everything up to whichever of `a` or `b` comes first; returns
    /// the collected text and the delimiter actually hit.
    pub fn read_until_either(
        &mut self,
        a: char,
        b: char,
        expected: &str,
    ) -> Result<(String, char), DecodeError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == a || c == b => return Ok((out, c)),
                Some(c) => out.push(c),
                None => return Err(self.end_of_input(expected)),
            }
        }
    }

    /// Read a raw scalar token: trimmed text up to the `;` terminator.
    pub fn read_raw_token(&mut self, expected: &str) -> Result<String, DecodeError> {
        Ok(self.read_until(';', expected)?.trim().to_string())
    }

    /// Skip whitespace, then consume exactly `ch`.
    pub fn expect(&mut self, ch: char) -> Result<(), DecodeError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == ch => Ok(()),
            Some(c) => Err(self.malformed(&format!("'{ch}'"), c.to_string())),
            None => Err(self.end_of_input(&format!("'{ch}'"))),
        }
    }

    /// Skip whitespace and consume one payload tag character.
    pub fn read_tag(&mut self, expected: &str) -> Result<char, DecodeError> {
        self.skip_ws();
        self.bump().ok_or_else(|| self.end_of_input(expected))
    }

    /// Skip whitespace and look at the next character without consuming it.
    pub fn peek_tag(&mut self) -> Option<char> {
        self.skip_ws();
        self.peek()
    }

    /// Read a quoted string: leading `"`, escape sequences, closing `"`.
    /// Does not consume the trailing `;`.
    pub fn read_quoted(&mut self) -> Result<String, DecodeError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('\\' | '"' | ';')) => out.push(c),
                    Some(c) => {
                        return Err(self.malformed("escape sequence", format!("\\{c}")));
                    }
                    None => return Err(self.end_of_input("escape sequence")),
                },
                Some(c) => out.push(c),
                None => return Err(self.end_of_input("closing '\"'")),
            }
        }
    }

    /// Read an escaped but unquoted token up to its unescaped `;`
    /// terminator, consuming the terminator.
    pub fn read_escaped_token(&mut self, expected: &str) -> Result<String, DecodeError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(';') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('\\' | '"' | ';')) => out.push(c),
                    Some(c) => {
                        return Err(self.malformed("escape sequence", format!("\\{c}")));
                    }
                    None => return Err(self.end_of_input("escape sequence")),
                },
                Some(c) => out.push(c),
                None => return Err(self.end_of_input(expected)),
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
