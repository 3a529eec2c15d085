//! Tokenizer over an immutable byte window.

use crate::error::{Error, Result};
use crate::object::{DELIMITERS, Object, WHITESPACE};

fn is_regular(ch: u8) -> bool {
    !WHITESPACE.contains(&ch) && !DELIMITERS.contains(&ch)
}

fn is_octal(ch: u8) -> bool {
    (b'0'..=b'7').contains(&ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// A basic lexical analyser. Not strict: it only knows enough of the grammar
/// to find object boundaries.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the cursor within the window.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes exactly `len` raw bytes, or nothing if fewer remain.
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let rest = self.remaining();
        let bytes = rest.get(..len)?;
        self.pos += len;
        Some(bytes)
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn read(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    /// Treats CR, LF and CRLF alike; consumes the LF of a CRLF pair.
    fn eat_newline(&mut self, ch: u8) -> bool {
        if ch == b'\r' {
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            }
            return true;
        }
        ch == b'\n'
    }

    /// Returns the next token, or [`Object::End`] once the window is exhausted.
    pub fn next_token(&mut self) -> Result<Object> {
        loop {
            let Some(ch) = self.peek() else {
                return Ok(Object::End);
            };
            if b"-0123456789.".contains(&ch) {
                return self.number();
            }

            let start = self.pos;
            while self.peek().is_some_and(is_regular) {
                self.pos += 1;
            }
            match &self.data[start..self.pos] {
                b"" => {}
                b"null" => return Ok(Object::Null),
                b"true" => return Ok(Object::Bool(true)),
                b"false" => return Ok(Object::Bool(false)),
                word => return Ok(Object::Keyword(word.to_vec())),
            }

            self.pos += 1;
            return match ch {
                b'/' => self.name(),
                b'%' => Ok(self.comment()),
                b'(' => self.string(),
                b'[' => Ok(Object::BeginArray),
                b']' => Ok(Object::EndArray),
                b'<' if self.peek() == Some(b'<') => {
                    self.pos += 1;
                    Ok(Object::BeginDict)
                }
                b'<' => self.hex_string(),
                b'>' if self.peek() == Some(b'>') => {
                    self.pos += 1;
                    Ok(Object::EndDict)
                }
                b'>' => Err(Error::token("unexpected '>'")),
                _ if self.eat_newline(ch) => Ok(Object::Newline),
                _ if WHITESPACE.contains(&ch) => continue,
                _ => Err(Error::token(format!(
                    "unexpected input {:?} at offset {start}",
                    ch as char
                ))),
            };
        }
    }

    fn number(&mut self) -> Result<Object> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let (mut real, mut digits) = (false, false);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits = true;
            } else if ch == b'.' && !real {
                real = true;
            } else {
                break;
            }
            self.pos += 1;
        }
        if !digits {
            return Err(Error::token("invalid number"));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(Object::Number)
            .ok_or_else(|| Error::token("invalid number"))
    }

    fn name(&mut self) -> Result<Object> {
        let mut value = Vec::new();
        while let Some(ch) = self.peek().filter(|&ch| is_regular(ch)) {
            self.pos += 1;
            if ch != b'#' {
                value.push(ch);
                continue;
            }
            let hi = self.peek().and_then(hex_value);
            if hi.is_some() {
                self.pos += 1;
            }
            let lo = self.peek().and_then(hex_value);
            if lo.is_some() {
                self.pos += 1;
            }
            match (hi, lo) {
                (Some(hi), Some(lo)) => value.push(hi << 4 | lo),
                _ => return Err(Error::token("invalid name hexa escape")),
            }
        }
        if value.is_empty() {
            return Err(Error::token("unexpected end of name"));
        }
        Ok(Object::Name(value))
    }

    fn comment(&mut self) -> Object {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch != b'\r' && ch != b'\n') {
            self.pos += 1;
        }
        Object::Comment(self.data[start..self.pos].to_vec())
    }

    fn unescape(&mut self, ch: u8) -> u8 {
        match ch {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'b' => 0x08,
            b'f' => 0x0c,
            _ if is_octal(ch) => {
                let mut value = u32::from(ch - b'0');
                for _ in 0..2 {
                    match self.peek().filter(|&c| is_octal(c)) {
                        Some(c) => {
                            value = value * 8 + u32::from(c - b'0');
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                // High-order overflow is ignored.
                value as u8
            }
            _ => ch,
        }
    }

    fn string(&mut self) -> Result<Object> {
        let mut value = Vec::new();
        let mut parens = 1;
        loop {
            let Some(mut ch) = self.read() else {
                return Err(Error::token("unexpected end of string"));
            };
            if self.eat_newline(ch) {
                ch = b'\n';
            } else if ch == b'(' {
                parens += 1;
            } else if ch == b')' {
                parens -= 1;
                if parens == 0 {
                    break;
                }
            } else if ch == b'\\' {
                let Some(escaped) = self.read() else {
                    return Err(Error::token("unexpected end of string"));
                };
                if self.eat_newline(escaped) {
                    continue;
                }
                ch = self.unescape(escaped);
            }
            value.push(ch);
        }
        Ok(Object::String(value))
    }

    fn hex_string(&mut self) -> Result<Object> {
        let mut value = Vec::new();
        let mut pending: Option<u8> = None;
        loop {
            let Some(ch) = self.read() else {
                return Err(Error::token("unexpected end of hex string"));
            };
            if ch == b'>' {
                break;
            }
            if WHITESPACE.contains(&ch) {
                continue;
            }
            let Some(nibble) = hex_value(ch) else {
                return Err(Error::token("invalid hex string"));
            };
            match pending.take() {
                Some(hi) => value.push(hi << 4 | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(hi) = pending {
            value.push(hi << 4);
        }
        Ok(Object::String(value))
    }
}
