//! Object model and canonical serialization.
//!
//! Objects are plain values. Composite objects own their children outright,
//! so cloning is always a deep copy and cycles can only appear through
//! references that the [`crate::Updater`] resolves by number.

use std::collections::BTreeMap;

pub(crate) const WHITESPACE: &[u8] = b"\t\n\x0c\r ";
pub(crate) const DELIMITERS: &[u8] = b"()<>[]{}/%";

/// A token or object. Tokens and objects share one type: the markers
/// (`BeginArray`, `EndDict`, ...) only ever come out of the lexer, while the
/// composite kinds only ever come out of the parser or user code.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// End of input.
    End,
    /// CR, LF or CRLF.
    Newline,
    Comment(Vec<u8>),
    Null,
    Bool(bool),
    Number(f64),
    Keyword(Vec<u8>),
    /// A name without its leading slash, escapes decoded.
    Name(Vec<u8>),
    /// A literal or hex string, decoded.
    String(Vec<u8>),

    BeginArray,
    EndArray,
    BeginDict,
    EndDict,

    Array(Vec<Object>),
    Dict(Dict),
    Stream(Dict, Vec<u8>),
    Indirect {
        n: u32,
        generation: u16,
        value: Box<Object>,
    },
    Reference {
        n: u32,
        generation: u16,
    },
}

impl Object {
    pub fn name(name: impl Into<Vec<u8>>) -> Self {
        Object::Name(name.into())
    }

    pub fn string(s: impl Into<Vec<u8>>) -> Self {
        Object::String(s.into())
    }

    pub fn keyword(k: impl Into<Vec<u8>>) -> Self {
        Object::Keyword(k.into())
    }

    pub fn reference(n: u32, generation: u16) -> Self {
        Object::Reference { n, generation }
    }

    pub fn indirect(value: Object, n: u32, generation: u16) -> Self {
        Object::Indirect {
            n,
            generation,
            value: Box::new(value),
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Object::Keyword(k) if k == keyword.as_bytes())
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Object::Name(n) if n == name.as_bytes())
    }

    /// Returns the value if this is a number without a fractional part.
    pub fn as_integer(&self) -> Option<f64> {
        match self {
            Object::Number(n) if n.fract() == 0.0 => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if this is a non-negative integer no greater than `max`.
    pub fn as_uint(&self, max: u64) -> Option<u64> {
        let n = self.as_integer()?;
        (n >= 0.0 && n <= max as f64).then_some(n as u64)
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_dict(self) -> Option<Dict> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Renders the object in its canonical form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    /// Appends the canonical form to `out`. [`Object::End`] renders as nothing.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Object::End => {}
            Object::Newline => out.push(b'\n'),
            Object::Comment(text) => {
                out.push(b'%');
                out.extend_from_slice(text);
            }
            Object::Null => out.extend_from_slice(b"null"),
            Object::Bool(true) => out.extend_from_slice(b"true"),
            Object::Bool(false) => out.extend_from_slice(b"false"),
            // Display for f64 is the shortest round-tripping form and never
            // switches to exponent notation.
            Object::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
            Object::Keyword(k) => out.extend_from_slice(k),
            Object::Name(n) => write_name(n, out),
            Object::String(s) => write_string(s, out),
            Object::BeginArray => out.push(b'['),
            Object::EndArray => out.push(b']'),
            Object::BeginDict => out.extend_from_slice(b"<<"),
            Object::EndDict => out.extend_from_slice(b">>"),
            Object::Array(items) => {
                out.extend_from_slice(b"[ ");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write_to(out);
                }
                out.extend_from_slice(b" ]");
            }
            Object::Dict(dict) => dict.write_to(out),
            Object::Stream(dict, data) => {
                let mut dict = dict.clone();
                dict.insert("Length", Object::Number(data.len() as f64));
                dict.write_to(out);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nendstream");
            }
            Object::Indirect {
                n,
                generation,
                value,
            } => {
                out.extend_from_slice(format!("{n} {generation} obj\n").as_bytes());
                value.write_to(out);
                out.extend_from_slice(b"\nendobj");
            }
            Object::Reference { n, generation } => {
                out.extend_from_slice(format!("{n} {generation} R").as_bytes());
            }
        }
    }
}

impl From<Dict> for Object {
    fn from(dict: Dict) -> Self {
        Object::Dict(dict)
    }
}

fn write_name(name: &[u8], out: &mut Vec<u8>) {
    out.push(b'/');
    for &ch in name {
        if ch == b'#'
            || DELIMITERS.contains(&ch)
            || WHITESPACE.contains(&ch)
            || !(0x21..=0x7e).contains(&ch)
        {
            out.extend_from_slice(format!("#{ch:02x}").as_bytes());
        } else {
            out.push(ch);
        }
    }
}

fn write_string(s: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &ch in s {
        match ch {
            b'\\' | b'(' | b')' => out.extend_from_slice(&[b'\\', ch]),
            // A raw CR would be read back as a line feed.
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(ch),
        }
    }
    out.push(b')');
}

/// Dictionary with byte-string keys, iterated and serialized in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict(BTreeMap<Vec<u8>, Object>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&Object> {
        self.0.get(key.as_ref())
    }

    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut Object> {
        self.0.get_mut(key.as_ref())
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: Object) -> Option<Object> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<Object> {
        self.0.remove(key.as_ref())
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.0.contains_key(key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Object)> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");
        for (key, value) in &self.0 {
            out.push(b' ');
            write_name(key, out);
            out.push(b' ');
            value.write_to(out);
        }
        out.extend_from_slice(b" >>");
    }
}

impl<K: Into<Vec<u8>>> FromIterator<(K, Object)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, Object)>>(iter: I) -> Self {
        Dict(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
