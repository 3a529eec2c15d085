//! Structural parser turning tokens into composite objects.

use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::object::{Dict, Object};

/// Resolves references met while parsing, namely indirect stream lengths.
pub trait Resolve {
    /// Passes non-reference objects through, follows one reference hop otherwise.
    fn dereference(&self, object: Object) -> Result<Object>;
}

/// Leaves references unresolved, for parsing outside of any document.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolve;

impl Resolve for NoResolve {
    fn dereference(&self, object: Object) -> Result<Object> {
        Ok(object)
    }
}

/// Reads objects at the lexer's position. Not a strict parser.
pub struct Parser<'a, R: ?Sized> {
    lexer: Lexer<'a>,
    resolver: &'a R,
}

impl<'a, R: Resolve + ?Sized> Parser<'a, R> {
    pub fn new(data: &'a [u8], resolver: &'a R) -> Self {
        Self {
            lexer: Lexer::new(data),
            resolver,
        }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Parses one object. `stack` holds the objects already produced in the
    /// current nesting context: `N G obj` and `N G R` pop their ID pair from
    /// it, and `stream` pops its dictionary.
    pub fn parse(&mut self, stack: &mut Vec<Object>) -> Result<Object> {
        loop {
            let token = self.lexer.next_token()?;
            return match token {
                Object::Newline | Object::Comment(_) => continue,
                Object::BeginArray => self
                    .parse_until(Object::EndArray, "array doesn't end")
                    .map(Object::Array),
                Object::BeginDict => {
                    let items = self.parse_until(Object::EndDict, "dictionary doesn't end")?;
                    dict_from_items(items).map(Object::Dict)
                }
                // Stream data typically needs the cross-reference table.
                _ if token.is_keyword("stream") => self.parse_stream(stack),
                _ if token.is_keyword("obj") => self.parse_indirect(stack),
                _ if token.is_keyword("R") => parse_reference(stack),
                _ => Ok(token),
            };
        }
    }

    fn parse_until(&mut self, terminator: Object, unterminated: &str) -> Result<Vec<Object>> {
        let mut items = Vec::new();
        loop {
            match self.parse(&mut items)? {
                Object::End => return Err(Error::structural(unterminated)),
                object if object == terminator => return Ok(items),
                object => items.push(object),
            }
        }
    }

    fn parse_stream(&mut self, stack: &mut Vec<Object>) -> Result<Object> {
        let dict = match stack.pop() {
            Some(Object::Dict(dict)) => dict,
            Some(_) => return Err(Error::structural("stream not preceded by a dictionary")),
            None => return Err(Error::structural("missing stream dictionary")),
        };
        let length = dict
            .get("Length")
            .cloned()
            .ok_or_else(|| Error::structural("missing stream Length"))?;
        let length = self
            .resolver
            .dereference(length)?
            .as_uint(usize::MAX as u64)
            .ok_or_else(|| Error::structural("stream Length not an unsigned integer"))?;

        if self.lexer.next_token()? != Object::Newline {
            return Err(Error::structural("stream does not start with a newline"));
        }
        let data = usize::try_from(length)
            .ok()
            .and_then(|len| self.lexer.take(len))
            .ok_or_else(|| Error::structural("stream is longer than the document"))?
            .to_vec();

        // Trailing newlines and comments are skipped by parse().
        if !self.parse(stack)?.is_keyword("endstream") {
            return Err(Error::structural("improperly terminated stream"));
        }
        Ok(Object::Stream(dict, data))
    }

    fn parse_indirect(&mut self, stack: &mut Vec<Object>) -> Result<Object> {
        let (n, generation) =
            pop_id_pair(stack).map_err(|e| Error::structural(format!("{e} before obj")))?;

        let mut inner = Vec::new();
        loop {
            match self.parse(&mut inner)? {
                Object::End => return Err(Error::structural("object doesn't end")),
                object if object.is_keyword("endobj") => break,
                object => inner.push(object),
            }
        }
        match <[Object; 1]>::try_from(inner) {
            Ok([value]) => Ok(Object::indirect(value, n, generation)),
            Err(_) => Err(Error::structural(
                "indirect objects must contain exactly one object",
            )),
        }
    }
}

fn parse_reference(stack: &mut Vec<Object>) -> Result<Object> {
    let (n, generation) =
        pop_id_pair(stack).map_err(|e| Error::structural(format!("{e} before R")))?;
    Ok(Object::reference(n, generation))
}

fn pop_id_pair(stack: &mut Vec<Object>) -> std::result::Result<(u32, u16), &'static str> {
    if stack.len() < 2 {
        return Err("missing object ID pair");
    }
    let generation = stack.pop();
    let n = stack.pop();
    let n = n.and_then(|n| n.as_uint(u32::MAX as u64));
    let generation = generation.and_then(|g| g.as_uint(u16::MAX as u64));
    match (n, generation) {
        (Some(n), Some(g)) => Ok((n as u32, g as u16)),
        _ => Err("invalid object ID pair"),
    }
}

fn dict_from_items(items: Vec<Object>) -> Result<Dict> {
    if items.len() % 2 != 0 {
        return Err(Error::structural("unbalanced dictionary"));
    }
    let mut dict = Dict::new();
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let Object::Name(key) = key else {
            return Err(Error::structural("invalid dictionary key type"));
        };
        dict.insert(key, value);
    }
    Ok(dict)
}

/// Parses the first object in `data` without a document to resolve against.
pub fn parse_object(data: &[u8]) -> Result<Object> {
    let mut parser = Parser::new(data, &NoResolve);
    let mut stack = Vec::new();
    loop {
        match parser.parse(&mut stack)? {
            // Numbers may turn out to be the start of an ID pair.
            object @ Object::Number(_) => stack.push(object),
            Object::End => {
                return stack
                    .pop()
                    .ok_or_else(|| Error::structural("no object found"));
            }
            object => return Ok(object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(data: &[u8]) -> Result<Object> {
        parse_object(data)
    }

    fn err(data: &[u8]) -> String {
        parse(data).unwrap_err().to_string()
    }

    #[test]
    fn references_pop_from_enclosing_array() {
        assert_eq!(
            parse(b"[1 0 R 2 5 R 7]").unwrap(),
            Object::Array(vec![
                Object::reference(1, 0),
                Object::reference(2, 5),
                Object::Number(7.0),
            ])
        );
    }

    #[test]
    fn dictionary_values_may_be_references() {
        let dict = parse(b"<< /Root 1 0 R /Size 4 >>").unwrap();
        let dict = dict.as_dict().unwrap();
        assert_eq!(dict.get("Root"), Some(&Object::reference(1, 0)));
        assert_eq!(dict.get("Size"), Some(&Object::Number(4.0)));
    }

    #[test]
    fn top_level_reference() {
        assert_eq!(parse(b"12 0 R").unwrap(), Object::reference(12, 0));
        assert_eq!(parse(b"12").unwrap(), Object::Number(12.0));
    }

    #[test]
    fn comments_and_newlines_are_transparent() {
        assert_eq!(
            parse(b"[ 1 % one\n 2\r\n]").unwrap(),
            Object::Array(vec![Object::Number(1.0), Object::Number(2.0)])
        );
    }

    #[test]
    fn indirect_object() {
        assert_eq!(
            parse(b"3 0 obj\n<< /Type /Page >>\nendobj").unwrap(),
            Object::indirect(
                [("Type", Object::name("Page"))].into_iter().collect::<Dict>().into(),
                3,
                0
            )
        );
        assert!(err(b"3 0 obj\n1 2\nendobj").contains("exactly one object"));
        assert!(err(b"3 0 obj\n1").contains("object doesn't end"));
        assert!(err(b"0 obj 1 endobj").contains("missing object ID pair"));
        assert!(err(b"1.5 0 obj 1 endobj").contains("invalid object ID pair"));
    }

    #[test]
    fn streams_read_raw_length() {
        let obj = parse(b"1 0 obj\n<< /Length 6 >>\nstream\n(a) >>\nendstream\nendobj").unwrap();
        let Object::Indirect { value, .. } = obj else {
            panic!("expected indirect object");
        };
        let Object::Stream(dict, data) = *value else {
            panic!("expected stream");
        };
        assert_eq!(data, b"(a) >>");
        assert_eq!(dict.get("Length"), Some(&Object::Number(6.0)));
    }

    #[test]
    fn stream_framing_errors() {
        assert!(err(b"1 0 obj << >> stream\nx\nendstream endobj").contains("missing stream Length"));
        assert!(
            err(b"1 0 obj << /Length 1 >> stream x\nendstream endobj")
                .contains("does not start with a newline")
        );
        assert!(
            err(b"1 0 obj << /Length 99 >> stream\nx\nendstream endobj")
                .contains("longer than the document")
        );
        assert!(
            err(b"1 0 obj << /Length 1 >> stream\nxy\nendstream endobj")
                .contains("improperly terminated")
        );
        assert!(
            err(b"1 0 obj << /Length 2 0 R >> stream\nxy\nendstream endobj")
                .contains("not an unsigned integer")
        );
        assert!(err(b"1 0 obj [] stream\nendobj").contains("not preceded by a dictionary"));
    }

    #[test]
    fn malformed_composites() {
        assert!(err(b"[1 2").contains("array doesn't end"));
        assert!(err(b"<< /A 1").contains("dictionary doesn't end"));
        assert!(err(b"<< /A >>").contains("unbalanced dictionary"));
        assert!(err(b"<< 1 2 >>").contains("invalid dictionary key type"));
        assert!(err(b"[ (open ]").contains("token error"));
    }

    #[test]
    fn round_trip_of_lossless_kinds() {
        let dict: Dict = [
            ("Kids", Object::Array(vec![Object::reference(4, 0), Object::Null])),
            ("Name", Object::name("A B#")),
            ("Text", Object::string("p(a)r\\e\rn")),
            ("Flag", Object::Bool(false)),
            ("Num", Object::Number(-12.75)),
            ("Sub", Dict::new().into()),
        ]
        .into_iter()
        .collect();
        let original = Object::Dict(dict);
        assert_eq!(parse(&original.serialize()).unwrap(), original);
    }
}
