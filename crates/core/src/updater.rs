//! The update session: reading objects from a document and appending new
//! versions of them as an incremental update.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::{Parser, Resolve};
use crate::pdf::{header_version, parse_version_name};
use crate::types::Placeholder;
use crate::xref::{self, XrefEntry};

/// Reads and incrementally updates one document.
///
/// Everything is append-only: bytes present when the session was opened are
/// never rewritten. Objects written with [`Updater::update`] are readable
/// through [`Updater::get`] right away.
#[derive(Debug)]
pub struct Updater {
    document: Vec<u8>,
    /// Listed slots only; anything else below `xref_size` is free.
    xref: BTreeMap<u32, XrefEntry>,
    /// Declared table size, independent of how many slots are listed.
    xref_size: u32,
    updated: BTreeSet<u32>,
    trailer: Dict,
}

impl Updater {
    /// Opens a session, resolving the whole cross-reference chain.
    pub fn new(document: Vec<u8>) -> Result<Self> {
        let resolved = xref::resolve(&document)?;
        Ok(Self {
            document,
            xref: resolved.entries,
            xref_size: resolved.size,
            updated: BTreeSet::new(),
            trailer: resolved.trailer,
        })
    }

    pub fn document(&self) -> &[u8] {
        &self.document
    }

    /// The trailer to be written on flush, initialized with the newest one.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dict {
        &mut self.trailer
    }

    /// Number of object slots, as will be declared by the next trailer.
    pub fn size(&self) -> u32 {
        self.xref_size
    }

    /// References to every in-use object, in object number order.
    pub fn list_indirect(&self) -> Vec<Object> {
        self.xref
            .range(..self.xref_size)
            .filter(|(_, entry)| entry.in_use)
            .map(|(&n, entry)| Object::reference(n, entry.generation))
            .collect()
    }

    /// The document version as `major * 10 + minor`, preferring the catalog's
    /// `/Version` over the header comment. Zero when neither is usable.
    pub fn version(&self, root: &Dict) -> u8 {
        if let Some(Object::Name(name)) = root.get("Version")
            && let Some(version) = parse_version_name(name)
        {
            return version;
        }
        header_version(&self.document).unwrap_or(0)
    }

    /// Retrieves an object by its number and generation.
    ///
    /// Free, out-of-range and stale slots yield [`Object::Null`].
    pub fn get(&self, n: u32, generation: u16) -> Result<Object> {
        if n >= self.xref_size {
            return Ok(Object::Null);
        }
        let Some(entry) = self.xref.get(&n) else {
            return Ok(Object::Null);
        };
        if !entry.in_use || entry.generation != generation {
            return Ok(Object::Null);
        }
        let Some(data) = usize::try_from(entry.offset)
            .ok()
            .and_then(|offset| self.document.get(offset..))
            .filter(|data| !data.is_empty())
        else {
            return Ok(Object::Null);
        };

        let mut parser = Parser::new(data, self);
        let mut stack = Vec::new();
        loop {
            match parser.parse(&mut stack)? {
                Object::End => {
                    return Err(Error::structural(format!(
                        "object {n} {generation} does not end"
                    )));
                }
                Object::Indirect {
                    n: found_n,
                    generation: found_generation,
                    value,
                } => {
                    if found_n != n || found_generation != generation {
                        return Err(Error::ObjectAccess(format!(
                            "object mismatch: expected {n} {generation}, \
                             found {found_n} {found_generation}"
                        )));
                    }
                    return Ok(*value);
                }
                object => stack.push(object),
            }
        }
    }

    /// Finds the first page of the page (sub)tree at `node`, returning its
    /// object number together with its dictionary.
    pub fn first_page(&self, node: &Object) -> Result<(u32, Dict)> {
        let mut visited = HashSet::new();
        let mut node = node.clone();
        loop {
            let Object::Reference { n, generation } = node else {
                return Err(Error::shape("invalid or unsupported page tree"));
            };
            if !visited.insert(n) {
                return Err(Error::shape("circular page tree"));
            }
            let Object::Dict(dict) = self.get(n, generation)? else {
                return Err(Error::shape("invalid or unsupported page tree"));
            };
            match dict.get("Type") {
                Some(t) if t.is_name("Page") => return Ok((n, dict)),
                Some(t) if t.is_name("Pages") => {}
                _ => return Err(Error::shape("invalid or unsupported page tree")),
            }
            // Kids must directly hold references.
            node = match dict.get("Kids") {
                Some(Object::Array(kids)) => match kids.first() {
                    Some(kid @ Object::Reference { .. }) => kid.clone(),
                    _ => return Err(Error::shape("invalid or unsupported page tree")),
                },
                _ => return Err(Error::shape("invalid or unsupported page tree")),
            };
        }
    }

    /// Allocates a new object number.
    ///
    /// # Panics
    ///
    /// When the object number space is exhausted.
    pub fn allocate(&mut self) -> u32 {
        let n = self.xref_size;
        self.xref_size = next_size(n);
        tracing::debug!(n, "Allocated object number");
        // No slot is listed yet: the free list is not maintained.
        n
    }

    /// Appends a new version of object `n` to the end of the document.
    ///
    /// The returned writer must be given exactly one object; the object is
    /// closed with `endobj` when the writer is dropped.
    ///
    /// # Panics
    ///
    /// When `n` is the largest object number, which leaves no room for the
    /// table size.
    pub fn update(&mut self, n: u32) -> ObjectWriter<'_> {
        if n >= self.xref_size {
            self.xref_size = next_size(n);
        }

        let generation = self.xref.get(&n).map_or(0, |entry| entry.generation);
        self.xref.insert(
            n,
            XrefEntry {
                offset: (self.document.len() + 1) as u64,
                generation,
                in_use: true,
            },
        );
        self.updated.insert(n);
        tracing::debug!(n, generation, offset = self.document.len() + 1, "Updating object");

        self.document
            .extend_from_slice(format!("\n{n} {generation} obj\n").as_bytes());
        ObjectWriter {
            document: &mut self.document,
        }
    }

    /// Shorthand for writing a whole object through [`Updater::update`].
    pub fn update_with(&mut self, n: u32, object: &Object) {
        self.update(n).write_object(object);
    }

    /// Writes the cross-reference section and trailer for every updated
    /// object, ending the session with the final document.
    #[tracing::instrument(skip(self), fields(updated = self.updated.len()))]
    pub fn flush_updates(mut self) -> Vec<u8> {
        let start_xref = self.document.len() + 1;
        let mut buf = std::mem::take(&mut self.document);
        buf.extend_from_slice(b"\nxref\n");

        let updated: Vec<u32> = self.updated.iter().copied().collect();
        let mut i = 0;
        while i < updated.len() {
            let start = updated[i];
            let mut stop = start + 1;
            i += 1;
            while i < updated.len() && updated[i] == stop {
                stop += 1;
                i += 1;
            }

            buf.extend_from_slice(format!("{start} {}\n", stop - start).as_bytes());
            for n in start..stop {
                let entry = self.xref.get(&n).copied().unwrap_or_default();
                let kind = if entry.in_use { 'n' } else { 'f' };
                buf.extend_from_slice(
                    format!("{:010} {:05} {kind} \n", entry.offset, entry.generation).as_bytes(),
                );
            }
        }

        // A cross-reference section holds at least one subsection.
        if updated.is_empty() {
            buf.extend_from_slice(b"0 0\n");
        }

        self.trailer
            .insert("Size", Object::Number(f64::from(self.xref_size)));
        buf.extend_from_slice(b"trailer\n");
        self.trailer.write_to(&mut buf);
        buf.extend_from_slice(format!("\nstartxref\n{start_xref}\n%%EOF\n").as_bytes());
        buf
    }
}

fn next_size(n: u32) -> u32 {
    n.checked_add(1).expect("object number overflow")
}

impl Resolve for Updater {
    /// A reference costs exactly one [`Updater::get`]; chains are not followed.
    fn dereference(&self, object: Object) -> Result<Object> {
        match object {
            Object::Reference { n, generation } => self.get(n, generation),
            other => Ok(other),
        }
    }
}

/// Cursor over the body of an object being appended to the document.
///
/// Positions are absolute offsets into the document, stable across growth.
pub struct ObjectWriter<'a> {
    document: &'a mut Vec<u8>,
}

impl ObjectWriter<'_> {
    /// Current length of the document, i.e. where the next byte will land.
    pub fn position(&self) -> usize {
        self.document.len()
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.document.extend_from_slice(bytes);
        self
    }

    pub fn write_object(&mut self, object: &Object) -> &mut Self {
        object.write_to(self.document);
        self
    }

    /// Writes `len` copies of `fill` and returns where they landed.
    pub fn reserve(&mut self, fill: u8, len: usize) -> Placeholder {
        let offset = self.position();
        self.document.resize(offset + len, fill);
        Placeholder { offset, len }
    }
}

impl Drop for ObjectWriter<'_> {
    fn drop(&mut self) {
        self.document.extend_from_slice(b"\nendobj");
    }
}
