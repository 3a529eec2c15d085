//! Cross-reference resolution across chained update sections.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::{NoResolve, Parser};
use crate::pdf::find_startxref;

/// One slot of the cross-reference table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XrefEntry {
    /// File offset, or the number of the next free entry.
    pub offset: u64,
    pub generation: u16,
    pub in_use: bool,
}

/// The flattened outcome of walking every section from newest to oldest.
#[derive(Debug, Clone)]
pub struct ResolvedXref {
    /// Keyed by object number. Only listed slots below `size` are kept, so
    /// a sparse table never costs more than the entries it lists.
    pub entries: BTreeMap<u32, XrefEntry>,
    /// The table size declared by the newest trailer.
    pub size: u32,
    /// The newest trailer, with `Prev` pointing at the newest section.
    pub trailer: Dict,
}

/// Builds the object table of `document`.
///
/// Sections are read newest first following `Prev`, so the first entry seen
/// for an object number shadows any older one.
#[tracing::instrument(skip(document), fields(document_len = document.len()))]
pub fn resolve(document: &[u8]) -> Result<ResolvedXref> {
    let newest = find_startxref(document)?;

    let mut entries = BTreeMap::new();
    let mut loaded_sections = HashSet::new();
    let mut trailer: Option<Dict> = None;
    let mut offset = newest;

    loop {
        if !loaded_sections.insert(offset) {
            return Err(Error::xref("circular xref offsets"));
        }
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < document.len())
            .ok_or_else(|| Error::xref("invalid xref offset"))?;
        tracing::debug!(offset, "Loading cross-reference section");

        let mut parser = Parser::new(&document[start..], &NoResolve);
        load_section(&mut parser, document.len(), &mut entries)?;

        let section_trailer = match parser.parse(&mut Vec::new())? {
            Object::Dict(dict) => dict,
            _ => return Err(Error::xref("invalid trailer dictionary")),
        };
        let prev = section_trailer.get("Prev").cloned();
        trailer.get_or_insert(section_trailer);

        match prev {
            None => break,
            Some(prev) => {
                offset = prev
                    .as_uint(u64::MAX)
                    .ok_or_else(|| Error::xref("invalid Prev offset"))?;
            }
        }
    }

    let mut trailer = trailer.ok_or_else(|| Error::xref("missing trailer"))?;
    trailer.insert("Prev", Object::Number(newest as f64));

    let size = trailer
        .get("Size")
        .and_then(|size| size.as_uint(u32::MAX as u64))
        .filter(|&size| size > 0)
        .map(|size| size as u32)
        .ok_or_else(|| Error::xref("invalid or missing cross-reference table Size"))?;
    entries.retain(|&n, _| n < size);

    Ok(ResolvedXref {
        entries,
        size,
        trailer,
    })
}

fn load_section(
    parser: &mut Parser<'_, NoResolve>,
    document_len: usize,
    entries: &mut BTreeMap<u32, XrefEntry>,
) -> Result<()> {
    let mut throwaway = Vec::new();
    if !parser.parse(&mut throwaway)?.is_keyword("xref") {
        return Err(Error::xref("invalid xref table"));
    }
    loop {
        let object = parser.parse(&mut throwaway)?;
        if object == Object::End {
            return Err(Error::xref("unexpected EOF while looking for the trailer"));
        }
        if object.is_keyword("trailer") {
            return Ok(());
        }

        let second = parser.parse(&mut throwaway)?;
        let (Some(start), Some(count)) = (
            object.as_uint(u32::MAX as u64),
            second.as_uint(u32::MAX as u64),
        ) else {
            return Err(Error::xref("invalid xref section header"));
        };
        if start + count > u64::from(u32::MAX) + 1 {
            return Err(Error::xref("invalid xref section header"));
        }

        for n in start..start + count {
            let entry = parse_entry(parser, &mut throwaway, document_len)?;
            // Sections are read newest first.
            entries.entry(n as u32).or_insert(entry);
        }
    }
}

fn parse_entry(
    parser: &mut Parser<'_, NoResolve>,
    throwaway: &mut Vec<Object>,
    document_len: usize,
) -> Result<XrefEntry> {
    let offset = parser.parse(throwaway)?;
    let generation = parser.parse(throwaway)?;
    let key = parser.parse(throwaway)?;

    let offset = offset.as_uint(document_len as u64);
    let generation = generation.as_uint(u16::MAX as u64);
    let in_use = match &key {
        Object::Keyword(k) if k == b"n" => Some(true),
        Object::Keyword(k) if k == b"f" => Some(false),
        _ => None,
    };
    match (offset, generation, in_use) {
        (Some(offset), Some(generation), Some(in_use)) => Ok(XrefEntry {
            offset,
            generation: generation as u16,
            in_use,
        }),
        _ => Err(Error::xref("invalid xref entry")),
    }
}
