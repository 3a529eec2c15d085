//! Common types and result structures.

use serde::Serialize;

/// A fixed-width run of bytes reserved in the document, to be patched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub offset: usize,
    pub len: usize,
}

impl Placeholder {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// The spans covered by a signature: everything but the signature window.
///
/// Renders as `[0 sign_offset tail_offset tail_length]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    /// Start of the quoted hex string holding the signature.
    pub sign_offset: usize,
    /// Length of that string including both quotes.
    pub sign_length: usize,
    /// Length of everything that follows it.
    pub tail_length: usize,
}

impl ByteRange {
    pub fn tail_offset(&self) -> usize {
        self.sign_offset + self.sign_length
    }

    pub fn document_len(&self) -> usize {
        self.tail_offset() + self.tail_length
    }

    /// The two signed spans of `document`.
    pub fn spans<'a>(&self, document: &'a [u8]) -> [&'a [u8]; 2] {
        [
            &document[..self.sign_offset],
            &document[self.tail_offset()..][..self.tail_length],
        ]
    }

    pub fn to_pdf_array(&self) -> String {
        format!(
            "[0 {} {} {}]",
            self.sign_offset,
            self.tail_offset(),
            self.tail_length
        )
    }
}

/// Summary of a completed signing run.
#[derive(Debug, Clone, Serialize)]
pub struct SignReport {
    pub byte_range: ByteRange,
    /// Size of the signature blob, before hex encoding.
    pub signature_len: usize,
    /// Capacity of the reserved window, in bytes.
    pub reservation: usize,
    pub signature_object: u32,
    pub field_object: u32,
}
