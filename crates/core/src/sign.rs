//! Embedding a detached signature into a document as an incremental update.
//!
//! Signing runs in two passes. The first appends the signature dictionary,
//! the signature field, the updated first page and the updated catalog, with
//! fixed-width placeholders for `/ByteRange` and `/Contents`, then flushes.
//! Only then is the final layout known, so the second pass patches the byte
//! range into its placeholder, signs everything outside the `/Contents`
//! string, and patches the signature in. Nothing else is touched afterwards.

use chrono::{DateTime, FixedOffset, Local};

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result, SignerError};
use crate::object::{Dict, Object};
use crate::pdf::version_name;
use crate::types::{ByteRange, Placeholder, SignReport};
use crate::updater::Updater;

/// Width of the `/ByteRange` placeholder, fine for a gigabyte.
pub const BYTE_RANGE_WIDTH: usize = 32;

/// Default signature reservation, in bytes.
pub const DEFAULT_RESERVATION: usize = 4096;

/// `SignaturesExist | AppendOnly`.
const SIG_FLAGS: f64 = 3.0;

/// Annotation flag `Hidden`.
const HIDDEN: f64 = 2.0;

/// Produces detached signatures. Implemented outside of this crate, which
/// never touches key material.
pub trait Signer {
    /// Signs the concatenation of `content`, returning a DER-encoded detached
    /// signature.
    fn sign(
        &self,
        content: &[&[u8]],
        digest: DigestAlgorithm,
    ) -> std::result::Result<Vec<u8>, SignerError>;
}

impl<S: Signer + ?Sized> Signer for &S {
    fn sign(
        &self,
        content: &[&[u8]],
        digest: DigestAlgorithm,
    ) -> std::result::Result<Vec<u8>, SignerError> {
        (**self).sign(content, digest)
    }
}

/// Options for signing.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Bytes set aside for the signature; the window holds twice as many
    /// hex digits.
    pub reservation: usize,
    pub digest: DigestAlgorithm,
    /// Recorded as the signature dictionary's `/M`.
    pub signing_time: DateTime<FixedOffset>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            reservation: DEFAULT_RESERVATION,
            digest: DigestAlgorithm::default(),
            signing_time: Local::now().fixed_offset(),
        }
    }
}

/// A signed document and what was done to it.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub document: Vec<u8>,
    pub report: SignReport,
}

/// Renders a date string of the form `D:YYYYMMDDHHmmSS` followed by `Z` or
/// `+HH'mm'`.
pub fn pdf_date(ts: &DateTime<FixedOffset>) -> Object {
    let mut date = ts.format("D:%Y%m%d%H%M%S").to_string();
    let offset = ts.offset().local_minus_utc();
    if offset == 0 {
        date.push('Z');
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.unsigned_abs() / 60;
        date.push_str(&format!("{sign}{:02}'{:02}'", minutes / 60, minutes % 60));
    }
    Object::String(date.into_bytes())
}

/// Signs `document`, returning a grown copy. The input is never modified,
/// and on error nothing usable is returned.
///
/// The document must not use cross-reference streams, or must at least be
/// a hybrid-reference file.
#[tracing::instrument(
    skip(document, signer, options),
    fields(document_len = document.len(), reservation = options.reservation)
)]
pub fn sign<S: Signer + ?Sized>(
    document: &[u8],
    signer: &S,
    options: &SignOptions,
) -> Result<SignedDocument> {
    let mut pdf = Updater::new(document.to_vec())?;

    let (root_n, root_generation) = match pdf.trailer().get("Root") {
        Some(&Object::Reference { n, generation }) => (n, generation),
        _ => {
            return Err(Error::shape("trailer does not contain a reference to Root"));
        }
    };
    let mut root = pdf
        .get(root_n, root_generation)?
        .into_dict()
        .ok_or_else(|| Error::shape("invalid Root dictionary reference"))?;

    // Existing forms, and any signatures in them, would be overwritten.
    if root.contains_key("AcroForm") {
        return Err(Error::shape(
            "the document already contains forms, they would be overwritten",
        ));
    }
    let pages_ref = match root.get("Pages") {
        Some(pages @ Object::Reference { .. }) => pages.clone(),
        _ => return Err(Error::shape("invalid Pages reference")),
    };

    let (sigdict_n, byte_range_placeholder, contents) =
        write_signature_dictionary(&mut pdf, options);

    let sigfield_n = pdf.allocate();
    pdf.update_with(sigfield_n, &signature_field(sigdict_n).into());

    let (page_n, mut page) = pdf.first_page(&pages_ref)?;
    let mut annots = match page.remove("Annots") {
        None => Vec::new(),
        Some(Object::Array(annots)) => annots,
        // Indirectly referenced arrays are not supported.
        Some(_) => return Err(Error::shape("unexpected Annots")),
    };
    annots.push(Object::reference(sigfield_n, 0));
    page.insert("Annots", Object::Array(annots));
    pdf.update_with(page_n, &page.into());

    let form: Dict = [
        (
            "Fields",
            Object::Array(vec![Object::reference(sigfield_n, 0)]),
        ),
        ("SigFlags", Object::Number(SIG_FLAGS)),
    ]
    .into_iter()
    .collect();
    root.insert("AcroForm", form.into());

    let minimum = options.digest.min_pdf_version();
    if pdf.version(&root) < minimum {
        tracing::debug!(version = %version_name(minimum), "Upgrading document version");
        root.insert("Version", Object::name(version_name(minimum)));
    }
    pdf.update_with(root_n, &root.into());

    let mut document = pdf.flush_updates();

    // The window excludes the hex digits together with their quotes.
    let byte_range = ByteRange {
        sign_offset: contents.offset - 1,
        sign_length: contents.len + 2,
        tail_length: document.len() - (contents.end() + 1),
    };
    let ranges = byte_range.to_pdf_array();
    if ranges.len() > byte_range_placeholder.len {
        return Err(Error::Reservation(
            "not enough space reserved for /ByteRange".into(),
        ));
    }
    document[byte_range_placeholder.offset..][..ranges.len()]
        .copy_from_slice(ranges.as_bytes());

    let signature_len =
        fill_in_signature(&mut document, byte_range, contents, signer, options.digest)?;
    tracing::info!(signature_len, "Signature embedded");

    Ok(SignedDocument {
        document,
        report: SignReport {
            byte_range,
            signature_len,
            reservation: options.reservation,
            signature_object: sigdict_n,
            field_object: sigfield_n,
        },
    })
}

/// Appends the signature dictionary, returning its number along with the
/// `/ByteRange` and `/Contents` placeholders.
fn write_signature_dictionary(
    pdf: &mut Updater,
    options: &SignOptions,
) -> (u32, Placeholder, Placeholder) {
    let n = pdf.allocate();
    let mut w = pdf.update(n);
    // The timestamp matters to some viewers.
    w.write(b"<< /Type/Sig /Filter/Adobe.PPKLite /SubFilter/adbe.pkcs7.detached\n   /M")
        .write_object(&pdf_date(&options.signing_time))
        .write(b" /ByteRange ");
    let byte_range = w.reserve(b' ', BYTE_RANGE_WIDTH);
    w.write(b"\n   /Contents <");
    let contents = w.reserve(b'0', options.reservation * 2);
    w.write(b"> >>");
    (n, byte_range, contents)
}

/// A hidden widget merged with its signature field.
fn signature_field(sigdict_n: u32) -> Dict {
    [
        ("FT", Object::name("Sig")),
        ("V", Object::reference(sigdict_n, 0)),
        ("Subtype", Object::name("Widget")),
        ("F", Object::Number(HIDDEN)),
        ("T", Object::string("Signature1")),
        ("Rect", Object::Array(vec![Object::Number(0.0); 4])),
    ]
    .into_iter()
    .collect()
}

/// Signs everything outside the window and writes the signature, hex-encoded,
/// over the start of the `/Contents` placeholder.
fn fill_in_signature<S: Signer + ?Sized>(
    document: &mut [u8],
    byte_range: ByteRange,
    contents: Placeholder,
    signer: &S,
    digest: DigestAlgorithm,
) -> Result<usize> {
    let signature = signer
        .sign(&byte_range.spans(document), digest)
        .map_err(Error::Signer)?;

    if signature.len() * 2 > contents.len {
        return Err(Error::Reservation(format!(
            "not enough space reserved for the signature ({} nibbles vs {} nibbles)",
            contents.len,
            signature.len() * 2
        )));
    }
    let target = &mut document[contents.offset..][..signature.len() * 2];
    hex::encode_to_slice(&signature, target)
        .map_err(|e| Error::Reservation(e.to_string()))?;
    Ok(signature.len())
}
