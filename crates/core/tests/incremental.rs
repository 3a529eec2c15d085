//! End-to-end behavior of incremental updates and signing on small
//! hand-assembled documents.

use std::cell::RefCell;

use chrono::{FixedOffset, TimeZone};
use pdf_sign_core::pdf::find_startxref;
use pdf_sign_core::{
    DigestAlgorithm, Error, Object, SignOptions, Signer, SignerError, Updater, compute_digest,
    sign,
};
use pretty_assertions::assert_eq;

const CATALOG: &str = "<< /Type /Catalog /Pages 2 0 R >>";
const PAGES: &str = "<< /Type /Pages /Kids [3 0 R] /Count 1 >>";
const PAGE: &str = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>";

/// Lays out objects 1..=n in order behind `header`, with a single
/// cross-reference section pointing at them.
fn build(header: &str, objects: &[&str]) -> Vec<u8> {
    let mut doc = format!("%PDF-{header}\n%\u{e2}\u{e3}\n").into_bytes();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(doc.len());
        doc.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = doc.len();
    doc.extend_from_slice(
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
    );
    for offset in offsets {
        doc.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    doc.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    doc
}

fn simple(header: &str) -> Vec<u8> {
    build(header, &[CATALOG, PAGES, PAGE])
}

/// Returns the digest of whatever it is handed, remembering the content.
#[derive(Default)]
struct DigestSigner {
    seen: RefCell<Vec<u8>>,
}

impl Signer for DigestSigner {
    fn sign(&self, content: &[&[u8]], digest: DigestAlgorithm) -> Result<Vec<u8>, SignerError> {
        self.seen.borrow_mut().extend(content.iter().copied().flatten());
        Ok(compute_digest(digest, content))
    }
}

struct FailingSigner;

impl Signer for FailingSigner {
    fn sign(&self, _: &[&[u8]], _: DigestAlgorithm) -> Result<Vec<u8>, SignerError> {
        Err("token removed".into())
    }
}

fn options(reservation: usize) -> SignOptions {
    let tz = FixedOffset::east_opt(0).unwrap();
    SignOptions {
        reservation,
        digest: DigestAlgorithm::Sha256,
        signing_time: tz.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn signing_appends_a_verifiable_update() {
    let input = simple("1.4");
    let signer = DigestSigner::default();
    let signed = sign(&input, &signer, &options(64)).unwrap();
    let doc = &signed.document;
    let range = signed.report.byte_range;

    // Append-only, and the ranges cover everything but the window.
    assert!(doc.starts_with(&input));
    assert_eq!(range.document_len(), doc.len());
    assert_eq!(doc[range.sign_offset], b'<');
    assert_eq!(doc[range.tail_offset() - 1], b'>');
    assert_eq!(range.sign_length, 64 * 2 + 2);

    let [head, tail] = range.spans(doc);
    let mut expected = head.to_vec();
    expected.extend_from_slice(tail);
    assert_eq!(*signer.seen.borrow(), expected);

    // The signature lands at the start of the window, the rest stays zero.
    let signature = compute_digest(DigestAlgorithm::Sha256, &[&expected]);
    assert_eq!(signed.report.signature_len, signature.len());
    let window = &doc[range.sign_offset + 1..range.tail_offset() - 1];
    let hex_len = signature.len() * 2;
    assert_eq!(&window[..hex_len], hex::encode(&signature).as_bytes());
    assert!(window[hex_len..].iter().all(|&b| b == b'0'));

    let text = format!(
        "/ByteRange [0 {} {} {}]",
        range.sign_offset,
        range.tail_offset(),
        range.tail_length
    );
    assert!(contains(doc, text.as_bytes()));
    assert!(contains(doc, b"/M(D:20240102030405Z)"));
    assert!(doc.ends_with(b"%%EOF\n"));
}

#[test]
fn signed_output_can_be_reopened() {
    let signed = sign(&simple("1.4"), &DigestSigner::default(), &options(64)).unwrap();
    let report = signed.report.clone();
    let pdf = Updater::new(signed.document).unwrap();
    assert_eq!(pdf.size(), 6);

    let root = pdf.get(1, 0).unwrap().into_dict().unwrap();
    assert_eq!(root.get("Version"), Some(&Object::name("1.6")));
    let form = root.get("AcroForm").and_then(Object::as_dict).unwrap();
    assert_eq!(form.get("SigFlags"), Some(&Object::Number(3.0)));
    assert_eq!(
        form.get("Fields"),
        Some(&Object::Array(vec![Object::reference(report.field_object, 0)]))
    );

    let page = pdf.get(3, 0).unwrap().into_dict().unwrap();
    assert_eq!(
        page.get("Annots"),
        Some(&Object::Array(vec![Object::reference(report.field_object, 0)]))
    );

    let field = pdf.get(report.field_object, 0).unwrap().into_dict().unwrap();
    assert_eq!(
        field.get("V"),
        Some(&Object::reference(report.signature_object, 0))
    );
    let sigdict = pdf
        .get(report.signature_object, 0)
        .unwrap()
        .into_dict()
        .unwrap();
    assert!(sigdict.get("SubFilter").unwrap().is_name("adbe.pkcs7.detached"));
    let Some(Object::String(contents)) = sigdict.get("Contents") else {
        panic!("missing Contents");
    };
    assert_eq!(contents.len(), 64);
}

#[test]
fn existing_annotations_are_kept() {
    let page = "<< /Type /Page /Parent 2 0 R /Annots [4 0 R] >>";
    let input = build("1.6", &[CATALOG, PAGES, page, "<< /Subtype /Link >>"]);
    let signed = sign(&input, &DigestSigner::default(), &options(64)).unwrap();
    let field = signed.report.field_object;
    let pdf = Updater::new(signed.document).unwrap();
    let page = pdf.get(3, 0).unwrap().into_dict().unwrap();
    assert_eq!(
        page.get("Annots"),
        Some(&Object::Array(vec![
            Object::reference(4, 0),
            Object::reference(field, 0)
        ]))
    );
}

#[test]
fn indirect_annotations_are_unsupported() {
    let page = "<< /Type /Page /Parent 2 0 R /Annots 4 0 R >>";
    let input = build("1.6", &[CATALOG, PAGES, page, "[]"]);
    let err = sign(&input, &DigestSigner::default(), &options(64)).unwrap_err();
    assert!(matches!(err, Error::DocumentShape(_)), "{err}");
    assert!(err.to_string().contains("Annots"), "{err}");
}

#[test]
fn newer_versions_are_left_alone() {
    let signed = sign(&simple("1.7"), &DigestSigner::default(), &options(64)).unwrap();
    let pdf = Updater::new(signed.document).unwrap();
    let root = pdf.get(1, 0).unwrap().into_dict().unwrap();
    assert_eq!(root.get("Version"), None);
}

#[test]
fn stronger_digests_require_newer_versions() {
    let mut opts = options(128);
    opts.digest = DigestAlgorithm::Sha512;
    let signer = DigestSigner::default();
    let signed = sign(&simple("1.6"), &signer, &opts).unwrap();
    assert_eq!(signed.report.signature_len, 64);
    let pdf = Updater::new(signed.document).unwrap();
    let root = pdf.get(1, 0).unwrap().into_dict().unwrap();
    assert_eq!(root.get("Version"), Some(&Object::name("1.7")));
}

#[test]
fn small_reservations_are_rejected() {
    let input = simple("1.4");
    let err = sign(&input, &DigestSigner::default(), &options(4)).unwrap_err();
    assert!(matches!(err, Error::Reservation(_)), "{err}");
}

#[test]
fn existing_forms_are_rejected_before_signing() {
    let catalog = "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [] >> >>";
    let input = build("1.4", &[catalog, PAGES, PAGE]);
    let signer = DigestSigner::default();
    let err = sign(&input, &signer, &options(64)).unwrap_err();
    assert!(matches!(err, Error::DocumentShape(_)), "{err}");
    assert!(signer.seen.borrow().is_empty());
}

#[test]
fn signer_failures_pass_through() {
    let err = sign(&simple("1.4"), &FailingSigner, &options(64)).unwrap_err();
    assert!(matches!(err, Error::Signer(_)), "{err}");
    assert!(err.to_string().contains("token removed"), "{err}");
}

#[test]
fn circular_page_trees_are_rejected() {
    let pages = "<< /Type /Pages /Kids [2 0 R] /Count 1 >>";
    let input = build("1.4", &[CATALOG, pages, PAGE]);
    let err = sign(&input, &DigestSigner::default(), &options(64)).unwrap_err();
    assert!(err.to_string().contains("circular page tree"), "{err}");
}

#[test]
fn missing_root_is_rejected() {
    let mut input = simple("1.4");
    let pos = input.windows(5).rposition(|w| w == b"/Root").unwrap();
    input[pos + 1..pos + 5].copy_from_slice(b"Rolt");
    let err = sign(&input, &DigestSigner::default(), &options(64)).unwrap_err();
    assert!(matches!(err, Error::DocumentShape(_)), "{err}");
}

#[test]
fn newest_section_wins_and_prev_points_at_it() {
    let mut pdf = Updater::new(simple("1.4")).unwrap();
    pdf.update_with(3, &Object::string("replaced"));
    let updated = pdf.flush_updates();
    let newest = find_startxref(&updated).unwrap();

    let pdf = Updater::new(updated).unwrap();
    assert_eq!(pdf.get(3, 0).unwrap(), Object::string("replaced"));
    assert_eq!(pdf.get(2, 0).unwrap().as_dict().map(|d| d.len()), Some(3));
    assert_eq!(
        pdf.trailer().get("Prev"),
        Some(&Object::Number(newest as f64))
    );
}

#[test]
fn empty_flush_still_writes_a_subsection() {
    let input = simple("1.4");
    let flushed = Updater::new(input.clone()).unwrap().flush_updates();
    let appended = &flushed[input.len()..];
    assert!(appended.starts_with(b"\nxref\n0 0\ntrailer\n"));

    // Still a readable chain.
    let pdf = Updater::new(flushed).unwrap();
    assert_eq!(pdf.size(), 4);
    assert!(pdf.get(1, 0).unwrap().as_dict().is_some());
}

#[test]
fn flush_groups_contiguous_numbers() {
    let input = simple("1.4");
    let mut pdf = Updater::new(input.clone()).unwrap();
    for n in [7, 5, 10, 6] {
        pdf.update_with(n, &Object::Number(f64::from(n)));
    }
    assert_eq!(pdf.size(), 11);
    let flushed = pdf.flush_updates();
    let appended = String::from_utf8_lossy(&flushed[input.len()..]).into_owned();

    let xref = appended.find("\nxref\n").unwrap();
    let table: Vec<&str> = appended[xref + 6..].lines().take(6).collect();
    assert_eq!(table[0], "5 3");
    assert_eq!(table[4], "10 1");
    assert!(table[1].ends_with(" 00000 n "));
    assert!(appended.contains("/Size 11"));

    let pdf = Updater::new(flushed).unwrap();
    assert_eq!(pdf.get(10, 0).unwrap(), Object::Number(10.0));
    assert_eq!(pdf.get(8, 0).unwrap(), Object::Null);
}

#[test]
fn circular_prev_chains_are_rejected() {
    let mut doc = b"%PDF-1.4\n".to_vec();
    let xref = doc.len();
    doc.extend_from_slice(
        format!(
            "xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {xref} >>\n\
             startxref\n{xref}\n%%EOF\n"
        )
        .as_bytes(),
    );
    let err = Updater::new(doc).unwrap_err();
    assert!(matches!(err, Error::CrossReference(_)), "{err}");
    assert!(err.to_string().contains("circular"), "{err}");
}

#[test]
fn missing_anchor_is_rejected() {
    let mut doc = simple("1.4");
    doc.truncate(doc.len() - 6);
    assert!(matches!(
        Updater::new(doc).unwrap_err(),
        Error::CrossReference(_)
    ));
}

#[test]
fn indirect_stream_lengths_resolve_through_the_table() {
    let input = build("1.4", &["<< /Length 2 0 R >>\nstream\nhello\nendstream", "5"]);
    let pdf = Updater::new(input).unwrap();
    let Object::Stream(dict, data) = pdf.get(1, 0).unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(dict.get("Length"), Some(&Object::reference(2, 0)));
    assert_eq!(data, b"hello");
}

#[test]
fn pages_with_content_streams_can_be_signed() {
    let page = "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>";
    let content = "<< /Length 5 0 R >>\nstream\nhello\nendstream";
    let input = build("1.4", &[CATALOG, PAGES, page, content, "5"]);
    let signed = sign(&input, &DigestSigner::default(), &options(64)).unwrap();

    let pdf = Updater::new(signed.document).unwrap();
    let page = pdf.get(3, 0).unwrap().into_dict().unwrap();
    assert_eq!(page.get("Contents"), Some(&Object::reference(4, 0)));
    let Object::Stream(_, data) = pdf.get(4, 0).unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(data, b"hello");
}

fn assert_shape_error(objects: &[&str], message: &str) {
    let input = build("1.4", objects);
    let signer = DigestSigner::default();
    let err = sign(&input, &signer, &options(64)).unwrap_err();
    assert!(matches!(err, Error::DocumentShape(_)), "{err}");
    assert!(err.to_string().contains(message), "{err}");
    assert!(signer.seen.borrow().is_empty());
}

#[test]
fn malformed_page_trees_are_rejected() {
    let tree = "invalid or unsupported page tree";
    let pages = "<< /Type /Pages /Kids 4 0 R /Count 1 >>";
    assert_shape_error(&[CATALOG, pages, PAGE, "[3 0 R]"], tree);

    let pages = "<< /Type /Pages /Kids [[3 0 R]] /Count 1 >>";
    assert_shape_error(&[CATALOG, pages, PAGE], tree);

    let pages = "<< /Type /Pages /Kids [] /Count 0 >>";
    assert_shape_error(&[CATALOG, pages, PAGE], tree);

    let annot = "<< /Type /Annot /Parent 2 0 R >>";
    assert_shape_error(&[CATALOG, PAGES, annot], tree);
}

#[test]
fn catalogs_need_an_indirect_page_tree() {
    let catalog = "<< /Type /Catalog >>";
    assert_shape_error(&[catalog, PAGES, PAGE], "invalid Pages reference");

    let catalog = "<< /Type /Catalog /Pages << /Type /Pages /Kids [3 0 R] /Count 1 >> >>";
    assert_shape_error(&[catalog, PAGES, PAGE], "invalid Pages reference");
}

#[test]
fn newest_trailer_fields_win() {
    let mut doc = simple("1.4");
    let oldest = find_startxref(&doc).unwrap();

    let page = doc.len();
    doc.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R /Rotate 90 >>\nendobj\n");
    let catalog = doc.len();
    doc.extend_from_slice(b"4 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let newest = doc.len();
    doc.extend_from_slice(
        format!(
            "xref\n0 1\n0000000000 65535 f \n3 2\n{page:010} 00000 n \n{catalog:010} 00000 n \n\
             trailer\n<< /Size 5 /Root 4 0 R /Info 1 0 R /Prev {oldest} >>\n\
             startxref\n{newest}\n%%EOF\n"
        )
        .as_bytes(),
    );

    let pdf = Updater::new(doc).unwrap();
    assert_eq!(pdf.size(), 5);
    let trailer = pdf.trailer();
    assert_eq!(trailer.get("Root"), Some(&Object::reference(4, 0)));
    assert_eq!(trailer.get("Info"), Some(&Object::reference(1, 0)));
    assert_eq!(trailer.get("Prev"), Some(&Object::Number(newest as f64)));

    let page = pdf.get(3, 0).unwrap().into_dict().unwrap();
    assert_eq!(page.get("Rotate"), Some(&Object::Number(90.0)));
    // Untouched objects still come from the older section.
    let pages = pdf.get(2, 0).unwrap().into_dict().unwrap();
    assert!(pages.get("Type").unwrap().is_name("Pages"));
}
