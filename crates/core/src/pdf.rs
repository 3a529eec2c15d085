//! Scanning the raw document for its anchors: the `startxref` trailer at the
//! end and the version comment at the start.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::error::{Error, Result};

/// Both anchors sit within roughly a kibibyte of their end of the document.
const ANCHOR_WINDOW: usize = 1024;

static STARTXREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s-u)\A.*\sstartxref\s+(\d+)\s+%%EOF").expect("static regex is valid")
});

static HEADER_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)(?:\A|[\r\n])%(?:!PS-Adobe-\d\.\d )?PDF-(\d)\.(\d)[\r\n]")
        .expect("static regex is valid")
});

/// Finds the offset recorded by the last `startxref <offset> %%EOF` anchor.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let haystack = &data[data.len().saturating_sub(ANCHOR_WINDOW)..];
    let captures = STARTXREF
        .captures(haystack)
        .ok_or_else(|| Error::xref("cannot find startxref"))?;
    std::str::from_utf8(&captures[1])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Error::xref("startxref offset out of range"))
}

/// Reads the version claimed by the header comment as `major * 10 + minor`,
/// e.g. 17 for `%PDF-1.7`.
pub fn header_version(data: &[u8]) -> Option<u8> {
    let haystack = &data[..data.len().min(ANCHOR_WINDOW)];
    let captures = HEADER_VERSION.captures(haystack)?;
    Some((captures[1][0] - b'0') * 10 + (captures[2][0] - b'0'))
}

/// Parses a version name of the exact form `D.D`.
pub fn parse_version_name(name: &[u8]) -> Option<u8> {
    match name {
        &[major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Some((major - b'0') * 10 + (minor - b'0'))
        }
        _ => None,
    }
}

/// Renders `major * 10 + minor` back as a version name.
pub fn version_name(version: u8) -> String {
    format!("{}.{}", version / 10, version % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_startxref() {
        let pdf = b"%PDF-1.4\n...content...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_startxref(pdf).unwrap(), 1234);
    }

    #[test]
    fn finds_last_startxref_when_multiple() {
        let pdf = b"%PDF-1.4\nstartxref\n10\n%%EOF\nmore\nstartxref\r\n99\r\n%%EOF";
        assert_eq!(find_startxref(pdf).unwrap(), 99);
    }

    #[test]
    fn only_searches_the_tail() {
        let mut pdf = b"%PDF-1.4\nstartxref\n10\n%%EOF\n".to_vec();
        pdf.extend(std::iter::repeat_n(b' ', 2048));
        assert!(find_startxref(&pdf).is_err());
    }

    #[test]
    fn missing_anchor() {
        let err = find_startxref(b"%PDF-1.4\nno anchor").unwrap_err();
        assert!(err.to_string().contains("cannot find startxref"));
    }

    #[test]
    fn tail_may_contain_binary() {
        let mut pdf = b"%PDF-1.4\n\xff\xfe\x00 stream bytes".to_vec();
        pdf.extend_from_slice(b"\nstartxref\n42\n%%EOF\n");
        assert_eq!(find_startxref(&pdf).unwrap(), 42);
    }

    #[test]
    fn header_versions() {
        assert_eq!(header_version(b"%PDF-1.7\n%\xe2\xe3"), Some(17));
        assert_eq!(header_version(b"%!PS-Adobe-3.0 PDF-1.4\r"), Some(14));
        assert_eq!(header_version(b"garbage\n%PDF-1.3\n"), Some(13));
        assert_eq!(header_version(b"%PDF-x.y\n"), None);
    }

    #[test]
    fn version_names() {
        assert_eq!(parse_version_name(b"1.6"), Some(16));
        assert_eq!(parse_version_name(b"2.0"), Some(20));
        assert_eq!(parse_version_name(b"1.10"), None);
        assert_eq!(version_name(16), "1.6");
    }
}
