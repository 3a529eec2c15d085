//! JSON output formats.

use pdf_sign_core::{DigestAlgorithm, SignReport};
use serde::Serialize;

#[derive(Serialize)]
pub struct SignJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub output: String,
    pub digest: DigestAlgorithm,
    pub signer: String,
    #[serde(flatten)]
    pub report: &'a SignReport,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    pub error: String,
    pub causes: Vec<String>,
    pub exit_code: u8,
}
