use clap::Parser;
use pdf_sign_core::DigestAlgorithm;
use pdf_sign_core::sign::DEFAULT_RESERVATION;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pdf-sign",
    version,
    about = "Sign PDF documents with a PKCS#12 key pair",
    long_about = "Append a detached CMS signature to a PDF as an incremental update, \
                  leaving every original byte in place."
)]
pub struct Cli {
    /// Path to the PDF file to sign
    pub input: PathBuf,

    /// Output path for the signed PDF; may equal INPUT
    pub output: PathBuf,

    /// PKCS#12 archive holding the private key and its certificate chain
    pub keypair: PathBuf,

    /// Password protecting the PKCS#12 archive
    pub password: String,

    /// Bytes reserved for the signature
    #[arg(
        short,
        long,
        value_name = "BYTES",
        default_value_t = DEFAULT_RESERVATION as u16,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub reservation: u16,

    /// Digest algorithm for the signed byte ranges (sha256, sha384, sha512)
    #[arg(short, long, value_name = "ALG", default_value_t = DigestAlgorithm::Sha256)]
    pub digest: DigestAlgorithm,

    /// Output machine-readable JSON to stdout
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging (sets RUST_LOG=debug if not already set)
    #[arg(short, long)]
    pub verbose: bool,
}
