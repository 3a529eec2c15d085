//! The sign command: read, sign, and atomically replace the output.

use anyhow::{Context, Result};
use console::style;
use pdf_sign_cms::{CmsSigner, KeyPair};
use pdf_sign_core::SignOptions;
use std::io::Write;
use std::path::Path;

use crate::app::Stage;
use crate::cli::Cli;
use crate::json::SignJson;
use crate::util::{format_bytes, spinner};

pub fn sign_pdf(cli: Cli) -> Result<()> {
    eprintln!("{}", style("==> Signing PDF").cyan().bold());

    let progress = spinner(format!("Reading PDF {}", style(cli.input.display()).cyan()));
    let document = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to open PDF: {}", cli.input.display()))
        .context(Stage::ReadInput)?;
    progress.finish_with_message(format!(
        "[OK] Read PDF ({})",
        style(format_bytes(document.len())).cyan()
    ));

    let der = std::fs::read(&cli.keypair)
        .with_context(|| format!("Failed to open key pair: {}", cli.keypair.display()))
        .context(Stage::ReadKeyPair)?;
    let pair = KeyPair::from_pkcs12(&der, &cli.password)
        .with_context(|| format!("Invalid key pair: {}", cli.keypair.display()))
        .context(Stage::ParseKeyPair)?;
    let subject = pair
        .leaf()
        .map(|leaf| leaf.tbs_certificate.subject.to_string())
        .context(Stage::ParseKeyPair)?;
    eprintln!(
        "    Using key: {} ({})",
        style(&subject).cyan(),
        style(pair.private_key.algorithm()).dim()
    );

    let progress = spinner("Creating signature...".to_string());
    let options = SignOptions {
        reservation: usize::from(cli.reservation),
        digest: cli.digest,
        ..SignOptions::default()
    };
    let signer = CmsSigner::new(pair);
    let signed = pdf_sign_core::sign(&document, &signer, &options).context(Stage::Sign)?;
    progress.finish_with_message(format!(
        "[OK] Created signature ({} of {} reserved)",
        style(format_bytes(signed.report.signature_len)).cyan(),
        format_bytes(signed.report.reservation)
    ));

    let progress = spinner(format!(
        "Writing signed PDF to {}",
        style(cli.output.display()).cyan()
    ));
    write_atomically(&cli.output, &signed.document)
        .with_context(|| format!("Failed to write output file: {}", cli.output.display()))
        .context(Stage::WriteOutput)?;
    progress.finish_and_clear();

    eprintln!(
        "\n{} {}",
        style("[SUCCESS]").green().bold(),
        style("Signed successfully").cyan()
    );

    if cli.json {
        let payload = SignJson {
            status: "ok",
            command: "sign",
            input: cli.input.display().to_string(),
            output: cli.output.display().to_string(),
            digest: cli.digest,
            signer: subject,
            report: &signed.report,
        };
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        println!("{}", cli.output.display());
    }

    Ok(())
}

/// Replaces `path` with `data` only once all of it has been written, so the
/// output may also be the input.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    tracing::debug!(path = %path.display(), len = data.len(), "Output written");
    Ok(())
}
