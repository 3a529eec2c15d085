//! Detached CMS `SignedData` over the signed byte ranges of a document.

use anyhow::{Context, Result, anyhow, bail};
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use pdf_sign_core::{DigestAlgorithm, SignerError, compute_digest};
use sha2::{Sha256, Sha384, Sha512};
use signature::Keypair;
use x509_cert::Certificate;
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage};
use x509_cert::spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding,
};

use crate::keypair::{KeyPair, PrivateKey};

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_CE_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
const ID_CE_EXT_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");
const ID_KP_EMAIL_PROTECTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");
const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

fn digest_algorithm_identifier(digest: DigestAlgorithm) -> AlgorithmIdentifierOwned {
    let oid = match digest {
        DigestAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
        DigestAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
        DigestAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
    };
    AlgorithmIdentifierOwned {
        oid: ObjectIdentifier::new_unwrap(oid),
        parameters: None,
    }
}

/// Signs with a PKCS#12 key pair, embedding the whole chain.
#[derive(Debug, Clone)]
pub struct CmsSigner {
    pair: KeyPair,
}

impl CmsSigner {
    pub fn new(pair: KeyPair) -> Self {
        Self { pair }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.pair
    }

    /// Produces a DER-encoded detached `SignedData` over the concatenation
    /// of `content`.
    #[tracing::instrument(skip(self, content), fields(ranges = content.len(), digest = %digest))]
    pub fn sign_detached(&self, content: &[&[u8]], digest: DigestAlgorithm) -> Result<Vec<u8>> {
        let leaf = self.pair.leaf()?;
        check_key_usage(leaf)?;

        let message_digest = compute_digest(digest, content);
        let der = match &self.pair.private_key {
            PrivateKey::Rsa(key) => match digest {
                DigestAlgorithm::Sha256 => self.build::<_, rsa::pkcs1v15::Signature>(
                    &rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone()),
                    digest,
                    &message_digest,
                ),
                DigestAlgorithm::Sha384 => self.build::<_, rsa::pkcs1v15::Signature>(
                    &rsa::pkcs1v15::SigningKey::<Sha384>::new(key.clone()),
                    digest,
                    &message_digest,
                ),
                DigestAlgorithm::Sha512 => self.build::<_, rsa::pkcs1v15::Signature>(
                    &rsa::pkcs1v15::SigningKey::<Sha512>::new(key.clone()),
                    digest,
                    &message_digest,
                ),
            },
            PrivateKey::P256(key) => {
                // The curve fixes the signature hash.
                if digest != DigestAlgorithm::Sha256 {
                    bail!("ECDSA P-256 keys only sign with sha256, not {digest}");
                }
                self.build::<_, p256::ecdsa::DerSignature>(
                    &p256::ecdsa::SigningKey::from(key),
                    digest,
                    &message_digest,
                )
            }
        }?;
        tracing::debug!(len = der.len(), "Built SignedData");
        Ok(der)
    }

    fn build<S, Sig>(
        &self,
        signing_key: &S,
        digest: DigestAlgorithm,
        message_digest: &[u8],
    ) -> Result<Vec<u8>>
    where
        S: Keypair + DynSignatureAlgorithmIdentifier + signature::Signer<Sig>,
        S::VerifyingKey: EncodePublicKey,
        Sig: SignatureBitStringEncoding,
    {
        let leaf = self.pair.leaf()?;
        let content = EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        };
        let signer_id = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: leaf.tbs_certificate.issuer.clone(),
            serial_number: leaf.tbs_certificate.serial_number.clone(),
        });

        let signer_info = SignerInfoBuilder::new(
            signing_key,
            signer_id,
            digest_algorithm_identifier(digest),
            &content,
            Some(message_digest),
        )
        .map_err(|e| anyhow!("failed to prepare signer info: {e:?}"))?;

        let mut builder = SignedDataBuilder::new(&content);
        builder
            .add_digest_algorithm(digest_algorithm_identifier(digest))
            .map_err(|e| anyhow!("failed to add digest algorithm: {e:?}"))?;
        for cert in &self.pair.chain {
            builder
                .add_certificate(CertificateChoices::Certificate(cert.clone()))
                .map_err(|e| anyhow!("failed to add certificate: {e:?}"))?;
        }
        builder
            .add_signer_info::<S, Sig>(signer_info)
            .map_err(|e| anyhow!("failed to sign: {e:?}"))?;

        builder
            .build()
            .map_err(|e| anyhow!("failed to build SignedData: {e:?}"))?
            .to_der()
            .context("failed to encode SignedData")
    }
}

impl pdf_sign_core::Signer for CmsSigner {
    fn sign(
        &self,
        content: &[&[u8]],
        digest: DigestAlgorithm,
    ) -> std::result::Result<Vec<u8>, SignerError> {
        Ok(self.sign_detached(content, digest)?)
    }
}

/// The certificate must be usable for signing documents. A missing
/// KeyUsage extension leaves usage unrestricted.
fn check_key_usage(cert: &Certificate) -> Result<()> {
    let extensions = cert.tbs_certificate.extensions.as_deref().unwrap_or_default();
    for extension in extensions {
        let value = extension.extn_value.as_bytes();
        if extension.extn_id == ID_CE_KEY_USAGE {
            let usage = KeyUsage::from_der(value).context("invalid KeyUsage extension")?;
            if !usage.digital_signature() && !usage.non_repudiation() {
                bail!(
                    "the certificate's key usage must include digital signatures \
                     or non-repudiation"
                );
            }
        } else if extension.extn_id == ID_CE_EXT_KEY_USAGE {
            let usage = ExtendedKeyUsage::from_der(value)
                .context("invalid ExtendedKeyUsage extension")?;
            if !usage
                .0
                .iter()
                .any(|oid| *oid == ID_KP_EMAIL_PROTECTION || *oid == ANY_EXTENDED_KEY_USAGE)
            {
                bail!("the certificate's extended key usage must include S/MIME");
            }
        }
    }
    Ok(())
}
