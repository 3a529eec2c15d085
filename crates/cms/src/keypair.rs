//! Loading a private key and its certificate chain from a PKCS#12 archive.

use anyhow::{Context, Result, anyhow, bail};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};

/// A private key of one of the supported algorithms.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    P256(p256::SecretKey),
}

impl PrivateKey {
    /// Decodes a PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::P256(key));
        }
        bail!("unsupported private key algorithm, expected RSA or ECDSA P-256")
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "RSA",
            PrivateKey::P256(_) => "ECDSA P-256",
        }
    }

    /// DER-encoded `SubjectPublicKeyInfo` of the public half.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            PrivateKey::Rsa(key) => key.to_public_key().to_public_key_der(),
            PrivateKey::P256(key) => key.public_key().to_public_key_der(),
        }
        .map_err(|e| anyhow!("failed to encode public key: {e}"))?;
        Ok(document.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.algorithm()).finish()
    }
}

/// A signing key together with its certificate chain, leaf first.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub chain: Vec<Certificate>,
}

impl KeyPair {
    /// Opens a PKCS#12 archive holding exactly one private key and at least
    /// one certificate. The first certificate must belong to the key.
    #[tracing::instrument(skip(der, password), fields(der_len = der.len()))]
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self> {
        let pfx = p12::PFX::parse(der).map_err(|e| anyhow!("not a PKCS#12 archive: {e:?}"))?;
        // Only SHA-1 MACs and the legacy PBE schemes are understood, so
        // archives from OpenSSL 3 defaults fail here too.
        if !pfx.verify_mac(password) {
            bail!(
                "PKCS#12 integrity check failed: either the password is wrong or the \
                 archive uses modern encryption; re-export it with `openssl pkcs12 -legacy`"
            );
        }

        let mut keys = pfx
            .key_bags(password)
            .map_err(|e| anyhow!("failed to decrypt private keys: {e:?}"))?;
        let key_der = match keys.len() {
            0 => bail!("the archive contains no private key"),
            1 => keys.remove(0),
            n => bail!("the archive contains {n} private keys, expected one"),
        };
        let private_key = PrivateKey::from_pkcs8_der(&key_der)?;

        let chain = pfx
            .cert_x509_bags(password)
            .map_err(|e| anyhow!("failed to decrypt certificates: {e:?}"))?
            .iter()
            .map(|der| Certificate::from_der(der).context("invalid certificate"))
            .collect::<Result<Vec<_>>>()?;

        let pair = Self { private_key, chain };
        pair.check_leaf()?;
        tracing::debug!(
            algorithm = pair.private_key.algorithm(),
            certificates = pair.chain.len(),
            "Loaded key pair"
        );
        Ok(pair)
    }

    /// The certificate belonging to the private key.
    pub fn leaf(&self) -> Result<&Certificate> {
        self.chain
            .first()
            .context("the archive contains no certificate")
    }

    fn check_leaf(&self) -> Result<()> {
        let leaf_key = self
            .leaf()?
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .context("failed to encode certificate public key")?;
        if leaf_key != self.private_key.public_key_der()? {
            bail!("the private key does not match the certificate");
        }
        Ok(())
    }
}
