//! Error taxonomy for reading, updating and signing documents.
//!
//! Every variant is terminal for the operation that produced it. A buffer that
//! was being mutated when the error surfaced must be discarded by the caller.

use thiserror::Error;

/// Opaque failure reported by a [`crate::Signer`] implementation.
pub type SignerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// A malformed literal: number, name, string or hex string.
    #[error("token error: {0}")]
    Token(String),

    /// Unbalanced arrays or dictionaries, missing object ID pairs,
    /// malformed stream framing.
    #[error("structural error: {0}")]
    Structural(String),

    /// Missing `startxref` anchor, circular sections, invalid entries or `Size`.
    #[error("cross-reference error: {0}")]
    CrossReference(String),

    /// The object found at a recorded offset is not the one that was asked for.
    #[error("object access error: {0}")]
    ObjectAccess(String),

    /// The document graph does not have the shape signing requires.
    #[error("unsupported document: {0}")]
    DocumentShape(String),

    /// A placeholder reserved before flushing turned out to be too small.
    #[error("reservation error: {0}")]
    Reservation(String),

    /// Pass-through from the external signer.
    #[error("signer error: {0}")]
    Signer(#[source] SignerError),
}

impl Error {
    pub(crate) fn token(msg: impl Into<String>) -> Self {
        Error::Token(msg.into())
    }

    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    pub(crate) fn xref(msg: impl Into<String>) -> Self {
        Error::CrossReference(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Error::DocumentShape(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_category() {
        let err = Error::xref("circular xref offsets");
        assert_eq!(
            err.to_string(),
            "cross-reference error: circular xref offsets"
        );
        let err = Error::Reservation("not enough space reserved for /ByteRange".into());
        assert!(err.to_string().starts_with("reservation error"));
    }

    #[test]
    fn signer_error_keeps_source() {
        let inner: SignerError = "key does not match certificate".into();
        let err = Error::Signer(inner);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("key does not match"));
    }
}
