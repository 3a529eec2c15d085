//! Core primitives for signing PDF documents in place: a tokenizer and object
//! model, a cross-reference resolver, an append-only update session, and the
//! two-pass signing orchestrator.
//!
//! This crate never touches key material; signatures come from a [`Signer`].

pub mod digest;
pub mod error;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod pdf;
pub mod sign;
pub mod types;
pub mod updater;
pub mod xref;

pub use digest::{DigestAlgorithm, compute_digest};
pub use error::{Error, Result, SignerError};
pub use lexer::Lexer;
pub use object::{Dict, Object};
pub use parser::{NoResolve, Parser, Resolve, parse_object};
pub use sign::{SignOptions, SignedDocument, Signer, sign};
pub use types::*;
pub use updater::{ObjectWriter, Updater};
pub use xref::XrefEntry;
