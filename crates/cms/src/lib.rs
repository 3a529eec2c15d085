//! PKCS#12 key pairs and detached CMS signatures for `pdf-sign-core`.

pub mod keypair;
pub mod sign;

pub use keypair::{KeyPair, PrivateKey};
pub use sign::CmsSigner;
