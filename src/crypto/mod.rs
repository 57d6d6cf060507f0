//! Crypto module: key management, signing, verification.
//!
//! - Keys: generation, raw-byte import/export, hex addresses
//! - Sign: Ed25519 signatures over instruction envelopes

pub mod keys;
pub mod sign;

pub use keys::{Keypair, PublicKey};
pub use sign::{Signature, Signer, Verifier};
