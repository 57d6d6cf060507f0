use anyhow::{anyhow, Result};
use ed25519_dalek::{Signature as DalekSig, Signer as DalekSigner, Verifier as DalekVerifier};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{Keypair, PublicKey};
use crate::utils::serde_helpers;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

// serde has no derive support for 64-byte arrays, so signatures travel as hex.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde_helpers::as_hex(&self.0, s)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes = serde_helpers::from_hex(d)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be 64 bytes"))?;
        Ok(Signature(arr))
    }
}

/// Trait for signing
pub trait Signer {
    fn sign(&self, msg: &[u8]) -> Signature;
}

/// Trait for verifying
pub trait Verifier {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<()>;
}

impl Signer for Keypair {
    fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.keypair.sign(msg);
        Signature(sig.to_bytes())
    }
}

impl Verifier for PublicKey {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<()> {
        let pk = ed25519_dalek::PublicKey::from_bytes(&self.0)?;
        let ds = DalekSig::from_bytes(&sig.0)?;
        pk.verify(msg, &ds)
            .map_err(|_| anyhow!("signature verification failed"))
    }
}
