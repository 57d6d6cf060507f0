use anyhow::Result;
use ed25519_dalek::{Keypair as DalekKeypair, PublicKey as DalekPublic, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Hex string form, used as an account address throughout the engine.
    pub fn to_address(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex address back into a public key.
    pub fn from_address(addr: &str) -> Result<Self> {
        let bytes = hex::decode(addr)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("address must be 32 bytes of hex"))?;
        Ok(PublicKey(arr))
    }
}

pub struct Keypair {
    pub keypair: DalekKeypair,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let kp = DalekKeypair::generate(&mut OsRng);
        Self { keypair: kp }
    }

    /// Construct from raw secret bytes
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let sk = SecretKey::from_bytes(secret)?;
        let pk = DalekPublic::from(&sk);
        let kp = DalekKeypair { secret: sk, public: pk };
        Ok(Self { keypair: kp })
    }

    /// Get public key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.keypair.public.to_bytes())
    }

    /// Hex address of the public key
    pub fn address(&self) -> String {
        self.public().to_address()
    }

    /// Export secret as bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.keypair.secret.to_bytes()
    }
}
