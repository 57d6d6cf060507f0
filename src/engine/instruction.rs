//! The instruction set and its signed envelope.
//!
//! Instructions travel in a [SignedInstruction] envelope carrying the
//! payer's address, a strictly-increasing nonce, and an Ed25519 signature
//! over the serialized (payer, nonce, instruction) tuple. The envelope's
//! SHA-256 digest (hex) is the transaction signature handed back to
//! callers and used for dedup and receipt lookup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{Keypair, PublicKey, Signature, Signer, Verifier};
use crate::token::Address;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Instruction {
    /// Engine genesis marker. Succeeds exactly once per engine instance.
    Initialize,
    /// Stake the payer's nft and fractionalize it into ricks.
    InitializeEscrow {
        nft_mint: Address,
        ricks_amount: u64,
        ricks_per_day: u64,
        auction_duration_secs: u64,
        resolver: Address,
    },
    /// Create the payer's position account for an escrow.
    InitializeUserPosition { escrow: Address },
    /// Open the next issuance auction once a full period has elapsed.
    OpenAuction { escrow: Address },
    /// Escrowed bid on the open auction.
    PlaceBid { escrow: Address, amount: u64 },
    /// Close an ended auction: credit the winner, distribute proceeds.
    SettleAuction { escrow: Address },
    /// Move ricks from the escrow vault to the user's own token account.
    Withdraw {
        escrow: Address,
        ricks_vault: Address,
        user_token_account: Address,
        amount: u64,
    },
    /// Pay out the position's accrued share of auction proceeds.
    ClaimProceeds { escrow: Address },
    /// Resolver buyout: pay `price`, take the nft, finalize the escrow.
    Finalize { escrow: Address, price: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedInstruction {
    /// Hex public key of the signer, also their ledger address
    pub payer: Address,
    /// Strictly increasing per payer; replay protection
    pub nonce: u64,
    pub instruction: Instruction,
    pub signature: Signature,
}

impl SignedInstruction {
    fn message_bytes(payer: &Address, nonce: u64, instruction: &Instruction) -> Vec<u8> {
        bincode::serialize(&(payer, nonce, instruction)).unwrap_or_default()
    }

    /// Sign `instruction` with `keypair` as payer.
    pub fn sign(keypair: &Keypair, nonce: u64, instruction: Instruction) -> Self {
        let payer = keypair.address();
        let msg = Self::message_bytes(&payer, nonce, &instruction);
        let signature = keypair.sign(&msg);
        Self { payer, nonce, instruction, signature }
    }

    /// Verify the envelope signature against the payer's public key.
    pub fn verify(&self) -> Result<()> {
        let pk = PublicKey::from_address(&self.payer)?;
        let msg = Self::message_bytes(&self.payer, self.nonce, &self.instruction);
        pk.verify(&msg, &self.signature)
    }

    /// The transaction signature: hex SHA-256 of the serialized envelope.
    pub fn id(&self) -> String {
        let bin = bincode::serialize(self).unwrap_or_default();
        let mut h = Sha256::new();
        h.update(&bin);
        hex::encode(h.finalize())
    }
}

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction signature of the executed envelope
    pub signature: String,
    pub payer: Address,
    pub success: bool,
    pub err: Option<String>,
    /// The escrow the instruction touched (the new address for
    /// InitializeEscrow)
    pub escrow: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_and_id_nonempty() {
        let kp = Keypair::generate();
        let signed = SignedInstruction::sign(&kp, 1, Instruction::Initialize);
        assert!(signed.verify().is_ok());
        assert!(!signed.id().is_empty());
    }

    #[test]
    fn test_tampered_envelope_fails_verification() {
        let kp = Keypair::generate();
        let mut signed = SignedInstruction::sign(&kp, 1, Instruction::Initialize);
        signed.nonce = 2;
        assert!(signed.verify().is_err());
    }

    #[test]
    fn test_distinct_nonces_give_distinct_ids() {
        let kp = Keypair::generate();
        let a = SignedInstruction::sign(&kp, 1, Instruction::Initialize);
        let b = SignedInstruction::sign(&kp, 2, Instruction::Initialize);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let kp = Keypair::generate();
        let signed = SignedInstruction::sign(
            &kp,
            7,
            Instruction::PlaceBid { escrow: "abc".to_string(), amount: 42 },
        );
        let json = serde_json::to_string(&signed).unwrap();
        let back: SignedInstruction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signed);
        assert!(back.verify().is_ok());
    }
}
