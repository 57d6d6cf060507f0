//! Token ledger: mints, token accounts, and owner-checked transfers.
//!
//! - Mint: supply + mint authority
//! - TokenAccount: (mint, owner, amount), addressed by derived hex keys
//! - TokenLedger: single in-process ledger behind a RwLock
//!
//! Escrow vaults are plain token accounts owned by the escrow's derived
//! authority address; the executor moves vault funds by signing as that
//! authority.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Account key type (hex string, 32 bytes)
pub type Address = String;

/// Derive a deterministic address from seed byte-slices.
/// Length-prefixing each seed keeps distinct seed lists from colliding.
pub fn derive_address(seeds: &[&[u8]]) -> Address {
    let mut h = Sha256::new();
    for seed in seeds {
        h.update((seed.len() as u64).to_le_bytes());
        h.update(seed);
    }
    hex::encode(h.finalize())
}

/// The canonical token account address for (owner, mint).
pub fn associated_token_address(owner: &Address, mint: &Address) -> Address {
    derive_address(&[b"token", owner.as_bytes(), mint.as_bytes()])
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("mint not found: {0}")]
    MintNotFound(Address),

    #[error("mint already exists: {0}")]
    MintExists(Address),

    #[error("token account not found: {0}")]
    AccountNotFound(Address),

    #[error("token account already exists: {0}")]
    AccountExists(Address),

    #[error("token accounts have mismatched mints")]
    MintMismatch,

    #[error("signer is not the account owner")]
    IncorrectOwner,

    #[error("signer is not the mint authority")]
    IncorrectMintAuthority,

    #[error("insufficient token balance")]
    InsufficientFunds,

    #[error("supply overflow")]
    SupplyOverflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mint {
    /// authority allowed to mint new supply
    pub authority: Address,
    /// total minted supply
    pub supply: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Address,
    pub owner: Address,
    pub amount: u64,
}

#[derive(Default)]
struct Inner {
    mints: HashMap<Address, Mint>,
    accounts: HashMap<Address, TokenAccount>,
}

/// Serializable copy of the whole ledger, checkpointed to the escrow
/// store so balances survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub mints: HashMap<Address, Mint>,
    pub accounts: HashMap<Address, TokenAccount>,
}

/// In-process token ledger shared across the engine.
#[derive(Clone, Default)]
pub struct TokenLedger {
    inner: Arc<RwLock<Inner>>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the full ledger state for persistence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.read();
        LedgerSnapshot { mints: inner.mints.clone(), accounts: inner.accounts.clone() }
    }

    /// Rebuild a ledger from a persisted snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                mints: snapshot.mints,
                accounts: snapshot.accounts,
            })),
        }
    }

    pub fn create_mint(&self, address: Address, authority: Address, decimals: u8) -> Result<(), TokenError> {
        let mut inner = self.inner.write();
        if inner.mints.contains_key(&address) {
            return Err(TokenError::MintExists(address));
        }
        inner.mints.insert(address, Mint { authority, supply: 0, decimals });
        Ok(())
    }

    pub fn get_mint(&self, address: &Address) -> Option<Mint> {
        self.inner.read().mints.get(address).cloned()
    }

    pub fn create_account(&self, address: Address, mint: Address, owner: Address) -> Result<(), TokenError> {
        let mut inner = self.inner.write();
        if !inner.mints.contains_key(&mint) {
            return Err(TokenError::MintNotFound(mint));
        }
        if inner.accounts.contains_key(&address) {
            return Err(TokenError::AccountExists(address));
        }
        inner.accounts.insert(address, TokenAccount { mint, owner, amount: 0 });
        Ok(())
    }

    /// Get-or-create the associated token account for (owner, mint).
    pub fn ensure_associated_account(&self, owner: &Address, mint: &Address) -> Result<Address, TokenError> {
        let address = associated_token_address(owner, mint);
        let mut inner = self.inner.write();
        if !inner.mints.contains_key(mint) {
            return Err(TokenError::MintNotFound(mint.clone()));
        }
        inner.accounts.entry(address.clone()).or_insert_with(|| TokenAccount {
            mint: mint.clone(),
            owner: owner.clone(),
            amount: 0,
        });
        Ok(address)
    }

    pub fn get_account(&self, address: &Address) -> Option<TokenAccount> {
        self.inner.read().accounts.get(address).cloned()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.inner.read().accounts.get(address).map(|a| a.amount).unwrap_or(0)
    }

    /// Mint new supply into `dest`. Only the mint authority may mint.
    pub fn mint_to(&self, mint: &Address, dest: &Address, amount: u64, authority: &Address) -> Result<(), TokenError> {
        let mut inner = self.inner.write();
        let m = inner.mints.get(mint).ok_or_else(|| TokenError::MintNotFound(mint.clone()))?;
        if &m.authority != authority {
            return Err(TokenError::IncorrectMintAuthority);
        }
        let new_supply = m.supply.checked_add(amount).ok_or(TokenError::SupplyOverflow)?;
        {
            let acc = inner
                .accounts
                .get(dest)
                .ok_or_else(|| TokenError::AccountNotFound(dest.clone()))?;
            if &acc.mint != mint {
                return Err(TokenError::MintMismatch);
            }
        }
        if let Some(m) = inner.mints.get_mut(mint) {
            m.supply = new_supply;
        }
        if let Some(acc) = inner.accounts.get_mut(dest) {
            acc.amount = acc.amount.saturating_add(amount);
        }
        Ok(())
    }

    /// Transfer `amount` between accounts of the same mint. `signer` must
    /// be the owner of `from`.
    pub fn transfer(&self, from: &Address, to: &Address, amount: u64, signer: &Address) -> Result<(), TokenError> {
        let mut inner = self.inner.write();
        let (from_mint, from_owner, from_amount) = {
            let acc = inner
                .accounts
                .get(from)
                .ok_or_else(|| TokenError::AccountNotFound(from.clone()))?;
            (acc.mint.clone(), acc.owner.clone(), acc.amount)
        };
        if &from_owner != signer {
            return Err(TokenError::IncorrectOwner);
        }
        if from_amount < amount {
            return Err(TokenError::InsufficientFunds);
        }
        {
            let to_acc = inner
                .accounts
                .get(to)
                .ok_or_else(|| TokenError::AccountNotFound(to.clone()))?;
            if to_acc.mint != from_mint {
                return Err(TokenError::MintMismatch);
            }
        }
        if let Some(acc) = inner.accounts.get_mut(from) {
            acc.amount -= amount;
        }
        if let Some(acc) = inner.accounts.get_mut(to) {
            acc.amount = acc.amount.saturating_add(amount);
        }
        Ok(())
    }
}
