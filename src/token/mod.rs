//! Token module: the in-process mint/account ledger the escrows settle on.

pub mod ledger;

pub use ledger::{
    associated_token_address, derive_address, Address, LedgerSnapshot, Mint, TokenAccount,
    TokenError, TokenLedger,
};
