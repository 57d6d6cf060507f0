use thiserror::Error;

use crate::token::ledger::TokenError;

/// Unified error type for the escrow engine.
#[derive(Error, Debug)]
pub enum RicksError {
    #[error("ricks amount cannot be zero")]
    RicksAmountCannotBeZero,

    #[error("auction duration must be between 1 and {0} seconds")]
    InvalidAuctionDuration(u64),

    #[error("user account cannot be the escrow account")]
    UserAccountCannotBeEscrowAccount,

    #[error("user account has incorrect owner")]
    UserAccountIncorrectOwner,

    #[error("incorrect ricks escrow account")]
    IncorrectRicksEscrow,

    #[error("engine already initialized")]
    AlreadyInitialized,

    #[error("engine not initialized")]
    NotInitialized,

    #[error("escrow not found: {0}")]
    EscrowNotFound(String),

    #[error("escrow is finalized")]
    EscrowFinalized,

    #[error("user position not found: {0}")]
    PositionNotFound(String),

    #[error("user position already exists: {0}")]
    PositionAlreadyExists(String),

    #[error("position holds insufficient ricks")]
    InsufficientPosition,

    #[error("no issuance is due yet")]
    IssuanceNotDue,

    #[error("escrow issues no ricks per period")]
    NothingToAuction,

    #[error("an auction is already open for this escrow")]
    AuctionAlreadyOpen,

    #[error("no open auction for this escrow")]
    NoOpenAuction,

    #[error("auction is still open")]
    AuctionStillOpen,

    #[error("auction has closed")]
    AuctionClosed,

    #[error("bid must exceed the current best bid")]
    BidTooLow,

    #[error("only the escrow resolver may finalize")]
    NotResolver,

    #[error("finalize price cannot be zero")]
    PriceCannotBeZero,

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("store error: {0}")]
    Store(String),
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, RicksError>;
