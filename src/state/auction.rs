use serde::{Deserialize, Serialize};

use crate::token::Address;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bid {
    pub bidder: Address,
    pub amount: u64,
}

/// One issuance auction: a period's newly issued ricks offered against the
/// escrow's payment token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RicksAuction {
    /// The escrow this auction issues shares for
    pub escrow: Address,
    /// Issuance period index (1-based)
    pub period: u64,
    /// Ricks offered in this auction
    pub lot: u64,
    pub opened_at: u64,
    pub ends_at: u64,
    /// Current best bid, already escrowed in the payment vault
    pub best_bid: Option<Bid>,
    pub settled: bool,
}

impl RicksAuction {
    pub fn is_open(&self, now: u64) -> bool {
        !self.settled && now < self.ends_at
    }

    /// Minimum amount a new bid must reach to displace the current best.
    pub fn min_next_bid(&self) -> u64 {
        match &self.best_bid {
            Some(bid) => bid.amount.saturating_add(1),
            None => 1,
        }
    }
}
