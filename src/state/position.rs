use serde::{Deserialize, Serialize};

use crate::state::escrow::REWARD_PRECISION;
use crate::token::{derive_address, Address};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPosition {
    /// Derived address of this position
    pub address: Address,
    /// The escrow for which we track position
    pub escrow: Address,
    /// Owner of the position
    pub owner: Address,
    /// The amount of ricks owned by user
    pub ricks_amount: u64,
    /// Reward debt against the escrow accumulator (e12-scaled)
    pub reward_debt_e12: u128,
    /// Proceeds accrued but not yet claimed
    pub pending_payout: u64,
}

impl UserPosition {
    pub fn derive(user: &Address, escrow: &Address) -> Address {
        derive_address(&[b"user", user.as_bytes(), escrow.as_bytes()])
    }

    pub fn new(user: &Address, escrow: &Address) -> Self {
        Self {
            address: Self::derive(user, escrow),
            escrow: escrow.clone(),
            owner: user.clone(),
            ricks_amount: 0,
            reward_debt_e12: 0,
            pending_payout: 0,
        }
    }

    /// Settle accrued proceeds against the escrow accumulator. Must be
    /// called before `ricks_amount` changes, and followed by
    /// [`reset_debt`](Self::reset_debt) afterwards.
    pub fn accrue(&mut self, reward_per_share_e12: u128) {
        let gross = (self.ricks_amount as u128).saturating_mul(reward_per_share_e12);
        let owed = gross.saturating_sub(self.reward_debt_e12) / REWARD_PRECISION;
        self.pending_payout = self.pending_payout.saturating_add(owed as u64);
        self.reward_debt_e12 = gross;
    }

    /// Re-anchor the reward debt after `ricks_amount` changed.
    pub fn reset_debt(&mut self, reward_per_share_e12: u128) {
        self.reward_debt_e12 = (self.ricks_amount as u128).saturating_mul(reward_per_share_e12);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accrue_pro_rata() {
        let escrow = "escrow".to_string();
        let user = "user".to_string();
        let mut pos = UserPosition::new(&user, &escrow);
        pos.ricks_amount = 100;
        pos.reset_debt(0);

        // 0.5 payment per share distributed
        let rps = REWARD_PRECISION / 2;
        pos.accrue(rps);
        assert_eq!(pos.pending_payout, 50);

        // accruing again against the same accumulator adds nothing
        pos.accrue(rps);
        assert_eq!(pos.pending_payout, 50);
    }

    #[test]
    fn test_debt_reset_after_share_change() {
        let mut pos = UserPosition::new(&"u".to_string(), &"e".to_string());
        pos.ricks_amount = 10;
        pos.reset_debt(0);

        let rps = REWARD_PRECISION; // 1 per share
        pos.accrue(rps);
        assert_eq!(pos.pending_payout, 10);

        pos.ricks_amount += 10;
        pos.reset_debt(rps);

        // nothing new distributed, larger holding earns nothing yet
        pos.accrue(rps);
        assert_eq!(pos.pending_payout, 10);

        // next distribution pays on the full 20 shares
        pos.accrue(2 * rps);
        assert_eq!(pos.pending_payout, 30);
    }
}
