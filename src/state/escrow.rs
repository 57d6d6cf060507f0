//! Escrow record: one staked NFT fractionalized into ricks, with a
//! recurring issuance schedule and pro-rata proceeds accounting.

use serde::{Deserialize, Serialize};

use crate::token::{derive_address, Address};

/// Length of one issuance period, and the cap on a configured auction
/// duration.
pub const MAX_DELAY_SEC: u64 = 86_400;

/// Fixed-point scale for the reward-per-share accumulator.
pub const REWARD_PRECISION: u128 = 1_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Escrow {
    /// Derived address of this escrow
    pub address: Address,
    /// Creator of the escrow
    pub creator: Address,
    /// Resolver for this escrow: the finalization authority
    pub resolver: Address,
    /// Mint of the staked nft
    pub nft_mint: Address,
    /// Vault token account holding the staked nft
    pub nft_vault: Address,
    /// Mint of the ricks shares
    pub ricks_mint: Address,
    /// Ricks token account (the escrow's share vault)
    pub ricks_vault: Address,
    /// The token this escrow is denominated in
    pub payment_mint: Address,
    /// Vault token account holding bids and undistributed proceeds
    pub payment_vault: Address,
    /// Total ricks ever issued for this escrow
    pub ricks_amount: u64,
    /// Ricks still held in vault-tracked positions; the denominator for
    /// proceeds distribution (withdrawn ricks stop accruing)
    pub staked_amount: u64,
    /// Ricks newly issued per period
    pub ricks_per_day: u64,
    /// How long each issuance auction stays open
    pub auction_duration_secs: u64,
    /// Escrow start time (unix seconds)
    pub start_time: u64,
    /// Periods whose issuance has already been auctioned (or lapsed)
    pub issued_periods: u64,
    /// A flag checking whether the escrow is finalized
    pub finalized: bool,
    /// Accumulated proceeds per share, scaled by [REWARD_PRECISION]
    pub reward_per_share_e12: u128,
}

impl Escrow {
    /// Derived address for a new escrow.
    pub fn derive(creator: &Address, nft_mint: &Address, nonce: u64) -> Address {
        derive_address(&[b"escrow", creator.as_bytes(), nft_mint.as_bytes(), &nonce.to_le_bytes()])
    }

    /// The authority that owns this escrow's vault accounts.
    pub fn authority_address(escrow: &Address) -> Address {
        derive_address(&[b"authority", escrow.as_bytes()])
    }

    /// The escrow's ricks share vault.
    pub fn ricks_vault_address(escrow: &Address) -> Address {
        derive_address(&[b"ricks", escrow.as_bytes()])
    }

    /// The escrow's payment vault.
    pub fn payment_vault_address(escrow: &Address) -> Address {
        derive_address(&[b"payment", escrow.as_bytes()])
    }

    /// The mint created for this escrow's shares.
    pub fn ricks_mint_address(escrow: &Address) -> Address {
        derive_address(&[b"mint", escrow.as_bytes()])
    }

    /// The vault holding the staked nft.
    pub fn nft_vault_address(escrow: &Address) -> Address {
        derive_address(&[b"nft", escrow.as_bytes()])
    }

    /// The next issuance period whose auction may open at `now`, if any.
    pub fn period_due(&self, now: u64) -> Option<u64> {
        let next = self.issued_periods + 1;
        let due_at = self.start_time + next.saturating_mul(MAX_DELAY_SEC);
        if now >= due_at {
            Some(next)
        } else {
            None
        }
    }

    /// Fold `proceeds` into the per-share accumulator, pro rata over the
    /// ricks staked in positions right now.
    pub fn distribute_proceeds(&mut self, proceeds: u64) {
        if self.staked_amount == 0 {
            return;
        }
        let delta = (proceeds as u128) * REWARD_PRECISION / (self.staked_amount as u128);
        self.reward_per_share_e12 = self.reward_per_share_e12.saturating_add(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Escrow {
        let creator = "creator".to_string();
        let nft_mint = "nftmint".to_string();
        let address = Escrow::derive(&creator, &nft_mint, 1);
        Escrow {
            creator,
            resolver: "resolver".to_string(),
            nft_mint,
            nft_vault: Escrow::nft_vault_address(&address),
            ricks_mint: Escrow::ricks_mint_address(&address),
            ricks_vault: Escrow::ricks_vault_address(&address),
            payment_mint: "pay".to_string(),
            payment_vault: Escrow::payment_vault_address(&address),
            address,
            ricks_amount: 100,
            staked_amount: 100,
            ricks_per_day: 10,
            auction_duration_secs: 3_600,
            start_time: 1_000,
            issued_periods: 0,
            finalized: false,
            reward_per_share_e12: 0,
        }
    }

    #[test]
    fn test_period_due_schedule() {
        let mut escrow = sample();
        assert_eq!(escrow.period_due(1_000), None);
        assert_eq!(escrow.period_due(1_000 + MAX_DELAY_SEC - 1), None);
        assert_eq!(escrow.period_due(1_000 + MAX_DELAY_SEC), Some(1));
        escrow.issued_periods = 1;
        assert_eq!(escrow.period_due(1_000 + MAX_DELAY_SEC), None);
        assert_eq!(escrow.period_due(1_000 + 2 * MAX_DELAY_SEC), Some(2));
    }

    #[test]
    fn test_distribute_proceeds_accumulates() {
        let mut escrow = sample();
        escrow.distribute_proceeds(50);
        assert_eq!(escrow.reward_per_share_e12, 50 * REWARD_PRECISION / 100);
        escrow.distribute_proceeds(50);
        assert_eq!(escrow.reward_per_share_e12, 100 * REWARD_PRECISION / 100);
    }

    #[test]
    fn test_distribute_with_no_shares_is_noop() {
        let mut escrow = sample();
        escrow.staked_amount = 0;
        escrow.distribute_proceeds(50);
        assert_eq!(escrow.reward_per_share_e12, 0);
    }
}
