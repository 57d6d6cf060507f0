//! Instruction executor.
//!
//! Applies signed instructions against the token ledger and escrow store
//! under per-escrow locks, produces Receipts, and keeps them for lookup
//! by transaction signature. Instructions touching different escrows
//! execute in parallel; instructions on the same escrow serialize.

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::clock::Clock;
use crate::engine::instruction::{Instruction, Receipt, SignedInstruction};
use crate::state::{Bid, Escrow, EscrowLocks, EscrowStore, RicksAuction, UserPosition, MAX_DELAY_SEC};
use crate::token::{Address, TokenLedger};
use crate::utils::errors::{Result, RicksError};
use crate::utils::metrics::METRICS;

/// Recorded by the one successful `Initialize` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genesis {
    pub payer: Address,
    pub timestamp: u64,
}

/// Lock key used by instructions that touch no particular escrow.
const GENESIS_LOCK_KEY: &str = "genesis";

/// Receipts retained for lookup; older ones are evicted.
const RECEIPT_CAPACITY: usize = 10_000;

pub struct Executor {
    ledger: TokenLedger,
    store: Arc<dyn EscrowStore>,
    locks: EscrowLocks,
    clock: Arc<dyn Clock>,
    /// The token every escrow on this engine is denominated in
    payment_mint: Address,
    genesis: RwLock<Option<Genesis>>,
    receipts: Mutex<LruCache<String, Receipt>>,
}

impl Executor {
    pub fn new(
        ledger: TokenLedger,
        store: Arc<dyn EscrowStore>,
        locks: EscrowLocks,
        clock: Arc<dyn Clock>,
        payment_mint: Address,
    ) -> Self {
        Self {
            ledger,
            store,
            locks,
            clock,
            payment_mint,
            genesis: RwLock::new(None),
            receipts: Mutex::new(LruCache::new(RECEIPT_CAPACITY)),
        }
    }

    pub fn payment_mint(&self) -> &Address {
        &self.payment_mint
    }

    pub fn genesis(&self) -> Option<Genesis> {
        self.genesis.read().clone()
    }

    /// Look up the receipt for a transaction signature.
    pub fn receipt(&self, signature: &str) -> Option<Receipt> {
        self.receipts.lock().get(&signature.to_string()).cloned()
    }

    /// Drop lock-table entries no task holds.
    pub async fn gc_locks(&self) -> usize {
        self.locks.gc().await
    }

    /// Execute one instruction under its escrow lock and record a receipt.
    pub async fn execute(&self, signed: SignedInstruction) -> Receipt {
        let signature = signed.id();
        let guard = self.locks.acquire(self.lock_keys(&signed)).await;
        let outcome = self.apply(&signed);
        drop(guard);

        let receipt = match outcome {
            Ok(escrow) => {
                METRICS.inc_counter("instructions_executed");
                debug!(sig = %signature, payer = %signed.payer, "instruction executed");
                Receipt {
                    signature: signature.clone(),
                    payer: signed.payer.clone(),
                    success: true,
                    err: None,
                    escrow,
                }
            }
            Err(e) => {
                METRICS.inc_counter("instructions_failed");
                warn!(sig = %signature, payer = %signed.payer, err = %e, "instruction failed");
                Receipt {
                    signature: signature.clone(),
                    payer: signed.payer.clone(),
                    success: false,
                    err: Some(e.to_string()),
                    escrow: None,
                }
            }
        };
        self.receipts.lock().put(signature, receipt.clone());
        receipt
    }

    /// Execute a batch in parallel; ordering across escrows is unspecified,
    /// per-escrow ordering is enforced by the locks.
    pub async fn execute_batch(self: &Arc<Self>, batch: Vec<SignedInstruction>) -> Vec<Receipt> {
        let mut handles: Vec<JoinHandle<Receipt>> = Vec::with_capacity(batch.len());
        for signed in batch {
            let exec = self.clone();
            handles.push(tokio::spawn(async move { exec.execute(signed).await }));
        }
        let mut receipts = Vec::with_capacity(handles.len());
        for h in handles {
            match h.await {
                Ok(r) => receipts.push(r),
                Err(e) => warn!("execution task join error: {:?}", e),
            }
        }
        receipts
    }

    fn lock_keys(&self, signed: &SignedInstruction) -> Vec<Address> {
        match &signed.instruction {
            Instruction::Initialize => vec![GENESIS_LOCK_KEY.to_string()],
            Instruction::InitializeEscrow { nft_mint, .. } => {
                vec![Escrow::derive(&signed.payer, nft_mint, signed.nonce)]
            }
            Instruction::InitializeUserPosition { escrow }
            | Instruction::OpenAuction { escrow }
            | Instruction::PlaceBid { escrow, .. }
            | Instruction::SettleAuction { escrow }
            | Instruction::Withdraw { escrow, .. }
            | Instruction::ClaimProceeds { escrow }
            | Instruction::Finalize { escrow, .. } => vec![escrow.clone()],
        }
    }

    fn apply(&self, signed: &SignedInstruction) -> Result<Option<Address>> {
        let payer = &signed.payer;
        match &signed.instruction {
            Instruction::Initialize => {
                self.initialize(payer)?;
                Ok(None)
            }
            Instruction::InitializeEscrow {
                nft_mint,
                ricks_amount,
                ricks_per_day,
                auction_duration_secs,
                resolver,
            } => self
                .initialize_escrow(
                    payer,
                    signed.nonce,
                    nft_mint,
                    *ricks_amount,
                    *ricks_per_day,
                    *auction_duration_secs,
                    resolver,
                )
                .map(Some),
            Instruction::InitializeUserPosition { escrow } => {
                self.initialize_user_position(payer, escrow)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::OpenAuction { escrow } => {
                self.open_auction(escrow)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::PlaceBid { escrow, amount } => {
                self.place_bid(payer, escrow, *amount)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::SettleAuction { escrow } => {
                self.settle_auction(escrow)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::Withdraw { escrow, ricks_vault, user_token_account, amount } => {
                self.withdraw(payer, escrow, ricks_vault, user_token_account, *amount)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::ClaimProceeds { escrow } => {
                self.claim_proceeds(payer, escrow)?;
                Ok(Some(escrow.clone()))
            }
            Instruction::Finalize { escrow, price } => {
                self.finalize(payer, escrow, *price)?;
                Ok(Some(escrow.clone()))
            }
        }
    }

    fn initialize(&self, payer: &Address) -> Result<()> {
        let mut genesis = self.genesis.write();
        if genesis.is_some() {
            return Err(RicksError::AlreadyInitialized);
        }
        *genesis = Some(Genesis { payer: payer.clone(), timestamp: self.clock.now() });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn initialize_escrow(
        &self,
        creator: &Address,
        nonce: u64,
        nft_mint: &Address,
        ricks_amount: u64,
        ricks_per_day: u64,
        auction_duration_secs: u64,
        resolver: &Address,
    ) -> Result<Address> {
        if ricks_amount == 0 {
            return Err(RicksError::RicksAmountCannotBeZero);
        }
        if auction_duration_secs == 0 || auction_duration_secs > MAX_DELAY_SEC {
            return Err(RicksError::InvalidAuctionDuration(MAX_DELAY_SEC));
        }

        let address = Escrow::derive(creator, nft_mint, nonce);
        if self.get_escrow(&address)?.is_some() {
            return Err(RicksError::Store(format!("escrow already exists: {address}")));
        }
        let authority = Escrow::authority_address(&address);

        // stake the nft into the vault
        let nft_vault = Escrow::nft_vault_address(&address);
        let creator_nft = self.ledger.ensure_associated_account(creator, nft_mint)?;
        self.ledger.create_account(nft_vault.clone(), nft_mint.clone(), authority.clone())?;
        self.ledger.transfer(&creator_nft, &nft_vault, 1, creator)?;

        // create the share mint and vault, issue the initial supply
        let ricks_mint = Escrow::ricks_mint_address(&address);
        let ricks_vault = Escrow::ricks_vault_address(&address);
        self.ledger.create_mint(ricks_mint.clone(), authority.clone(), 0)?;
        self.ledger.create_account(ricks_vault.clone(), ricks_mint.clone(), authority.clone())?;
        self.ledger.mint_to(&ricks_mint, &ricks_vault, ricks_amount, &authority)?;

        // payment vault for bids and proceeds
        let payment_vault = Escrow::payment_vault_address(&address);
        self.ledger
            .create_account(payment_vault.clone(), self.payment_mint.clone(), authority)?;

        // the creator starts holding the whole initial issue
        let mut position = UserPosition::new(creator, &address);
        position.ricks_amount = ricks_amount;
        self.put_position(position)?;

        let escrow = Escrow {
            address: address.clone(),
            creator: creator.clone(),
            resolver: resolver.clone(),
            nft_mint: nft_mint.clone(),
            nft_vault,
            ricks_mint,
            ricks_vault,
            payment_mint: self.payment_mint.clone(),
            payment_vault,
            ricks_amount,
            staked_amount: ricks_amount,
            ricks_per_day,
            auction_duration_secs,
            start_time: self.clock.now(),
            issued_periods: 0,
            finalized: false,
            reward_per_share_e12: 0,
        };
        self.put_escrow(escrow)?;
        METRICS.inc_counter("escrows_created");
        Ok(address)
    }

    fn initialize_user_position(&self, user: &Address, escrow_addr: &Address) -> Result<()> {
        let escrow = self.load_escrow(escrow_addr)?;
        let address = UserPosition::derive(user, escrow_addr);
        if self.get_position(&address)?.is_some() {
            return Err(RicksError::PositionAlreadyExists(address));
        }
        let mut position = UserPosition::new(user, escrow_addr);
        // a fresh position earns nothing retroactively
        position.reset_debt(escrow.reward_per_share_e12);
        self.put_position(position)
    }

    fn open_auction(&self, escrow_addr: &Address) -> Result<()> {
        let escrow = self.load_escrow(escrow_addr)?;
        if escrow.finalized {
            return Err(RicksError::EscrowFinalized);
        }
        if escrow.ricks_per_day == 0 {
            return Err(RicksError::NothingToAuction);
        }
        if self.get_auction(escrow_addr)?.is_some() {
            return Err(RicksError::AuctionAlreadyOpen);
        }
        let now = self.clock.now();
        let period = escrow.period_due(now).ok_or(RicksError::IssuanceNotDue)?;
        let auction = RicksAuction {
            escrow: escrow_addr.clone(),
            period,
            lot: escrow.ricks_per_day,
            opened_at: now,
            ends_at: now + escrow.auction_duration_secs,
            best_bid: None,
            settled: false,
        };
        self.put_auction(auction)?;
        METRICS.inc_counter("auctions_opened");
        Ok(())
    }

    fn place_bid(&self, bidder: &Address, escrow_addr: &Address, amount: u64) -> Result<()> {
        let escrow = self.load_escrow(escrow_addr)?;
        if escrow.finalized {
            return Err(RicksError::EscrowFinalized);
        }
        let mut auction = self.get_auction(escrow_addr)?.ok_or(RicksError::NoOpenAuction)?;
        let now = self.clock.now();
        if !auction.is_open(now) {
            return Err(RicksError::AuctionClosed);
        }
        if amount < auction.min_next_bid() {
            return Err(RicksError::BidTooLow);
        }
        // winners are credited to their position; require it up front
        let position_addr = UserPosition::derive(bidder, escrow_addr);
        if self.get_position(&position_addr)?.is_none() {
            return Err(RicksError::PositionNotFound(position_addr));
        }

        // escrow the new bid before refunding the displaced one
        let bidder_account = self.ledger.ensure_associated_account(bidder, &escrow.payment_mint)?;
        self.ledger.transfer(&bidder_account, &escrow.payment_vault, amount, bidder)?;

        let authority = Escrow::authority_address(escrow_addr);
        if let Some(prev) = auction.best_bid.take() {
            let refund_to = self.ledger.ensure_associated_account(&prev.bidder, &escrow.payment_mint)?;
            self.ledger.transfer(&escrow.payment_vault, &refund_to, prev.amount, &authority)?;
        }

        auction.best_bid = Some(Bid { bidder: bidder.clone(), amount });
        self.put_auction(auction)?;
        METRICS.inc_counter("bids_placed");
        Ok(())
    }

    fn settle_auction(&self, escrow_addr: &Address) -> Result<()> {
        let mut escrow = self.load_escrow(escrow_addr)?;
        let auction = self.get_auction(escrow_addr)?.ok_or(RicksError::NoOpenAuction)?;
        if self.clock.now() < auction.ends_at {
            return Err(RicksError::AuctionStillOpen);
        }

        if let Some(best) = &auction.best_bid {
            // distribute over holders as of before this issue
            escrow.distribute_proceeds(best.amount);

            let position_addr = UserPosition::derive(&best.bidder, escrow_addr);
            let mut position = self
                .get_position(&position_addr)?
                .ok_or(RicksError::PositionNotFound(position_addr))?;
            position.accrue(escrow.reward_per_share_e12);
            position.ricks_amount = position.ricks_amount.saturating_add(auction.lot);
            position.reset_debt(escrow.reward_per_share_e12);
            self.put_position(position)?;

            let authority = Escrow::authority_address(escrow_addr);
            self.ledger
                .mint_to(&escrow.ricks_mint, &escrow.ricks_vault, auction.lot, &authority)?;
            escrow.ricks_amount = escrow.ricks_amount.saturating_add(auction.lot);
            escrow.staked_amount = escrow.staked_amount.saturating_add(auction.lot);
            METRICS.inc_counter("auctions_settled");
        } else {
            // unsold lots lapse; issuance never bursts after idle periods
            METRICS.inc_counter("auctions_lapsed");
        }

        escrow.issued_periods = auction.period;
        self.put_escrow(escrow)?;
        self.remove_auction(escrow_addr)
    }

    fn withdraw(
        &self,
        user: &Address,
        escrow_addr: &Address,
        ricks_vault: &Address,
        user_token_account: &Address,
        amount: u64,
    ) -> Result<()> {
        let escrow = self.load_escrow(escrow_addr)?;
        if user_token_account == ricks_vault {
            return Err(RicksError::UserAccountCannotBeEscrowAccount);
        }
        if ricks_vault != &escrow.ricks_vault {
            return Err(RicksError::IncorrectRicksEscrow);
        }

        // destination must exist, or be the user's own associated account
        let destination = match self.ledger.get_account(user_token_account) {
            Some(acc) => {
                if &acc.owner != user {
                    return Err(RicksError::UserAccountIncorrectOwner);
                }
                user_token_account.clone()
            }
            None => {
                let ata = self.ledger.ensure_associated_account(user, &escrow.ricks_mint)?;
                if &ata != user_token_account {
                    return Err(RicksError::UserAccountIncorrectOwner);
                }
                ata
            }
        };

        let position_addr = UserPosition::derive(user, escrow_addr);
        let mut position = self
            .get_position(&position_addr)?
            .ok_or(RicksError::PositionNotFound(position_addr))?;
        if position.ricks_amount < amount {
            return Err(RicksError::InsufficientPosition);
        }
        position.accrue(escrow.reward_per_share_e12);
        position.ricks_amount -= amount;
        position.reset_debt(escrow.reward_per_share_e12);

        let authority = Escrow::authority_address(escrow_addr);
        self.ledger.transfer(&escrow.ricks_vault, &destination, amount, &authority)?;
        self.put_position(position)?;

        let mut escrow = escrow;
        escrow.staked_amount = escrow.staked_amount.saturating_sub(amount);
        self.put_escrow(escrow)
    }

    fn claim_proceeds(&self, user: &Address, escrow_addr: &Address) -> Result<()> {
        let escrow = self.load_escrow(escrow_addr)?;
        let position_addr = UserPosition::derive(user, escrow_addr);
        let mut position = self
            .get_position(&position_addr)?
            .ok_or(RicksError::PositionNotFound(position_addr))?;
        position.accrue(escrow.reward_per_share_e12);
        let payout = position.pending_payout;
        position.pending_payout = 0;
        self.put_position(position)?;

        if payout > 0 {
            let destination = self.ledger.ensure_associated_account(user, &escrow.payment_mint)?;
            let authority = Escrow::authority_address(escrow_addr);
            self.ledger.transfer(&escrow.payment_vault, &destination, payout, &authority)?;
        }
        Ok(())
    }

    fn finalize(&self, payer: &Address, escrow_addr: &Address, price: u64) -> Result<()> {
        let mut escrow = self.load_escrow(escrow_addr)?;
        if escrow.finalized {
            return Err(RicksError::EscrowFinalized);
        }
        if payer != &escrow.resolver {
            return Err(RicksError::NotResolver);
        }
        if price == 0 {
            return Err(RicksError::PriceCannotBeZero);
        }
        if self.get_auction(escrow_addr)?.is_some() {
            return Err(RicksError::AuctionStillOpen);
        }

        let payer_account = self.ledger.ensure_associated_account(payer, &escrow.payment_mint)?;
        self.ledger.transfer(&payer_account, &escrow.payment_vault, price, payer)?;
        escrow.distribute_proceeds(price);

        let authority = Escrow::authority_address(escrow_addr);
        let nft_destination = self.ledger.ensure_associated_account(payer, &escrow.nft_mint)?;
        self.ledger.transfer(&escrow.nft_vault, &nft_destination, 1, &authority)?;

        escrow.finalized = true;
        self.put_escrow(escrow)?;
        METRICS.inc_counter("escrows_finalized");
        Ok(())
    }

    // store access with error mapping to the domain type

    fn load_escrow(&self, address: &Address) -> Result<Escrow> {
        self.get_escrow(address)?
            .ok_or_else(|| RicksError::EscrowNotFound(address.clone()))
    }

    fn get_escrow(&self, address: &Address) -> Result<Option<Escrow>> {
        self.store.get_escrow(address).map_err(store_err)
    }

    fn put_escrow(&self, escrow: Escrow) -> Result<()> {
        self.store.put_escrow(escrow).map_err(store_err)
    }

    fn get_position(&self, address: &Address) -> Result<Option<UserPosition>> {
        self.store.get_position(address).map_err(store_err)
    }

    fn put_position(&self, position: UserPosition) -> Result<()> {
        self.store.put_position(position).map_err(store_err)
    }

    fn get_auction(&self, escrow: &Address) -> Result<Option<RicksAuction>> {
        self.store.get_auction(escrow).map_err(store_err)
    }

    fn put_auction(&self, auction: RicksAuction) -> Result<()> {
        self.store.put_auction(auction).map_err(store_err)
    }

    fn remove_auction(&self, escrow: &Address) -> Result<()> {
        self.store.remove_auction(escrow).map_err(store_err)
    }
}

fn store_err(e: anyhow::Error) -> RicksError {
    RicksError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::engine::clock::ManualClock;
    use crate::state::InMemEscrowStore;
    use crate::token::derive_address;

    struct Harness {
        exec: Arc<Executor>,
        clock: Arc<ManualClock>,
        ledger: TokenLedger,
        payment_mint: Address,
        nft_mint: Address,
        faucet: Address,
    }

    fn harness() -> Harness {
        let ledger = TokenLedger::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let faucet = "faucet".to_string();
        let payment_mint = derive_address(&[b"mint", b"payment"]);
        let nft_mint = derive_address(&[b"mint", b"the-nft"]);
        ledger.create_mint(payment_mint.clone(), faucet.clone(), 0).unwrap();
        ledger.create_mint(nft_mint.clone(), faucet.clone(), 0).unwrap();
        let store: Arc<dyn EscrowStore> = Arc::new(InMemEscrowStore::new());
        let exec = Arc::new(Executor::new(
            ledger.clone(),
            store,
            EscrowLocks::new(16),
            clock.clone(),
            payment_mint.clone(),
        ));
        Harness { exec, clock, ledger, payment_mint, nft_mint, faucet }
    }

    impl Harness {
        fn fund_payment(&self, who: &Address, amount: u64) -> Address {
            let ata = self.ledger.ensure_associated_account(who, &self.payment_mint).unwrap();
            self.ledger.mint_to(&self.payment_mint, &ata, amount, &self.faucet).unwrap();
            ata
        }

        fn give_nft(&self, who: &Address) {
            let ata = self.ledger.ensure_associated_account(who, &self.nft_mint).unwrap();
            self.ledger.mint_to(&self.nft_mint, &ata, 1, &self.faucet).unwrap();
        }

        async fn run(&self, kp: &Keypair, nonce: u64, ix: Instruction) -> Receipt {
            self.exec.execute(SignedInstruction::sign(kp, nonce, ix)).await
        }

        async fn create_escrow(&self, creator: &Keypair, nonce: u64, resolver: &Address) -> Address {
            self.give_nft(&creator.address());
            let receipt = self
                .run(
                    creator,
                    nonce,
                    Instruction::InitializeEscrow {
                        nft_mint: self.nft_mint.clone(),
                        ricks_amount: 100,
                        ricks_per_day: 10,
                        auction_duration_secs: 3_600,
                        resolver: resolver.clone(),
                    },
                )
                .await;
            assert!(receipt.success, "escrow creation failed: {:?}", receipt.err);
            receipt.escrow.unwrap()
        }
    }

    fn assert_failed_with(receipt: &Receipt, needle: &str) {
        assert!(!receipt.success);
        let err = receipt.err.as_deref().unwrap_or("");
        assert!(err.contains(needle), "expected '{needle}' in '{err}'");
    }

    #[tokio::test]
    async fn test_initialize_succeeds_exactly_once() {
        let h = harness();
        let kp = Keypair::generate();

        let first = h.run(&kp, 1, Instruction::Initialize).await;
        assert!(first.success);
        assert!(!first.signature.is_empty());
        assert_eq!(h.exec.genesis().unwrap().payer, kp.address());

        let second = h.run(&kp, 2, Instruction::Initialize).await;
        assert_failed_with(&second, "already initialized");
    }

    #[tokio::test]
    async fn test_initialize_escrow_stakes_nft_and_issues_ricks() {
        let h = harness();
        let creator = Keypair::generate();
        let address = h.create_escrow(&creator, 1, &"resolver".to_string()).await;

        let escrow = h.exec.store.get_escrow(&address).unwrap().unwrap();
        assert_eq!(escrow.ricks_amount, 100);
        assert_eq!(escrow.staked_amount, 100);
        assert!(!escrow.finalized);

        // nft moved into the vault
        assert_eq!(h.ledger.balance(&escrow.nft_vault), 1);
        // whole initial issue sits in the ricks vault
        assert_eq!(h.ledger.balance(&escrow.ricks_vault), 100);
        assert_eq!(h.ledger.get_mint(&escrow.ricks_mint).unwrap().supply, 100);

        // creator position holds the initial issue
        let pos_addr = UserPosition::derive(&creator.address(), &address);
        let pos = h.exec.store.get_position(&pos_addr).unwrap().unwrap();
        assert_eq!(pos.ricks_amount, 100);
    }

    #[tokio::test]
    async fn test_initialize_escrow_rejects_zero_ricks() {
        let h = harness();
        let creator = Keypair::generate();
        h.give_nft(&creator.address());
        let receipt = h
            .run(
                &creator,
                1,
                Instruction::InitializeEscrow {
                    nft_mint: h.nft_mint.clone(),
                    ricks_amount: 0,
                    ricks_per_day: 10,
                    auction_duration_secs: 3_600,
                    resolver: "r".to_string(),
                },
            )
            .await;
        assert_failed_with(&receipt, "ricks amount cannot be zero");
    }

    #[tokio::test]
    async fn test_auction_cycle_distributes_proceeds() {
        let h = harness();
        let creator = Keypair::generate();
        let bidder = Keypair::generate();
        let escrow = h.create_escrow(&creator, 1, &"resolver".to_string()).await;

        // no issuance is due before a full period elapses
        let early = h.run(&creator, 2, Instruction::OpenAuction { escrow: escrow.clone() }).await;
        assert_failed_with(&early, "no issuance is due");

        h.clock.advance(MAX_DELAY_SEC);
        let opened = h.run(&creator, 3, Instruction::OpenAuction { escrow: escrow.clone() }).await;
        assert!(opened.success);

        // bidding requires an initialized position
        let no_pos = h.run(&bidder, 1, Instruction::PlaceBid { escrow: escrow.clone(), amount: 50 }).await;
        assert_failed_with(&no_pos, "position not found");

        let init_pos =
            h.run(&bidder, 2, Instruction::InitializeUserPosition { escrow: escrow.clone() }).await;
        assert!(init_pos.success);

        let bidder_ata = h.fund_payment(&bidder.address(), 1_000);
        let bid = h.run(&bidder, 3, Instruction::PlaceBid { escrow: escrow.clone(), amount: 50 }).await;
        assert!(bid.success);
        assert_eq!(h.ledger.balance(&bidder_ata), 950);

        // cannot settle while the auction is open
        let too_soon = h.run(&creator, 4, Instruction::SettleAuction { escrow: escrow.clone() }).await;
        assert_failed_with(&too_soon, "still open");

        h.clock.advance(3_600);
        let settled = h.run(&creator, 5, Instruction::SettleAuction { escrow: escrow.clone() }).await;
        assert!(settled.success);

        let state = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        assert_eq!(state.ricks_amount, 110);
        assert_eq!(state.staked_amount, 110);
        assert_eq!(state.issued_periods, 1);
        assert_eq!(h.ledger.balance(&state.ricks_vault), 110);

        let winner_pos = h
            .exec
            .store
            .get_position(&UserPosition::derive(&bidder.address(), &escrow))
            .unwrap()
            .unwrap();
        assert_eq!(winner_pos.ricks_amount, 10);

        // the 50 in proceeds belong to the creator, the only prior holder
        let claim = h.run(&creator, 6, Instruction::ClaimProceeds { escrow: escrow.clone() }).await;
        assert!(claim.success);
        let creator_payment = h
            .ledger
            .ensure_associated_account(&creator.address(), &h.payment_mint)
            .unwrap();
        assert_eq!(h.ledger.balance(&creator_payment), 50);
        assert_eq!(h.ledger.balance(&state.payment_vault), 0);

        // the winner bought in at this accumulator level and earned nothing
        let winner_claim = h.run(&bidder, 4, Instruction::ClaimProceeds { escrow: escrow.clone() }).await;
        assert!(winner_claim.success);
        assert_eq!(h.ledger.balance(&bidder_ata), 950);
    }

    #[tokio::test]
    async fn test_outbid_refunds_previous_best() {
        let h = harness();
        let creator = Keypair::generate();
        let first = Keypair::generate();
        let second = Keypair::generate();
        let escrow = h.create_escrow(&creator, 1, &"resolver".to_string()).await;

        h.clock.advance(MAX_DELAY_SEC);
        assert!(h.run(&creator, 2, Instruction::OpenAuction { escrow: escrow.clone() }).await.success);
        for (n, kp) in [(1u64, &first), (1u64, &second)] {
            assert!(h.run(kp, n, Instruction::InitializeUserPosition { escrow: escrow.clone() }).await.success);
        }

        let first_ata = h.fund_payment(&first.address(), 100);
        let second_ata = h.fund_payment(&second.address(), 100);

        assert!(h.run(&first, 2, Instruction::PlaceBid { escrow: escrow.clone(), amount: 50 }).await.success);
        let low = h.run(&second, 2, Instruction::PlaceBid { escrow: escrow.clone(), amount: 50 }).await;
        assert_failed_with(&low, "exceed");

        assert!(h.run(&second, 3, Instruction::PlaceBid { escrow: escrow.clone(), amount: 60 }).await.success);
        // displaced bid is back in the first bidder's account
        assert_eq!(h.ledger.balance(&first_ata), 100);
        assert_eq!(h.ledger.balance(&second_ata), 40);

        let state = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        assert_eq!(h.ledger.balance(&state.payment_vault), 60);
    }

    #[tokio::test]
    async fn test_lapsed_auction_advances_period_without_minting() {
        let h = harness();
        let creator = Keypair::generate();
        let escrow = h.create_escrow(&creator, 1, &"resolver".to_string()).await;

        h.clock.advance(MAX_DELAY_SEC);
        assert!(h.run(&creator, 2, Instruction::OpenAuction { escrow: escrow.clone() }).await.success);
        h.clock.advance(3_600);
        assert!(h.run(&creator, 3, Instruction::SettleAuction { escrow: escrow.clone() }).await.success);

        let state = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        assert_eq!(state.issued_periods, 1);
        assert_eq!(state.ricks_amount, 100);
        assert_eq!(h.ledger.get_mint(&state.ricks_mint).unwrap().supply, 100);
    }

    #[tokio::test]
    async fn test_withdraw_checks_and_moves_ricks() {
        let h = harness();
        let creator = Keypair::generate();
        let stranger = Keypair::generate();
        let escrow = h.create_escrow(&creator, 1, &"resolver".to_string()).await;
        let state = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        let creator_ricks = crate::token::associated_token_address(&creator.address(), &state.ricks_mint);

        // destination must not be the vault itself
        let to_vault = h
            .run(
                &creator,
                2,
                Instruction::Withdraw {
                    escrow: escrow.clone(),
                    ricks_vault: state.ricks_vault.clone(),
                    user_token_account: state.ricks_vault.clone(),
                    amount: 1,
                },
            )
            .await;
        assert_failed_with(&to_vault, "cannot be the escrow account");

        // the named vault must be the escrow's
        let wrong_vault = h
            .run(
                &creator,
                3,
                Instruction::Withdraw {
                    escrow: escrow.clone(),
                    ricks_vault: "bogus".to_string(),
                    user_token_account: creator_ricks.clone(),
                    amount: 1,
                },
            )
            .await;
        assert_failed_with(&wrong_vault, "incorrect ricks escrow");

        // destination owned by someone else is rejected
        let stranger_account = h
            .ledger
            .ensure_associated_account(&stranger.address(), &state.ricks_mint)
            .unwrap();
        let wrong_owner = h
            .run(
                &creator,
                4,
                Instruction::Withdraw {
                    escrow: escrow.clone(),
                    ricks_vault: state.ricks_vault.clone(),
                    user_token_account: stranger_account,
                    amount: 1,
                },
            )
            .await;
        assert_failed_with(&wrong_owner, "incorrect owner");

        let ok = h
            .run(
                &creator,
                5,
                Instruction::Withdraw {
                    escrow: escrow.clone(),
                    ricks_vault: state.ricks_vault.clone(),
                    user_token_account: creator_ricks.clone(),
                    amount: 40,
                },
            )
            .await;
        assert!(ok.success, "withdraw failed: {:?}", ok.err);
        assert_eq!(h.ledger.balance(&creator_ricks), 40);
        assert_eq!(h.ledger.balance(&state.ricks_vault), 60);

        let after = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        assert_eq!(after.staked_amount, 60);
        let pos = h
            .exec
            .store
            .get_position(&UserPosition::derive(&creator.address(), &escrow))
            .unwrap()
            .unwrap();
        assert_eq!(pos.ricks_amount, 60);

        let too_much = h
            .run(
                &creator,
                6,
                Instruction::Withdraw {
                    escrow: escrow.clone(),
                    ricks_vault: state.ricks_vault,
                    user_token_account: creator_ricks,
                    amount: 61,
                },
            )
            .await;
        assert_failed_with(&too_much, "insufficient ricks");
    }

    #[tokio::test]
    async fn test_finalize_is_resolver_only_and_stops_auctions() {
        let h = harness();
        let creator = Keypair::generate();
        let resolver = Keypair::generate();
        let escrow = h.create_escrow(&creator, 1, &resolver.address()).await;

        let not_resolver = h.run(&creator, 2, Instruction::Finalize { escrow: escrow.clone(), price: 500 }).await;
        assert_failed_with(&not_resolver, "resolver");

        let resolver_ata = h.fund_payment(&resolver.address(), 1_000);
        let finalized = h.run(&resolver, 1, Instruction::Finalize { escrow: escrow.clone(), price: 500 }).await;
        assert!(finalized.success, "finalize failed: {:?}", finalized.err);
        assert_eq!(h.ledger.balance(&resolver_ata), 500);

        let state = h.exec.store.get_escrow(&escrow).unwrap().unwrap();
        assert!(state.finalized);
        // nft handed to the resolver
        let resolver_nft = crate::token::associated_token_address(&resolver.address(), &h.nft_mint);
        assert_eq!(h.ledger.balance(&resolver_nft), 1);
        assert_eq!(h.ledger.balance(&state.nft_vault), 0);

        // buyout proceeds claimable pro rata by the creator
        let claim = h.run(&creator, 3, Instruction::ClaimProceeds { escrow: escrow.clone() }).await;
        assert!(claim.success);
        let creator_payment = h
            .ledger
            .ensure_associated_account(&creator.address(), &h.payment_mint)
            .unwrap();
        assert_eq!(h.ledger.balance(&creator_payment), 500);

        h.clock.advance(MAX_DELAY_SEC);
        let reopened = h.run(&creator, 4, Instruction::OpenAuction { escrow: escrow.clone() }).await;
        assert_failed_with(&reopened, "finalized");
    }

    #[tokio::test]
    async fn test_receipt_cache_is_capped() {
        let h = harness();
        {
            let mut receipts = h.exec.receipts.lock();
            for n in 0..=RECEIPT_CAPACITY {
                receipts.put(
                    format!("sig-{n}"),
                    Receipt {
                        signature: format!("sig-{n}"),
                        payer: "payer".to_string(),
                        success: true,
                        err: None,
                        escrow: None,
                    },
                );
            }
        }
        assert_eq!(h.exec.receipts.lock().len(), RECEIPT_CAPACITY);
        // oldest entry was evicted, newest survives
        assert!(h.exec.receipt("sig-0").is_none());
        assert!(h.exec.receipt(&format!("sig-{RECEIPT_CAPACITY}")).is_some());
    }

    #[tokio::test]
    async fn test_batch_executes_independent_escrows() {
        let h = harness();
        let a = Keypair::generate();
        let b = Keypair::generate();
        let escrow_a = h.create_escrow(&a, 1, &"r".to_string()).await;
        let escrow_b = h.create_escrow(&b, 1, &"r".to_string()).await;

        let batch = vec![
            SignedInstruction::sign(&a, 2, Instruction::InitializeUserPosition { escrow: escrow_b.clone() }),
            SignedInstruction::sign(&b, 2, Instruction::InitializeUserPosition { escrow: escrow_a.clone() }),
        ];
        let receipts = h.exec.execute_batch(batch).await;
        assert_eq!(receipts.len(), 2);
        assert!(receipts.iter().all(|r| r.success));
        assert!(h.exec.receipt(&receipts[0].signature).is_some());
    }
}
