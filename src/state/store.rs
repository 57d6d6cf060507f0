//! Persistent escrow-state abstractions.
//! - EscrowStore trait (pluggable persistence engine)
//! - InMemEscrowStore (concurrent maps for tests/dev)
//! - RocksEscrowStore (rocksdb backend, behind the `rocksdb` feature)

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::state::auction::RicksAuction;
use crate::state::escrow::Escrow;
use crate::state::position::UserPosition;
use crate::token::{Address, LedgerSnapshot};

/// Trait for an escrow persistence engine. Positions are keyed by their
/// derived position address; at most one open auction exists per escrow.
/// The token ledger checkpoints through the same backend so escrows never
/// outlive the vault balances they reference.
pub trait EscrowStore: Send + Sync + 'static {
    fn get_escrow(&self, address: &Address) -> Result<Option<Escrow>>;
    fn put_escrow(&self, escrow: Escrow) -> Result<()>;
    fn list_escrows(&self) -> Result<Vec<Escrow>>;

    fn get_position(&self, address: &Address) -> Result<Option<UserPosition>>;
    fn put_position(&self, position: UserPosition) -> Result<()>;

    fn get_auction(&self, escrow: &Address) -> Result<Option<RicksAuction>>;
    fn put_auction(&self, auction: RicksAuction) -> Result<()>;
    fn remove_auction(&self, escrow: &Address) -> Result<()>;

    fn get_ledger(&self) -> Result<Option<LedgerSnapshot>>;
    fn put_ledger(&self, snapshot: &LedgerSnapshot) -> Result<()>;
}

/// In-memory escrow store (good for tests/dev)
#[derive(Default)]
pub struct InMemEscrowStore {
    escrows: DashMap<Address, Escrow>,
    positions: DashMap<Address, UserPosition>,
    auctions: DashMap<Address, RicksAuction>,
    ledger: Mutex<Option<LedgerSnapshot>>,
}

impl InMemEscrowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EscrowStore for InMemEscrowStore {
    fn get_escrow(&self, address: &Address) -> Result<Option<Escrow>> {
        Ok(self.escrows.get(address).map(|e| e.clone()))
    }

    fn put_escrow(&self, escrow: Escrow) -> Result<()> {
        self.escrows.insert(escrow.address.clone(), escrow);
        Ok(())
    }

    fn list_escrows(&self) -> Result<Vec<Escrow>> {
        Ok(self.escrows.iter().map(|e| e.clone()).collect())
    }

    fn get_position(&self, address: &Address) -> Result<Option<UserPosition>> {
        Ok(self.positions.get(address).map(|p| p.clone()))
    }

    fn put_position(&self, position: UserPosition) -> Result<()> {
        self.positions.insert(position.address.clone(), position);
        Ok(())
    }

    fn get_auction(&self, escrow: &Address) -> Result<Option<RicksAuction>> {
        Ok(self.auctions.get(escrow).map(|a| a.clone()))
    }

    fn put_auction(&self, auction: RicksAuction) -> Result<()> {
        self.auctions.insert(auction.escrow.clone(), auction);
        Ok(())
    }

    fn remove_auction(&self, escrow: &Address) -> Result<()> {
        self.auctions.remove(escrow);
        Ok(())
    }

    fn get_ledger(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(self.ledger.lock().clone())
    }

    fn put_ledger(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        *self.ledger.lock() = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use rocksdb::{Options, DB};
    use std::path::Path;
    use std::sync::Arc;

    const ESCROW_PREFIX: &str = "escrow/";
    const POSITION_PREFIX: &str = "pos/";
    const AUCTION_PREFIX: &str = "auction/";
    const LEDGER_KEY: &str = "ledger";

    pub struct RocksEscrowStore {
        db: Arc<DB>,
    }

    impl RocksEscrowStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, path.as_ref().join("escrows.db"))?;
            Ok(Self { db: Arc::new(db) })
        }

        fn get_at<T: serde::de::DeserializeOwned>(&self, key: String) -> Result<Option<T>> {
            match self.db.get(key.as_bytes())? {
                Some(val) => Ok(Some(bincode::deserialize(&val)?)),
                None => Ok(None),
            }
        }

        fn put_at<T: serde::Serialize>(&self, key: String, value: &T) -> Result<()> {
            self.db.put(key.as_bytes(), bincode::serialize(value)?)?;
            Ok(())
        }
    }

    impl EscrowStore for RocksEscrowStore {
        fn get_escrow(&self, address: &Address) -> Result<Option<Escrow>> {
            self.get_at(format!("{ESCROW_PREFIX}{address}"))
        }

        fn put_escrow(&self, escrow: Escrow) -> Result<()> {
            self.put_at(format!("{ESCROW_PREFIX}{}", escrow.address), &escrow)
        }

        fn list_escrows(&self) -> Result<Vec<Escrow>> {
            let mut out = Vec::new();
            for item in self.db.iterator(rocksdb::IteratorMode::Start) {
                let (k, v) = item?;
                if String::from_utf8_lossy(&k).starts_with(ESCROW_PREFIX) {
                    out.push(bincode::deserialize(&v)?);
                }
            }
            Ok(out)
        }

        fn get_position(&self, address: &Address) -> Result<Option<UserPosition>> {
            self.get_at(format!("{POSITION_PREFIX}{address}"))
        }

        fn put_position(&self, position: UserPosition) -> Result<()> {
            self.put_at(format!("{POSITION_PREFIX}{}", position.address), &position)
        }

        fn get_auction(&self, escrow: &Address) -> Result<Option<RicksAuction>> {
            self.get_at(format!("{AUCTION_PREFIX}{escrow}"))
        }

        fn put_auction(&self, auction: RicksAuction) -> Result<()> {
            self.put_at(format!("{AUCTION_PREFIX}{}", auction.escrow), &auction)
        }

        fn remove_auction(&self, escrow: &Address) -> Result<()> {
            self.db.delete(format!("{AUCTION_PREFIX}{escrow}").as_bytes())?;
            Ok(())
        }

        fn get_ledger(&self) -> Result<Option<LedgerSnapshot>> {
            self.get_at(LEDGER_KEY.to_string())
        }

        fn put_ledger(&self, snapshot: &LedgerSnapshot) -> Result<()> {
            self.put_at(LEDGER_KEY.to_string(), snapshot)
        }
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksEscrowStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenLedger;

    #[test]
    fn test_ledger_snapshot_round_trip() {
        let store = InMemEscrowStore::new();
        assert!(store.get_ledger().unwrap().is_none());

        let ledger = TokenLedger::new();
        ledger.create_mint("m".to_string(), "auth".to_string(), 0).unwrap();
        store.put_ledger(&ledger.snapshot()).unwrap();

        let back = store.get_ledger().unwrap().unwrap();
        assert!(back.mints.contains_key("m"));
    }

    #[test]
    fn test_inmem_round_trip() {
        let store = InMemEscrowStore::new();
        let creator = "creator".to_string();
        let nft_mint = "nft".to_string();
        let address = Escrow::derive(&creator, &nft_mint, 0);
        let escrow = Escrow {
            nft_vault: Escrow::nft_vault_address(&address),
            ricks_mint: Escrow::ricks_mint_address(&address),
            ricks_vault: Escrow::ricks_vault_address(&address),
            payment_vault: Escrow::payment_vault_address(&address),
            address: address.clone(),
            creator,
            resolver: "r".to_string(),
            nft_mint,
            payment_mint: "pay".to_string(),
            ricks_amount: 1,
            staked_amount: 1,
            ricks_per_day: 1,
            auction_duration_secs: 60,
            start_time: 0,
            issued_periods: 0,
            finalized: false,
            reward_per_share_e12: 0,
        };
        store.put_escrow(escrow.clone()).unwrap();
        assert_eq!(store.get_escrow(&address).unwrap(), Some(escrow));
        assert_eq!(store.list_escrows().unwrap().len(), 1);
        assert!(store.get_auction(&address).unwrap().is_none());
    }
}
