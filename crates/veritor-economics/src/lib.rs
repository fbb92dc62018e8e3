//! Balance custody for the veritor oracle.
//!
//! Accounts, escrow locks, and the audit trail of every fund movement.
//! This crate knows nothing about inference requests; the oracle layer
//! drives it through [`BalanceManager`] and [`EscrowManager`].

pub mod balance;
pub mod escrow;
pub mod storage;
pub mod types;

pub use balance::{AccountInfo, BalanceManager};
pub use escrow::{EscrowKind, EscrowManager, LockId, LockMetadata};
pub use storage::{EconomicsStorage, MemoryStorage, TransactionRecord};
pub use types::{AccountAddress, TransferReason, VeriAmount};

#[cfg(feature = "rocksdb")]
pub use storage::RocksDbStorage;

use anyhow::Result;
use std::sync::Arc;

/// Bundles the custody managers over one storage backend.
pub struct EconomicsEngine {
    pub balances: Arc<BalanceManager>,
    pub escrow: Arc<EscrowManager>,
}

impl EconomicsEngine {
    pub fn new(storage: Arc<dyn EconomicsStorage>) -> Self {
        let balances = Arc::new(BalanceManager::new(storage));
        let escrow = Arc::new(EscrowManager::new(balances.clone()));
        Self { balances, escrow }
    }

    /// Total supply currently on the books: every balance, locked or not.
    pub async fn circulating_supply(&self) -> Result<VeriAmount> {
        let accounts = self.balances.get_all_accounts().await?;
        let mut total = VeriAmount::ZERO;
        for account in accounts {
            total = total.saturating_add(account.balance);
        }
        Ok(total)
    }
}
