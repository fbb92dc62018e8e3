use crate::types::{AccountAddress, TransferReason, VeriAmount};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

type BalanceMap = HashMap<AccountAddress, VeriAmount>;
type SnapshotBackup = Option<(BalanceMap, BalanceMap)>;

/// One confirmed balance movement, hashed for audit lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub from: AccountAddress,
    pub to: AccountAddress,
    pub amount: VeriAmount,
    pub reason: TransferReason,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait EconomicsStorage: Send + Sync {
    async fn get_balance(&self, address: AccountAddress) -> Result<VeriAmount>;
    async fn set_balance(&self, address: AccountAddress, balance: VeriAmount) -> Result<()>;
    async fn get_locked_balance(&self, address: AccountAddress) -> Result<VeriAmount>;
    async fn set_locked_balance(&self, address: AccountAddress, locked: VeriAmount) -> Result<()>;
    async fn get_all_accounts(&self) -> Result<Vec<AccountAddress>>;

    // Multi-write atomicity for transfers
    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    // Audit trail
    async fn record_transaction(&self, tx: TransactionRecord) -> Result<()>;
    async fn get_transaction_history(
        &self,
        address: AccountAddress,
    ) -> Result<Vec<TransactionRecord>>;
}

pub struct MemoryStorage {
    balances: Arc<RwLock<BalanceMap>>,
    locked_balances: Arc<RwLock<BalanceMap>>,
    snapshot: Arc<RwLock<SnapshotBackup>>,
    transaction_history: Arc<RwLock<Vec<TransactionRecord>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            locked_balances: Arc::new(RwLock::new(HashMap::new())),
            snapshot: Arc::new(RwLock::new(None)),
            transaction_history: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl EconomicsStorage for MemoryStorage {
    async fn get_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        let balances = self.balances.read().await;
        Ok(balances.get(&address).copied().unwrap_or(VeriAmount::ZERO))
    }

    async fn set_balance(&self, address: AccountAddress, balance: VeriAmount) -> Result<()> {
        let mut balances = self.balances.write().await;
        if balance == VeriAmount::ZERO {
            balances.remove(&address);
        } else {
            balances.insert(address, balance);
        }
        Ok(())
    }

    async fn get_locked_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        let locked = self.locked_balances.read().await;
        Ok(locked.get(&address).copied().unwrap_or(VeriAmount::ZERO))
    }

    async fn set_locked_balance(&self, address: AccountAddress, locked: VeriAmount) -> Result<()> {
        let mut locked_balances = self.locked_balances.write().await;
        if locked == VeriAmount::ZERO {
            locked_balances.remove(&address);
        } else {
            locked_balances.insert(address, locked);
        }
        Ok(())
    }

    async fn get_all_accounts(&self) -> Result<Vec<AccountAddress>> {
        let balances = self.balances.read().await;
        let locked = self.locked_balances.read().await;
        let mut accounts: Vec<AccountAddress> = balances.keys().copied().collect();
        for address in locked.keys() {
            if !balances.contains_key(address) {
                accounts.push(*address);
            }
        }
        Ok(accounts)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let balances = self.balances.read().await;
        let locked = self.locked_balances.read().await;
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some((balances.clone(), locked.clone()));
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        if let Some((balances_backup, locked_backup)) = snapshot.take() {
            let mut balances = self.balances.write().await;
            let mut locked = self.locked_balances.write().await;
            *balances = balances_backup;
            *locked = locked_backup;
            info!(storage_type = "memory", "↩️ Transaction rolled back");
        }
        Ok(())
    }

    async fn record_transaction(&self, tx: TransactionRecord) -> Result<()> {
        let mut history = self.transaction_history.write().await;
        history.push(tx);
        Ok(())
    }

    async fn get_transaction_history(
        &self,
        address: AccountAddress,
    ) -> Result<Vec<TransactionRecord>> {
        let history = self.transaction_history.read().await;
        Ok(history
            .iter()
            .filter(|tx| tx.from == address || tx.to == address)
            .cloned()
            .collect())
    }
}

#[cfg(feature = "rocksdb")]
pub struct RocksDbStorage {
    db: Arc<rocksdb::DB>,
    cf_balances: String,
    cf_locked: String,
    cf_transactions: String,
}

#[cfg(feature = "rocksdb")]
impl RocksDbStorage {
    pub fn new(path: &str) -> Result<Self> {
        use rocksdb::{Options, DB};

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_names = vec!["balances", "locked_balances", "transactions"];
        let db = DB::open_cf(&opts, path, &cf_names)?;

        Ok(Self {
            db: Arc::new(db),
            cf_balances: "balances".to_string(),
            cf_locked: "locked_balances".to_string(),
            cf_transactions: "transactions".to_string(),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("Column family not found: {}", name))
    }
}

#[cfg(feature = "rocksdb")]
#[async_trait]
impl EconomicsStorage for RocksDbStorage {
    async fn get_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        let cf = self.cf(&self.cf_balances)?;
        match self.db.get_cf(cf, address.as_bytes())? {
            Some(bytes) => {
                let value = u64::from_le_bytes(bytes.as_slice().try_into()?);
                Ok(VeriAmount::from_base_units(value))
            }
            None => Ok(VeriAmount::ZERO),
        }
    }

    async fn set_balance(&self, address: AccountAddress, balance: VeriAmount) -> Result<()> {
        let cf = self.cf(&self.cf_balances)?;
        if balance == VeriAmount::ZERO {
            self.db.delete_cf(cf, address.as_bytes())?;
        } else {
            self.db
                .put_cf(cf, address.as_bytes(), balance.to_base_units().to_le_bytes())?;
        }
        Ok(())
    }

    async fn get_locked_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        let cf = self.cf(&self.cf_locked)?;
        match self.db.get_cf(cf, address.as_bytes())? {
            Some(bytes) => {
                let value = u64::from_le_bytes(bytes.as_slice().try_into()?);
                Ok(VeriAmount::from_base_units(value))
            }
            None => Ok(VeriAmount::ZERO),
        }
    }

    async fn set_locked_balance(&self, address: AccountAddress, locked: VeriAmount) -> Result<()> {
        let cf = self.cf(&self.cf_locked)?;
        if locked == VeriAmount::ZERO {
            self.db.delete_cf(cf, address.as_bytes())?;
        } else {
            self.db
                .put_cf(cf, address.as_bytes(), locked.to_base_units().to_le_bytes())?;
        }
        Ok(())
    }

    async fn get_all_accounts(&self) -> Result<Vec<AccountAddress>> {
        let cf = self.cf(&self.cf_balances)?;
        let mut accounts = Vec::new();
        for entry in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, _) = entry?;
            if key.len() == 32 {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&key);
                accounts.push(AccountAddress::from_bytes(bytes));
            }
        }
        Ok(accounts)
    }

    // Individual writes are durable on their own; RocksDB callers get
    // atomicity per put, so the snapshot protocol is a no-op here.
    async fn begin_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn record_transaction(&self, tx: TransactionRecord) -> Result<()> {
        use rocksdb::WriteBatch;

        let cf = self.cf(&self.cf_transactions)?;
        let mut batch = WriteBatch::default();
        let tx_data = serde_json::to_vec(&tx)?;

        // Zero-padded timestamps keep prefix iteration in time order
        let timestamp_padded = format!("{:020}", tx.timestamp.timestamp_millis());
        let from_key = format!(
            "tx_by_addr:{}:{}:{}",
            hex::encode(tx.from.as_bytes()),
            timestamp_padded,
            tx.tx_hash
        );
        batch.put_cf(cf, from_key.as_bytes(), &tx_data);

        if tx.from != tx.to {
            let to_key = format!(
                "tx_by_addr:{}:{}:{}",
                hex::encode(tx.to.as_bytes()),
                timestamp_padded,
                tx.tx_hash
            );
            batch.put_cf(cf, to_key.as_bytes(), &tx_data);
        }

        self.db.write(batch)?;
        Ok(())
    }

    async fn get_transaction_history(
        &self,
        address: AccountAddress,
    ) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(&self.cf_transactions)?;
        let prefix = format!("tx_by_addr:{}:", hex::encode(address.as_bytes()));
        let mut transactions = Vec::new();

        let iter = self.db.iterator_cf(
            cf,
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let tx: TransactionRecord = serde_json::from_slice(&value)?;
            transactions.push(tx);
        }

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_balances() {
        let storage = MemoryStorage::new();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        assert_eq!(storage.get_balance(addr).await.unwrap(), VeriAmount::ZERO);

        storage
            .set_balance(addr, VeriAmount::from_veri(2.5))
            .await
            .unwrap();
        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            VeriAmount::from_veri(2.5)
        );

        storage
            .set_locked_balance(addr, VeriAmount::from_veri(1.0))
            .await
            .unwrap();
        assert_eq!(
            storage.get_locked_balance(addr).await.unwrap(),
            VeriAmount::from_veri(1.0)
        );

        let accounts = storage.get_all_accounts().await.unwrap();
        assert_eq!(accounts, vec![addr]);
    }

    #[tokio::test]
    async fn test_memory_storage_rollback() {
        let storage = MemoryStorage::new();
        let addr = AccountAddress::from_bytes([2u8; 32]);

        storage
            .set_balance(addr, VeriAmount::from_veri(5.0))
            .await
            .unwrap();

        storage.begin_transaction().await.unwrap();
        storage
            .set_balance(addr, VeriAmount::from_veri(1.0))
            .await
            .unwrap();
        storage.rollback_transaction().await.unwrap();

        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            VeriAmount::from_veri(5.0)
        );
    }

    #[tokio::test]
    async fn test_memory_transaction_history() {
        let storage = MemoryStorage::new();
        let a = AccountAddress::from_bytes([3u8; 32]);
        let b = AccountAddress::from_bytes([4u8; 32]);
        let c = AccountAddress::from_bytes([5u8; 32]);

        storage
            .record_transaction(TransactionRecord {
                tx_hash: "abc".to_string(),
                from: a,
                to: b,
                amount: VeriAmount::from_veri(1.0),
                reason: TransferReason::EscrowAward,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(storage.get_transaction_history(a).await.unwrap().len(), 1);
        assert_eq!(storage.get_transaction_history(b).await.unwrap().len(), 1);
        assert!(storage.get_transaction_history(c).await.unwrap().is_empty());
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn test_rocksdb_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::new(dir.path().to_str().unwrap()).unwrap();
        let addr = AccountAddress::from_bytes([6u8; 32]);

        storage
            .set_balance(addr, VeriAmount::from_veri(3.0))
            .await
            .unwrap();
        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            VeriAmount::from_veri(3.0)
        );
        assert_eq!(storage.get_all_accounts().await.unwrap().len(), 1);
    }
}
