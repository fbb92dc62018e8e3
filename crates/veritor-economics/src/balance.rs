use crate::storage::{EconomicsStorage, TransactionRecord};
use crate::types::{AccountAddress, TransferReason, VeriAmount};
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub address: AccountAddress,
    pub balance: VeriAmount,
    pub locked_balance: VeriAmount,
}

/// Account balances with a locked portion reserved for escrow.
///
/// `balance` is the account total; `locked_balance` is the slice of it that
/// escrow holds. Spendable funds are always `balance - locked_balance`, and
/// every spend path (debit, transfer) checks the spendable amount, so locked
/// funds can only move after an explicit unlock.
pub struct BalanceManager {
    storage: Arc<dyn EconomicsStorage>,
}

impl BalanceManager {
    pub fn new(storage: Arc<dyn EconomicsStorage>) -> Self {
        Self { storage }
    }

    pub async fn get_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        self.storage.get_balance(address).await
    }

    pub async fn get_locked_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        self.storage.get_locked_balance(address).await
    }

    pub async fn get_unlocked_balance(&self, address: AccountAddress) -> Result<VeriAmount> {
        let balance = self.get_balance(address).await?;
        let locked = self.get_locked_balance(address).await?;
        Ok(balance.saturating_sub(locked))
    }

    pub async fn credit(
        &self,
        address: AccountAddress,
        amount: VeriAmount,
        reason: TransferReason,
    ) -> Result<()> {
        if amount == VeriAmount::ZERO {
            return Ok(());
        }

        let current = self.get_balance(address).await?;
        let new_balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {}", address))?;
        if new_balance > VeriAmount::MAX_SUPPLY {
            bail!("Balance would exceed max supply");
        }

        self.storage.set_balance(address, new_balance).await?;
        self.record(address, address, amount, reason).await;

        info!(
            address = %address,
            amount = amount.to_veri(),
            balance_before = current.to_veri(),
            balance_after = new_balance.to_veri(),
            reason = %reason,
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn debit(
        &self,
        address: AccountAddress,
        amount: VeriAmount,
        reason: TransferReason,
    ) -> Result<()> {
        if amount == VeriAmount::ZERO {
            return Ok(());
        }

        let current = self.get_balance(address).await?;
        let unlocked = self.get_unlocked_balance(address).await?;
        if unlocked < amount {
            bail!(
                "Insufficient unlocked balance for {}: has {}, needs {}",
                address,
                unlocked,
                amount
            );
        }

        let new_balance = current.saturating_sub(amount);
        self.storage.set_balance(address, new_balance).await?;
        self.record(address, address, amount, reason).await;

        info!(
            address = %address,
            amount = amount.to_veri(),
            balance_before = current.to_veri(),
            balance_after = new_balance.to_veri(),
            reason = %reason,
            "💸 Balance debited"
        );
        Ok(())
    }

    pub async fn transfer(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        amount: VeriAmount,
        reason: TransferReason,
    ) -> Result<()> {
        if amount == VeriAmount::ZERO {
            return Ok(());
        }
        if from == to {
            bail!("Cannot transfer to same address");
        }

        self.storage.begin_transaction().await?;
        match self.transfer_internal(from, to, amount).await {
            Ok(()) => {
                self.storage.commit_transaction().await?;
                let tx_hash = self.record(from, to, amount, reason).await;
                info!(
                    from = %from,
                    to = %to,
                    amount = amount.to_veri(),
                    tx_hash = %tx_hash,
                    reason = %reason,
                    "✅ Transfer committed"
                );
                Ok(())
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                info!(
                    from = %from,
                    to = %to,
                    amount = amount.to_veri(),
                    error = %e,
                    "❌ Transfer rolled back"
                );
                Err(e)
            }
        }
    }

    async fn transfer_internal(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        amount: VeriAmount,
    ) -> Result<()> {
        let from_balance = self.storage.get_balance(from).await?;
        let from_locked = self.storage.get_locked_balance(from).await?;
        let spendable = from_balance.saturating_sub(from_locked);
        if spendable < amount {
            bail!(
                "Insufficient unlocked balance: {} has {}, needs {}",
                from,
                spendable,
                amount
            );
        }

        let to_balance = self.storage.get_balance(to).await?;
        let new_to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for recipient {}", to))?;

        self.storage
            .set_balance(from, from_balance.saturating_sub(amount))
            .await?;
        self.storage.set_balance(to, new_to_balance).await?;
        Ok(())
    }

    pub async fn lock(&self, address: AccountAddress, amount: VeriAmount) -> Result<()> {
        let balance = self.storage.get_balance(address).await?;
        let locked = self.storage.get_locked_balance(address).await?;
        let unlocked = balance.saturating_sub(locked);
        if unlocked < amount {
            bail!(
                "Insufficient unlocked balance: has {}, needs {}",
                unlocked,
                amount
            );
        }

        let new_locked = locked.saturating_add(amount);
        self.storage.set_locked_balance(address, new_locked).await?;

        info!(
            address = %address,
            amount = amount.to_veri(),
            locked_before = locked.to_veri(),
            locked_after = new_locked.to_veri(),
            total_balance = balance.to_veri(),
            "🔒 Balance locked"
        );
        Ok(())
    }

    pub async fn unlock(&self, address: AccountAddress, amount: VeriAmount) -> Result<()> {
        let locked = self.storage.get_locked_balance(address).await?;
        if locked < amount {
            bail!(
                "Insufficient locked balance: has {}, trying to unlock {}",
                locked,
                amount
            );
        }

        let new_locked = locked.saturating_sub(amount);
        self.storage.set_locked_balance(address, new_locked).await?;

        info!(
            address = %address,
            amount = amount.to_veri(),
            locked_before = locked.to_veri(),
            locked_after = new_locked.to_veri(),
            "🔓 Balance unlocked"
        );
        Ok(())
    }

    pub async fn get_all_accounts(&self) -> Result<Vec<AccountInfo>> {
        let addresses = self.storage.get_all_accounts().await?;
        let mut accounts = Vec::with_capacity(addresses.len());
        for address in addresses {
            accounts.push(AccountInfo {
                address,
                balance: self.storage.get_balance(address).await?,
                locked_balance: self.storage.get_locked_balance(address).await?,
            });
        }
        Ok(accounts)
    }

    pub async fn get_transaction_history(
        &self,
        address: AccountAddress,
    ) -> Result<Vec<TransactionRecord>> {
        self.storage.get_transaction_history(address).await
    }

    /// Best-effort audit append; a failed record never fails the movement.
    async fn record(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        amount: VeriAmount,
        reason: TransferReason,
    ) -> String {
        let timestamp = Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(format!("{}", reason).as_bytes());
        hasher.update(&timestamp.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        let tx_hash = hex::encode(hasher.finalize().as_bytes());

        let record = TransactionRecord {
            tx_hash: tx_hash.clone(),
            from,
            to,
            amount,
            reason,
            timestamp,
        };
        if let Err(e) = self.storage.record_transaction(record).await {
            debug!(tx_hash = %tx_hash, error = %e, "Failed to record transaction");
        }
        tx_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn manager() -> BalanceManager {
        BalanceManager::new(Arc::new(MemoryStorage::new()))
    }

    fn addr(byte: u8) -> AccountAddress {
        AccountAddress::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let mgr = manager();
        let alice = addr(1);
        let bob = addr(2);

        mgr.credit(alice, VeriAmount::from_veri(10.0), TransferReason::Genesis)
            .await
            .unwrap();
        assert_eq!(
            mgr.get_balance(alice).await.unwrap(),
            VeriAmount::from_veri(10.0)
        );

        mgr.transfer(
            alice,
            bob,
            VeriAmount::from_veri(3.0),
            TransferReason::EscrowAward,
        )
        .await
        .unwrap();

        assert_eq!(
            mgr.get_balance(alice).await.unwrap(),
            VeriAmount::from_veri(7.0)
        );
        assert_eq!(
            mgr.get_balance(bob).await.unwrap(),
            VeriAmount::from_veri(3.0)
        );

        let history = mgr.get_transaction_history(bob).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, TransferReason::EscrowAward);
    }

    #[tokio::test]
    async fn test_locking() {
        let mgr = manager();
        let alice = addr(3);

        mgr.credit(alice, VeriAmount::from_veri(5.0), TransferReason::Genesis)
            .await
            .unwrap();
        mgr.lock(alice, VeriAmount::from_veri(4.0)).await.unwrap();

        assert_eq!(
            mgr.get_locked_balance(alice).await.unwrap(),
            VeriAmount::from_veri(4.0)
        );
        assert_eq!(
            mgr.get_unlocked_balance(alice).await.unwrap(),
            VeriAmount::from_veri(1.0)
        );

        // Cannot lock beyond the unlocked remainder
        assert!(mgr.lock(alice, VeriAmount::from_veri(2.0)).await.is_err());

        mgr.unlock(alice, VeriAmount::from_veri(4.0)).await.unwrap();
        assert_eq!(
            mgr.get_unlocked_balance(alice).await.unwrap(),
            VeriAmount::from_veri(5.0)
        );

        // Cannot unlock more than is locked
        assert!(mgr.unlock(alice, VeriAmount::from_veri(0.1)).await.is_err());
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let mgr = manager();
        let alice = addr(4);
        let bob = addr(5);

        mgr.credit(alice, VeriAmount::from_veri(1.0), TransferReason::Genesis)
            .await
            .unwrap();
        mgr.lock(alice, VeriAmount::from_veri(0.8)).await.unwrap();

        // Locked funds are not spendable
        assert!(mgr
            .debit(alice, VeriAmount::from_veri(0.5), TransferReason::BondRefund)
            .await
            .is_err());
        assert!(mgr
            .transfer(
                alice,
                bob,
                VeriAmount::from_veri(0.5),
                TransferReason::EscrowAward
            )
            .await
            .is_err());

        // Balance unchanged after the failed transfer
        assert_eq!(
            mgr.get_balance(alice).await.unwrap(),
            VeriAmount::from_veri(1.0)
        );
        assert_eq!(mgr.get_balance(bob).await.unwrap(), VeriAmount::ZERO);
    }
}
