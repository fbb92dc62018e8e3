use crate::error::{OracleError, Result};
use crate::types::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use veritor_economics::{AccountAddress, VeriAmount};

/// Registry-side view of one prover.
///
/// `free_stake` is the bond portion not committed to any request; the
/// committed remainder is tracked per request by the escrow layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverAccount {
    pub address: AccountAddress,
    pub free_stake: VeriAmount,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub registered_at: DateTime<Utc>,
    /// Requests currently holding a lock against this prover's bond
    pub active_requests: HashSet<RequestId>,
    pub total_posted: u64,
    pub total_finalized: u64,
    pub total_slashed: u64,
}

/// How a request released its hold on the prover's bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Finalized,
    Slashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_provers: usize,
    pub total_free_stake: VeriAmount,
    pub total_active_requests: usize,
}

/// Tracks registered provers and their free bond accounting. Threshold and
/// balance checks live in the engine; this registry only enforces
/// membership and internal consistency.
pub struct ProverRegistry {
    provers: Arc<RwLock<HashMap<AccountAddress, ProverAccount>>>,
}

impl ProverRegistry {
    pub fn new() -> Self {
        Self {
            provers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(
        &self,
        address: AccountAddress,
        stake: VeriAmount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut provers = self.provers.write().await;
        if provers.contains_key(&address) {
            return Err(OracleError::InvalidState(format!(
                "prover {} is already registered",
                address
            )));
        }

        provers.insert(
            address,
            ProverAccount {
                address,
                free_stake: stake,
                registered_at: now,
                active_requests: HashSet::new(),
                total_posted: 0,
                total_finalized: 0,
                total_slashed: 0,
            },
        );

        info!(
            prover = %address,
            stake = stake.to_veri(),
            "🛡️ Prover registered"
        );
        Ok(())
    }

    /// Add to a registered prover's free stake, returning the new total.
    pub async fn increase_stake(
        &self,
        address: AccountAddress,
        amount: VeriAmount,
    ) -> Result<VeriAmount> {
        let mut provers = self.provers.write().await;
        let account = provers.get_mut(&address).ok_or_else(|| {
            OracleError::Unauthorized(format!("{} is not a registered prover", address))
        })?;

        account.free_stake = account.free_stake.saturating_add(amount);
        let total = account.free_stake;

        info!(
            prover = %address,
            added = amount.to_veri(),
            total = total.to_veri(),
            "📈 Prover stake increased"
        );
        Ok(total)
    }

    /// Remove a prover, returning the free stake to refund. Refused while
    /// any request still holds a lock against the bond.
    pub async fn unregister(&self, address: AccountAddress) -> Result<VeriAmount> {
        let mut provers = self.provers.write().await;
        let account = provers.get(&address).ok_or_else(|| {
            OracleError::Unauthorized(format!("{} is not a registered prover", address))
        })?;

        if !account.active_requests.is_empty() {
            return Err(OracleError::InvalidState(format!(
                "prover {} has {} active request(s) holding stake",
                address,
                account.active_requests.len()
            )));
        }

        let refunded = account.free_stake;
        provers.remove(&address);

        info!(
            prover = %address,
            refunded = refunded.to_veri(),
            "👋 Prover unregistered"
        );
        Ok(refunded)
    }

    pub async fn is_registered(&self, address: AccountAddress) -> bool {
        let provers = self.provers.read().await;
        provers.contains_key(&address)
    }

    /// Free (uncommitted) stake; zero for unknown accounts.
    pub async fn get_free_stake(&self, address: AccountAddress) -> VeriAmount {
        let provers = self.provers.read().await;
        provers
            .get(&address)
            .map(|a| a.free_stake)
            .unwrap_or(VeriAmount::ZERO)
    }

    pub async fn get_account(&self, address: AccountAddress) -> Option<ProverAccount> {
        let provers = self.provers.read().await;
        provers.get(&address).cloned()
    }

    /// Commit part of the free stake to a request. The engine validates the
    /// threshold first; a shortfall here means registry and engine state
    /// have diverged.
    pub(crate) async fn lock_stake(
        &self,
        address: AccountAddress,
        amount: VeriAmount,
        request_id: RequestId,
    ) -> Result<()> {
        let mut provers = self.provers.write().await;
        let account = provers
            .get_mut(&address)
            .ok_or_else(|| anyhow::anyhow!("lock_stake on unknown prover {}", address))?;

        let free = account.free_stake;
        account.free_stake = free.checked_sub(amount).ok_or_else(|| {
            anyhow::anyhow!(
                "lock_stake underflow for {}: free {}, needs {}",
                address,
                free,
                amount
            )
        })?;
        account.active_requests.insert(request_id);
        account.total_posted += 1;
        Ok(())
    }

    /// Drop a request's hold on the bond once it reaches a terminal status.
    pub(crate) async fn clear_request(
        &self,
        address: AccountAddress,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()> {
        let mut provers = self.provers.write().await;
        let account = provers
            .get_mut(&address)
            .ok_or_else(|| anyhow::anyhow!("clear_request on unknown prover {}", address))?;

        if !account.active_requests.remove(&request_id) {
            return Err(
                anyhow::anyhow!("request {} held no lock on prover {}", request_id, address).into(),
            );
        }
        match outcome {
            RequestOutcome::Finalized => account.total_finalized += 1,
            RequestOutcome::Slashed => account.total_slashed += 1,
        }
        Ok(())
    }

    pub async fn stats(&self) -> RegistryStats {
        let provers = self.provers.read().await;
        let mut stats = RegistryStats {
            total_provers: provers.len(),
            total_free_stake: VeriAmount::ZERO,
            total_active_requests: 0,
        };
        for account in provers.values() {
            stats.total_free_stake = stats.total_free_stake.saturating_add(account.free_stake);
            stats.total_active_requests += account.active_requests.len();
        }
        stats
    }
}

impl Default for ProverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> AccountAddress {
        AccountAddress::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn test_register_and_duplicate() {
        let registry = ProverRegistry::new();
        let prover = addr(1);

        registry
            .register(prover, VeriAmount::from_veri(0.5), Utc::now())
            .await
            .unwrap();
        assert!(registry.is_registered(prover).await);
        assert_eq!(
            registry.get_free_stake(prover).await,
            VeriAmount::from_veri(0.5)
        );

        let err = registry
            .register(prover, VeriAmount::from_veri(0.5), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_increase_requires_registration() {
        let registry = ProverRegistry::new();
        let err = registry
            .increase_stake(addr(2), VeriAmount::from_veri(0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unregister_refused_with_active_request() {
        let registry = ProverRegistry::new();
        let prover = addr(3);
        registry
            .register(prover, VeriAmount::from_veri(1.0), Utc::now())
            .await
            .unwrap();
        registry
            .lock_stake(prover, VeriAmount::from_veri(0.5), RequestId(1))
            .await
            .unwrap();

        let err = registry.unregister(prover).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));

        registry
            .clear_request(prover, RequestId(1), RequestOutcome::Finalized)
            .await
            .unwrap();
        let refunded = registry.unregister(prover).await.unwrap();
        assert_eq!(refunded, VeriAmount::from_veri(0.5));
        assert!(!registry.is_registered(prover).await);
    }

    #[tokio::test]
    async fn test_lock_stake_reduces_free_exactly() {
        let registry = ProverRegistry::new();
        let prover = addr(4);
        registry
            .register(prover, VeriAmount::from_veri(0.5), Utc::now())
            .await
            .unwrap();

        registry
            .lock_stake(prover, VeriAmount::from_veri(0.5), RequestId(1))
            .await
            .unwrap();
        assert_eq!(registry.get_free_stake(prover).await, VeriAmount::ZERO);

        // A second lock has nothing left to take
        let err = registry
            .lock_stake(prover, VeriAmount::from_veri(0.5), RequestId(2))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Internal(_)));
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = ProverRegistry::new();
        registry
            .register(addr(5), VeriAmount::from_veri(0.5), Utc::now())
            .await
            .unwrap();
        registry
            .register(addr(6), VeriAmount::from_veri(1.5), Utc::now())
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total_provers, 2);
        assert_eq!(stats.total_free_stake, VeriAmount::from_veri(2.0));
        assert_eq!(stats.total_active_requests, 0);
    }
}
