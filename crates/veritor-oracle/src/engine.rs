use crate::config::OracleConfig;
use crate::error::{OracleError, Result};
use crate::events::{EventBus, OracleEvent};
use crate::ledger::{LedgerStats, RequestLedger};
use crate::registry::{ProverAccount, ProverRegistry, RegistryStats, RequestOutcome};
use crate::types::{InferenceRequest, InferenceStatus, ModelHash, RequestId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use veritor_economics::{
    AccountAddress, BalanceManager, EscrowKind, EscrowManager, TransferReason, VeriAmount,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleStats {
    pub paused: bool,
    pub current_request_id: u64,
    pub ledger: LedgerStats,
    pub registry: RegistryStats,
    pub events_emitted: u64,
}

/// The oracle state machine.
///
/// Owns every mutation of prover free stake and request escrow; no other
/// code path may move those funds. Mutating operations serialize behind a
/// single engine-wide mutex so transitions on the same request can never
/// interleave; read-only views take only the inner locks.
pub struct OracleEngine {
    config: Arc<RwLock<OracleConfig>>,
    owner: AccountAddress,
    paused: Arc<RwLock<bool>>,
    registry: Arc<ProverRegistry>,
    ledger: Arc<RequestLedger>,
    balances: Arc<BalanceManager>,
    escrow: Arc<EscrowManager>,
    events: Arc<EventBus>,
    op_lock: Mutex<()>,
    // Prometheus metrics
    requests_total: Option<Arc<prometheus::IntCounter>>,
    posts_total: Option<Arc<prometheus::IntCounter>>,
    disputes_total: Option<Arc<prometheus::IntCounter>>,
    finalizations_total: Option<Arc<prometheus::IntCounter>>,
}

impl OracleEngine {
    /// Build an engine over existing custody managers. Configuration is
    /// validated by the admin surface and at node startup, not here, so
    /// tests can run degenerate windows.
    pub fn new(
        config: OracleConfig,
        owner: AccountAddress,
        balances: Arc<BalanceManager>,
        escrow: Arc<EscrowManager>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            owner,
            paused: Arc::new(RwLock::new(false)),
            registry: Arc::new(ProverRegistry::new()),
            ledger: Arc::new(RequestLedger::new()),
            balances,
            escrow,
            events,
            op_lock: Mutex::new(()),
            requests_total: None,
            posts_total: None,
            disputes_total: None,
            finalizations_total: None,
        }
    }

    /// Set metrics for lifecycle tracking
    pub fn set_metrics(
        &mut self,
        requests_total: Arc<prometheus::IntCounter>,
        posts_total: Arc<prometheus::IntCounter>,
        disputes_total: Arc<prometheus::IntCounter>,
        finalizations_total: Arc<prometheus::IntCounter>,
    ) {
        self.requests_total = Some(requests_total);
        self.posts_total = Some(posts_total);
        self.disputes_total = Some(disputes_total);
        self.finalizations_total = Some(finalizations_total);
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn owner(&self) -> AccountAddress {
        self.owner
    }

    async fn ensure_not_paused(&self) -> Result<()> {
        if *self.paused.read().await {
            return Err(OracleError::Paused);
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: AccountAddress) -> Result<()> {
        if caller != self.owner {
            return Err(OracleError::Unauthorized(format!(
                "{} is not the oracle owner",
                caller
            )));
        }
        Ok(())
    }

    async fn ensure_spendable(&self, account: AccountAddress, needed: VeriAmount) -> Result<()> {
        let available = self.balances.get_unlocked_balance(account).await?;
        if available < needed {
            return Err(OracleError::InsufficientStake {
                required: needed,
                provided: available,
            });
        }
        Ok(())
    }

    // ==================== Prover registry operations ====================

    pub async fn register_prover(&self, caller: AccountAddress, stake: VeriAmount) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let min = self.config.read().await.min_prover_stake;
        if stake < min {
            return Err(OracleError::InsufficientStake {
                required: min,
                provided: stake,
            });
        }
        if self.registry.is_registered(caller).await {
            return Err(OracleError::InvalidState(format!(
                "prover {} is already registered",
                caller
            )));
        }
        self.ensure_spendable(caller, stake).await?;

        self.escrow
            .lock(EscrowKind::ProverBond { prover: caller }, stake)
            .await?;
        self.registry.register(caller, stake, now).await?;

        self.events.emit(OracleEvent::ProverRegistered {
            prover: caller.to_hex(),
            stake,
            timestamp: now,
        });
        Ok(())
    }

    pub async fn increase_prover_stake(
        &self,
        caller: AccountAddress,
        amount: VeriAmount,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        if amount.is_zero() {
            return Err(OracleError::InsufficientStake {
                required: VeriAmount::from_base_units(1),
                provided: VeriAmount::ZERO,
            });
        }
        if !self.registry.is_registered(caller).await {
            return Err(OracleError::Unauthorized(format!(
                "{} is not a registered prover",
                caller
            )));
        }
        self.ensure_spendable(caller, amount).await?;

        let bond = EscrowKind::ProverBond { prover: caller }.to_lock_id();
        self.escrow.lock_additional(&bond, amount).await?;
        let total = self.registry.increase_stake(caller, amount).await?;

        self.events.emit(OracleEvent::ProverStakeIncreased {
            prover: caller.to_hex(),
            added: amount,
            total,
            timestamp: now,
        });
        Ok(())
    }

    pub async fn unregister_prover(&self, caller: AccountAddress) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let refunded = self.registry.unregister(caller).await?;
        let bond = EscrowKind::ProverBond { prover: caller }.to_lock_id();
        self.escrow.refund(&bond, TransferReason::BondRefund).await?;

        self.events.emit(OracleEvent::ProverUnregistered {
            prover: caller.to_hex(),
            refunded,
            timestamp: now,
        });
        Ok(())
    }

    // ==================== Request lifecycle operations ====================

    pub async fn request_inference(
        &self,
        caller: AccountAddress,
        model_hash: ModelHash,
        input_data: Vec<u8>,
        stake: VeriAmount,
    ) -> Result<RequestId> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let min = self.config.read().await.min_requester_stake;
        if stake < min {
            return Err(OracleError::InsufficientStake {
                required: min,
                provided: stake,
            });
        }
        self.ensure_spendable(caller, stake).await?;

        // Guards passed; only now may an id be consumed
        let input_len = input_data.len();
        let id = self
            .ledger
            .create(caller, model_hash, input_data, stake, now)
            .await;
        self.escrow
            .lock(
                EscrowKind::RequestStake {
                    request_id: id.value(),
                    requester: caller,
                },
                stake,
            )
            .await?;

        if let Some(ref counter) = self.requests_total {
            counter.inc();
        }
        self.events.emit(OracleEvent::InferenceRequested {
            request_id: id.value(),
            requester: caller.to_hex(),
            model_hash: model_hash.to_hex(),
            stake,
            input_len,
            timestamp: now,
        });

        info!(
            request_id = id.value(),
            requester = %caller,
            model_hash = %model_hash,
            stake = stake.to_veri(),
            "📨 Inference requested"
        );
        Ok(id)
    }

    pub async fn post_inference(
        &self,
        caller: AccountAddress,
        id: RequestId,
        output_data: Vec<u8>,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let mut request = self.ledger.get(id).await?;
        if request.status != InferenceStatus::Pending {
            return Err(OracleError::InvalidState(format!(
                "request {} expected Pending, found {}",
                id, request.status
            )));
        }
        if caller == request.requester {
            return Err(OracleError::Unauthorized(
                "requester cannot prove their own request".to_string(),
            ));
        }
        if !self.registry.is_registered(caller).await {
            return Err(OracleError::Unauthorized(format!(
                "{} is not a registered prover",
                caller
            )));
        }

        let config = self.config.read().await.clone();
        let bond_stake = config.min_prover_stake;
        let free = self.registry.get_free_stake(caller).await;
        if free < bond_stake {
            return Err(OracleError::InsufficientStake {
                required: bond_stake,
                provided: free,
            });
        }

        // Commit the bond to this request, then re-tag the locked funds
        self.registry.lock_stake(caller, bond_stake, id).await?;
        let bond = EscrowKind::ProverBond { prover: caller }.to_lock_id();
        self.escrow
            .transfer_locked(
                &bond,
                EscrowKind::ProverStake {
                    request_id: id.value(),
                    prover: caller,
                },
                bond_stake,
            )
            .await?;

        let deadline = now + config.dispute_window();
        let output_len = output_data.len();
        request.prover = Some(caller);
        request.output_data = Some(output_data);
        request.prover_stake = bond_stake;
        request.dispute_deadline = Some(deadline);
        request.transition_to(InferenceStatus::Posted)?;
        self.ledger.put(request).await?;

        if let Some(ref counter) = self.posts_total {
            counter.inc();
        }
        self.events.emit(OracleEvent::InferencePosted {
            request_id: id.value(),
            prover: caller.to_hex(),
            output_len,
            prover_stake: bond_stake,
            dispute_deadline: deadline,
            timestamp: now,
        });

        info!(
            request_id = id.value(),
            prover = %caller,
            prover_stake = bond_stake.to_veri(),
            dispute_deadline = %deadline,
            "📤 Inference posted"
        );
        Ok(())
    }

    pub async fn dispute_inference(
        &self,
        caller: AccountAddress,
        id: RequestId,
        counter_example: Vec<u8>,
        stake: VeriAmount,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let mut request = self.ledger.get(id).await?;
        if request.status != InferenceStatus::Posted {
            return Err(OracleError::InvalidState(format!(
                "request {} expected Posted, found {}",
                id, request.status
            )));
        }
        if !request.window_open(now) {
            return Err(OracleError::InvalidState(format!(
                "dispute window for request {} closed at {}",
                id,
                request
                    .dispute_deadline
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default()
            )));
        }

        let required = request
            .requester_stake
            .checked_add(request.prover_stake)
            .ok_or_else(|| anyhow::anyhow!("escrow overflow on request {}", id))?;
        if stake < required {
            return Err(OracleError::InsufficientStake {
                required,
                provided: stake,
            });
        }
        // The dispute stake is an admission gate: the challenger must hold
        // it, and settlement in the same operation hands the escrow over
        // without retaining the gate amount.
        self.ensure_spendable(caller, stake).await?;

        let prover = request
            .prover
            .ok_or_else(|| anyhow::anyhow!("posted request {} has no prover", id))?;

        // Effects commit before any outbound transfer
        request.challenger = Some(caller);
        request.challenger_stake = stake;
        request.counter_example = Some(counter_example);
        request.inference_valid = Some(false);
        request.settled_at = Some(now);
        request.transition_to(InferenceStatus::Settled)?;
        self.ledger.put(request.clone()).await?;
        self.registry
            .clear_request(prover, id, RequestOutcome::Slashed)
            .await?;

        let requester_lock = EscrowKind::RequestStake {
            request_id: id.value(),
            requester: request.requester,
        }
        .to_lock_id();
        let prover_lock = EscrowKind::ProverStake {
            request_id: id.value(),
            prover,
        }
        .to_lock_id();
        self.escrow
            .release(&requester_lock, caller, TransferReason::EscrowAward)
            .await?;
        self.escrow
            .release(&prover_lock, caller, TransferReason::EscrowAward)
            .await?;

        if let Some(ref counter) = self.disputes_total {
            counter.inc();
        }
        self.events.emit(OracleEvent::InferenceDisputed {
            request_id: id.value(),
            challenger: caller.to_hex(),
            stake,
            timestamp: now,
        });
        self.events.emit(OracleEvent::InferenceSettled {
            request_id: id.value(),
            challenger: caller.to_hex(),
            payout: required,
            inference_valid: false,
            timestamp: now,
        });

        info!(
            request_id = id.value(),
            challenger = %caller,
            payout = required.to_veri(),
            "⚔️ Inference disputed and settled"
        );
        Ok(())
    }

    /// Time-gated sweep, open to any caller so payout cannot be blocked by
    /// prover inaction.
    pub async fn finalize_inference(&self, caller: AccountAddress, id: RequestId) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_paused().await?;
        let now = Utc::now();

        let mut request = self.ledger.get(id).await?;
        if request.status != InferenceStatus::Posted {
            return Err(OracleError::InvalidState(format!(
                "request {} expected Posted, found {}",
                id, request.status
            )));
        }
        if !request.window_closed(now) {
            return Err(OracleError::InvalidState(format!(
                "dispute window for request {} open until {}",
                id,
                request
                    .dispute_deadline
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default()
            )));
        }

        let prover = request
            .prover
            .ok_or_else(|| anyhow::anyhow!("posted request {} has no prover", id))?;
        let total_reward = request
            .requester_stake
            .checked_add(request.prover_stake)
            .ok_or_else(|| anyhow::anyhow!("escrow overflow on request {}", id))?;

        // Effects commit before any outbound transfer
        request.inference_valid = Some(true);
        request.settled_at = Some(now);
        request.transition_to(InferenceStatus::Finalized)?;
        self.ledger.put(request.clone()).await?;
        self.registry
            .clear_request(prover, id, RequestOutcome::Finalized)
            .await?;

        let requester_lock = EscrowKind::RequestStake {
            request_id: id.value(),
            requester: request.requester,
        }
        .to_lock_id();
        let prover_lock = EscrowKind::ProverStake {
            request_id: id.value(),
            prover,
        }
        .to_lock_id();
        self.escrow
            .release(&requester_lock, prover, TransferReason::EscrowAward)
            .await?;
        self.escrow
            .release(&prover_lock, prover, TransferReason::EscrowRelease)
            .await?;

        if let Some(ref counter) = self.finalizations_total {
            counter.inc();
        }
        self.events.emit(OracleEvent::InferenceFinalized {
            request_id: id.value(),
            prover: prover.to_hex(),
            total_reward,
            timestamp: now,
        });

        info!(
            request_id = id.value(),
            prover = %prover,
            caller = %caller,
            total_reward = total_reward.to_veri(),
            "🏁 Inference finalized"
        );
        Ok(())
    }

    // ==================== Read-only views ====================

    pub async fn get_request(&self, id: RequestId) -> Result<InferenceRequest> {
        self.ledger.get(id).await
    }

    pub async fn current_request_id(&self) -> u64 {
        self.ledger.current_request_id().await
    }

    pub async fn is_registered_prover(&self, address: AccountAddress) -> bool {
        self.registry.is_registered(address).await
    }

    /// Free (uncommitted) prover stake; zero for unknown accounts.
    pub async fn get_prover_stake(&self, address: AccountAddress) -> VeriAmount {
        self.registry.get_free_stake(address).await
    }

    pub async fn get_prover_account(&self, address: AccountAddress) -> Option<ProverAccount> {
        self.registry.get_account(address).await
    }

    pub async fn get_config(&self) -> OracleConfig {
        self.config.read().await.clone()
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    pub async fn stats(&self) -> OracleStats {
        OracleStats {
            paused: self.is_paused().await,
            current_request_id: self.ledger.current_request_id().await,
            ledger: self.ledger.stats().await,
            registry: self.registry.stats().await,
            events_emitted: self.events.total_events_emitted(),
        }
    }

    // ==================== Admin surface ====================

    /// Swap the oracle parameters. Owner-only; permitted while paused so a
    /// bad parameter can be corrected before resuming.
    pub async fn update_config(
        &self,
        caller: AccountAddress,
        new_config: OracleConfig,
    ) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_owner(caller)?;
        new_config.validate()?;
        let now = Utc::now();

        {
            let mut config = self.config.write().await;
            *config = new_config.clone();
        }

        self.events.emit(OracleEvent::ConfigUpdated {
            min_requester_stake: new_config.min_requester_stake,
            min_prover_stake: new_config.min_prover_stake,
            dispute_window_secs: new_config.dispute_window_secs,
            timestamp: now,
        });

        info!(
            min_requester_stake = new_config.min_requester_stake.to_veri(),
            min_prover_stake = new_config.min_prover_stake.to_veri(),
            dispute_window_secs = new_config.dispute_window_secs,
            "⚙️ Config updated"
        );
        Ok(())
    }

    pub async fn pause(&self, caller: AccountAddress) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_owner(caller)?;

        let mut paused = self.paused.write().await;
        if *paused {
            return Err(OracleError::Paused);
        }
        *paused = true;

        self.events.emit(OracleEvent::OraclePaused {
            timestamp: Utc::now(),
        });
        info!("⏸️ Oracle paused");
        Ok(())
    }

    pub async fn unpause(&self, caller: AccountAddress) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.ensure_owner(caller)?;

        let mut paused = self.paused.write().await;
        if !*paused {
            return Err(OracleError::InvalidState("oracle is not paused".to_string()));
        }
        *paused = false;

        self.events.emit(OracleEvent::OracleResumed {
            timestamp: Utc::now(),
        });
        info!("▶️ Oracle resumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritor_economics::MemoryStorage;

    const WINDOW: u64 = 3600;

    struct Harness {
        engine: OracleEngine,
        balances: Arc<BalanceManager>,
        owner: AccountAddress,
        requester: AccountAddress,
        prover: AccountAddress,
        challenger: AccountAddress,
    }

    fn addr(byte: u8) -> AccountAddress {
        AccountAddress::from_bytes([byte; 32])
    }

    async fn harness(window_secs: u64) -> Harness {
        let balances = Arc::new(BalanceManager::new(Arc::new(MemoryStorage::new())));
        let escrow = Arc::new(EscrowManager::new(balances.clone()));
        let owner = addr(0xA0);
        let requester = addr(0xA1);
        let prover = addr(0xA2);
        let challenger = addr(0xA3);

        for account in [requester, prover, challenger] {
            balances
                .credit(account, VeriAmount::from_veri(10.0), TransferReason::Genesis)
                .await
                .unwrap();
        }

        let config = OracleConfig::default().with_dispute_window_secs(window_secs);
        let engine = OracleEngine::new(config, owner, balances.clone(), escrow, Arc::new(EventBus::new()));
        Harness {
            engine,
            balances,
            owner,
            requester,
            prover,
            challenger,
        }
    }

    async fn posted_request(h: &Harness) -> RequestId {
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        let id = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                b"input".to_vec(),
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();
        h.engine
            .post_inference(h.prover, id, b"output".to_vec())
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_register_prover_thresholds() {
        let h = harness(WINDOW).await;

        let err = h
            .engine
            .register_prover(h.prover, VeriAmount::from_veri(0.4))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));

        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        assert!(h.engine.is_registered_prover(h.prover).await);
        assert_eq!(
            h.engine.get_prover_stake(h.prover).await,
            VeriAmount::from_veri(0.5)
        );

        // Bond is locked at the balance layer
        assert_eq!(
            h.balances.get_unlocked_balance(h.prover).await.unwrap(),
            VeriAmount::from_veri(9.5)
        );

        let err = h
            .engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_register_requires_spendable_balance() {
        let h = harness(WINDOW).await;
        let poor = addr(0xEE);
        let err = h
            .engine
            .register_prover(poor, VeriAmount::from_veri(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));
    }

    #[tokio::test]
    async fn test_increase_and_unregister_round_trip() {
        let h = harness(WINDOW).await;
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        h.engine
            .increase_prover_stake(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        assert_eq!(
            h.engine.get_prover_stake(h.prover).await,
            VeriAmount::from_veri(1.0)
        );

        h.engine.unregister_prover(h.prover).await.unwrap();
        assert!(!h.engine.is_registered_prover(h.prover).await);
        assert_eq!(h.engine.get_prover_stake(h.prover).await, VeriAmount::ZERO);
        assert_eq!(
            h.balances.get_unlocked_balance(h.prover).await.unwrap(),
            VeriAmount::from_veri(10.0)
        );
    }

    #[tokio::test]
    async fn test_request_guards_consume_no_id() {
        let h = harness(WINDOW).await;

        let err = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.05),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));
        assert_eq!(h.engine.current_request_id().await, 0);

        let id = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();
        assert_eq!(id, RequestId(1));
        assert_eq!(h.engine.current_request_id().await, 1);
    }

    #[tokio::test]
    async fn test_post_authorization_order() {
        let h = harness(WINDOW).await;
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        let id = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();

        // The requester is refused before any registration check
        let err = h
            .engine
            .post_inference(h.requester, id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unauthorized(ref s) if s.contains("own request")));

        // An unregistered stranger is refused as unauthorized
        let err = h
            .engine
            .post_inference(addr(0xEF), id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unauthorized(_)));

        h.engine
            .post_inference(h.prover, id, b"out".to_vec())
            .await
            .unwrap();
        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, InferenceStatus::Posted);
        assert!(request.dispute_deadline.is_some());

        // Posting twice is an invalid state
        let err = h
            .engine
            .post_inference(h.prover, id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_post_deducts_exactly_min_prover_stake() {
        let h = harness(WINDOW).await;
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(2.0))
            .await
            .unwrap();
        let id = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();

        let before = h.engine.get_prover_stake(h.prover).await;
        h.engine
            .post_inference(h.prover, id, b"out".to_vec())
            .await
            .unwrap();
        let after = h.engine.get_prover_stake(h.prover).await;

        assert_eq!(
            before.checked_sub(after),
            Some(VeriAmount::from_veri(0.5))
        );
    }

    #[tokio::test]
    async fn test_post_requires_free_stake() {
        let h = harness(WINDOW).await;
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();

        let first = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();
        let second = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([2u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();

        h.engine
            .post_inference(h.prover, first, b"a".to_vec())
            .await
            .unwrap();

        // The whole bond is committed to the first request
        let err = h
            .engine
            .post_inference(h.prover, second, b"b".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));
    }

    #[tokio::test]
    async fn test_dispute_threshold_is_exact() {
        let h = harness(WINDOW).await;
        let id = posted_request(&h).await;

        let required = VeriAmount::from_veri(0.6);
        let one_below = required.checked_sub(VeriAmount::from_base_units(1)).unwrap();

        let err = h
            .engine
            .dispute_inference(h.challenger, id, b"counter".to_vec(), one_below)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));

        h.engine
            .dispute_inference(h.challenger, id, b"counter".to_vec(), required)
            .await
            .unwrap();

        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, InferenceStatus::Settled);
        assert_eq!(request.inference_valid, Some(false));
        assert_eq!(request.challenger_stake, required);
        assert!(request.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_dispute_pays_challenger_combined_escrow() {
        let h = harness(WINDOW).await;
        let id = posted_request(&h).await;

        let before = h.balances.get_balance(h.challenger).await.unwrap();
        h.engine
            .dispute_inference(h.challenger, id, b"counter".to_vec(), VeriAmount::from_veri(0.6))
            .await
            .unwrap();
        let after = h.balances.get_balance(h.challenger).await.unwrap();

        assert_eq!(after.checked_sub(before), Some(VeriAmount::from_veri(0.6)));
        // Prover's committed bond is gone, free stake untouched at zero
        assert_eq!(h.engine.get_prover_stake(h.prover).await, VeriAmount::ZERO);
        assert_eq!(
            h.balances.get_balance(h.prover).await.unwrap(),
            VeriAmount::from_veri(9.5)
        );
    }

    #[tokio::test]
    async fn test_finalize_blocked_while_window_open() {
        let h = harness(WINDOW).await;
        let id = posted_request(&h).await;

        let err = h
            .engine
            .finalize_inference(h.challenger, id)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_finalize_pays_prover_and_rejects_repeat() {
        let h = harness(0).await;
        let id = posted_request(&h).await;

        let before = h.balances.get_balance(h.prover).await.unwrap();
        h.engine
            .finalize_inference(addr(0xDD), id)
            .await
            .unwrap();
        let after = h.balances.get_balance(h.prover).await.unwrap();

        // requester_stake flows in, the committed bond unlocks in place
        assert_eq!(after.checked_sub(before), Some(VeriAmount::from_veri(0.1)));
        assert_eq!(
            h.balances.get_locked_balance(h.prover).await.unwrap(),
            VeriAmount::ZERO
        );

        let request = h.engine.get_request(id).await.unwrap();
        assert_eq!(request.status, InferenceStatus::Finalized);
        assert_eq!(request.inference_valid, Some(true));

        // Finalizing again transfers nothing and fails the state guard
        let err = h
            .engine
            .finalize_inference(addr(0xDD), id)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
        assert_eq!(
            h.balances.get_balance(h.prover).await.unwrap(),
            after
        );
    }

    #[tokio::test]
    async fn test_dispute_after_window_closed() {
        let h = harness(0).await;
        let id = posted_request(&h).await;

        let err = h
            .engine
            .dispute_inference(h.challenger, id, b"late".to_vec(), VeriAmount::from_veri(0.6))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unregister_blocked_by_posted_request() {
        let h = harness(0).await;
        let id = posted_request(&h).await;

        let err = h.engine.unregister_prover(h.prover).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidState(_)));

        h.engine.finalize_inference(h.prover, id).await.unwrap();
        h.engine.unregister_prover(h.prover).await.unwrap();
        assert!(!h.engine.is_registered_prover(h.prover).await);
    }

    #[tokio::test]
    async fn test_pause_blocks_every_mutation() {
        let h = harness(WINDOW).await;
        h.engine
            .register_prover(h.prover, VeriAmount::from_veri(0.5))
            .await
            .unwrap();
        let id = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap();

        h.engine.pause(h.owner).await.unwrap();

        assert!(matches!(
            h.engine
                .register_prover(h.challenger, VeriAmount::from_veri(0.5))
                .await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine
                .increase_prover_stake(h.prover, VeriAmount::from_veri(0.1))
                .await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine.unregister_prover(h.prover).await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine
                .request_inference(
                    h.requester,
                    ModelHash::from_bytes([1u8; 32]),
                    vec![],
                    VeriAmount::from_veri(0.1)
                )
                .await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine.post_inference(h.prover, id, vec![]).await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine
                .dispute_inference(h.challenger, id, vec![], VeriAmount::from_veri(1.0))
                .await,
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            h.engine.finalize_inference(h.owner, id).await,
            Err(OracleError::Paused)
        ));

        // Views stay open while paused
        assert!(h.engine.get_request(id).await.is_ok());
        assert!(h.engine.is_registered_prover(h.prover).await);

        h.engine.unpause(h.owner).await.unwrap();
        h.engine
            .post_inference(h.prover, id, b"out".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_admin_guards() {
        let h = harness(WINDOW).await;
        let stranger = addr(0xCC);

        assert!(matches!(
            h.engine.pause(stranger).await,
            Err(OracleError::Unauthorized(_))
        ));
        assert!(matches!(
            h.engine
                .update_config(stranger, OracleConfig::default())
                .await,
            Err(OracleError::Unauthorized(_))
        ));

        // Owner cannot set a sub-floor window
        let bad = OracleConfig::default().with_dispute_window_secs(30 * 60);
        assert!(matches!(
            h.engine.update_config(h.owner, bad).await,
            Err(OracleError::InvalidConfiguration(_))
        ));

        let good = OracleConfig::default()
            .with_min_requester_stake(VeriAmount::from_veri(0.2))
            .with_dispute_window_secs(48 * 3600);
        h.engine.update_config(h.owner, good.clone()).await.unwrap();
        assert_eq!(h.engine.get_config().await, good);

        // The new floor applies to the next request
        let err = h
            .engine
            .request_inference(
                h.requester,
                ModelHash::from_bytes([1u8; 32]),
                vec![],
                VeriAmount::from_veri(0.1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientStake { .. }));
    }

    #[tokio::test]
    async fn test_pause_twice_and_unpause_idle() {
        let h = harness(WINDOW).await;
        h.engine.pause(h.owner).await.unwrap();
        assert!(matches!(h.engine.pause(h.owner).await, Err(OracleError::Paused)));

        h.engine.unpause(h.owner).await.unwrap();
        assert!(matches!(
            h.engine.unpause(h.owner).await,
            Err(OracleError::InvalidState(_))
        ));
    }
}
