use crate::config::NodeConfig;
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use veritor_economics::{
    EconomicsEngine, EconomicsStorage, MemoryStorage, TransferReason, VeriAmount,
};
use veritor_oracle::{EventBus, EventPriority, OracleEngine};

/// The assembled node: custody, oracle engine, and metrics over one
/// storage backend.
#[derive(Clone)]
pub struct VeritorNode {
    config: NodeConfig,
    pub economics: Arc<EconomicsEngine>,
    pub engine: Arc<OracleEngine>,
    pub metrics: Metrics,
}

impl VeritorNode {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        info!(name = %config.node.name, "Initializing veritor node");

        let storage = build_storage(&config)?;
        let economics = Arc::new(EconomicsEngine::new(storage));

        let metrics = Metrics::new();

        let mut events = EventBus::new();
        events.set_metrics(Arc::new(metrics.events_emitted_total.clone()));

        let owner = config
            .owner_address()
            .context("invalid oracle.owner address in configuration")?;
        let oracle_config = config.oracle_params();
        oracle_config.validate()?;

        let mut engine = OracleEngine::new(
            oracle_config,
            owner,
            economics.balances.clone(),
            economics.escrow.clone(),
            Arc::new(events),
        );
        engine.set_metrics(
            Arc::new(metrics.requests_total.clone()),
            Arc::new(metrics.posts_total.clone()),
            Arc::new(metrics.disputes_total.clone()),
            Arc::new(metrics.finalizations_total.clone()),
        );

        let node = Self {
            config,
            economics,
            engine: Arc::new(engine),
            metrics,
        };
        node.apply_genesis().await?;
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.config.node.name
    }

    /// Credit the configured genesis allocations, once. A non-zero supply
    /// means a persistent backend was already initialized on a previous
    /// start.
    async fn apply_genesis(&self) -> Result<()> {
        let supply = self.economics.circulating_supply().await?;
        if !supply.is_zero() {
            info!(
                circulating = supply.to_veri(),
                "Genesis already applied, skipping"
            );
            return Ok(());
        }

        for allocation in &self.config.genesis.allocations {
            let address = veritor_economics::AccountAddress::from_hex(&allocation.address)
                .with_context(|| format!("invalid genesis address {}", allocation.address))?;
            let amount = VeriAmount::from_veri(allocation.amount);
            self.economics
                .balances
                .credit(address, amount, TransferReason::Genesis)
                .await?;
        }

        let total = self.economics.circulating_supply().await?;
        info!(
            accounts = self.config.genesis.allocations.len(),
            total_supply = total.to_veri(),
            "🧬 Genesis allocation applied"
        );
        Ok(())
    }

    /// Refresh scrape-time gauges from engine and custody state.
    pub async fn refresh_gauges(&self) -> Result<()> {
        let stats = self.engine.stats().await;
        self.metrics
            .registered_provers
            .set(stats.registry.total_provers as i64);
        self.metrics
            .open_requests
            .set((stats.ledger.pending + stats.ledger.posted) as i64);

        let mut locked = VeriAmount::ZERO;
        for account in self.economics.balances.get_all_accounts().await? {
            locked = locked.saturating_add(account.locked_balance);
        }
        self.metrics.locked_supply_veri.set(locked.to_veri() as i64);
        Ok(())
    }

    /// Tap every event channel and log what flows through. High-priority
    /// events (disputes, settlement, pause state) log at info, the rest at
    /// debug.
    pub fn start_event_logger(&self) -> JoinHandle<()> {
        let bus = self.engine.event_bus();
        let (mut high_rx, mut medium_rx, mut low_rx) = bus.subscribe_all();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = high_rx.recv() => event,
                    event = medium_rx.recv() => event,
                    event = low_rx.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event).unwrap_or_default();
                        match event.priority() {
                            EventPriority::High => {
                                info!(event = event.event_type(), %payload, "Oracle event")
                            }
                            _ => debug!(event = event.event_type(), %payload, "Oracle event"),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event logger lagged behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn build_storage(config: &NodeConfig) -> Result<Arc<dyn EconomicsStorage>> {
    let storage: Arc<dyn EconomicsStorage> = match config.storage.backend.as_str() {
        "rocksdb" => {
            #[cfg(feature = "rocksdb")]
            {
                let path = config.node.data_dir.join("economics");
                std::fs::create_dir_all(&path)?;
                Arc::new(veritor_economics::RocksDbStorage::new(
                    &path.to_string_lossy(),
                )?)
            }
            #[cfg(not(feature = "rocksdb"))]
            {
                warn!("RocksDB backend requested but feature not enabled, falling back to memory");
                Arc::new(MemoryStorage::new())
            }
        }
        "memory" => Arc::new(MemoryStorage::new()),
        other => {
            warn!(backend = other, "Unknown storage backend, falling back to memory");
            Arc::new(MemoryStorage::new())
        }
    };
    Ok(storage)
}
