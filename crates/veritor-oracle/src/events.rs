//! Event stream for oracle state changes.
//!
//! Every lifecycle transition and fund movement emits an event carrying
//! enough detail for an external observer (UI, analytics, indexer) to
//! reconstruct the request record without re-querying the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use veritor_economics::VeriAmount;

/// Maximum number of events buffered per channel before old events are dropped
const HIGH_PRIORITY_BUFFER: usize = 1000;
const MEDIUM_PRIORITY_BUFFER: usize = 500;
const LOW_PRIORITY_BUFFER: usize = 100;

/// Events emitted by the oracle engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OracleEvent {
    /// A prover joined the registry
    ProverRegistered {
        prover: String,
        stake: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A registered prover added to their free stake
    ProverStakeIncreased {
        prover: String,
        added: VeriAmount,
        total: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A prover left the registry and was refunded
    ProverUnregistered {
        prover: String,
        refunded: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A funded inference request was admitted
    InferenceRequested {
        request_id: u64,
        requester: String,
        model_hash: String,
        stake: VeriAmount,
        input_len: usize,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A prover posted a claimed result and opened the dispute window
    InferencePosted {
        request_id: u64,
        prover: String,
        output_len: usize,
        prover_stake: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        dispute_deadline: DateTime<Utc>,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A challenger contested a posted result inside the window
    InferenceDisputed {
        request_id: u64,
        challenger: String,
        stake: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Dispute settlement: the escrow moved to the challenger
    InferenceSettled {
        request_id: u64,
        challenger: String,
        payout: VeriAmount,
        inference_valid: bool,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// The window elapsed unchallenged; the prover was paid
    InferenceFinalized {
        request_id: u64,
        prover: String,
        total_reward: VeriAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Owner swapped the oracle parameters
    ConfigUpdated {
        min_requester_stake: VeriAmount,
        min_prover_stake: VeriAmount,
        dispute_window_secs: u64,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Owner engaged the emergency pause
    OraclePaused {
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Owner lifted the emergency pause
    OracleResumed {
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },
}

impl OracleEvent {
    /// Stable dotted name, used by log and stream consumers.
    pub fn event_type(&self) -> &'static str {
        match self {
            OracleEvent::ProverRegistered { .. } => "prover.registered",
            OracleEvent::ProverStakeIncreased { .. } => "prover.stake_increased",
            OracleEvent::ProverUnregistered { .. } => "prover.unregistered",
            OracleEvent::InferenceRequested { .. } => "inference.requested",
            OracleEvent::InferencePosted { .. } => "inference.posted",
            OracleEvent::InferenceDisputed { .. } => "inference.disputed",
            OracleEvent::InferenceSettled { .. } => "inference.settled",
            OracleEvent::InferenceFinalized { .. } => "inference.finalized",
            OracleEvent::ConfigUpdated { .. } => "oracle.config_updated",
            OracleEvent::OraclePaused { .. } => "oracle.paused",
            OracleEvent::OracleResumed { .. } => "oracle.resumed",
        }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            // Money changed hands or the guard state flipped
            OracleEvent::InferenceDisputed { .. }
            | OracleEvent::InferenceSettled { .. }
            | OracleEvent::OraclePaused { .. }
            | OracleEvent::OracleResumed { .. } => EventPriority::High,

            // Lifecycle progress
            OracleEvent::InferenceRequested { .. }
            | OracleEvent::InferencePosted { .. }
            | OracleEvent::InferenceFinalized { .. }
            | OracleEvent::ConfigUpdated { .. } => EventPriority::Medium,

            // Registry churn
            OracleEvent::ProverRegistered { .. }
            | OracleEvent::ProverStakeIncreased { .. }
            | OracleEvent::ProverUnregistered { .. } => EventPriority::Low,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OracleEvent::ProverRegistered { timestamp, .. }
            | OracleEvent::ProverStakeIncreased { timestamp, .. }
            | OracleEvent::ProverUnregistered { timestamp, .. }
            | OracleEvent::InferenceRequested { timestamp, .. }
            | OracleEvent::InferencePosted { timestamp, .. }
            | OracleEvent::InferenceDisputed { timestamp, .. }
            | OracleEvent::InferenceSettled { timestamp, .. }
            | OracleEvent::InferenceFinalized { timestamp, .. }
            | OracleEvent::ConfigUpdated { timestamp, .. }
            | OracleEvent::OraclePaused { timestamp }
            | OracleEvent::OracleResumed { timestamp } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPriority {
    High,
    Medium,
    Low,
}

/// Priority-channelled broadcast bus for oracle events.
pub struct EventBus {
    high_priority: broadcast::Sender<OracleEvent>,
    medium_priority: broadcast::Sender<OracleEvent>,
    low_priority: broadcast::Sender<OracleEvent>,
    emitted: Arc<std::sync::atomic::AtomicU64>,
    pub events_emitted_total: Option<Arc<prometheus::IntCounter>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (high_tx, _) = broadcast::channel(HIGH_PRIORITY_BUFFER);
        let (medium_tx, _) = broadcast::channel(MEDIUM_PRIORITY_BUFFER);
        let (low_tx, _) = broadcast::channel(LOW_PRIORITY_BUFFER);

        Self {
            high_priority: high_tx,
            medium_priority: medium_tx,
            low_priority: low_tx,
            emitted: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            events_emitted_total: None,
        }
    }

    /// Set metrics for event tracking
    pub fn set_metrics(&mut self, events_emitted_total: Arc<prometheus::IntCounter>) {
        self.events_emitted_total = Some(events_emitted_total);
    }

    /// Subscribe to all event channels
    ///
    /// Returns three receivers: (high, medium, low)
    pub fn subscribe_all(
        &self,
    ) -> (
        broadcast::Receiver<OracleEvent>,
        broadcast::Receiver<OracleEvent>,
        broadcast::Receiver<OracleEvent>,
    ) {
        (
            self.high_priority.subscribe(),
            self.medium_priority.subscribe(),
            self.low_priority.subscribe(),
        )
    }

    pub fn subscribe_high_priority(&self) -> broadcast::Receiver<OracleEvent> {
        self.high_priority.subscribe()
    }

    pub fn subscribe_medium_priority(&self) -> broadcast::Receiver<OracleEvent> {
        self.medium_priority.subscribe()
    }

    pub fn subscribe_low_priority(&self) -> broadcast::Receiver<OracleEvent> {
        self.low_priority.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Events route to the channel matching their priority. With no
    /// subscribers the event is dropped, which is expected.
    pub fn emit(&self, event: OracleEvent) {
        let channel = match event.priority() {
            EventPriority::High => &self.high_priority,
            EventPriority::Medium => &self.medium_priority,
            EventPriority::Low => &self.low_priority,
        };

        match channel.send(event.clone()) {
            Ok(subscriber_count) => {
                debug!(
                    event_type = event.event_type(),
                    priority = ?event.priority(),
                    subscribers = subscriber_count,
                    "Event emitted"
                );
                self.emitted
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if let Some(ref counter) = self.events_emitted_total {
                    counter.inc();
                }
            }
            Err(_) => {
                debug!(
                    event_type = event.event_type(),
                    "Event dropped, no subscribers"
                );
            }
        }
    }

    pub fn total_events_emitted(&self) -> u64 {
        self.emitted.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn has_subscribers(&self) -> bool {
        self.high_priority.receiver_count() > 0
            || self.medium_priority.receiver_count() > 0
            || self.low_priority.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized_event() -> OracleEvent {
        OracleEvent::InferenceFinalized {
            request_id: 1,
            prover: "0xabcd".to_string(),
            total_reward: VeriAmount::from_veri(0.6),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_medium_priority();

        bus.emit(finalized_event());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "inference.finalized");
        assert_eq!(bus.total_events_emitted(), 1);
    }

    #[tokio::test]
    async fn test_priority_routing() {
        let bus = EventBus::new();
        let mut high_rx = bus.subscribe_high_priority();
        let mut low_rx = bus.subscribe_low_priority();

        bus.emit(OracleEvent::OraclePaused {
            timestamp: Utc::now(),
        });
        bus.emit(OracleEvent::ProverRegistered {
            prover: "0x01".to_string(),
            stake: VeriAmount::from_veri(0.5),
            timestamp: Utc::now(),
        });

        assert_eq!(high_rx.recv().await.unwrap().event_type(), "oracle.paused");
        assert_eq!(
            low_rx.recv().await.unwrap().event_type(),
            "prover.registered"
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_count() {
        let bus = EventBus::new();
        bus.emit(finalized_event());
        assert_eq!(bus.total_events_emitted(), 0);
        assert!(!bus.has_subscribers());
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(finalized_event()).unwrap();
        assert_eq!(json["type"], "InferenceFinalized");
        assert_eq!(json["data"]["request_id"], 1);
        assert!(json["data"]["timestamp"].is_number());
    }
}
