//! # Veritor Node
//!
//! Operational shell around the oracle engine: TOML configuration with
//! environment overrides, storage backend selection, genesis allocation,
//! the HTTP API, Prometheus metrics, and structured logging. The node adds
//! no oracle semantics of its own; every rule lives in `veritor-oracle`.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod node;

pub use config::NodeConfig;
pub use metrics::Metrics;
pub use node::VeritorNode;
