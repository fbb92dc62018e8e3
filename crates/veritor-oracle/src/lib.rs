//! # Veritor Oracle
//!
//! The optimistic-verification core: coordinates a requester, a prover, and
//! an optional challenger around an off-chain AI inference whose correctness
//! is too expensive to check directly. A prover posts a claimed result backed
//! by stake; if nobody disputes it inside a fixed window the result is
//! accepted and the prover is paid, otherwise a fully collateralized
//! challenge settles the request against the prover.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending --post--> Posted --finalize (window closed)--> Finalized
//!                     |
//!                     +--dispute (window open)---------> Settled
//! ```
//!
//! Every transition is caller-triggered and runs to completion behind an
//! engine-wide lock; there is no background processing. Fund custody is
//! delegated to `veritor-economics`; this crate decides *who* gets paid,
//! never *how* balances move.
//!
//! ## Components
//!
//! - [`OracleEngine`] — every externally visible operation, pause and owner
//!   guards, checks-effects-interactions ordering.
//! - [`ProverRegistry`] — registered provers and their free bond accounting.
//! - [`RequestLedger`] — sequential request ids and the permanent record of
//!   every request.
//! - [`EventBus`] — broadcast notifications carrying enough detail to
//!   reconstruct state without re-querying.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod types;

pub use config::{OracleConfig, MIN_DISPUTE_WINDOW_SECS};
pub use engine::{OracleEngine, OracleStats};
pub use error::{OracleError, Result};
pub use events::{EventBus, EventPriority, OracleEvent};
pub use ledger::{LedgerStats, RequestLedger};
pub use registry::{ProverAccount, ProverRegistry, RegistryStats};
pub use types::{InferenceRequest, InferenceStatus, ModelHash, RequestId};
