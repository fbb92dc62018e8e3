use crate::types::RequestId;
use thiserror::Error;
use veritor_economics::VeriAmount;

/// Oracle error types
#[derive(Error, Debug)]
pub enum OracleError {
    /// Amount below a required threshold (registration, request, or dispute)
    #[error("Insufficient stake: required {required}, provided {provided}")]
    InsufficientStake {
        required: VeriAmount,
        provided: VeriAmount,
    },

    /// Unknown or zero request id
    #[error("Request not found: {0}")]
    NotFound(RequestId),

    /// Caller lacks the role the operation requires
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not permitted from the request's current status or timing
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Global pause guard is active
    #[error("Oracle is paused")]
    Paused,

    /// Admin supplied a zero or degenerate parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Custody-layer failure; indicates a broken invariant, not caller error
    #[error("Internal invariant violation: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OracleError {
    /// Stable machine-readable tag, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::InsufficientStake { .. } => "insufficient_stake",
            OracleError::NotFound(_) => "not_found",
            OracleError::Unauthorized(_) => "unauthorized",
            OracleError::InvalidState(_) => "invalid_state",
            OracleError::Paused => "paused",
            OracleError::InvalidConfiguration(_) => "invalid_configuration",
            OracleError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
