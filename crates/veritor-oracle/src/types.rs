use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use veritor_economics::{AccountAddress, VeriAmount};

/// Sequentially assigned request identifier. The first assigned id is 1;
/// id 0 is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque 256-bit content identifier of the model being queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHash([u8; 32]);

impl ModelHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Model hash must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for ModelHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}..", hex::encode(&self.0[..8]))
    }
}

/// Request lifecycle status.
///
/// Wire indices are stable: Pending=0, Posted=1, Disputed=2, Finalized=3,
/// Settled=4. `Disputed` is an intermediate status for staged dispute
/// flows; the current dispute path settles in a single step and never
/// rests a request there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceStatus {
    Pending,
    Posted,
    Disputed,
    Finalized,
    Settled,
}

impl InferenceStatus {
    pub fn index(&self) -> u8 {
        match self {
            InferenceStatus::Pending => 0,
            InferenceStatus::Posted => 1,
            InferenceStatus::Disputed => 2,
            InferenceStatus::Finalized => 3,
            InferenceStatus::Settled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InferenceStatus::Finalized | InferenceStatus::Settled)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        use InferenceStatus::*;
        match (self, next) {
            // From Pending
            (Pending, Posted) => true,

            // From Posted
            (Posted, Disputed) => true,  // staged dispute entry
            (Posted, Settled) => true,   // single-phase dispute settlement
            (Posted, Finalized) => true, // window elapsed unchallenged

            // From Disputed
            (Disputed, Settled) => true,

            // Terminal states cannot transition
            (Finalized, _) | (Settled, _) => false,

            // All other transitions are invalid
            _ => false,
        }
    }
}

impl fmt::Display for InferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InferenceStatus::Pending => "Pending",
            InferenceStatus::Posted => "Posted",
            InferenceStatus::Disputed => "Disputed",
            InferenceStatus::Finalized => "Finalized",
            InferenceStatus::Settled => "Settled",
        };
        write!(f, "{}", name)
    }
}

/// Full record of one inference request. Records are never deleted;
/// finalized and settled entries stay queryable as the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub id: RequestId,
    pub requester: AccountAddress,
    pub prover: Option<AccountAddress>,
    pub challenger: Option<AccountAddress>,
    pub model_hash: ModelHash,
    pub input_data: Vec<u8>,
    pub output_data: Option<Vec<u8>>,
    pub counter_example: Option<Vec<u8>>,
    pub requester_stake: VeriAmount,
    pub prover_stake: VeriAmount,
    pub challenger_stake: VeriAmount,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub dispute_deadline: Option<DateTime<Utc>>,
    pub status: InferenceStatus,
    pub inference_valid: Option<bool>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl InferenceRequest {
    pub fn new(
        id: RequestId,
        requester: AccountAddress,
        model_hash: ModelHash,
        input_data: Vec<u8>,
        requester_stake: VeriAmount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester,
            prover: None,
            challenger: None,
            model_hash,
            input_data,
            output_data: None,
            counter_example: None,
            requester_stake,
            prover_stake: VeriAmount::ZERO,
            challenger_stake: VeriAmount::ZERO,
            dispute_deadline: None,
            status: InferenceStatus::Pending,
            inference_valid: None,
            created_at,
            settled_at: None,
        }
    }

    /// Enforced status change. Use this instead of assigning `status`
    /// directly so the one-directional transition rules always hold.
    pub fn transition_to(&mut self, new_status: InferenceStatus) -> crate::error::Result<()> {
        if !self.status.can_transition_to(&new_status) {
            return Err(crate::error::OracleError::InvalidState(format!(
                "request {} cannot move from {} to {}",
                self.id, self.status, new_status
            )));
        }

        tracing::debug!(
            request_id = self.id.value(),
            from = %self.status,
            to = %new_status,
            "Request status transition"
        );
        self.status = new_status;
        Ok(())
    }

    /// True while a challenge is still accepted: the deadline is set and
    /// `now` is strictly before it.
    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        matches!(self.dispute_deadline, Some(deadline) if now < deadline)
    }

    /// True once finalization is allowed: the deadline is set and `now`
    /// has reached it.
    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.dispute_deadline, Some(deadline) if now >= deadline)
    }
}
