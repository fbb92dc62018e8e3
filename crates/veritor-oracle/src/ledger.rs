use crate::error::{OracleError, Result};
use crate::types::{InferenceRequest, InferenceStatus, ModelHash, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use veritor_economics::{AccountAddress, VeriAmount};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_requests: u64,
    pub pending: usize,
    pub posted: usize,
    pub finalized: usize,
    pub settled: usize,
}

/// Stores every inference request under a sequentially assigned id.
///
/// Ids start at 1 and are never reused; records are never deleted, so a
/// terminal request stays queryable as the audit trail.
pub struct RequestLedger {
    requests: Arc<RwLock<HashMap<RequestId, InferenceRequest>>>,
    next_request_id: Arc<RwLock<u64>>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            next_request_id: Arc::new(RwLock::new(1)),
        }
    }

    /// Admit a new request and assign the next id. Callers run every guard
    /// first; a rejected request must never consume an id.
    pub async fn create(
        &self,
        requester: AccountAddress,
        model_hash: ModelHash,
        input_data: Vec<u8>,
        requester_stake: VeriAmount,
        now: DateTime<Utc>,
    ) -> RequestId {
        let mut next_id = self.next_request_id.write().await;
        let id = RequestId(*next_id);
        *next_id += 1;

        let request = InferenceRequest::new(id, requester, model_hash, input_data, requester_stake, now);
        let mut requests = self.requests.write().await;
        requests.insert(id, request);

        debug!(request_id = id.value(), requester = %requester, "Request admitted to ledger");
        id
    }

    pub async fn get(&self, id: RequestId) -> Result<InferenceRequest> {
        if !id.is_valid() {
            return Err(OracleError::NotFound(id));
        }
        let requests = self.requests.read().await;
        requests.get(&id).cloned().ok_or(OracleError::NotFound(id))
    }

    /// Replace a request record. The record must already exist; the ledger
    /// never admits new ids through this path.
    pub async fn put(&self, request: InferenceRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(OracleError::NotFound(request.id));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    /// Last assigned request id; 0 before the first request.
    pub async fn current_request_id(&self) -> u64 {
        let next_id = self.next_request_id.read().await;
        *next_id - 1
    }

    pub async fn stats(&self) -> LedgerStats {
        let requests = self.requests.read().await;
        let mut stats = LedgerStats {
            total_requests: requests.len() as u64,
            pending: 0,
            posted: 0,
            finalized: 0,
            settled: 0,
        };
        for request in requests.values() {
            match request.status {
                InferenceStatus::Pending => stats.pending += 1,
                InferenceStatus::Posted | InferenceStatus::Disputed => stats.posted += 1,
                InferenceStatus::Finalized => stats.finalized += 1,
                InferenceStatus::Settled => stats.settled += 1,
            }
        }
        stats
    }
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new()
    }
}
