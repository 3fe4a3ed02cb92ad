use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use serde_json::Value;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::chain::Ledger;

use super::rate_limit::RateLimiter;

/// Largest integer a JSON client can send without losing precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone)]
pub struct RelayRequest {
    /// Raw body value; only interpreted after auth and rate checks pass.
    pub id: Value,
    pub caller_identity: String,
    pub supplied_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub hash: TxHash,
    pub confirmed: bool,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited,

    #[error("id must be a positive integer")]
    InvalidId,

    #[error("{0}")]
    Submission(String),

    #[error("transaction {hash} was broadcast but not confirmed: {reason}")]
    Confirmation { hash: TxHash, reason: String },
}

pub struct RelayService {
    ledger: Arc<dyn Ledger>,
    contract: Address,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    // One signing credential: broadcasts must not interleave or nonces collide
    submit_lock: Mutex<()>,
}

impl RelayService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        contract: Address,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        if api_key.is_some() {
            tracing::info!("Relayer API key configured");
        } else {
            tracing::warn!("No relayer API key configured, /like is open to any caller");
        }

        Self {
            ledger,
            contract,
            api_key,
            limiter,
            submit_lock: Mutex::new(()),
        }
    }

    pub async fn relay_like(&self, request: RelayRequest) -> Result<TransactionOutcome, RelayError> {
        let caller = request.caller_identity.as_str();
        let raw_id = &request.id;

        if !self.is_authorized(request.supplied_key.as_deref()) {
            tracing::warn!(id = %raw_id, caller, outcome = "unauthorized", "Relay request rejected");
            return Err(RelayError::Unauthorized);
        }
        tracing::debug!(id = %raw_id, caller, outcome = "auth_checked", "Relay request authorized");

        let decision = self.limiter.check(caller);
        if !decision.allowed {
            tracing::warn!(
                id = %raw_id,
                caller,
                count = decision.count,
                outcome = "rate_limited",
                "Relay request rejected"
            );
            return Err(RelayError::RateLimited);
        }
        tracing::debug!(id = %raw_id, caller, count = decision.count, outcome = "rate_checked", "Relay request within quota");

        let Some(id) = parse_id(raw_id) else {
            tracing::warn!(id = %raw_id, caller, outcome = "invalid_id", "Relay request rejected");
            return Err(RelayError::InvalidId);
        };
        tracing::debug!(id, caller, outcome = "validated", "Relay request validated");

        let hash = {
            let _guard = self.submit_lock.lock().await;
            self.ledger
                .send_like(self.contract, id)
                .await
                .map_err(|e| {
                    tracing::error!(id, caller, outcome = "submission_failed", "Failed to like message: {e}");
                    RelayError::Submission(e.to_string())
                })?
        };
        tracing::info!(id, caller, %hash, outcome = "submitted", "Like transaction broadcast");

        let receipt = self.ledger.wait_for_confirmation(hash).await.map_err(|e| {
            tracing::error!(id, caller, %hash, outcome = "confirmation_failed", "Failed to confirm like: {e}");
            RelayError::Confirmation {
                hash,
                reason: e.to_string(),
            }
        })?;

        if !receipt.success {
            tracing::error!(id, caller, %hash, outcome = "reverted", "Like transaction reverted");
            return Err(RelayError::Confirmation {
                hash,
                reason: "transaction reverted".into(),
            });
        }

        tracing::info!(id, caller, %hash, outcome = "confirmed", "Message liked");
        Ok(TransactionOutcome {
            hash: receipt.hash,
            confirmed: true,
        })
    }

    fn is_authorized(&self, supplied: Option<&str>) -> bool {
        match (&self.api_key, supplied) {
            (None, _) => true,
            (Some(expected), Some(supplied)) => {
                bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
            }
            (Some(_), None) => false,
        }
    }
}

/// Positive integer ids only; integral floats such as `7.0` count as integers.
pub fn parse_id(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };

    n.as_u64()
        .or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= MAX_SAFE_INTEGER)
                .map(|f| f as u64)
        })
        .filter(|id| *id > 0)
}
