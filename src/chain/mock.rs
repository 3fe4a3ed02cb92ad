use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;

use crate::error::Result;

use super::ledger::{Ledger, OnChainMessage, Receipt};

#[derive(Debug, Default)]
pub struct Calls {
    /// `(from, to)` of every `get_logs`; `to` is `None` for `latest`.
    pub log_queries: Vec<(Option<u64>, Option<u64>)>,
    pub block_number: usize,
    pub message_reads: Vec<u64>,
    pub likes: Vec<u64>,
    pub confirmations: Vec<TxHash>,
}

/// In-memory node. Logs are served by block range; ranges wider than
/// `max_range` or listed in `failing_ranges` fail like a provider would.
#[derive(Default)]
pub struct MockLedger {
    pub logs: Vec<Log>,
    pub head: u64,
    pub max_range: Option<u64>,
    pub failing_ranges: Vec<(u64, u64)>,
    pub messages: HashMap<u64, OnChainMessage>,
    pub failing_reads: HashSet<u64>,
    pub fail_send: bool,
    pub fail_confirm: bool,
    pub revert: bool,
    pub send_delay: Option<Duration>,
    pub calls: Mutex<Calls>,
    pub in_flight_sends: AtomicUsize,
    pub max_in_flight_sends: AtomicUsize,
}

impl MockLedger {
    pub fn with_messages(messages: impl IntoIterator<Item = OnChainMessage>) -> Self {
        Self {
            messages: messages.into_iter().map(|m| (m.id, m)).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_in_flight_sends.load(Ordering::SeqCst)
    }
}

pub fn message(id: u64, timestamp: u64) -> OnChainMessage {
    OnChainMessage {
        id,
        author: Address::repeat_byte(0xaa),
        text: format!("message {id}"),
        likes: 0,
        timestamp,
    }
}

pub fn tx_hash_for(id: u64) -> TxHash {
    TxHash::left_padding_from(&id.to_be_bytes())
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let from = filter.get_from_block();
        let to = filter.get_to_block();
        self.calls().log_queries.push((from, to));

        let start = from.unwrap_or(0);
        let end = to.unwrap_or(self.head);

        if self.failing_ranges.contains(&(start, end)) {
            return Err(TransportErrorKind::custom_str("internal error").into());
        }
        if let Some(max) = self.max_range {
            if end.saturating_sub(start) + 1 > max {
                return Err(
                    TransportErrorKind::custom_str("query exceeds max block range").into(),
                );
            }
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .map(|b| b >= start && b <= end)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64> {
        self.calls().block_number += 1;
        Ok(self.head)
    }

    async fn get_message(&self, _contract: Address, id: u64) -> Result<Option<OnChainMessage>> {
        self.calls().message_reads.push(id);
        if self.failing_reads.contains(&id) {
            return Err(TransportErrorKind::custom_str("execution reverted").into());
        }
        Ok(self.messages.get(&id).cloned())
    }

    async fn send_like(&self, _contract: Address, id: u64) -> Result<TxHash> {
        let in_flight = self.in_flight_sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_sends.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        self.calls().likes.push(id);
        self.in_flight_sends.fetch_sub(1, Ordering::SeqCst);

        if self.fail_send {
            return Err(TransportErrorKind::custom_str("insufficient funds for gas").into());
        }
        Ok(tx_hash_for(id))
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt> {
        self.calls().confirmations.push(hash);
        if self.fail_confirm {
            return Err(TransportErrorKind::custom_str("connection reset").into());
        }
        Ok(Receipt {
            hash,
            success: !self.revert,
        })
    }
}
