use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use serde::Serialize;

use crate::error::Result;

use super::decode::EventRecord;
use super::fetcher::{BlockRange, LogFetcher};
use super::ledger::Ledger;

/// Field names a message id may be decoded under, in lookup order.
const ID_FIELDS: [&str; 2] = ["id", "_id"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: u64,
    pub author: Address,
    pub text: String,
    #[serde(rename = "likes")]
    pub like_count: u64,
    pub timestamp: u64,
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedMessage {
    pub id: u64,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MessageListing {
    /// Newest first.
    pub messages: Vec<MessageRecord>,
    pub skipped: Vec<SkippedMessage>,
}

pub struct MessageAggregator {
    ledger: Arc<dyn Ledger>,
    fetcher: LogFetcher,
    contract: Address,
    deployment_block: u64,
    chunk_size: u64,
    event_candidates: Vec<String>,
}

impl MessageAggregator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        fetcher: LogFetcher,
        contract: Address,
        deployment_block: u64,
        chunk_size: u64,
        event_candidates: Vec<String>,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            contract,
            deployment_block,
            chunk_size,
            event_candidates,
        }
    }

    pub async fn list_messages(&self) -> Result<MessageListing> {
        let events = self
            .fetcher
            .fetch_events(
                self.contract,
                self.event_candidates.as_slice(),
                BlockRange::to_latest(self.deployment_block),
                self.chunk_size,
            )
            .await?;

        tracing::debug!(events = events.len(), "Fetched message events");

        let mut listing = MessageListing::default();

        for id in distinct_ids(&events) {
            match self.ledger.get_message(self.contract, id).await {
                Ok(Some(message)) => listing.messages.push(MessageRecord {
                    id: message.id,
                    author: message.author,
                    text: message.text,
                    like_count: message.likes,
                    timestamp: message.timestamp,
                    tx_hash: origin_tx(&events, id),
                }),
                Ok(None) => {
                    tracing::warn!(id, "Skipping message id with no on-chain record");
                    listing.skipped.push(SkippedMessage {
                        id,
                        reason: "message not found".into(),
                    });
                }
                Err(e) => {
                    tracing::warn!(id, "Skipping invalid message id: {e}");
                    listing.skipped.push(SkippedMessage {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Stable: equal timestamps keep event order
        listing
            .messages
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(listing)
    }
}

fn event_id(event: &EventRecord) -> Option<u64> {
    ID_FIELDS
        .iter()
        .find_map(|name| event.fields.get(name))
        .and_then(|value| value.as_u64())
        .filter(|id| *id != 0)
}

/// Non-zero ids in first-seen order.
fn distinct_ids(events: &[EventRecord]) -> Vec<u64> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for event in events {
        match event_id(event) {
            Some(id) if seen.insert(id) => ids.push(id),
            Some(_) => {}
            None => tracing::debug!(
                event = event.event_name,
                contract = %event.contract_address,
                block = ?event.block_number,
                log_index = ?event.log_index,
                "Dropping event without a usable message id"
            ),
        }
    }

    ids
}

fn origin_tx(events: &[EventRecord], id: u64) -> Option<TxHash> {
    events
        .iter()
        .find(|event| event_id(event) == Some(id))
        .and_then(|event| event.transaction_hash)
}
