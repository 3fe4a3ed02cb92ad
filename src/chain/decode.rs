use std::collections::BTreeMap;

use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::error::{RelayerError, Result};

use super::events::MessageBoard::{MessageCreated, MessageLiked};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(U256),
    Address(Address),
    Text(String),
}

impl FieldValue {
    /// Integer view of the field; `None` for non-numeric or oversized values.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Uint(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

pub type DecodedFields = BTreeMap<&'static str, FieldValue>;

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_name: &'static str,
    pub contract_address: Address,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub fields: DecodedFields,
}

/// Declared layout of one contract event.
#[derive(Debug)]
pub struct EventShape {
    pub name: &'static str,
    pub signature_hash: B256,
    decoder: fn(&Log) -> Option<DecodedFields>,
}

impl EventShape {
    pub fn decode(&self, log: &Log) -> Option<EventRecord> {
        if log.topics().first() != Some(&self.signature_hash) {
            return None;
        }

        let fields = (self.decoder)(log)?;

        Some(EventRecord {
            event_name: self.name,
            contract_address: log.address(),
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
            fields,
        })
    }
}

pub static KNOWN_EVENTS: &[EventShape] = &[
    EventShape {
        name: "MessageCreated",
        signature_hash: MessageCreated::SIGNATURE_HASH,
        decoder: decode_message_created,
    },
    EventShape {
        name: "MessageLiked",
        signature_hash: MessageLiked::SIGNATURE_HASH,
        decoder: decode_message_liked,
    },
];

/// Picks the first candidate present in the known event set.
pub fn resolve_event<S: AsRef<str>>(candidates: &[S]) -> Result<&'static EventShape> {
    candidates
        .iter()
        .find_map(|name| KNOWN_EVENTS.iter().find(|shape| shape.name == name.as_ref()))
        .ok_or_else(|| RelayerError::UnknownEvent {
            candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
}

fn decode_message_created(log: &Log) -> Option<DecodedFields> {
    let decoded = MessageCreated::decode_log(&log.inner, true).ok()?;

    Some(BTreeMap::from([
        ("id", FieldValue::Uint(decoded.id)),
        ("author", FieldValue::Address(decoded.author)),
        ("text", FieldValue::Text(decoded.text.clone())),
        ("timestamp", FieldValue::Uint(decoded.timestamp)),
    ]))
}

fn decode_message_liked(log: &Log) -> Option<DecodedFields> {
    let decoded = MessageLiked::decode_log(&log.inner, true).ok()?;

    Some(BTreeMap::from([
        ("id", FieldValue::Uint(decoded.id)),
        ("liker", FieldValue::Address(decoded.liker)),
    ]))
}
