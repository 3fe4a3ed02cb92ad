pub mod aggregator;
pub mod decode;
pub mod events;
pub mod fetcher;
pub mod ledger;

#[cfg(test)]
pub mod mock;

pub use aggregator::{MessageAggregator, MessageRecord};
pub use fetcher::{FetchPolicy, LogFetcher, DEFAULT_EVENT_CANDIDATES};
pub use ledger::{AlloyLedger, Ledger};
