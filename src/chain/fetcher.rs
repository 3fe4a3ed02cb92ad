use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::rpc::types::{Filter, Log};
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};

use crate::error::{RelayerError, Result};

use super::decode::{resolve_event, EventRecord, EventShape};
use super::ledger::Ledger;

pub const DEFAULT_EVENT_CANDIDATES: &[&str] = &["MessageCreated", "MessageWritten"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTarget {
    Number(u64),
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: BlockTarget,
}

impl BlockRange {
    pub fn to_latest(from: u64) -> Self {
        Self {
            from,
            to: BlockTarget::Latest,
        }
    }

    pub fn between(from: u64, to: u64) -> Self {
        Self {
            from,
            to: BlockTarget::Number(to),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// One full-range query, falling back to chunks if the node rejects it.
    #[default]
    OptimisticThenChunked,
    ChunkedOnly,
}

impl FromStr for FetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimistic" => Ok(Self::OptimisticThenChunked),
            "chunked" => Ok(Self::ChunkedOnly),
            other => Err(format!("unknown fetch mode '{other}', expected 'optimistic' or 'chunked'")),
        }
    }
}

/// Single query over the whole range.
pub struct Optimistic;

impl Optimistic {
    pub async fn fetch(&self, ledger: &dyn Ledger, base: &Filter, range: BlockRange) -> Result<Vec<Log>> {
        let to = match range.to {
            BlockTarget::Number(n) => BlockNumberOrTag::Number(n),
            BlockTarget::Latest => BlockNumberOrTag::Latest,
        };
        let filter = base.clone().from_block(range.from).to_block(to);
        ledger.get_logs(&filter).await
    }
}

/// Consecutive sub-range queries, strictly sequential and ascending.
pub struct Chunked<'a> {
    pub chunk_size: NonZeroU64,
    pub limiter: &'a DefaultDirectRateLimiter,
}

impl Chunked<'_> {
    pub async fn fetch(&self, ledger: &dyn Ledger, base: &Filter, range: BlockRange) -> Result<Vec<Log>> {
        // Snapshot the head once so every chunk sees the same upper bound
        let end = match range.to {
            BlockTarget::Number(n) => n,
            BlockTarget::Latest => ledger.block_number().await?,
        };

        if range.from > end {
            return Ok(Vec::new());
        }

        let total_blocks = end - range.from + 1;
        let mut logs = Vec::new();

        for (chunk_start, chunk_end) in chunk_ranges(range.from, end, self.chunk_size) {
            self.limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;

            let filter = base.clone().from_block(chunk_start).to_block(chunk_end);
            let chunk = ledger
                .get_logs(&filter)
                .await
                .map_err(|e| RelayerError::ChunkFetch {
                    from: chunk_start,
                    to: chunk_end,
                    source: Box::new(e),
                })?;

            logs.extend(chunk);

            let progress = (chunk_end - range.from + 1) as f64 / total_blocks as f64 * 100.0;
            tracing::debug!(
                "Chunk {}-{} done ({:.1}%), {} logs so far",
                chunk_start,
                chunk_end,
                progress,
                logs.len()
            );
        }

        Ok(logs)
    }
}

/// Inclusive `[start, end]` split into `size`-block chunks, the last one clipped.
pub fn chunk_ranges(start: u64, end: u64, size: NonZeroU64) -> impl Iterator<Item = (u64, u64)> {
    let span = size.get() - 1;
    let mut next = Some(start).filter(|s| *s <= end);

    std::iter::from_fn(move || {
        let chunk_start = next?;
        let chunk_end = chunk_start.saturating_add(span).min(end);
        next = chunk_end.checked_add(1).filter(|n| *n <= end);
        Some((chunk_start, chunk_end))
    })
}

pub struct LogFetcher {
    ledger: Arc<dyn Ledger>,
    policy: FetchPolicy,
    limiter: DefaultDirectRateLimiter,
}

impl LogFetcher {
    pub fn new(ledger: Arc<dyn Ledger>, requests_per_second: NonZeroU32) -> Self {
        Self {
            ledger,
            policy: FetchPolicy::default(),
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn fetch_events<S>(
        &self,
        address: Address,
        candidates: &[S],
        range: BlockRange,
        chunk_size: u64,
    ) -> Result<Vec<EventRecord>>
    where
        S: AsRef<str> + Sync,
    {
        let shape = resolve_event(candidates)?;
        let chunk_size = NonZeroU64::new(chunk_size).ok_or(RelayerError::InvalidChunkSize)?;

        if let BlockTarget::Number(to) = range.to {
            if range.from > to {
                return Ok(Vec::new());
            }
        }

        let base = Filter::new()
            .address(address)
            .event_signature(shape.signature_hash);
        let ledger = self.ledger.as_ref();
        let chunked = Chunked {
            chunk_size,
            limiter: &self.limiter,
        };

        let logs = match self.policy {
            FetchPolicy::ChunkedOnly => chunked.fetch(ledger, &base, range).await?,
            FetchPolicy::OptimisticThenChunked => match Optimistic.fetch(ledger, &base, range).await {
                Ok(logs) => logs,
                Err(e) => {
                    tracing::warn!(
                        event = shape.name,
                        from = range.from,
                        "Full-range log query failed ({e}), falling back to {}-block chunks",
                        chunk_size
                    );
                    chunked.fetch(ledger, &base, range).await?
                }
            },
        };

        Ok(decode_all(shape, &logs))
    }
}

fn decode_all(shape: &EventShape, logs: &[Log]) -> Vec<EventRecord> {
    let records: Vec<_> = logs.iter().filter_map(|log| shape.decode(log)).collect();

    let skipped = logs.len() - records.len();
    if skipped > 0 {
        tracing::debug!(event = shape.name, skipped, "Skipped logs that did not decode");
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::decode::tests::message_created_log;
    use crate::chain::mock::MockLedger;
    use alloy::primitives::address;
    use nonzero_ext::nonzero;

    const BOARD: Address = address!("c6ada2982604e78e77fa16942389f4e1c82410ce");

    fn fetcher(ledger: &Arc<MockLedger>) -> LogFetcher {
        LogFetcher::new(ledger.clone(), nonzero!(1000u32))
    }

    fn ledger_with_logs(blocks: &[u64]) -> MockLedger {
        MockLedger {
            logs: blocks
                .iter()
                .enumerate()
                .map(|(i, b)| message_created_log(i as u64 + 1, *b, i as u8 + 1))
                .collect(),
            head: 1_000,
            ..Default::default()
        }
    }

    fn ids(records: &[EventRecord]) -> Vec<u64> {
        records.iter().filter_map(|r| r.fields["id"].as_u64()).collect()
    }

    #[test]
    fn fetch_mode_parses_from_config_strings() {
        assert_eq!("optimistic".parse::<FetchPolicy>(), Ok(FetchPolicy::OptimisticThenChunked));
        assert_eq!("Chunked".parse::<FetchPolicy>(), Ok(FetchPolicy::ChunkedOnly));
        assert!("parallel".parse::<FetchPolicy>().is_err());
    }

    #[test]
    fn chunks_cover_range_and_clip_last() {
        let chunks: Vec<_> = chunk_ranges(0, 25, nonzero!(10u64)).collect();
        assert_eq!(chunks, vec![(0, 9), (10, 19), (20, 25)]);

        let single: Vec<_> = chunk_ranges(7, 7, nonzero!(100u64)).collect();
        assert_eq!(single, vec![(7, 7)]);

        assert_eq!(chunk_ranges(10, 9, nonzero!(1u64)).count(), 0);
    }

    #[test]
    fn chunks_do_not_overflow_at_the_top_of_the_range() {
        let chunks: Vec<_> = chunk_ranges(u64::MAX - 2, u64::MAX, nonzero!(2u64)).collect();
        assert_eq!(
            chunks,
            vec![(u64::MAX - 2, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn optimistic_query_is_used_when_it_succeeds() {
        let ledger = Arc::new(ledger_with_logs(&[10, 20, 30]));

        let records = fetcher(&ledger)
            .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::to_latest(0), 10)
            .await
            .unwrap();

        assert_eq!(ids(&records), vec![1, 2, 3]);
        let calls = ledger.calls();
        assert_eq!(calls.log_queries, vec![(Some(0), None)]);
        assert_eq!(calls.block_number, 0);
    }

    #[tokio::test]
    async fn falls_back_to_sequential_chunks_with_a_snapshotted_head() {
        let mut ledger = ledger_with_logs(&[5, 12, 12, 27, 40]);
        ledger.head = 35;
        ledger.max_range = Some(10);
        let ledger = Arc::new(ledger);

        let records = fetcher(&ledger)
            .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::to_latest(3), 10)
            .await
            .unwrap();

        assert_eq!(ids(&records), vec![1, 2, 3, 4]);
        let calls = ledger.calls();
        assert_eq!(calls.block_number, 1);
        assert_eq!(
            calls.log_queries,
            vec![
                (Some(3), None),
                (Some(3), Some(12)),
                (Some(13), Some(22)),
                (Some(23), Some(32)),
                (Some(33), Some(35)),
            ]
        );
    }

    #[tokio::test]
    async fn chunked_output_matches_single_query_output() {
        let blocks = [0, 1, 1, 9, 10, 11, 54, 99, 100];
        let expected = {
            let ledger = Arc::new(ledger_with_logs(&blocks));
            fetcher(&ledger)
                .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::between(0, 100), 7)
                .await
                .unwrap()
        };

        for chunk_size in [1, 3, 7, 50, 101, 1_000] {
            let ledger = Arc::new(ledger_with_logs(&blocks));
            let records = fetcher(&ledger)
                .with_policy(FetchPolicy::ChunkedOnly)
                .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::between(0, 100), chunk_size)
                .await
                .unwrap();

            assert_eq!(ids(&records), ids(&expected), "chunk size {chunk_size}");
            let hashes: Vec<_> = records.iter().map(|r| r.transaction_hash).collect();
            let expected_hashes: Vec<_> = expected.iter().map(|r| r.transaction_hash).collect();
            assert_eq!(hashes, expected_hashes);
        }
    }

    #[tokio::test]
    async fn inverted_range_issues_no_queries() {
        let ledger = Arc::new(ledger_with_logs(&[10]));

        let records = fetcher(&ledger)
            .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::between(50, 10), 10)
            .await
            .unwrap();

        assert!(records.is_empty());
        let calls = ledger.calls();
        assert!(calls.log_queries.is_empty());
        assert_eq!(calls.block_number, 0);
    }

    #[tokio::test]
    async fn head_below_start_yields_no_chunk_queries() {
        let mut ledger = ledger_with_logs(&[10]);
        ledger.head = 40;
        ledger.failing_ranges = vec![(100, 40)];
        let ledger = Arc::new(ledger);

        let records = fetcher(&ledger)
            .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::to_latest(100), 10)
            .await
            .unwrap();

        assert!(records.is_empty());
        // Only the rejected optimistic attempt
        assert_eq!(ledger.calls().log_queries, vec![(Some(100), None)]);
    }

    #[tokio::test]
    async fn chunk_failure_aborts_with_the_failing_range() {
        let ledger = Arc::new(MockLedger {
            max_range: Some(100_000),
            failing_ranges: vec![(500_000, 599_999)],
            head: 2_000_000,
            ..Default::default()
        });

        let err = fetcher(&ledger)
            .fetch_events(
                BOARD,
                DEFAULT_EVENT_CANDIDATES,
                BlockRange::between(0, 999_999),
                100_000,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayerError::ChunkFetch { from: 500_000, to: 599_999, .. }
        ));
        assert!(err.to_string().contains("500000-599999"), "{err}");

        // Optimistic attempt plus chunks up to and including the failing one
        let calls = ledger.calls();
        assert_eq!(calls.log_queries.len(), 7);
        assert_eq!(calls.log_queries.last(), Some(&(Some(500_000), Some(599_999))));
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected_before_querying() {
        let ledger = Arc::new(ledger_with_logs(&[10]));

        let err = fetcher(&ledger)
            .fetch_events(BOARD, DEFAULT_EVENT_CANDIDATES, BlockRange::to_latest(0), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayerError::InvalidChunkSize));
        assert!(ledger.calls().log_queries.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_names_fail_before_querying() {
        let ledger = Arc::new(ledger_with_logs(&[10]));

        let err = fetcher(&ledger)
            .fetch_events(BOARD, &["MessageWritten"], BlockRange::to_latest(0), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayerError::UnknownEvent { .. }));
        assert!(ledger.calls().log_queries.is_empty());
    }
}
