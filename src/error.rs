use alloy::primitives::TxHash;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    #[error("contract call error: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("none of the events ({}) found in ABI", candidates.join(","))]
    UnknownEvent { candidates: Vec<String> },

    #[error("chunk size must be at least 1 block")]
    InvalidChunkSize,

    #[error("failed fetching logs for block range {from}-{to}: {source}")]
    ChunkFetch {
        from: u64,
        to: u64,
        #[source]
        source: Box<RelayerError>,
    },

    #[error("transaction {hash} not confirmed after {secs}s")]
    ConfirmationTimeout { hash: TxHash, secs: u64 },

    #[error("pending transaction error: {0}")]
    PendingTransaction(alloy::providers::PendingTransactionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayerError>;
