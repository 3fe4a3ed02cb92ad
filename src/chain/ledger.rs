use std::marker::PhantomData;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{PendingTransactionBuilder, PendingTransactionError, Provider, WatchTxError};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::Transport;
use async_trait::async_trait;

use crate::error::{RelayerError, Result};

use super::events::MessageBoard::{self, MessageBoardInstance};

/// Current on-chain state of one message, as returned by `getMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainMessage {
    pub id: u64,
    pub author: Address,
    pub text: String,
    pub likes: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub success: bool,
}

/// Operations the relayer needs from the remote node.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    async fn block_number(&self) -> Result<u64>;

    /// `None` when the contract has no message stored under `id`.
    async fn get_message(&self, contract: Address, id: u64) -> Result<Option<OnChainMessage>>;

    /// Signs and broadcasts `likeMessage(id)`, returning once the node accepted it.
    async fn send_like(&self, contract: Address, id: u64) -> Result<TxHash>;

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt>;
}

/// Receipt polling follows the provider client's poll interval.
pub struct AlloyLedger<P, T> {
    provider: P,
    confirmation_timeout: Duration,
    _transport: PhantomData<fn() -> T>,
}

impl<P, T> AlloyLedger<P, T> {
    pub fn new(provider: P, confirmation_timeout: Duration) -> Self {
        Self {
            provider,
            confirmation_timeout,
            _transport: PhantomData,
        }
    }
}

#[async_trait]
impl<P, T> Ledger for AlloyLedger<P, T>
where
    P: Provider<T> + Send + Sync + 'static,
    T: Transport + Clone,
{
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        Ok(self.provider.get_logs(filter).await?)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_message(&self, contract: Address, id: u64) -> Result<Option<OnChainMessage>> {
        let board: MessageBoardInstance<T, &P> = MessageBoard::new(contract, &self.provider);
        let message = board.getMessage(U256::from(id)).call().await?._0;

        // Unknown ids come back as a zeroed struct rather than a revert
        if message.id.is_zero() || message.author == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(OnChainMessage {
            id: u64::try_from(message.id).unwrap_or(id),
            author: message.author,
            text: message.text,
            likes: u64::try_from(message.likes).unwrap_or(u64::MAX),
            timestamp: u64::try_from(message.timestamp).unwrap_or(0),
        }))
    }

    async fn send_like(&self, contract: Address, id: u64) -> Result<TxHash> {
        let board: MessageBoardInstance<T, &P> = MessageBoard::new(contract, &self.provider);
        let pending = board.likeMessage(U256::from(id)).send().await?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<Receipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), hash)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| confirmation_error(hash, self.confirmation_timeout, e))?;

        Ok(Receipt {
            hash,
            success: receipt.status(),
        })
    }
}

fn confirmation_error(
    hash: TxHash,
    timeout: Duration,
    err: PendingTransactionError,
) -> RelayerError {
    match err {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            RelayerError::ConfirmationTimeout {
                hash,
                secs: timeout.as_secs(),
            }
        }
        PendingTransactionError::TransportError(e) => RelayerError::Rpc(e),
        other => RelayerError::PendingTransaction(other),
    }
}
