use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::chain::FetchPolicy;
use crate::error::{RelayerError, Result};
use crate::relay::rate_limit::{DEFAULT_MAX_PER_WINDOW, DEFAULT_WINDOW_MS};

pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xc6ada2982604e78e77fa16942389f4e1c82410ce";

pub struct Config {
    pub rpc_url: String,
    /// False when `BASE_RPC_URL` was absent and the public default is in use.
    pub rpc_configured: bool,
    pub contract_address: Address,
    pub deployment_block: u64,
    pub relayer_private_key: String,
    pub api_key: Option<String>,
    pub rate_window_ms: u64,
    pub rate_max: u32,
    pub server_port: u16,
    pub log_chunk_size: u64,
    pub log_fetch_policy: FetchPolicy,
    pub rpc_requests_per_second: NonZeroU32,
    pub confirmation_poll: Duration,
    pub confirmation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_rpc = lookup("BASE_RPC_URL").filter(|v| !v.is_empty());
        let rpc_configured = env_rpc.is_some();
        let rpc_url = env_rpc.unwrap_or_else(|| DEFAULT_RPC_URL.into());

        let contract_address =
            lookup("CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.into());
        let contract_address = Address::from_str(&contract_address)
            .map_err(|e| RelayerError::Config(format!("Invalid CONTRACT_ADDRESS: {e}")))?;

        let deployment_block = parse_or(&lookup, "DEPLOYMENT_BLOCK", 39_908_272u64)?;

        let relayer_private_key = lookup("RELAYER_PRIVATE_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RelayerError::Config("RELAYER_PRIVATE_KEY is required".into()))?;

        // An empty key would otherwise lock every caller out
        let api_key = lookup("RELAYER_API_KEY").filter(|v| !v.is_empty());

        let rate_window_ms = parse_or(&lookup, "RATE_WINDOW_MS", DEFAULT_WINDOW_MS)?;
        let rate_max = parse_or(&lookup, "RATE_MAX", DEFAULT_MAX_PER_WINDOW)?;
        let server_port = parse_or(&lookup, "RELAYER_PORT", 5000u16)?;

        let log_chunk_size = parse_or(&lookup, "LOG_CHUNK_SIZE", 100_000u64)?;
        if log_chunk_size == 0 {
            return Err(RelayerError::Config(
                "Invalid LOG_CHUNK_SIZE: must be greater than zero".into(),
            ));
        }

        let log_fetch_policy = parse_or(&lookup, "LOG_FETCH_MODE", FetchPolicy::default())?;

        let rpc_requests_per_second = parse_or(&lookup, "RPC_REQUESTS_PER_SECOND", 5u32)?;
        let rpc_requests_per_second = NonZeroU32::new(rpc_requests_per_second).ok_or_else(|| {
            RelayerError::Config("Invalid RPC_REQUESTS_PER_SECOND: must be greater than zero".into())
        })?;

        let confirmation_poll_ms = parse_or(&lookup, "CONFIRMATION_POLL_MS", 1000u64)?;
        if confirmation_poll_ms == 0 {
            return Err(RelayerError::Config(
                "Invalid CONFIRMATION_POLL_MS: must be greater than zero".into(),
            ));
        }
        let confirmation_poll = Duration::from_millis(confirmation_poll_ms);
        let confirmation_timeout =
            Duration::from_secs(parse_or(&lookup, "CONFIRMATION_TIMEOUT_SECS", 120u64)?);

        Ok(Self {
            rpc_url,
            rpc_configured,
            contract_address,
            deployment_block,
            relayer_private_key,
            api_key,
            rate_window_ms,
            rate_max,
            server_port,
            log_chunk_size,
            log_fetch_policy,
            rpc_requests_per_second,
            confirmation_poll,
            confirmation_timeout,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| RelayerError::Config(format!("Invalid {key}: {e}"))),
        None => Ok(default),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_configured", &self.rpc_configured)
            .field("contract_address", &self.contract_address)
            .field("deployment_block", &self.deployment_block)
            .field("relayer_private_key", &"<redacted>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("rate_window_ms", &self.rate_window_ms)
            .field("rate_max", &self.rate_max)
            .field("server_port", &self.server_port)
            .field("log_chunk_size", &self.log_chunk_size)
            .field("log_fetch_policy", &self.log_fetch_policy)
            .field("rpc_requests_per_second", &self.rpc_requests_per_second)
            .field("confirmation_poll", &self.confirmation_poll)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish()
    }
}
