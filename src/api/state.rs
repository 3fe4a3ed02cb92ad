use std::sync::Arc;
use std::time::Instant;

use crate::chain::MessageAggregator;
use crate::config::Config;
use crate::relay::RelayService;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub messages: Arc<MessageAggregator>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(relay: RelayService, messages: MessageAggregator, config: Config) -> Self {
        Self {
            relay: Arc::new(relay),
            messages: Arc::new(messages),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
