pub mod rate_limit;
pub mod service;

pub use rate_limit::RateLimiter;
pub use service::{RelayError, RelayRequest, RelayService};
