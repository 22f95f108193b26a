/// Shared runtime utilities: breakers, rate limiting, TTL cache

pub mod cache;
pub mod circuit_breaker;
pub mod rate_limit;

pub use cache::{LockOutcome, SharedCache};
pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
pub use rate_limit::TokenBucket;
