/// Token-bucket rate limiter for outbound API calls

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Simple token bucket: `rate_per_sec` tokens accrue per second up to
/// `capacity`. `acquire` suspends the caller until a token is free, so
/// request bursts smooth out instead of erroring.
pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            capacity,
            rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket sized for `rate_per_sec` steady-state with a burst of the
    /// same magnitude
    pub fn per_second(rate_per_sec: f64) -> Self {
        Self::new(rate_per_sec, rate_per_sec.max(1.0))
    }

    /// Take one token, sleeping until one is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - state.tokens) / self.rate_per_sec,
                    ))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    trace!(delay_ms = delay.as_millis() as u64, "rate limiter waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Take one token only if immediately available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
