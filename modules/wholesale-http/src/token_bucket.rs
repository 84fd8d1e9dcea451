use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single-host token bucket: `rps` tokens refill per second, burst is
/// `2 * rps` (§4.2). Acquiring when empty reports how long the caller
/// must wait rather than blocking internally, so callers stay cancel-safe.
pub struct TokenBucket {
    state: Mutex<State>,
    refill_per_sec: f64,
    capacity: f64,
}

struct State {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rps: f64) -> Self {
        let rps = rps.max(0.01);
        Self {
            state: Mutex::new(State { tokens: rps * 2.0, last_refill: Instant::now() }),
            refill_per_sec: rps,
            capacity: rps * 2.0,
        }
    }

    /// Returns `None` if a token was taken immediately, or `Some(wait)` if
    /// the caller should sleep `wait` and try again.
    pub fn try_acquire(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_throttles() {
        let bucket = TokenBucket::new(10.0);
        for _ in 0..20 {
            assert!(bucket.try_acquire().is_none());
        }
        assert!(bucket.try_acquire().is_some());
    }
}
