//! Log Throttling
//!
//! Some warnings fire once per evicted block; under sustained cache pressure
//! that is thousands of identical lines per second. `LogThrottle` runs its
//! closure at most once per interval and silently drops the rest.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Runs a closure at most once per interval
pub struct LogThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Invoke `f` if the interval has elapsed since the last invocation
    pub fn run(&self, f: impl FnOnce()) {
        let due = {
            let mut last = self.last.lock().unwrap();
            let due = last.map(|at| at.elapsed() >= self.interval).unwrap_or(true);
            if due {
                *last = Some(Instant::now());
            }
            due
        };
        if due {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_first_invocation_runs() {
        let throttle = LogThrottle::new(Duration::from_secs(30));
        let hits = AtomicU32::new(0);
        throttle.run(|| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_within_interval() {
        let throttle = LogThrottle::new(Duration::from_secs(30));
        let hits = AtomicU32::new(0);
        for _ in 0..10 {
            throttle.run(|| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_again_after_interval() {
        let throttle = LogThrottle::new(Duration::from_secs(30));
        let hits = AtomicU32::new(0);
        throttle.run(|| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_secs(31)).await;
        throttle.run(|| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
