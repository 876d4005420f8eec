//! Atomic memory primitives shared by the pool and the containers.
//!
//! Word-sized loads, stores, fetch-add and CAS come straight from
//! [`std::sync::atomic`]. This module adds the three barrier levels, the spin
//! hint, and the sleep-based exponential backoff used by contended CAS loops.

use std::sync::atomic::{fence, Ordering};
use std::thread;
use std::time::Duration;

/// Full two-way barrier.
#[inline]
pub fn full_barrier() {
    fence(Ordering::SeqCst);
}

/// Orders earlier loads before later loads and stores.
#[inline]
pub fn load_barrier() {
    fence(Ordering::Acquire);
}

/// Orders earlier stores before the publishing store or CAS that follows.
#[inline]
pub fn store_barrier() {
    fence(Ordering::Release);
}

/// Processor hint for a short busy-wait.
#[inline]
pub fn spin_hint() {
    std::hint::spin_loop();
}

/// Bounds of the exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub ceiling: Duration,
}

impl BackoffConfig {
    pub const DEFAULT_INITIAL: Duration = Duration::from_micros(1 << 6);
    pub const DEFAULT_CEILING: Duration = Duration::from_micros((1 << 20) - 1);

    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Self::DEFAULT_INITIAL,
            ceiling: Self::DEFAULT_CEILING,
        }
    }
}

/// Exponential backoff for one CAS retry loop.
///
/// Each [`wait`](Backoff::wait) sleeps for the current delay and then doubles
/// it, never exceeding the configured ceiling.
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Backoff {
            delay: config.initial.min(config.ceiling),
            ceiling: config.ceiling,
        }
    }

    pub fn wait(&mut self) {
        if self.delay.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.delay);
        }
        self.delay = (self.delay * 2).min(self.ceiling);
    }

    /// Delay the next [`wait`](Backoff::wait) will sleep for.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial, Duration::from_micros(64));
        assert_eq!(config.ceiling, Duration::from_micros(1_048_575));
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let config = BackoffConfig::default()
            .with_initial(Duration::from_micros(1))
            .with_ceiling(Duration::from_micros(5));
        let mut backoff = Backoff::new(&config);

        assert_eq!(backoff.current_delay(), Duration::from_micros(1));
        backoff.wait();
        assert_eq!(backoff.current_delay(), Duration::from_micros(2));
        backoff.wait();
        assert_eq!(backoff.current_delay(), Duration::from_micros(4));
        backoff.wait();
        assert_eq!(backoff.current_delay(), Duration::from_micros(5));
        backoff.wait();
        assert_eq!(backoff.current_delay(), Duration::from_micros(5));
    }

    #[test]
    fn test_initial_clamped_to_ceiling() {
        let config = BackoffConfig::default()
            .with_initial(Duration::from_millis(10))
            .with_ceiling(Duration::from_micros(3));
        assert_eq!(Backoff::new(&config).current_delay(), Duration::from_micros(3));
    }

    #[test]
    fn test_zero_delay_yields() {
        let config = BackoffConfig::default().with_initial(Duration::ZERO);
        let mut backoff = Backoff::new(&config);
        backoff.wait();
        assert!(backoff.current_delay().is_zero());
    }
}
