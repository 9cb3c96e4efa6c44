//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness).
//! Production drivers use real system time; tests drive a virtual clock so
//! backoff, heartbeat, and expiry behavior runs deterministically.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - methods are infallible except in exceptional circumstances
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as epoch milliseconds.
    ///
    /// Used only to stamp outgoing payloads; ordering decisions always use
    /// the monotonic clock.
    fn unix_millis(&self) -> i64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for request ids and local echo tags.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment backed by system time and OS entropy.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Hash of a process-local counter with per-process random keys.
        // Request ids only need uniqueness within one client, not secrecy.
        use std::hash::{BuildHasher, Hasher};
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let state = std::collections::hash_map::RandomState::new();
        for chunk in buffer.chunks_mut(8) {
            let mut hasher = state.build_hasher();
            hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
            let word = hasher.finish().to_be_bytes();
            for (dst, src) in chunk.iter_mut().zip(word.iter()) {
                *dst = *src;
            }
        }
    }
}

/// Deterministic environments for tests and simulations.
pub mod test_utils {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    };
    use std::time::{Duration, Instant};

    use super::Environment;

    /// Virtual-clock environment with a seeded byte counter.
    ///
    /// `now()` reports a fixed base instant advanced by [`MockEnv::advance`];
    /// `sleep()` resolves immediately so drivers never block in tests.
    #[derive(Clone)]
    pub struct MockEnv {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
        counter: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Create a mock environment starting at the current real instant.
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
                counter: Arc::new(AtomicU64::new(1)),
            }
        }

        /// Advance the virtual clock.
        pub fn advance(&self, duration: Duration) {
            if let Ok(mut offset) = self.offset.lock() {
                *offset += duration;
            }
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            let offset = self.offset.lock().map(|o| *o).unwrap_or(Duration::ZERO);
            self.base + offset
        }

        fn unix_millis(&self) -> i64 {
            // Anchored at a fixed epoch; advances with the virtual clock
            let offset = self.offset.lock().map(|o| *o).unwrap_or(Duration::ZERO);
            1_700_000_000_000 + offset.as_millis() as i64
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for byte in buffer.iter_mut() {
                *byte = (self.counter.fetch_add(1, Ordering::Relaxed) % 251) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Environment, test_utils::MockEnv};
    use std::time::Duration;

    #[test]
    fn mock_clock_advances() {
        let env = MockEnv::new();
        let t0 = env.now();
        env.advance(Duration::from_secs(5));
        assert_eq!(env.now() - t0, Duration::from_secs(5));
    }

    #[test]
    fn mock_random_is_deterministic_per_instance() {
        let env = MockEnv::new();
        let a = env.random_u64();
        let b = env.random_u64();
        assert_ne!(a, b);
    }
}
