//! Providers backed by the standard library

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::{ConsoleLevel, ConsoleProvider, RandomProvider, TimeProvider};

/// Wall clock plus a monotonic timer base
pub struct StdTimeProvider {
    epoch: Instant,
}

impl StdTimeProvider {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for StdTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for StdTimeProvider {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn elapsed_millis(&self, start: u64) -> u64 {
        let now = self.epoch.elapsed().as_millis() as u64;
        now.saturating_sub(start)
    }

    fn start_timer(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// xorshift64 generator seeded from the clock
pub struct StdRandomProvider {
    state: u64,
}

const FALLBACK_SEED: u64 = 0x1234_5678_9abc_def0;

impl StdRandomProvider {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(FALLBACK_SEED);
        Self::with_seed(seed)
    }

    /// Deterministic sequence, for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        // xorshift never leaves zero
        let state = if seed == 0 { FALLBACK_SEED } else { seed };
        Self { state }
    }
}

impl Default for StdRandomProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomProvider for StdRandomProvider {
    fn random(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        // Upper 53 bits as the mantissa
        ((x >> 11) as f64) / ((1u64 << 53) as f64)
    }
}

/// stdout for log/info/debug, stderr for warn/error
pub struct StdConsoleProvider;

impl StdConsoleProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdConsoleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProvider for StdConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        match level {
            ConsoleLevel::Log | ConsoleLevel::Info | ConsoleLevel::Debug => println!("{message}"),
            ConsoleLevel::Warn | ConsoleLevel::Error => eprintln!("{message}"),
        }
    }
}
