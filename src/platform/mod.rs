//! Host services the interpreter reaches through traits: clock, randomness
//! and console output.
//!
//! [`Interpreter`](crate::interpreter::Interpreter) starts with the std-backed
//! providers from [`default_console`], [`default_time`] and [`default_random`];
//! embedders swap them through the runtime's setters.

mod std_impl;

use std::cell::RefCell;
use std::rc::Rc;

pub use std_impl::{StdConsoleProvider, StdRandomProvider, StdTimeProvider};

/// Clock used by `console.time` / `console.timeEnd`
pub trait TimeProvider {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Milliseconds elapsed since a handle returned by [`start_timer`](Self::start_timer)
    fn elapsed_millis(&self, start: u64) -> u64;

    /// Start a timer and return an opaque handle
    fn start_timer(&self) -> u64;
}

/// Source of `Math.random()`
pub trait RandomProvider {
    /// A number in `[0, 1)`
    fn random(&mut self) -> f64;
}

/// Console method that produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Debug,
    Warn,
    Error,
}

/// Sink for console output
pub trait ConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str);

    /// `console.clear()`; ignored unless the provider overrides it
    fn clear(&self) {}
}

pub fn default_console() -> Box<dyn ConsoleProvider> {
    Box::new(StdConsoleProvider::new())
}

pub fn default_time() -> Box<dyn TimeProvider> {
    Box::new(StdTimeProvider::new())
}

pub fn default_random() -> Box<dyn RandomProvider> {
    Box::new(StdRandomProvider::new())
}

/// Time provider with a frozen clock
pub struct NoOpTimeProvider;

impl TimeProvider for NoOpTimeProvider {
    fn now_millis(&self) -> i64 {
        0
    }

    fn elapsed_millis(&self, _start: u64) -> u64 {
        0
    }

    fn start_timer(&self) -> u64 {
        0
    }
}

/// Random provider that always answers `0.5`
pub struct NoOpRandomProvider;

impl RandomProvider for NoOpRandomProvider {
    fn random(&mut self) -> f64 {
        0.5
    }
}

/// Console provider that discards output
pub struct NoOpConsoleProvider;

impl ConsoleProvider for NoOpConsoleProvider {
    fn write(&self, _level: ConsoleLevel, _message: &str) {}
}

/// Console provider that keeps every message in memory.
///
/// Clones share the same buffer, so the host keeps one clone and hands the
/// other to the runtime.
#[derive(Clone, Default)]
pub struct BufferedConsoleProvider {
    lines: Rc<RefCell<Vec<(ConsoleLevel, String)>>>,
}

impl BufferedConsoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages written so far, oldest first
    pub fn lines(&self) -> Vec<(ConsoleLevel, String)> {
        self.lines.borrow().clone()
    }

    /// Messages only, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|(_, message)| message.clone()).collect()
    }
}

impl ConsoleProvider for BufferedConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        self.lines.borrow_mut().push((level, message.to_string()));
    }

    fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_console_shares_lines() {
        let console = BufferedConsoleProvider::new();
        let handle = console.clone();
        console.write(ConsoleLevel::Warn, "careful");
        assert_eq!(handle.lines(), vec![(ConsoleLevel::Warn, "careful".to_string())]);
        console.clear();
        assert!(handle.messages().is_empty());
    }

    #[test]
    fn test_seeded_random_in_range() {
        let mut random = StdRandomProvider::with_seed(42);
        for _ in 0..1000 {
            let n = random.random();
            assert!((0.0..1.0).contains(&n));
        }
    }
}
