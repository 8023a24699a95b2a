//! Replica selection strategies for DNS round robin.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::config::SelectionMode;

/// Picks one index out of `len` candidates. `len` is always non-zero.
pub trait Selector: Send + Sync + Debug {
    fn select(&self, len: usize) -> usize;
}

/// Uniform random pick from the thread-local generator, seeded once per thread.
#[derive(Debug, Default)]
pub struct Random;

impl Selector for Random {
    fn select(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Rotates through candidates with a shared counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Always the same index (clamped to the list), for reproducible picks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedIndex(pub usize);

impl Selector for FixedIndex {
    fn select(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}

/// Build the selector named by configuration.
pub fn from_mode(mode: SelectionMode) -> Box<dyn Selector> {
    match mode {
        SelectionMode::Random => Box::new(Random),
        SelectionMode::RoundRobin => Box::new(RoundRobin::new()),
    }
}
