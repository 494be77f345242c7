//! Minimal counters for operational visibility.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counters, cloned into every subsystem that drops or fails work.
///
/// `ticker_deviations` is the failure/provider/ticker counter: observations
/// discarded by the deviation filter.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticker_deviations: Arc<AtomicU64>,
    pub input_errors: Arc<AtomicU64>,
    pub provider_failures: Arc<AtomicU64>,
    pub store_failures: Arc<AtomicU64>,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
