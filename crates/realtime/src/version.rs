use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonic stamp handed out at emit time. Clients compare
/// versions to keep duplicated or reordered deliveries convergent.
#[derive(Debug, Default)]
pub struct EventSequence(AtomicU64);

impl EventSequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// The first call returns 1; 0 is reserved as "never seen".
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
