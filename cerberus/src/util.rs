// src/util.rs
use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown signal shared across every long-running loop.
pub struct BarrierFlag(AtomicBool);

impl Default for BarrierFlag {
    fn default() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl BarrierFlag {
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_flag_starts_unraised() {
        let f = BarrierFlag::default();
        assert!(!f.is_raised());
        f.raise();
        assert!(f.is_raised());
    }
}
