use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Epoch of page state. Advanced exactly once per accepted reprocessing pass.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Deserialize,
    Serialize,
    Display,
)]
pub struct Generation(pub u64);

/// Shared monotonic [`Generation`] counter.
///
/// Work captures [`VersionGuard::current`] when it is submitted and must check
/// [`VersionGuard::is_current`] immediately before mutating the DOM, abandoning silently if the
/// counter has moved on.
#[derive(Debug, Clone, Default)]
pub struct VersionGuard {
    current: Arc<AtomicU64>,
}

impl VersionGuard {
    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    /// Advance the counter, returning the new current [`Generation`].
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_guard_advance_invalidates_captured_generation() {
        let guard = VersionGuard::default();
        let shared = guard.clone();

        let captured = guard.current();
        assert!(shared.is_current(captured));

        assert_eq!(shared.advance(), Generation(1));
        assert!(!guard.is_current(captured));
        assert!(guard.is_current(Generation(1)));
        assert!(Generation(1) > captured);
    }
}
