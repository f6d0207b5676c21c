use crate::{OrderId, badge::BadgeState, gateway::FetchFailure, guard::Generation};
use fnv::FnvHashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Last known status of one [`OrderId`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RowStatus {
    /// Lookup submitted under the [`Generation`] and not yet settled.
    Loading { generation: Generation },
    /// Lookup resolved. Badges are cached for repaints that require no network call.
    Done { badges: BadgeState },
    /// Lookup failed. Eligible for retry on the next pass.
    Error(FetchFailure),
    /// Order confirmed absent (or not accessible). Suppressed until the TTL elapses.
    Stop404,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RowState {
    pub status: RowStatus,
    pub updated: Instant,
}

/// Outcome of [`RowStateTracker::decide`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Submit a lookup.
    Fetch,
    /// Do nothing (lookup in flight, or not found within the TTL).
    Skip,
    /// Already resolved. Paint the cached [`BadgeState`] without a lookup.
    Repaint(BadgeState),
}

/// Per-[`OrderId`] status memory used to dedupe lookups and suppress not found retries.
#[derive(Debug)]
pub struct RowStateTracker {
    states: FnvHashMap<OrderId, RowState>,
    stop404_ttl: Duration,
}

impl RowStateTracker {
    pub fn new(stop404_ttl: Duration) -> Self {
        Self {
            states: FnvHashMap::default(),
            stop404_ttl,
        }
    }

    pub fn decide(&self, id: &OrderId, now: Instant) -> Decision {
        let Some(state) = self.states.get(id) else {
            return Decision::Fetch;
        };

        match state.status {
            RowStatus::Loading { .. } => Decision::Skip,
            RowStatus::Done { badges } => Decision::Repaint(badges),
            RowStatus::Stop404 if now.duration_since(state.updated) < self.stop404_ttl => {
                Decision::Skip
            }
            RowStatus::Stop404 | RowStatus::Error(_) => Decision::Fetch,
        }
    }

    /// Determines if a lookup of `id` would be skipped entirely (no fetch and no repaint).
    pub fn should_skip(&self, id: &OrderId, now: Instant) -> bool {
        !matches!(self.decide(id, now), Decision::Fetch)
    }

    pub fn mark_loading(&mut self, id: OrderId, generation: Generation, now: Instant) {
        self.insert(id, RowStatus::Loading { generation }, now);
    }

    /// Record the settled status of a lookup submitted under `generation`.
    ///
    /// Only applies if the entry is still loading under that same [`Generation`], so a lookup
    /// whose tracker state was cleared (or re-submitted) meanwhile cannot overwrite newer state.
    /// Returns whether the status was recorded.
    pub fn complete(
        &mut self,
        id: &OrderId,
        generation: Generation,
        status: RowStatus,
        now: Instant,
    ) -> bool {
        match self.states.get_mut(id) {
            Some(state) if state.status == RowStatus::Loading { generation } => {
                *state = RowState {
                    status,
                    updated: now,
                };
                true
            }
            _ => false,
        }
    }

    pub fn mark_done(&mut self, id: OrderId, badges: BadgeState, now: Instant) {
        self.insert(id, RowStatus::Done { badges }, now);
    }

    pub fn mark_error(&mut self, id: OrderId, failure: FetchFailure, now: Instant) {
        self.insert(id, RowStatus::Error(failure), now);
    }

    pub fn mark_stop404(&mut self, id: OrderId, now: Instant) {
        self.insert(id, RowStatus::Stop404, now);
    }

    pub fn get(&self, id: &OrderId) -> Option<&RowState> {
        self.states.get(id)
    }

    /// Forget every entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let count = self.states.len();
        self.states.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn insert(&mut self, id: OrderId, status: RowStatus, now: Instant) {
        self.states.insert(
            id,
            RowState {
                status,
                updated: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RowStateTracker {
        RowStateTracker::new(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_stop404_suppressed_within_ttl() {
        let mut tracker = tracker();
        let id = OrderId::from("999");
        let marked = Instant::now();
        tracker.mark_stop404(id.clone(), marked);

        assert_eq!(tracker.decide(&id, marked + Duration::from_secs(5)), Decision::Skip);
        assert_eq!(
            tracker.decide(&id, marked + Duration::from_millis(29_999)),
            Decision::Skip
        );
        assert_eq!(
            tracker.decide(&id, marked + Duration::from_secs(30)),
            Decision::Fetch
        );
        assert_eq!(
            tracker.decide(&id, marked + Duration::from_secs(31)),
            Decision::Fetch
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_by_status() {
        let now = Instant::now();
        let badges = BadgeState {
            is_saved: true,
            has_receipt: false,
        };

        struct TestCase {
            status: Option<RowStatus>,
            expected: Decision,
        }

        let cases = vec![
            TestCase {
                // TC0: unknown order
                status: None,
                expected: Decision::Fetch,
            },
            TestCase {
                // TC1: in flight
                status: Some(RowStatus::Loading {
                    generation: Generation(3),
                }),
                expected: Decision::Skip,
            },
            TestCase {
                // TC2: resolved
                status: Some(RowStatus::Done { badges }),
                expected: Decision::Repaint(badges),
            },
            TestCase {
                // TC3: rate limited lookups retry on the next pass
                status: Some(RowStatus::Error(FetchFailure::RateLimit)),
                expected: Decision::Fetch,
            },
            TestCase {
                // TC4: network failures retry on the next pass
                status: Some(RowStatus::Error(FetchFailure::Network)),
                expected: Decision::Fetch,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let mut tracker = tracker();
            let id = OrderId::from("12345");
            if let Some(status) = test.status {
                tracker.insert(id.clone(), status, now);
            }
            assert_eq!(tracker.decide(&id, now), test.expected, "TC{index} failed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_only_applies_to_matching_generation() {
        let mut tracker = tracker();
        let now = Instant::now();
        let id = OrderId::from("12345");
        let done = RowStatus::Done {
            badges: BadgeState::default(),
        };

        // Cleared meanwhile
        tracker.mark_loading(id.clone(), Generation(1), now);
        tracker.clear();
        assert!(!tracker.complete(&id, Generation(1), done, now));
        assert!(tracker.is_empty());

        // Re-submitted under a later generation
        tracker.mark_loading(id.clone(), Generation(2), now);
        assert!(!tracker.complete(&id, Generation(1), done, now));
        assert_eq!(
            tracker.get(&id).map(|state| state.status),
            Some(RowStatus::Loading {
                generation: Generation(2)
            })
        );

        assert!(tracker.complete(&id, Generation(2), done, now));
        assert!(tracker.should_skip(&id, now));
    }
}
