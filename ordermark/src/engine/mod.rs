use crate::{
    OrderId,
    config::EngineConfig,
    dom::Host,
    exchange::ExchangeAdapter,
    gateway::OrderGateway,
    guard::{Generation, VersionGuard},
    queue::BoundedQueue,
    tracker::RowStateTracker,
    watcher::Trigger,
};
use ordermark_integration::channel::{UnboundedRx, UnboundedTx, mpsc_unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use tracing::debug;

/// Page lifecycle state machine driven by [`EngineEvent`]s.
pub mod lifecycle;

/// Reprocessing passes & the per-row lookup pipeline.
pub mod row;

/// The [`ListEngine`] event loop.
pub mod run;

/// Processes an `Event`, producing an `Output`.
pub trait Processor<Event> {
    type Output;
    fn process(&mut self, event: Event) -> Self::Output;
}

/// Counters describing one reprocessing pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PassSummary {
    pub generation: Generation,
    pub destructive: bool,
    /// Rows enumerated.
    pub rows: usize,
    /// Rows no [`OrderId`] could be extracted from.
    pub unidentified: usize,
    /// Rows skipped by the tracker (lookup in flight, or not found within the TTL).
    pub skipped: usize,
    /// Rows repainted from cached results without a lookup.
    pub repainted: usize,
    /// Lookups submitted.
    pub submitted: usize,
    pub painted: usize,
    pub failed: usize,
    pub stale: usize,
    pub recycled: usize,
    pub superseded: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: row::RowOutcome) {
        use row::RowOutcome;
        match outcome {
            RowOutcome::Painted => self.painted += 1,
            RowOutcome::Unpainted => {}
            RowOutcome::Stale => self.stale += 1,
            RowOutcome::Recycled => self.recycled += 1,
            RowOutcome::Failed(_) => self.failed += 1,
            RowOutcome::Superseded => self.superseded += 1,
        }
    }
}

/// State shared between the [`ListEngine`] event loop and its in-flight passes.
pub(crate) struct Context<H, Adapter, Gateway> {
    pub(crate) config: EngineConfig,
    pub(crate) host: H,
    pub(crate) adapter: Adapter,
    pub(crate) gateway: Gateway,
    pub(crate) queue: BoundedQueue,
    pub(crate) tracker: Mutex<RowStateTracker>,
    pub(crate) guard: VersionGuard,
    /// [`OrderId`] of the first identified row of the previous pass.
    pub(crate) first_row: Mutex<Option<OrderId>>,
    /// Debouncer input, used to request follow-up passes.
    pub(crate) triggers: UnboundedTx<Trigger>,
}

impl<H, Adapter, Gateway> Debug for Context<H, Adapter, Gateway>
where
    H: Debug,
    Adapter: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("host", &self.host)
            .field("adapter", &self.adapter)
            .field("generation", &self.guard.current())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl<H, Adapter, Gateway> Context<H, Adapter, Gateway> {
    /// Remember the first identified row of this pass, returning whether it differs from the
    /// previous pass (ie/ the host paginated in place).
    pub(crate) fn first_row_changed(&self, first: Option<&OrderId>) -> bool {
        let Some(first) = first else {
            return false;
        };

        let mut previous = self.first_row.lock();
        let changed = previous.as_ref().is_some_and(|previous| previous != first);
        if changed {
            debug!(previous = ?previous.as_ref(), current = %first, "first order row changed");
        }
        *previous = Some(first.clone());
        changed
    }

    /// Invalidate all in-flight work & discard every piece of per-row state.
    pub(crate) fn reset(&self) -> Generation {
        let generation = self.guard.advance();
        let superseded = self.queue.clear();
        let forgotten = self.tracker.lock().clear();
        *self.first_row.lock() = None;
        debug!(%generation, superseded, forgotten, "reset engine state");
        generation
    }
}

/// Order-list synchronisation engine for one exchange page.
///
/// Constructed once per page lifecycle with an injected [`Host`], [`ExchangeAdapter`] &
/// [`OrderGateway`]. See [`ListEngine::run`].
pub struct ListEngine<H, Adapter, Gateway> {
    context: Arc<Context<H, Adapter, Gateway>>,
    trigger_rx: UnboundedRx<Trigger>,
}

impl<H, Adapter, Gateway> Debug for ListEngine<H, Adapter, Gateway>
where
    H: Debug,
    Adapter: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListEngine")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<H, Adapter, Gateway> ListEngine<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    pub fn new(config: EngineConfig, host: H, adapter: Adapter, gateway: Gateway) -> Self {
        let (triggers, trigger_rx) = mpsc_unbounded();

        Self {
            context: Arc::new(Context {
                queue: BoundedQueue::new(config.max_concurrent),
                tracker: Mutex::new(RowStateTracker::new(config.stop404_ttl)),
                guard: VersionGuard::default(),
                first_row: Mutex::new(None),
                triggers,
                config,
                host,
                adapter,
                gateway,
            }),
            trigger_rx,
        }
    }

    /// Handle to the engine's [`VersionGuard`], which advances once per pass and once per reset.
    pub fn version_guard(&self) -> VersionGuard {
        self.context.guard.clone()
    }
}
