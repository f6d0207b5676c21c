use crate::{
    dom::{Host, MutationObserver, MutationRecord, NavigationEvent},
    engine::{Context, PassSummary, Processor, row::Pass},
    error::EngineError,
    exchange::ExchangeAdapter,
    gateway::OrderGateway,
    poll::poll_until,
    shutdown::{AsyncShutdown, Shutdown},
    watcher::{
        Trigger, is_relevant_mutation,
        location::{LocationChange, LocationTracker},
    },
};
use ordermark_integration::channel::{Tx, UnboundedTx};
use std::{sync::Arc, time::Duration};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Input processed by the [`Lifecycle`] state machine.
#[derive(Debug)]
pub enum EngineEvent<E> {
    Navigation(NavigationEvent<E>),
    /// The location poll interval elapsed.
    LocationPoll,
    /// A debounced reprocessing request.
    Reprocess(Trigger),
    Mutation(MutationRecord<E>),
    /// A delayed [`Action`] became due.
    Timer(Result<Action, JoinError>),
    /// The gateway wait & DOM settle of an initialisation finished.
    Initialized(Result<Result<(), EngineError>, JoinError>),
    /// A pass finished processing its lookups.
    PassFinished(Result<PassSummary, JoinError>),
}

/// Work scheduled to run after a settle delay.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// A history navigation settled.
    Navigated,
    Request(Trigger),
}

#[derive(Debug)]
pub enum Phase<Observer> {
    /// Not on an order list page.
    Idle,
    /// Waiting for the gateway & the host page to settle.
    Initializing,
    Watching {
        observer: Observer,
        /// The gateway never became ready: passes are skipped until the next initialisation.
        degraded: bool,
    },
}

/// Page lifecycle state machine: `Idle -> Initializing -> Watching`, back to `Idle` when the
/// location leaves the exchange's order list page.
///
/// Owns every timer, task & observer handle of the current page, so teardown is explicit.
#[derive(Debug)]
pub struct Lifecycle<H, Adapter, Gateway>
where
    H: Host,
{
    context: Arc<Context<H, Adapter, Gateway>>,
    location: LocationTracker,
    phase: Phase<H::Observer>,
    mutation_tx: UnboundedTx<MutationRecord<H::Element>>,
    /// Trigger requested while initialising, run once initialisation completes.
    deferred: Option<Trigger>,
    pub(crate) initializing: JoinSet<Result<(), EngineError>>,
    pub(crate) timers: JoinSet<Action>,
    pub(crate) passes: JoinSet<PassSummary>,
}

impl<H, Adapter, Gateway> Lifecycle<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    pub(crate) fn new(
        context: Arc<Context<H, Adapter, Gateway>>,
        mutation_tx: UnboundedTx<MutationRecord<H::Element>>,
    ) -> Self {
        let location = LocationTracker::new(
            context.host.location(),
            context.config.pagination_params.clone(),
        );

        Self {
            context,
            location,
            phase: Phase::Idle,
            mutation_tx,
            deferred: None,
            initializing: JoinSet::new(),
            timers: JoinSet::new(),
            passes: JoinSet::new(),
        }
    }

    pub fn phase(&self) -> &Phase<H::Observer> {
        &self.phase
    }

    /// Initialise if the current location is an order list page.
    pub(crate) fn start(&mut self) {
        if self.context.adapter.is_target(self.location.current()) {
            self.initialize();
        } else {
            info!(
                exchange = %self.context.adapter.kind(),
                location = %self.location.current(),
                "not an order list page, waiting for navigation"
            );
        }
    }

    fn on_navigation(&mut self, event: NavigationEvent<H::Element>) {
        match event {
            NavigationEvent::PushState | NavigationEvent::ReplaceState => {
                self.schedule(self.context.config.history_settle, Action::Navigated)
            }
            NavigationEvent::PopState | NavigationEvent::HashChange => self.on_history(),
            NavigationEvent::Click(element) => {
                if matches!(self.phase, Phase::Watching { .. })
                    && self.context.adapter.is_pagination_control(&element)
                {
                    debug!("pagination control clicked");
                    self.schedule(
                        self.context.config.pagination_settle,
                        Action::Request(Trigger::REFRESH),
                    );
                }
            }
        }
    }

    fn on_timer(&mut self, action: Result<Action, JoinError>) {
        match action {
            Ok(Action::Navigated) => self.on_history(),
            Ok(Action::Request(trigger)) => self.request(trigger),
            Err(error) if error.is_cancelled() => {}
            Err(error) => error!(%error, "timer task failed"),
        }
    }

    /// History navigation always reprocesses, even when the location is unchanged.
    fn on_history(&mut self) {
        if self.check_location() == LocationChange::Unchanged {
            debug!(location = %self.location.current(), "history navigation to current location");
            self.request(Trigger::REFRESH);
        }
    }

    fn check_location(&mut self) -> LocationChange {
        let change = self.location.observe(self.context.host.location());
        match change {
            LocationChange::Unchanged => {}
            LocationChange::Navigated => {
                if self.context.adapter.is_target(self.location.current()) {
                    self.initialize();
                } else if !matches!(self.phase, Phase::Idle) {
                    self.teardown(Shutdown::OffTarget);
                }
            }
            LocationChange::Paginated => {
                debug!(location = %self.location.current(), "pagination parameters changed");
                self.request(Trigger::RESET);
            }
        }
        change
    }

    /// Forward a [`Trigger`] to the debouncer, or defer it while initialising.
    fn request(&mut self, trigger: Trigger) {
        match self.phase {
            Phase::Idle => {}
            Phase::Initializing => self.defer(trigger),
            Phase::Watching { .. } => {
                if let Err(error) = self.context.triggers.send(trigger) {
                    error!(%error, "failed to request reprocess");
                }
            }
        }
    }

    fn defer(&mut self, trigger: Trigger) {
        let deferred = self.deferred.map_or(trigger, |deferred| deferred.merge(trigger));
        debug!(?deferred, "initialisation in flight, deferring reprocess");
        self.deferred = Some(deferred);
    }

    fn on_reprocess(&mut self, trigger: Trigger) {
        match self.phase {
            Phase::Watching {
                degraded: false, ..
            } => self.spawn_pass(trigger),
            Phase::Watching { degraded: true, .. } => {
                debug!(?trigger, "gateway unavailable, skipping reprocess")
            }
            Phase::Initializing => self.defer(trigger),
            Phase::Idle => {}
        }
    }

    fn on_mutation(&mut self, record: MutationRecord<H::Element>) {
        if matches!(self.phase, Phase::Watching { .. })
            && is_relevant_mutation(&self.context.adapter, &record)
        {
            self.request(Trigger::REFRESH);
        }
    }

    /// Begin (or defer) a destructive initialisation.
    ///
    /// Only one initialisation is ever in flight. Requests made meanwhile are deferred and run as
    /// one destructive pass once it completes.
    fn initialize(&mut self) {
        if !self.initializing.is_empty() {
            self.defer(Trigger::RESET);
            return;
        }

        if let Phase::Watching { observer, .. } = &mut self.phase {
            observer.disconnect();
        }
        self.phase = Phase::Initializing;
        self.timers.abort_all();
        let generation = self.context.reset();

        info!(
            exchange = %self.context.adapter.kind(),
            location = %self.location.current(),
            %generation,
            "initialising order list"
        );

        let context = Arc::clone(&self.context);
        self.initializing.spawn(async move {
            let config = &context.config;
            let ready = poll_until(config.auth_poll_interval, config.auth_wait_timeout, || {
                let context = Arc::clone(&context);
                async move { context.gateway.is_ready().await.then_some(()) }
            })
            .await;

            tokio::time::sleep(config.dom_settle).await;
            ready.map_err(|timeout| EngineError::AuthTimeout(timeout.timeout))
        });
    }

    fn on_initialized(&mut self, result: Result<Result<(), EngineError>, JoinError>) {
        let degraded = match result {
            Ok(Ok(())) => false,
            Ok(Err(error)) => {
                warn!(%error, "gateway unavailable, running degraded");
                true
            }
            Err(error) if error.is_cancelled() => return,
            Err(error) => {
                error!(%error, "initialisation task failed, running degraded");
                true
            }
        };

        let observer = self.context.host.observe_mutations(self.mutation_tx.clone());
        self.phase = Phase::Watching { observer, degraded };
        info!(exchange = %self.context.adapter.kind(), degraded, "watching order list");

        if !degraded {
            self.spawn_pass(Trigger::RESET);
        }

        if let Some(trigger) = self.deferred.take() {
            self.request(trigger);
        }
    }

    fn spawn_pass(&mut self, trigger: Trigger) {
        let pass = Pass::prepare(Arc::clone(&self.context), trigger);
        self.passes.spawn(pass.run());
    }

    fn schedule(&mut self, delay: Duration, action: Action) {
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            action
        });
    }

    /// Leave the current page: disconnect the observer, cancel timers & initialisation, and
    /// discard all pending work. In-flight lookups run to completion without effect.
    pub(crate) fn teardown(&mut self, reason: Shutdown) {
        if let Phase::Watching { observer, .. } = &mut self.phase {
            observer.disconnect();
        }
        self.phase = Phase::Idle;
        self.deferred = None;
        self.initializing.abort_all();
        self.timers.abort_all();
        let generation = self.context.reset();

        info!(
            exchange = %self.context.adapter.kind(),
            ?reason,
            %generation,
            "order list torn down"
        );
    }
}

impl<H, Adapter, Gateway> Processor<EngineEvent<H::Element>> for Lifecycle<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    type Output = ();

    fn process(&mut self, event: EngineEvent<H::Element>) -> Self::Output {
        match event {
            EngineEvent::Navigation(event) => self.on_navigation(event),
            EngineEvent::LocationPoll => {
                self.check_location();
            }
            EngineEvent::Reprocess(trigger) => self.on_reprocess(trigger),
            EngineEvent::Mutation(record) => self.on_mutation(record),
            EngineEvent::Timer(action) => self.on_timer(action),
            EngineEvent::Initialized(result) => self.on_initialized(result),
            EngineEvent::PassFinished(Ok(summary)) => {
                debug!(?summary, "pass finished")
            }
            EngineEvent::PassFinished(Err(error)) => error!(%error, "pass task failed"),
        }
    }
}

impl<H, Adapter, Gateway> AsyncShutdown for Lifecycle<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    type Result = usize;

    /// Tear down, then wait for in-flight passes to settle. Returns the number of passes awaited.
    async fn shutdown(&mut self) -> Self::Result {
        if !matches!(self.phase, Phase::Idle) || !self.initializing.is_empty() {
            self.teardown(Shutdown::FeedEnded);
        }

        let mut settled = 0;
        while let Some(result) = self.passes.join_next().await {
            if let Err(error) = result {
                error!(%error, "pass task failed");
            }
            settled += 1;
        }
        settled
    }
}
