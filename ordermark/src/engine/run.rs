use crate::{
    dom::Host,
    engine::{
        ListEngine, Processor,
        lifecycle::{EngineEvent, Lifecycle},
    },
    error::EngineError,
    exchange::ExchangeAdapter,
    gateway::OrderGateway,
    shutdown::{AsyncShutdown, Shutdown},
    watcher::debounce::Debouncer,
};
use ordermark_integration::channel::mpsc_unbounded;
use tokio::time::MissedTickBehavior;
use tracing::info;

impl<H, Adapter, Gateway> ListEngine<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    /// Run the engine until the host navigation feed ends.
    ///
    /// Subscribes to the [`Host`] navigation events, polls the location, debounces reprocess
    /// triggers and drives the [`Lifecycle`] state machine. Leaving the order list page tears the
    /// page state down, but the watchers stay armed to detect navigation back onto it.
    pub async fn run(self) -> Result<Shutdown, EngineError> {
        let Self {
            context,
            trigger_rx,
        } = self;

        info!(
            exchange = %context.adapter.kind(),
            max_concurrent = context.config.max_concurrent,
            "ListEngine running"
        );

        let (reprocess_tx, mut reprocess_rx) = mpsc_unbounded();
        let debouncer =
            tokio::spawn(Debouncer::new(context.config.debounce, trigger_rx, reprocess_tx).run());

        let (navigation_tx, mut navigation_rx) = mpsc_unbounded();
        context.host.subscribe(navigation_tx);

        let (mutation_tx, mut mutation_rx) = mpsc_unbounded();

        let mut location_poll = tokio::time::interval(context.config.url_poll_interval);
        location_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut lifecycle = Lifecycle::new(context, mutation_tx);
        lifecycle.start();

        // Run Lifecycle process loop until the navigation feed ends
        let result = loop {
            let event = tokio::select! {
                event = navigation_rx.recv() => match event {
                    Some(event) => EngineEvent::Navigation(event),
                    None => break Ok(Shutdown::FeedEnded),
                },
                trigger = reprocess_rx.recv() => match trigger {
                    Some(trigger) => EngineEvent::Reprocess(trigger),
                    None => break Err(EngineError::ChannelClosed("reprocess")),
                },
                Some(record) = mutation_rx.recv() => EngineEvent::Mutation(record),
                Some(result) = lifecycle.initializing.join_next(), if !lifecycle.initializing.is_empty() => {
                    EngineEvent::Initialized(result)
                }
                Some(action) = lifecycle.timers.join_next(), if !lifecycle.timers.is_empty() => {
                    EngineEvent::Timer(action)
                }
                Some(summary) = lifecycle.passes.join_next(), if !lifecycle.passes.is_empty() => {
                    EngineEvent::PassFinished(summary)
                }
                _ = location_poll.tick() => EngineEvent::LocationPoll,
            };

            lifecycle.process(event);
        };

        info!(?result, "ListEngine shutting down");

        let settled = lifecycle.shutdown().await;
        debouncer.abort();

        info!(settled, "ListEngine stopped");
        result
    }
}
