use crate::{
    OrderId,
    badge::{self, BadgeState, ROW_BINDING_ATTR},
    dom::{Element, Host},
    engine::{Context, PassSummary},
    exchange::ExchangeAdapter,
    gateway::{FetchFailure, GatewayError, OrderGateway, OrderRecord},
    guard::Generation,
    queue::QueueError,
    tracker::{Decision, RowStatus},
    watcher::Trigger,
};
use fnv::FnvHashMap;
use futures::future::join_all;
use ordermark_integration::channel::Tx;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Terminal outcome of one row's lookup pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RowOutcome {
    /// Badges were rendered.
    Painted,
    /// Resolved, but the row is not in a state that displays badges (eg/ order not completed).
    Unpainted,
    /// A newer [`Generation`] was declared while the lookup was in flight.
    Stale,
    /// The row was recycled to display another order while the lookup was in flight.
    Recycled,
    Failed(FetchFailure),
    /// Discarded from the queue by a destructive pass before it started.
    Superseded,
}

/// One order lookup and every row of the pass displaying that order.
#[derive(Debug)]
struct Lookup<E> {
    id: OrderId,
    rows: Vec<E>,
}

/// One reprocessing pass: the lookups submitted under a single [`Generation`].
#[derive(Debug)]
pub(crate) struct Pass<H, Adapter, Gateway>
where
    H: Host,
{
    context: Arc<Context<H, Adapter, Gateway>>,
    lookups: Vec<Lookup<H::Element>>,
    summary: PassSummary,
}

impl<H, Adapter, Gateway> Pass<H, Adapter, Gateway>
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    /// Synchronous half of a pass.
    ///
    /// Advances the [`Generation`], discards prior state if destructive, enumerates rows, binds
    /// each row to its [`OrderId`], repaints rows with cached results and marks the remaining
    /// rows as loading. No lookup is started until [`Pass::run`].
    pub(crate) fn prepare(context: Arc<Context<H, Adapter, Gateway>>, trigger: Trigger) -> Self {
        let root = context.host.root();
        let rows = context.adapter.enumerate_rows(&root);
        let ids: Vec<Option<OrderId>> = rows
            .iter()
            .map(|row| context.adapter.extract(row))
            .collect();

        let first_row_changed = context.adapter.detects_in_place_pagination()
            && context.first_row_changed(ids.iter().flatten().next());
        let destructive = trigger.destructive || first_row_changed;
        let generation = context.guard.advance();

        if destructive {
            let superseded = context.queue.clear();
            let forgotten = context.tracker.lock().clear();
            let stripped = badge::strip_all(&root);
            debug!(
                %generation,
                superseded,
                forgotten,
                stripped,
                "discarded prior row state"
            );
        }

        let mut summary = PassSummary {
            generation,
            destructive,
            rows: rows.len(),
            ..PassSummary::default()
        };
        let mut lookups: Vec<Lookup<H::Element>> = Vec::new();
        let mut pending: FnvHashMap<OrderId, usize> = FnvHashMap::default();
        let now = Instant::now();
        let mut tracker = context.tracker.lock();

        for (row, id) in rows.into_iter().zip(ids) {
            let Some(id) = id else {
                summary.unidentified += 1;
                continue;
            };

            bind(&row, &id);

            // Another row of this pass displays the same order
            if let Some(&index) = pending.get(&id) {
                lookups[index].rows.push(row);
                continue;
            }

            match tracker.decide(&id, now) {
                Decision::Skip => summary.skipped += 1,
                Decision::Repaint(badges) => {
                    if render(&context.adapter, &row, badges) {
                        summary.repainted += 1;
                    }
                }
                Decision::Fetch => {
                    tracker.mark_loading(id.clone(), generation, now);
                    pending.insert(id.clone(), lookups.len());
                    lookups.push(Lookup {
                        id,
                        rows: vec![row],
                    });
                }
            }
        }
        drop(tracker);

        summary.submitted = lookups.len();
        info!(
            exchange = %context.adapter.kind(),
            %generation,
            destructive,
            rows = summary.rows,
            submitted = summary.submitted,
            repainted = summary.repainted,
            skipped = summary.skipped,
            "reprocessing order rows"
        );

        Self {
            context,
            lookups,
            summary,
        }
    }

    /// Asynchronous half of a pass: run every lookup through the queue, isolating failures per
    /// row, and render the results that are still valid.
    pub(crate) async fn run(self) -> PassSummary {
        let Self {
            context,
            lookups,
            mut summary,
        } = self;

        let outcomes = join_all(
            lookups
                .into_iter()
                .map(|pending| lookup(&context, summary.generation, pending)),
        )
        .await;

        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            exchange = %context.adapter.kind(),
            generation = %summary.generation,
            painted = summary.painted,
            failed = summary.failed,
            stale = summary.stale,
            recycled = summary.recycled,
            superseded = summary.superseded,
            "finished processing order rows"
        );
        summary
    }
}

/// Bind the row to `id`, stripping badges left behind by the order the row previously displayed.
fn bind<E>(row: &E, id: &OrderId)
where
    E: Element,
{
    let bound = row.attribute(ROW_BINDING_ATTR);
    if bound.as_deref() == Some(id.as_str()) {
        return;
    }

    if bound.is_some() {
        let stripped = badge::strip(row);
        debug!(%id, previous = ?bound, stripped, "row recycled by host page");
    }
    row.set_attribute(ROW_BINDING_ATTR, id.as_str());
}

/// Render `badges` into the row if it currently displays them. Returns whether it did.
pub(crate) fn render<Adapter, E>(adapter: &Adapter, row: &E, badges: BadgeState) -> bool
where
    Adapter: ExchangeAdapter,
    E: Element,
{
    match adapter.badge_anchor(row) {
        Some(anchor) => {
            badge::upsert(&anchor, badges);
            true
        }
        None => false,
    }
}

async fn lookup<H, Adapter, Gateway>(
    context: &Context<H, Adapter, Gateway>,
    generation: Generation,
    Lookup { id, rows }: Lookup<H::Element>,
) -> RowOutcome
where
    H: Host,
    Adapter: ExchangeAdapter,
    Gateway: OrderGateway,
{
    let result = match context.queue.add(|| context.gateway.fetch_order(&id)).await {
        Ok(result) => result,
        Err(QueueError::Superseded) => {
            debug!(%id, %generation, "lookup superseded before it started");
            return RowOutcome::Superseded;
        }
    };

    let status = classify(&id, &result);
    let recorded = context
        .tracker
        .lock()
        .complete(&id, generation, status, Instant::now());

    if !context.guard.is_current(generation) {
        debug!(%id, %generation, recorded, "discarding stale lookup");
        if recorded && matches!(status, RowStatus::Done { .. }) {
            if let Err(error) = context.triggers.send(Trigger::REFRESH) {
                debug!(%id, %error, "failed to request follow-up pass");
            }
        }
        return RowOutcome::Stale;
    }

    let bound: Vec<_> = rows
        .into_iter()
        .filter(|row| {
            row.attribute(ROW_BINDING_ATTR).as_deref() == Some(id.as_str())
                && context.adapter.extract(row).as_ref() == Some(&id)
        })
        .collect();
    if bound.is_empty() {
        debug!(%id, "row recycled during lookup, skipping render");
        return RowOutcome::Recycled;
    }

    match status {
        RowStatus::Done { badges } => {
            let painted = bound
                .iter()
                .filter(|row| render(&context.adapter, *row, badges))
                .count();
            if painted == 0 {
                return RowOutcome::Unpainted;
            }
            debug!(%id, ?badges, painted, "rendered badges");
            RowOutcome::Painted
        }
        RowStatus::Stop404 => RowOutcome::Failed(FetchFailure::NotFound),
        RowStatus::Error(failure) => RowOutcome::Failed(failure),
        RowStatus::Loading { .. } => RowOutcome::Unpainted,
    }
}

fn classify(id: &OrderId, result: &Result<OrderRecord, GatewayError>) -> RowStatus {
    let error = match result {
        Ok(record) => {
            return RowStatus::Done {
                badges: BadgeState::from_record(Some(record)),
            };
        }
        Err(error) => error,
    };

    match FetchFailure::from(error) {
        FetchFailure::NotFound => {
            debug!(%id, %error, "order not found, suppressing lookups");
            RowStatus::Stop404
        }
        failure @ (FetchFailure::Auth | FetchFailure::RateLimit) => {
            warn!(%id, %error, %failure, "order lookup failed");
            RowStatus::Error(failure)
        }
        failure @ FetchFailure::Network => {
            error!(%id, %error, "order lookup failed unexpectedly");
            RowStatus::Error(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::order_record;

    #[test]
    fn test_classify() {
        struct TestCase {
            input: Result<OrderRecord, GatewayError>,
            expected: RowStatus,
        }

        let id = OrderId::from("12345");
        let tests = vec![
            // TC0: saved without receipt
            TestCase {
                input: Ok(order_record("12345", false)),
                expected: RowStatus::Done {
                    badges: BadgeState {
                        is_saved: true,
                        has_receipt: false,
                    },
                },
            },
            // TC1: saved with receipt
            TestCase {
                input: Ok(order_record("12345", true)),
                expected: RowStatus::Done {
                    badges: BadgeState {
                        is_saved: true,
                        has_receipt: true,
                    },
                },
            },
            // TC2: not found
            TestCase {
                input: Err(GatewayError::NotFound),
                expected: RowStatus::Stop404,
            },
            // TC3: another user's order
            TestCase {
                input: Err(GatewayError::AccessDenied),
                expected: RowStatus::Stop404,
            },
            // TC4: session expired
            TestCase {
                input: Err(GatewayError::AuthExpired("Сессия истекла".to_string())),
                expected: RowStatus::Error(FetchFailure::Auth),
            },
            // TC5: throttled
            TestCase {
                input: Err(GatewayError::RateLimited),
                expected: RowStatus::Error(FetchFailure::RateLimit),
            },
            // TC6: server error
            TestCase {
                input: Err(GatewayError::Api {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal".to_string(),
                }),
                expected: RowStatus::Error(FetchFailure::Network),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(classify(&id, &test.input), test.expected, "TC{index} failed");
        }
    }
}
