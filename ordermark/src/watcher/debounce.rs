use crate::watcher::Trigger;
use ordermark_integration::channel::{Tx, UnboundedRx, UnboundedTx};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Coalesces [`Trigger`]s into single reprocessing requests.
///
/// The window is fixed: it opens at the first trigger of a burst and closes `window` later,
/// regardless of how many triggers arrive meanwhile. One merged [`Trigger`] is emitted per window,
/// destructive if any contributing trigger was.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    rx: UnboundedRx<Trigger>,
    tx: UnboundedTx<Trigger>,
}

impl Debouncer {
    pub fn new(window: Duration, rx: UnboundedRx<Trigger>, tx: UnboundedTx<Trigger>) -> Self {
        Self { window, rx, tx }
    }

    /// Run until every input [`Trigger`] sender, or the output receiver, has been dropped.
    pub async fn run(mut self) {
        while let Some(first) = self.rx.recv().await {
            let deadline = Instant::now() + self.window;
            let mut merged = first;
            let mut collapsed = 1_usize;
            let mut input_closed = false;

            loop {
                tokio::select! {
                    next = self.rx.recv() => match next {
                        Some(trigger) => {
                            merged = merged.merge(trigger);
                            collapsed += 1;
                        }
                        None => {
                            input_closed = true;
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            if input_closed {
                tokio::time::sleep_until(deadline).await;
            }

            debug!(?merged, collapsed, "debounced reprocess triggers");
            if self.tx.send(merged).is_err() || input_closed {
                break;
            }
        }
    }
}
