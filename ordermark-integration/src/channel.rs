use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Sending half of a channel, abstracted over the channel kind.
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;
    type Error;
    fn send(&self, item: Self::Item) -> Result<(), Self::Error>;
}

/// The receiving half of a channel has been dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("channel receiver dropped")]
pub struct ChannelClosed;

#[derive(Debug)]
pub struct UnboundedTx<T> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
}

impl<T> UnboundedTx<T> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }

    /// Returns true if the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// Manual impl so `T` is not required to be `Clone`.
impl<T> Clone for UnboundedTx<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Tx for UnboundedTx<T>
where
    T: Send,
{
    type Item = T;
    type Error = ChannelClosed;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        self.tx.send(item).map_err(|_| ChannelClosed)
    }
}

#[derive(Debug, Constructor)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> UnboundedRx<T> {
    /// Receive the next item, or `None` once every [`UnboundedTx`] has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receive an item if one is immediately available.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// [`Tx`] wrapper that disables itself (rather than erroring repeatedly) once the receiver
/// has been dropped.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
pub struct ChannelTxDroppable<ChannelTx> {
    pub state: ChannelState<ChannelTx>,
}

impl<ChannelTx> ChannelTxDroppable<ChannelTx> {
    pub fn new(tx: ChannelTx) -> Self {
        Self {
            state: ChannelState::Active(tx),
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            state: ChannelState::Disabled,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Display)]
pub enum ChannelState<Tx> {
    Active(Tx),
    Disabled,
}

impl<ChannelTx> ChannelTxDroppable<ChannelTx>
where
    ChannelTx: Tx,
{
    pub fn send(&mut self, item: ChannelTx::Item) {
        let ChannelState::Active(tx) = &self.state else {
            return;
        };

        if tx.send(item).is_err() {
            let name = std::any::type_name::<ChannelTx::Item>();
            warn!(
                name,
                "ChannelTxDroppable receiver dropped - items will no longer be sent"
            );
            self.state = ChannelState::Disabled
        }
    }
}

pub fn mpsc_unbounded<T>() -> (UnboundedTx<T>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx::new(tx), UnboundedRx::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_tx_send_after_receiver_dropped() {
        let (tx, rx) = mpsc_unbounded::<u8>();
        assert!(tx.send(1).is_ok());
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(2), Err(ChannelClosed));
    }

    #[test]
    fn test_channel_tx_droppable_disables_on_closed_receiver() {
        let (tx, mut rx) = mpsc_unbounded::<u8>();
        let mut droppable = ChannelTxDroppable::new(tx);

        droppable.send(1);
        assert_eq!(rx.try_recv(), Some(1));

        drop(rx);
        droppable.send(2);
        assert!(matches!(droppable.state, ChannelState::Disabled));
    }

    #[test]
    fn test_unbounded_rx_recv_ends_once_senders_dropped() {
        let (tx, mut rx) = mpsc_unbounded::<&'static str>();
        tx.send("first").unwrap();
        drop(tx);

        tokio_test::block_on(async {
            assert_eq!(rx.recv().await, Some("first"));
            assert_eq!(rx.recv().await, None);
        });
    }
}
