use thiserror::Error;

/// All errors that stop a [`ListEngine`](crate::engine::ListEngine) from running.
///
/// Per-row lookup failures never surface here; they are recorded in the
/// [`RowStateTracker`](crate::tracker::RowStateTracker).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum EngineError {
    #[error("gateway not ready after waiting {0:?}")]
    AuthTimeout(std::time::Duration),

    #[error("engine task failed: {0}")]
    Task(String),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(format!("{value:?}"))
    }
}

impl From<ordermark_integration::channel::ChannelClosed> for EngineError {
    fn from(_: ordermark_integration::channel::ChannelClosed) -> Self {
        Self::ChannelClosed("trigger")
    }
}
