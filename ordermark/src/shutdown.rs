use serde::{Deserialize, Serialize};

pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// Reason an engine component was shut down.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum Shutdown {
    /// Navigated away from a supported order list page.
    OffTarget,
    /// The host navigation feed ended.
    FeedEnded,
}
