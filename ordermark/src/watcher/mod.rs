use crate::{
    badge,
    dom::{Element, MutationRecord},
    exchange::ExchangeAdapter,
};
use serde::{Deserialize, Serialize};

/// Coalesces bursts of [`Trigger`]s into single reprocessing passes.
pub mod debounce;

/// Polling based location diffing.
pub mod location;

/// Request for one reprocessing pass.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
pub struct Trigger {
    /// Discard all prior row state & rendered badges before enumerating rows.
    pub destructive: bool,
}

impl Trigger {
    /// Non-destructive pass, eg/ rows were added or re-rendered by the host page.
    pub const REFRESH: Self = Self { destructive: false };

    /// Destructive pass, eg/ the page context changed & prior row bindings are untrustworthy.
    pub const RESET: Self = Self { destructive: true };

    /// Combine two triggers into one that is destructive if either is.
    pub fn merge(self, other: Self) -> Self {
        Self {
            destructive: self.destructive || other.destructive,
        }
    }
}

/// Determines if a [`MutationRecord`] should trigger a non-destructive reprocess.
///
/// Mutations of (or inside) engine owned badge elements are ignored, as are added nodes that are
/// themselves engine owned. Any other added node that is an order row, contains order rows, or
/// lies inside an order row is relevant.
pub fn is_relevant_mutation<Adapter, E>(adapter: &Adapter, record: &MutationRecord<E>) -> bool
where
    Adapter: ExchangeAdapter,
    E: Element,
{
    if is_within_own(&record.target) {
        return false;
    }

    record
        .added
        .iter()
        .filter(|node| !badge::is_own(*node))
        .any(|node| touches_rows(adapter, node))
}

fn is_within_own<E>(element: &E) -> bool
where
    E: Element,
{
    let mut current = Some(element.clone());
    while let Some(element) = current {
        if badge::is_own(&element) {
            return true;
        }
        current = element.parent();
    }
    false
}

fn touches_rows<Adapter, E>(adapter: &Adapter, node: &E) -> bool
where
    Adapter: ExchangeAdapter,
    E: Element,
{
    adapter
        .row_selectors()
        .iter()
        .any(|selector| node.closest(selector).is_some() || node.select(selector).is_some())
}
