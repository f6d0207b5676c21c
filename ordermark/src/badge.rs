use crate::{
    dom::{Element, Position},
    gateway::OrderRecord,
};
use serde::{Deserialize, Serialize};

/// Reserved class name prefix of every element the engine creates.
pub const CLASS_PREFIX: &str = "ordermark-";
pub const WRAPPER_CLASS: &str = "ordermark-badges-wrapper";
pub const OVERLAY_CLASS: &str = "ordermark-badges-overlay";
pub const SAVED_CLASS: &str = "ordermark-saved-badge";
pub const RECEIPT_CLASS: &str = "ordermark-receipt-badge";

/// Row attribute binding a physical row to the [`OrderId`](crate::OrderId) it last displayed.
pub const ROW_BINDING_ATTR: &str = "data-ordermark-order-id";

pub const SAVED_LABEL: &str = "Отправлен";
pub const RECEIPT_LABEL: &str = "Чек пробит";

/// Badges a row should display, derived from the fetched [`OrderRecord`].
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
pub struct BadgeState {
    pub is_saved: bool,
    pub has_receipt: bool,
}

impl BadgeState {
    pub fn from_record(record: Option<&OrderRecord>) -> Self {
        Self {
            is_saved: record.is_some(),
            has_receipt: record.is_some_and(|record| record.receipt.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_saved && !self.has_receipt
    }
}

/// How the badge wrapper sits relative to the host content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum Placement {
    /// In flow with the host content.
    #[default]
    Inline,
    /// Positioned outside the container (styled via [`OVERLAY_CLASS`]).
    Overlay,
}

/// Where a row's badge wrapper lives.
#[derive(Debug, Clone)]
pub struct BadgeAnchor<E> {
    pub container: E,
    pub position: Position,
    pub placement: Placement,
}

/// Determines if the [`Element`] was created by the engine.
pub fn is_own<E>(element: &E) -> bool
where
    E: Element,
{
    element.attribute("class").is_some_and(|classes| {
        classes
            .split_whitespace()
            .any(|class| class.starts_with(CLASS_PREFIX))
    })
}

/// Create or update the badge wrapper inside the anchor container to reflect `state`.
///
/// Idempotent: repeated calls with the same state neither duplicate badges nor touch the DOM.
/// Host content inside the container is never modified. Returns the wrapper.
pub fn upsert<E>(anchor: &BadgeAnchor<E>, state: BadgeState) -> E
where
    E: Element,
{
    let wrapper = match anchor
        .container
        .children()
        .into_iter()
        .find(|child| child.has_class(WRAPPER_CLASS))
    {
        Some(wrapper) => wrapper,
        None => {
            let class = match anchor.placement {
                Placement::Inline => WRAPPER_CLASS.to_string(),
                Placement::Overlay => format!("{WRAPPER_CLASS} {OVERLAY_CLASS}"),
            };
            anchor.container.insert_element(&class, anchor.position)
        }
    };

    toggle(&wrapper, SAVED_CLASS, SAVED_LABEL, Position::First, state.is_saved);
    toggle(
        &wrapper,
        RECEIPT_CLASS,
        RECEIPT_LABEL,
        Position::Last,
        state.has_receipt,
    );

    let hidden = state.is_empty();
    if wrapper.is_hidden() != hidden {
        wrapper.set_hidden(hidden);
    }

    wrapper
}

fn toggle<E>(wrapper: &E, class: &str, label: &str, position: Position, enabled: bool)
where
    E: Element,
{
    let existing = wrapper
        .children()
        .into_iter()
        .find(|child| child.has_class(class));

    match (existing, enabled) {
        (None, true) => wrapper.insert_element(class, position).set_text(label),
        (Some(badge), false) => badge.remove(),
        _ => {}
    }
}

/// Remove every badge wrapper inside `row` and its binding attribute. Returns the number of
/// wrappers removed.
pub fn strip<E>(row: &E) -> usize
where
    E: Element,
{
    row.remove_attribute(ROW_BINDING_ATTR);

    let wrappers = row.select_all(&format!(".{WRAPPER_CLASS}"));
    let count = wrappers.len();
    wrappers.iter().for_each(Element::remove);
    count
}

/// Remove every badge wrapper & row binding attribute in the document.
pub fn strip_all<E>(root: &E) -> usize
where
    E: Element,
{
    root.select_all(&format!("[{ROW_BINDING_ATTR}]"))
        .iter()
        .for_each(|row| row.remove_attribute(ROW_BINDING_ATTR));

    let wrappers = root.select_all(&format!(".{WRAPPER_CLASS}"));
    let count = wrappers.len();
    wrappers.iter().for_each(Element::remove);
    count
}
