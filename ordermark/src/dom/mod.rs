use ordermark_integration::channel::UnboundedTx;
use std::fmt::Debug;
use url::Url;

/// CSS selector subset parsing & matching.
pub mod selector;

/// In-memory DOM implementing [`Element`] & [`Host`], used by tests and headless runs.
pub mod memory;

/// Insertion point of a new child [`Element`] within its parent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Position {
    /// Before the existing first child.
    First,
    /// After the existing last child.
    Last,
}

/// Cheap to clone handle to one node of the host page.
///
/// Implementations must tolerate handles to nodes that have since been detached by the host: reads
/// return empty results and writes are silently ignored.
pub trait Element: Debug + Clone + Send + Sync + 'static {
    /// All descendants (excluding `self`) matching the CSS `selector`, in document order.
    fn select_all(&self, selector: &str) -> Vec<Self>;

    /// First descendant (excluding `self`) matching the CSS `selector`.
    fn select(&self, selector: &str) -> Option<Self> {
        self.select_all(selector).into_iter().next()
    }

    fn matches(&self, selector: &str) -> bool;

    /// Concatenated text content of this node & all descendants.
    fn text(&self) -> String;

    fn set_text(&self, text: &str);

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    fn has_class(&self, class: &str) -> bool;

    fn parent(&self) -> Option<Self>;

    fn children(&self) -> Vec<Self>;

    /// Create a new `div` carrying the whitespace separated `class` list, insert it as a child at
    /// `position`, and return it.
    fn insert_element(&self, class: &str, position: Position) -> Self;

    /// Detach this node from its parent.
    fn remove(&self);

    fn set_hidden(&self, hidden: bool);

    fn is_hidden(&self) -> bool;

    /// Determines if both handles refer to the same node.
    fn ptr_eq(&self, other: &Self) -> bool;

    /// Nearest inclusive ancestor matching the CSS `selector`.
    fn closest(&self, selector: &str) -> Option<Self> {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if element.matches(selector) {
                return Some(element);
            }
            current = element.parent();
        }
        None
    }

    /// Determines if `self` is `other` or one of its descendants.
    fn is_within(&self, other: &Self) -> bool {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if element.ptr_eq(other) {
                return true;
            }
            current = element.parent();
        }
        false
    }
}

/// One batch of child list changes observed under the document root.
#[derive(Debug, Clone)]
pub struct MutationRecord<E> {
    /// Node whose children (or text) changed.
    pub target: E,
    pub added: Vec<E>,
    pub removed: Vec<E>,
}

/// History & user interaction events the host page emits.
#[derive(Debug, Clone)]
pub enum NavigationEvent<E> {
    /// `history.pushState` was invoked.
    PushState,
    /// `history.replaceState` was invoked.
    ReplaceState,
    /// Browser back/forward navigation.
    PopState,
    HashChange,
    /// A click on the provided [`Element`].
    Click(E),
}

/// Handle to an active mutation subscription.
pub trait MutationObserver: Debug + Send + Sync + 'static {
    /// Stop delivering [`MutationRecord`]s. Idempotent.
    fn disconnect(&mut self);
}

/// The host page the engine decorates.
///
/// A browser binding implements this by patching the history API once, listening for
/// `popstate`/`hashchange`/`click`, and wrapping a subtree `MutationObserver`.
pub trait Host: Debug + Send + Sync + 'static {
    type Element: Element;
    type Observer: MutationObserver;

    /// The document element.
    fn root(&self) -> Self::Element;

    fn location(&self) -> Url;

    /// Register the single navigation event subscriber. Events are delivered until the receiver
    /// is dropped.
    fn subscribe(&self, tx: UnboundedTx<NavigationEvent<Self::Element>>);

    /// Deliver every child list mutation under [`Host::root`] to `tx` until the returned
    /// [`MutationObserver`] is disconnected or dropped.
    fn observe_mutations(&self, tx: UnboundedTx<MutationRecord<Self::Element>>) -> Self::Observer;
}
