use crate::{
    ExchangeKind, OrderId,
    badge::BadgeAnchor,
    dom::Element,
    extract::RowExtractor,
};
use std::fmt::Debug;
use url::Url;

/// Bybit P2P order list (`/p2p/orderList`) & merchant admin order list.
pub mod bybit;

/// HTX fiat-crypto order list.
pub mod htx;

/// MEXC fiat order list.
pub mod mexc;

/// Describes how to find, identify and decorate the order rows of one exchange's order list page.
///
/// Selector sets are brittle external contracts tracking each exchange's markup. The
/// [`ListEngine`](crate::engine::ListEngine) logic is shared by every adapter.
pub trait ExchangeAdapter: Debug + Send + Sync + 'static {
    fn kind(&self) -> ExchangeKind;

    /// Determines if the location is an order list page this adapter decorates.
    fn is_target(&self, location: &Url) -> bool;

    /// Order row selectors, tried in order until one yields rows.
    fn row_selectors(&self) -> &[&'static str];

    fn extractor(&self) -> &RowExtractor;

    /// Where the row's badges belong, or `None` if the row should not display badges (eg/ the
    /// order is not completed, or the status cell is missing).
    fn badge_anchor<E>(&self, row: &E) -> Option<BadgeAnchor<E>>
    where
        E: Element;

    /// Selectors of pagination controls whose clicks change the visible rows without navigating.
    fn pagination_selectors(&self) -> &[&'static str] {
        &[]
    }

    /// Whether the host repaginates in place, so a different first row means a new page rather
    /// than a new order arriving at the top of the list.
    fn detects_in_place_pagination(&self) -> bool {
        false
    }

    /// Currently visible order rows, using the first row selector that matches anything.
    fn enumerate_rows<E>(&self, root: &E) -> Vec<E>
    where
        E: Element,
    {
        self.row_selectors()
            .iter()
            .map(|selector| root.select_all(selector))
            .find(|rows| !rows.is_empty())
            .unwrap_or_default()
    }

    fn extract<E>(&self, row: &E) -> Option<OrderId>
    where
        E: Element,
    {
        self.extractor().extract(row)
    }

    /// Determines if the clicked element is (or is inside) a pagination control.
    fn is_pagination_control<E>(&self, element: &E) -> bool
    where
        E: Element,
    {
        self.pagination_selectors()
            .iter()
            .any(|selector| element.closest(selector).is_some())
    }
}

/// Determines if `host` is `domain` or one of its subdomains.
pub(crate) fn host_matches(host: Option<&str>, domain: &str) -> bool {
    host.is_some_and(|host| {
        host == domain
            || host
                .strip_suffix(domain)
                .is_some_and(|subdomain| subdomain.ends_with('.'))
    })
}

/// Determines if `path` contains `segment`, followed by the end of the path or a `/`.
pub(crate) fn path_contains(path: &str, segment: &str) -> bool {
    path.match_indices(segment).any(|(index, _)| {
        let rest = &path[index + segment.len()..];
        rest.is_empty() || rest.starts_with('/')
    })
}
