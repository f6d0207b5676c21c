use crate::{
    ExchangeKind,
    badge::{BadgeAnchor, Placement},
    dom::{Element, Position},
    exchange::{ExchangeAdapter, host_matches, path_contains},
    extract::{IdSource, IdStrategy, RowExtractor},
};
use url::Url;

const COMPLETED: &str = "Завершено";

/// Bybit P2P order lists.
///
/// Two table layouts exist: the classic `.otc-order-table` with a dedicated
/// `td.fiat-order-status` cell, and the merchant admin `.merchant-order-list__table` whose last
/// cell holds the status.
#[derive(Debug, Clone)]
pub struct Bybit {
    extractor: RowExtractor,
}

impl Default for Bybit {
    fn default() -> Self {
        Self {
            extractor: RowExtractor::new([
                IdStrategy::new(
                    "td.fiat-amount .order-id .id, .order-id .id, .fiat-amount .id, span.id",
                    IdSource::Text,
                ),
                IdStrategy::new("td", IdSource::DigitRun { min_digits: 18 }).nth(1),
            ]),
        }
    }
}

impl ExchangeAdapter for Bybit {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bybit
    }

    fn is_target(&self, location: &Url) -> bool {
        host_matches(location.host_str(), "bybit.com")
            && (path_contains(location.path(), "/p2p/orderList")
                || path_contains(location.path(), "/p2p/merchant-admin/order-list"))
    }

    fn row_selectors(&self) -> &[&'static str] {
        &[".otc-order-table tbody > tr, .merchant-order-list__table tbody > tr"]
    }

    fn extractor(&self) -> &RowExtractor {
        &self.extractor
    }

    fn badge_anchor<E>(&self, row: &E) -> Option<BadgeAnchor<E>>
    where
        E: Element,
    {
        if let Some(status) = row.select("td.fiat-order-status") {
            let completed = status
                .select(".moly-space-item.w-full.moly-space-item-first")
                .is_some_and(|item| item.text().trim() == COMPLETED);

            return completed.then_some(BadgeAnchor {
                container: status,
                position: Position::First,
                placement: Placement::Inline,
            });
        }

        row.closest(".merchant-order-list__table")?;
        let status = row.select_all("td").pop()?;
        if !status.text().contains(COMPLETED) {
            return None;
        }

        Some(BadgeAnchor {
            container: status
                .select(".merchant-order-list__py-3")
                .unwrap_or(status),
            position: Position::First,
            placement: Placement::Overlay,
        })
    }
}
