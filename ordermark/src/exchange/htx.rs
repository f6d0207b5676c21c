use crate::{
    ExchangeKind,
    badge::{BadgeAnchor, Placement},
    dom::{Element, Position},
    exchange::{ExchangeAdapter, host_matches, path_contains},
    extract::{IdSource, IdStrategy, RowExtractor},
};
use url::Url;

/// HTX fiat-crypto order list.
///
/// Rows are `div` grids rather than table rows. Badges are appended to the end of any row that
/// carries a `.td.deliver-box` status cell, regardless of the status text.
#[derive(Debug, Clone)]
pub struct Htx {
    extractor: RowExtractor,
}

impl Default for Htx {
    fn default() -> Self {
        Self {
            extractor: RowExtractor::new([IdStrategy::new(".td.w-160 a", IdSource::Text)]),
        }
    }
}

impl ExchangeAdapter for Htx {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Htx
    }

    fn is_target(&self, location: &Url) -> bool {
        let host = location.host_str();
        (host_matches(host, "htx.com") || host_matches(host, "htx.com.gt"))
            && path_contains(location.path(), "/fiat-crypto/user-center/orders")
    }

    fn row_selectors(&self) -> &[&'static str] {
        &[".my-order .table .row-wrapper .row"]
    }

    fn extractor(&self) -> &RowExtractor {
        &self.extractor
    }

    fn badge_anchor<E>(&self, row: &E) -> Option<BadgeAnchor<E>>
    where
        E: Element,
    {
        row.select(".td.deliver-box")?;
        Some(BadgeAnchor {
            container: row.clone(),
            position: Position::Last,
            placement: Placement::Inline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        OrderId,
        dom::{
            Host,
            memory::{MemoryHost, NodeBuilder, node},
        },
    };

    fn row(id: &str, with_status: bool) -> NodeBuilder {
        let row = node("div")
            .class("row")
            .child(node("div").class("td w-160").child(node("a").text(id)))
            .child(node("div").class("td").text("100 USDT"));

        if with_status {
            row.child(node("div").class("td deliver-box").text("Completed"))
        } else {
            row
        }
    }

    #[test]
    fn test_is_target() {
        let htx = Htx::default();
        let url = |raw: &str| Url::parse(raw).unwrap();

        assert!(htx.is_target(&url("https://www.htx.com/fiat-crypto/user-center/orders")));
        assert!(htx.is_target(&url("https://www.htx.com.gt/en-us/fiat-crypto/user-center/orders/")));
        assert!(!htx.is_target(&url("https://www.htx.com/fiat-crypto/trade/buy-usdt")));
        assert!(!htx.is_target(&url("https://www.bybit.com/fiat-crypto/user-center/orders")));
    }

    #[test]
    fn test_rows_and_anchor() {
        let host = MemoryHost::new(
            Url::parse("https://www.htx.com/fiat-crypto/user-center/orders").unwrap(),
        );
        host.body().append(
            node("div").class("my-order").child(
                node("div")
                    .class("table")
                    .child(node("div").class("row-wrapper").children([
                        row("900123", true),
                        row("900124", false),
                    ])),
            ),
        );
        let htx = Htx::default();

        let rows = htx.enumerate_rows(&host.root());
        assert_eq!(rows.len(), 2);
        assert_eq!(htx.extract(&rows[0]), Some(OrderId::from("900123")));
        assert_eq!(htx.extract(&rows[1]), Some(OrderId::from("900124")));

        let anchor = htx.badge_anchor(&rows[0]).unwrap();
        assert!(anchor.container.ptr_eq(&rows[0]));
        assert_eq!(anchor.position, Position::Last);
        assert!(htx.badge_anchor(&rows[1]).is_none());
    }
}
