use crate::{
    ExchangeKind,
    badge::{BadgeAnchor, Placement},
    dom::{Element, Position},
    exchange::{ExchangeAdapter, host_matches, path_contains},
    extract::{Charset, IdSource, IdStrategy, RowExtractor},
};
use url::Url;

/// Minimum length of a MEXC order identifier.
const MIN_ID_LEN: usize = 15;

/// MEXC fiat order list.
///
/// Class names carry CSS-module hashes (eg/ `page_orderTableContent__kF0J0`), so every hashed
/// selector is paired with a `[class*=".."]` fallback. Pagination swaps rows in place without
/// touching the URL.
#[derive(Debug, Clone)]
pub struct Mexc {
    extractor: RowExtractor,
}

impl Default for Mexc {
    fn default() -> Self {
        let order_link = r#"a[href*="order-processing"]"#;

        Self {
            extractor: RowExtractor::new([
                IdStrategy::new(
                    r#"a.page_orderIdLine__qi2I0, a[class*="orderIdLine"]"#,
                    IdSource::Text,
                )
                .rule(MIN_ID_LEN, Charset::Token),
                IdStrategy::new(order_link, IdSource::HrefParam("id")),
                IdStrategy::new(order_link, IdSource::Text)
                    .rule(MIN_ID_LEN, Charset::Alphanumeric),
                IdStrategy::new("[data-order-id]", IdSource::Attribute("data-order-id")),
                IdStrategy::new(
                    "a",
                    IdSource::PrefixedDigits {
                        prefix: 'd',
                        min_digits: MIN_ID_LEN,
                    },
                ),
            ]),
        }
    }
}

impl ExchangeAdapter for Mexc {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Mexc
    }

    fn is_target(&self, location: &Url) -> bool {
        host_matches(location.host_str(), "mexc.com")
            && path_contains(
                location.path(),
                "/buy-crypto/order-processing/fiat-order-list",
            )
    }

    fn row_selectors(&self) -> &[&'static str] {
        &[
            r#".page_orderTableContent__kF0J0, [class*="orderTableContent"]"#,
            r#"[class*="order-table"] [class*="order-item"], [class*="order-row"], [class*="orderList"] > div"#,
        ]
    }

    fn extractor(&self) -> &RowExtractor {
        &self.extractor
    }

    fn badge_anchor<E>(&self, row: &E) -> Option<BadgeAnchor<E>>
    where
        E: Element,
    {
        let status = row.select(r#".page_tabListSix__s04Ms, [class*="tabListSix"]"#)?;
        let text = status.text();
        if !text.contains("Завершен") && !text.contains("Completed") {
            return None;
        }

        let container = status
            .select(r#".page_statusColText__md_kg, [class*="statusColText"]"#)
            .and_then(|label| label.parent())
            .unwrap_or(status);

        Some(BadgeAnchor {
            container,
            position: Position::First,
            placement: Placement::Inline,
        })
    }

    fn pagination_selectors(&self) -> &[&'static str] {
        &[r#"[class*="pagination"], [class*="Pagination"]"#]
    }

    fn detects_in_place_pagination(&self) -> bool {
        true
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

    fn status_cell(status: &str) -> NodeBuilder {
        node("div").class("page_tabListSix__s04Ms").child(
            node("div")
                .class("page_statusCol__x1")
                .child(node("span").class("page_statusColText__md_kg").text(status)),
        )
    }

    fn host() -> MemoryHost {
        MemoryHost::new(
            Url::parse("https://www.mexc.com/ru-RU/buy-crypto/order-processing/fiat-order-list")
                .unwrap(),
        )
    }

    #[test]
    fn test_is_target() {
        let mexc = Mexc::default();
        let url = |raw: &str| Url::parse(raw).unwrap();

        assert!(mexc.is_target(&url(
            "https://www.mexc.com/buy-crypto/order-processing/fiat-order-list?page=2"
        )));
        assert!(!mexc.is_target(&url(
            "https://www.mexc.com/buy-crypto/order-processing?id=d123"
        )));
        assert!(!mexc.is_target(&url(
            "https://www.htx.com/buy-crypto/order-processing/fiat-order-list"
        )));
    }

    #[test]
    fn test_extract_strategies() {
        struct TestCase {
            row: NodeBuilder,
            expected: Option<&'static str>,
        }

        let tests = vec![
            // TC0: order id line
            TestCase {
                row: node("div").child(
                    node("a")
                        .class("page_orderIdLine__qi2I0")
                        .text("d1234567890123456"),
                ),
                expected: Some("d1234567890123456"),
            },
            // TC1: order id line too short, falls through to href param
            TestCase {
                row: node("div").children([
                    node("a").class("page_orderIdLine__qi2I0").text("d123"),
                    node("a")
                        .attr("href", "/buy-crypto/order-processing?id=d9876543210987654")
                        .text("Details"),
                ]),
                expected: Some("d9876543210987654"),
            },
            // TC2: link text
            TestCase {
                row: node("div").child(
                    node("a")
                        .attr("href", "/buy-crypto/order-processing")
                        .text("A1B2C3D4E5F6G7H8"),
                ),
                expected: Some("A1B2C3D4E5F6G7H8"),
            },
            // TC3: data attribute
            TestCase {
                row: node("div").child(node("span").attr("data-order-id", "d5550001112223334")),
                expected: Some("d5550001112223334"),
            },
            // TC4: any prefixed link
            TestCase {
                row: node("div").child(node("a").text(" d1112223334445556 ")),
                expected: Some("d1112223334445556"),
            },
            // TC5: nothing
            TestCase {
                row: node("div").child(node("a").text("d123")),
                expected: None,
            },
        ];

        let mexc = Mexc::default();
        for (index, test) in tests.into_iter().enumerate() {
            let host = host();
            let row = host.body().append(test.row);
            assert_eq!(
                mexc.extract(&row),
                test.expected.map(OrderId::from),
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_rows_fallback_and_anchor() {
        let host = host();
        host.body().append(node("div").class("orderList").children([
            node("div").child(status_cell("Завершено")),
            node("div").child(status_cell("Отменено")),
        ]));
        let mexc = Mexc::default();

        let rows = mexc.enumerate_rows(&host.root());
        assert_eq!(rows.len(), 2);

        let anchor = mexc.badge_anchor(&rows[0]).unwrap();
        assert!(anchor.container.has_class("page_statusCol__x1"));
        assert_eq!(anchor.position, Position::First);
        assert!(mexc.badge_anchor(&rows[1]).is_none());
    }

    #[test]
    fn test_is_pagination_control() {
        let host = host();
        let pager = host.body().append(
            node("ul")
                .class("ant-pagination")
                .child(node("li").class("ant-pagination-item").child(node("a").text("2"))),
        );
        let mexc = Mexc::default();

        let page_link = pager.select("a").unwrap();
        assert!(mexc.is_pagination_control(&page_link));
        assert!(!mexc.is_pagination_control(&host.body()));
    }
}
