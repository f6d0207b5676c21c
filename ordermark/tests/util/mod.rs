#![allow(dead_code)]

use ordermark::{
    badge::{BadgeState, RECEIPT_CLASS, SAVED_CLASS, WRAPPER_CLASS},
    config::EngineConfig,
    dom::{
        Element,
        memory::{MemoryElement, MemoryHost, NodeBuilder, node},
    },
    engine::ListEngine,
    error::EngineError,
    exchange::ExchangeAdapter,
    guard::VersionGuard,
    shutdown::Shutdown,
    test_utils::MockGateway,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

pub const BYBIT_ORDER_LIST: &str = "https://www.bybit.com/p2p/orderList";
pub const COMPLETED: &str = "Завершено";
pub const CANCELLED: &str = "Отменено";

/// Long enough for initialisation (gateway poll & DOM settle) and one pass to finish.
pub const SETTLE: Duration = Duration::from_secs(1);

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

/// [`MemoryHost`] on the Bybit order list with an empty classic order table. Returns the
/// `tbody` rows are appended to.
pub fn bybit_host() -> (MemoryHost, MemoryElement) {
    let host = MemoryHost::new(url(BYBIT_ORDER_LIST));
    let table = host.body().append(
        node("div")
            .class("otc-order-table")
            .child(node("table").child(node("tbody"))),
    );
    let tbody = table.select("tbody").unwrap();
    (host, tbody)
}

pub fn bybit_row(id: &str, status: &str) -> NodeBuilder {
    node("tr")
        .child(
            node("td").class("fiat-amount").child(
                node("div")
                    .class("order-id")
                    .child(node("span").class("id").text(id)),
            ),
        )
        .child(status_cell(status))
        .child(node("td").text("9 250 RUB"))
}

pub fn status_cell(status: &str) -> NodeBuilder {
    node("td").class("fiat-order-status").child(status_item(status))
}

pub fn status_item(status: &str) -> NodeBuilder {
    node("div")
        .class("moly-space-item w-full moly-space-item-first")
        .text(status)
}

/// Replace the displayed order identifier of a Bybit row, as a recycling virtual DOM does.
pub fn recycle_bybit_row(row: &MemoryElement, id: &str) {
    let order_id = row.select(".order-id").unwrap();
    order_id.clear_children();
    order_id.append(node("span").class("id").text(id));
}

/// Badges currently visible in the row.
pub fn badges(row: &MemoryElement) -> BadgeState {
    match row.select(&format!(".{WRAPPER_CLASS}")) {
        Some(wrapper) if !wrapper.is_hidden() => BadgeState {
            is_saved: wrapper.select(&format!(".{SAVED_CLASS}")).is_some(),
            has_receipt: wrapper.select(&format!(".{RECEIPT_CLASS}")).is_some(),
        },
        _ => BadgeState::default(),
    }
}

pub fn wrapper_count(host: &MemoryHost) -> usize {
    host.body().select_all(&format!(".{WRAPPER_CLASS}")).len()
}

pub const SENT: BadgeState = BadgeState {
    is_saved: true,
    has_receipt: false,
};

pub const SENT_WITH_RECEIPT: BadgeState = BadgeState {
    is_saved: true,
    has_receipt: true,
};

pub const NONE: BadgeState = BadgeState {
    is_saved: false,
    has_receipt: false,
};

/// Spawn a [`ListEngine`] with the default configuration.
pub fn spawn_engine<Adapter>(
    host: &MemoryHost,
    adapter: Adapter,
    gateway: &MockGateway,
) -> (VersionGuard, JoinHandle<Result<Shutdown, EngineError>>)
where
    Adapter: ExchangeAdapter,
{
    let engine = ListEngine::new(
        EngineConfig::default(),
        host.clone(),
        adapter,
        gateway.clone(),
    );
    let guard = engine.version_guard();
    (guard, tokio::spawn(engine.run()))
}

/// End the navigation feed and wait for the engine to stop.
pub async fn shutdown(host: &MemoryHost, engine: JoinHandle<Result<Shutdown, EngineError>>) {
    host.close_navigation();
    assert_eq!(engine.await.unwrap(), Ok(Shutdown::FeedEnded));
}
