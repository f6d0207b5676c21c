#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Ordermark
//! Order-list synchronisation engine that overlays remote order status badges onto the order
//! list pages of P2P exchanges (Bybit, HTX & MEXC).
//!
//! The host page is treated as an untrusted, arbitrarily mutating data source. The engine:
//! * Detects SPA navigation, silent URL changes and DOM mutation bursts, and coalesces them into
//!   debounced reprocessing passes.
//! * Maps each visible order row to a stable [`OrderId`] using per-exchange fallback strategies.
//! * Looks up each order through an [`OrderGateway`](gateway::OrderGateway) under a FIFO
//!   concurrency cap, classifying failures (not found, access denied, auth expired, rate limited).
//! * Renders idempotent badges into each row, and guarantees stale in-flight lookups from a
//!   superseded page state never paint over a newer view.
//!
//! ## Overview
//! At a high level, the engine is assembled from de-coupled components:
//! * **Host**: [`Host`](dom::Host) & [`Element`](dom::Element) traits abstract the browser page.
//! * **Exchange**: [`ExchangeAdapter`](exchange::ExchangeAdapter) supplies per-site selectors,
//!   identifier extraction and badge placement.
//! * **Gateway**: authorised backend lookups with a typed error taxonomy.
//! * **Queue**, **Tracker** & **Guard**: admission control, per-order status memory and the
//!   generation counter used to discard stale work.
//! * **Engine**: the [`ListEngine`](engine::ListEngine) orchestrating all of the above.
//!
//! ## Getting Started
//! ```rust,no_run
//! use ordermark::{
//!     config::EngineConfig,
//!     dom::memory::MemoryHost,
//!     engine::ListEngine,
//!     exchange::bybit::Bybit,
//!     test_utils::MockGateway,
//! };
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     ordermark::logging::init_logging();
//!
//!     let host = MemoryHost::new(Url::parse("https://www.bybit.com/p2p/orderList").unwrap());
//!     let engine = ListEngine::new(EngineConfig::default(), host, Bybit::default(), MockGateway::default());
//!
//!     // Runs until the host navigation feed ends
//!     engine.run().await.unwrap();
//! }
//! ```

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Engine configuration, loadable from JSON.
pub mod config;

/// All top-level [`Error`](std::error::Error)s generated by the engine.
pub mod error;

/// Host page abstraction ([`Element`](dom::Element), [`Host`](dom::Host)), a CSS selector subset,
/// and an in-memory DOM implementation.
pub mod dom;

/// Authorised backend lookups of remote order records, credentials and error classification.
pub mod gateway;

/// Per-exchange adapters describing how to find, identify and decorate order rows.
pub mod exchange;

/// Row identifier extraction strategies.
pub mod extract;

/// FIFO admission controlled executor capping concurrent lookups.
pub mod queue;

/// Per-order status memory used to dedupe lookups and suppress not found retries.
pub mod tracker;

/// Monotonic generation counter used to discard stale work.
pub mod guard;

/// Idempotent badge rendering.
pub mod badge;

/// Navigation & mutation watching, debouncing and URL diffing.
pub mod watcher;

/// The list orchestrator.
pub mod engine;

/// Bounded polling utility.
pub mod poll;

/// Logging initialisation utilities.
pub mod logging;

/// Traits used to shut down engine components.
pub mod shutdown;

/// Opaque order identifier as displayed by an exchange.
///
/// Never treated as a number, since exchange order identifiers exceed integer precision in the
/// host pages' runtime.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display, From,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S>(id: S) -> Self
    where
        S: AsRef<str>,
    {
        Self(SmolStr::new(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Backend exchange discriminator.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
pub enum ExchangeKind {
    #[display("bybit")]
    Bybit,
    #[display("htx")]
    Htx,
    #[display("mexc")]
    Mexc,
}

impl ExchangeKind {
    /// Numeric `exchangeType` understood by the backend.
    pub fn exchange_type(&self) -> u8 {
        match self {
            ExchangeKind::Bybit => 1,
            ExchangeKind::Htx => 2,
            ExchangeKind::Mexc => 3,
        }
    }
}

pub mod test_utils {
    //! Scripted collaborators used to drive the engine without a browser or backend.

    use crate::{
        OrderId,
        gateway::{GatewayError, OrderGateway, OrderRecord, Receipt},
    };
    use async_trait::async_trait;
    use fnv::FnvHashMap;
    use ordermark_integration::error::SocketError;
    use parking_lot::Mutex;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };
    use tokio::sync::Notify;

    /// Scripted response for one [`OrderId`].
    #[derive(Debug)]
    pub enum MockResponse {
        Found(OrderRecord),
        Fail(GatewayError),
    }

    #[derive(Debug, Default)]
    struct MockState {
        responses: FnvHashMap<OrderId, MockResponse>,
        gates: FnvHashMap<OrderId, Arc<Notify>>,
        calls: Vec<OrderId>,
    }

    /// Scripted [`OrderGateway`].
    ///
    /// Unscripted identifiers resolve to [`GatewayError::NotFound`]. A gated identifier blocks
    /// until [`MockGateway::release`] is called, which lets tests hold lookups in flight.
    #[derive(Debug, Clone)]
    pub struct MockGateway {
        state: Arc<Mutex<MockState>>,
        ready: Arc<AtomicBool>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self {
                state: Arc::default(),
                ready: Arc::new(AtomicBool::new(true)),
                in_flight: Arc::default(),
                max_in_flight: Arc::default(),
            }
        }
    }

    impl MockGateway {
        pub fn respond(&self, id: impl Into<OrderId>, response: MockResponse) -> &Self {
            self.state.lock().responses.insert(id.into(), response);
            self
        }

        pub fn found(&self, id: &str, with_receipt: bool) -> &Self {
            self.respond(id, MockResponse::Found(order_record(id, with_receipt)))
        }

        pub fn fail(&self, id: &str, error: GatewayError) -> &Self {
            self.respond(id, MockResponse::Fail(error))
        }

        /// Hold lookups of `id` in flight until released.
        pub fn gate(&self, id: &str) -> &Self {
            self.state
                .lock()
                .gates
                .insert(OrderId::from(id), Arc::new(Notify::new()));
            self
        }

        /// Release every lookup of `id` currently or subsequently waiting on its gate.
        pub fn release(&self, id: &str) {
            if let Some(gate) = self.state.lock().gates.remove(&OrderId::from(id)) {
                gate.notify_waiters();
            }
        }

        pub fn set_ready(&self, ready: bool) {
            self.ready.store(ready, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<OrderId> {
            self.state.lock().calls.clone()
        }

        pub fn call_count(&self, id: &str) -> usize {
            let id = OrderId::from(id);
            self.state
                .lock()
                .calls
                .iter()
                .filter(|call| **call == id)
                .count()
        }

        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn fetch_order(&self, id: &OrderId) -> Result<OrderRecord, GatewayError> {
            let gate = {
                let mut state = self.state.lock();
                state.calls.push(id.clone());
                state.gates.get(id).cloned()
            };

            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            if let Some(gate) = gate {
                let notified = gate.notified();
                // Released between lookup and registration
                if self.state.lock().gates.contains_key(id) {
                    notified.await;
                }
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let state = self.state.lock();
            match state.responses.get(id) {
                Some(MockResponse::Found(record)) => Ok(record.clone()),
                Some(MockResponse::Fail(error)) => Err(replay(error)),
                None => Err(GatewayError::NotFound),
            }
        }
    }

    /// Re-create a scripted [`GatewayError`] so it can be returned more than once.
    fn replay(error: &GatewayError) -> GatewayError {
        match error {
            GatewayError::NotFound => GatewayError::NotFound,
            GatewayError::AccessDenied => GatewayError::AccessDenied,
            GatewayError::AuthExpired(message) => GatewayError::AuthExpired(message.clone()),
            GatewayError::AuthNotReady => GatewayError::AuthNotReady,
            GatewayError::RateLimited => GatewayError::RateLimited,
            GatewayError::Api { status, message } => GatewayError::Api {
                status: *status,
                message: message.clone(),
            },
            GatewayError::Socket(error) => {
                GatewayError::Socket(SocketError::Build(error.to_string()))
            }
        }
    }

    pub fn order_record(id: &str, with_receipt: bool) -> OrderRecord {
        OrderRecord {
            order_id: Some(OrderId::from(id)),
            receipt: with_receipt.then(|| Receipt {
                contact: Some("+7 900 000-00-00".to_string()),
                price: Some(serde_json::json!("92.5")),
                amount: Some(serde_json::json!("100")),
                sum: Some(serde_json::json!("9250")),
            }),
            extra: serde_json::Map::new(),
        }
    }
}
