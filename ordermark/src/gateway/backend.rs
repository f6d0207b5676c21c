use crate::{
    ExchangeKind, OrderId,
    config::EngineConfig,
    gateway::{
        GatewayError, OrderGateway, OrderRecord,
        credentials::{CredentialStore, Credentials, load_valid},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordermark_integration::{
    channel::{ChannelTxDroppable, UnboundedTx},
    error::SocketError,
    protocol::http::{
        BuildStrategy, HttpParser,
        rest::{RestRequest, client::RestClient},
    },
};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, time::Duration};
use tracing::{debug, warn};
use url::Url;

/// Notification that the backend session is no longer valid and the user must log in again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthAlert {
    pub exchange: ExchangeKind,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Backend endpoint used to look up an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LookupEndpoint {
    /// `GET /api/order?id=<id>&exchangeType=N`
    ById,
    /// `GET /api/order/by-string-id?stringOrderId=<id>&exchangeType=N`
    ByStringId,
}

impl From<ExchangeKind> for LookupEndpoint {
    fn from(value: ExchangeKind) -> Self {
        match value {
            ExchangeKind::Bybit | ExchangeKind::Htx => Self::ById,
            ExchangeKind::Mexc => Self::ByStringId,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderQuery {
    pub id: OrderId,
    pub exchange_type: u8,
}

/// `GET /api/order`
#[derive(Debug, Clone)]
pub struct GetOrder {
    pub query: GetOrderQuery,
    pub timeout: Duration,
}

impl RestRequest for GetOrder {
    type Response = OrderRecord;
    type QueryParams = GetOrderQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderByStringIdQuery {
    pub string_order_id: OrderId,
    pub exchange_type: u8,
}

/// `GET /api/order/by-string-id`
#[derive(Debug, Clone)]
pub struct GetOrderByStringId {
    pub query: GetOrderByStringIdQuery,
    pub timeout: Duration,
}

impl RestRequest for GetOrderByStringId {
    type Response = OrderRecord;
    type QueryParams = GetOrderByStringIdQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/order/by-string-id")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// [`BuildStrategy`] adding the `Authorization` header of the session [`Credentials`] a request
/// is sent with.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    credentials: Credentials,
}

impl BearerAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl BuildStrategy for BearerAuth {
    fn build<Request>(
        &self,
        _: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        builder
            .header(
                reqwest::header::AUTHORIZATION,
                self.credentials.authorization(),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .build()
            .map_err(SocketError::from)
    }
}

/// Error body returned by the backend. Either field may carry the message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendApiError {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl BackendApiError {
    fn into_message(self) -> String {
        self.message.or(self.error).unwrap_or_default()
    }
}

/// [`HttpParser`] classifying backend failures into [`GatewayError`]s.
///
/// A `403` is ambiguous: the backend uses it for throttling, for resources owned by another user,
/// and for invalid sessions. The body message disambiguates the first two. When it does not, a
/// request for a specific resource (`resource_scoped`) is treated as access denied, and any other
/// request as an expired session.
#[derive(Debug, Copy, Clone)]
pub struct BackendParser {
    pub resource_scoped: bool,
}

const RATE_LIMIT_PATTERNS: [&str; 4] = ["rate limit", "too many", "quota", "слишком много"];
const ACCESS_DENIED_PATTERNS: [&str; 5] = [
    "forbidden",
    "access denied",
    "not authorized to access",
    "доступ запрещен",
    "нет доступа",
];

fn contains_any(message: &str, patterns: &[&str]) -> bool {
    let message = message.to_lowercase();
    patterns.iter().any(|pattern| message.contains(pattern))
}

impl BackendParser {
    pub fn classify(&self, status: StatusCode, message: String) -> GatewayError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
            StatusCode::NOT_FOUND => GatewayError::NotFound,
            StatusCode::UNAUTHORIZED => GatewayError::AuthExpired(message),
            StatusCode::FORBIDDEN if contains_any(&message, &RATE_LIMIT_PATTERNS) => {
                GatewayError::RateLimited
            }
            StatusCode::FORBIDDEN if contains_any(&message, &ACCESS_DENIED_PATTERNS) => {
                GatewayError::AccessDenied
            }
            StatusCode::FORBIDDEN if self.resource_scoped => GatewayError::AccessDenied,
            StatusCode::FORBIDDEN => GatewayError::AuthExpired(message),
            status => GatewayError::Api { status, message },
        }
    }
}

impl HttpParser for BackendParser {
    type ApiError = BackendApiError;
    type OutputError = GatewayError;

    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
        self.classify(status, error.into_message())
    }

    fn parse_undecodable_error(&self, status: StatusCode, _: &[u8]) -> Self::OutputError {
        self.classify(status, String::new())
    }
}

/// [`OrderGateway`] looking up orders on the Ordermark backend.
///
/// Every lookup is authorised with the [`Credentials`] loaded for it, over one shared
/// [`reqwest::Client`] connection pool.
#[derive(Debug)]
pub struct BackendGateway<Store> {
    http_client: reqwest::Client,
    base_url: Url,
    parser: BackendParser,
    exchange: ExchangeKind,
    endpoint: LookupEndpoint,
    request_timeout: Duration,
    store: Store,
    /// Serialises session expiry so concurrent rejections of one session alert once.
    expiring: tokio::sync::Mutex<()>,
    alerts: Mutex<ChannelTxDroppable<UnboundedTx<AuthAlert>>>,
}

impl<Store> BackendGateway<Store>
where
    Store: CredentialStore,
{
    pub fn new(config: &EngineConfig, exchange: ExchangeKind, store: Store) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            parser: BackendParser {
                resource_scoped: true,
            },
            exchange,
            endpoint: LookupEndpoint::from(exchange),
            request_timeout: config.request_timeout,
            store,
            expiring: tokio::sync::Mutex::new(()),
            alerts: Mutex::new(ChannelTxDroppable::new_disabled()),
        }
    }

    /// Publish an [`AuthAlert`] on `tx` whenever a lookup finds the session expired.
    pub fn with_alerts(self, tx: UnboundedTx<AuthAlert>) -> Self {
        Self {
            alerts: Mutex::new(ChannelTxDroppable::new(tx)),
            ..self
        }
    }

    fn client(&self, credentials: Credentials) -> RestClient<BearerAuth, BackendParser> {
        RestClient::with_http_client(
            self.http_client.clone(),
            self.base_url.clone(),
            BearerAuth::new(credentials),
            self.parser,
        )
    }

    /// Build the lookup [`reqwest::Request`] for `id` without executing it.
    pub fn build_request(
        &self,
        id: &OrderId,
        credentials: Credentials,
    ) -> Result<reqwest::Request, SocketError> {
        let client = self.client(credentials);
        let exchange_type = self.exchange.exchange_type();
        match self.endpoint {
            LookupEndpoint::ById => client.build(GetOrder {
                query: GetOrderQuery {
                    id: id.clone(),
                    exchange_type,
                },
                timeout: self.request_timeout,
            }),
            LookupEndpoint::ByStringId => client.build(GetOrderByStringId {
                query: GetOrderByStringIdQuery {
                    string_order_id: id.clone(),
                    exchange_type,
                },
                timeout: self.request_timeout,
            }),
        }
    }

    async fn execute(
        &self,
        id: &OrderId,
        credentials: Credentials,
    ) -> Result<OrderRecord, GatewayError> {
        let client = self.client(credentials);
        let exchange_type = self.exchange.exchange_type();
        let (record, metric) = match self.endpoint {
            LookupEndpoint::ById => {
                client
                    .execute(GetOrder {
                        query: GetOrderQuery {
                            id: id.clone(),
                            exchange_type,
                        },
                        timeout: self.request_timeout,
                    })
                    .await?
            }
            LookupEndpoint::ByStringId => {
                client
                    .execute(GetOrderByStringId {
                        query: GetOrderByStringIdQuery {
                            string_order_id: id.clone(),
                            exchange_type,
                        },
                        timeout: self.request_timeout,
                    })
                    .await?
            }
        };

        debug!(
            exchange = %self.exchange,
            order_id = %id,
            duration_ms = ?metric.field("duration"),
            "order lookup succeeded"
        );

        verify_identity(id, record)
    }

    /// Clear the session `rejected` was sent with and alert, unless the store no longer holds it
    /// (eg/ a concurrent lookup already expired it, or the user logged in again).
    async fn expire_session(&self, rejected: &Credentials, message: &str) {
        let _expiring = self.expiring.lock().await;

        if self.store.load().await.as_ref() != Some(rejected) {
            debug!(exchange = %self.exchange, message, "session already expired");
            return;
        }

        warn!(exchange = %self.exchange, message, "session expired, clearing credentials");
        self.store.clear().await;
        self.alerts.lock().send(AuthAlert {
            exchange: self.exchange,
            message: message.to_string(),
            time: Utc::now(),
        });
    }
}

/// A record whose identifier differs from the requested one is not the requested order.
fn verify_identity(id: &OrderId, record: OrderRecord) -> Result<OrderRecord, GatewayError> {
    match &record.order_id {
        Some(actual) if actual != id => {
            warn!(requested = %id, %actual, "backend returned a different order");
            Err(GatewayError::NotFound)
        }
        _ => Ok(record),
    }
}

#[async_trait]
impl<Store> OrderGateway for BackendGateway<Store>
where
    Store: CredentialStore,
{
    async fn is_ready(&self) -> bool {
        load_valid(&self.store, Utc::now()).await.is_some()
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<OrderRecord, GatewayError> {
        let Some(credentials) = load_valid(&self.store, Utc::now()).await else {
            return Err(GatewayError::AuthNotReady);
        };

        let result = self.execute(id, credentials.clone()).await;
        if let Err(GatewayError::AuthExpired(message)) = &result {
            self.expire_session(&credentials, message).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::credentials::MemoryCredentialStore;
    use ordermark_integration::channel::mpsc_unbounded;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    fn credentials() -> Credentials {
        Credentials {
            auth_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            user_id: "7".to_string(),
            user_login: "trader".to_string(),
            token_expiry: None,
        }
    }

    #[test]
    fn test_backend_parser_classify() {
        struct TestCase {
            status: StatusCode,
            body: &'static [u8],
            resource_scoped: bool,
            expected: &'static str,
        }

        let cases = vec![
            TestCase {
                // TC0: throttled
                status: StatusCode::TOO_MANY_REQUESTS,
                body: b"",
                resource_scoped: true,
                expected: "RateLimited",
            },
            TestCase {
                // TC1: 403 with a rate limit message
                status: StatusCode::FORBIDDEN,
                body: br#"{"message":"Too many requests, slow down"}"#,
                resource_scoped: false,
                expected: "RateLimited",
            },
            TestCase {
                // TC2: 403 with a localised access denied message in the error field
                status: StatusCode::FORBIDDEN,
                body: r#"{"error":"Доступ запрещен"}"#.as_bytes(),
                resource_scoped: false,
                expected: "AccessDenied",
            },
            TestCase {
                // TC3: bare 403 on an order resource is not a session problem
                status: StatusCode::FORBIDDEN,
                body: b"<html>403</html>",
                resource_scoped: true,
                expected: "AccessDenied",
            },
            TestCase {
                // TC4: bare 403 elsewhere means the session expired
                status: StatusCode::FORBIDDEN,
                body: br#"{"message":"jwt expired"}"#,
                resource_scoped: false,
                expected: "AuthExpired",
            },
            TestCase {
                // TC5: not found
                status: StatusCode::NOT_FOUND,
                body: br#"{"message":"Order not found"}"#,
                resource_scoped: true,
                expected: "NotFound",
            },
            TestCase {
                // TC6: unauthorised
                status: StatusCode::UNAUTHORIZED,
                body: b"{}",
                resource_scoped: true,
                expected: "AuthExpired",
            },
            TestCase {
                // TC7: anything else
                status: StatusCode::BAD_GATEWAY,
                body: br#"{"message":"upstream"}"#,
                resource_scoped: true,
                expected: "Api",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let parser = BackendParser {
                resource_scoped: test.resource_scoped,
            };
            let actual = parser
                .parse::<OrderRecord>(test.status, test.body)
                .unwrap_err();
            let variant = format!("{actual:?}");
            assert!(
                variant.starts_with(test.expected),
                "TC{index} failed: {variant}"
            );
        }
    }

    #[test]
    fn test_build_request_per_endpoint() {
        let config = EngineConfig::default();
        let store = MemoryCredentialStore::new(None);

        let bybit = BackendGateway::new(&config, ExchangeKind::Bybit, store.clone());
        let request = bybit
            .build_request(&OrderId::from("1923456789012345678"), credentials())
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://p2p-analysis.app/api/order?id=1923456789012345678&exchangeType=1"
        );
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer abc"
        );
        assert_eq!(request.timeout(), Some(&Duration::from_secs(5)));

        let mexc = BackendGateway::new(&config, ExchangeKind::Mexc, store);
        let request = mexc
            .build_request(&OrderId::from("d1234567890123456"), credentials())
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://p2p-analysis.app/api/order/by-string-id?stringOrderId=d1234567890123456&exchangeType=3"
        );
    }

    #[test]
    fn test_build_request_uses_credentials_of_each_request() {
        let gateway = BackendGateway::new(
            &EngineConfig::default(),
            ExchangeKind::Htx,
            MemoryCredentialStore::new(None),
        );
        let other = Credentials {
            auth_token: "xyz".to_string(),
            ..credentials()
        };

        let first = gateway
            .build_request(&OrderId::from("1"), credentials())
            .unwrap();
        let second = gateway.build_request(&OrderId::from("2"), other).unwrap();

        assert_eq!(
            first.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer abc"
        );
        assert_eq!(
            second.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer xyz"
        );
    }

    #[test]
    fn test_verify_identity() {
        let record = crate::test_utils::order_record("12345", false);
        assert!(verify_identity(&OrderId::from("12345"), record.clone()).is_ok());
        assert!(matches!(
            verify_identity(&OrderId::from("67890"), record),
            Err(GatewayError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_fetch_order_without_credentials_is_not_ready() {
        let gateway = BackendGateway::new(
            &EngineConfig::default(),
            ExchangeKind::Bybit,
            MemoryCredentialStore::new(None),
        );

        assert!(!gateway.is_ready().await);
        assert!(matches!(
            gateway.fetch_order(&OrderId::from("1")).await,
            Err(GatewayError::AuthNotReady)
        ));
    }

    #[tokio::test]
    async fn test_expire_session_clears_store_and_alerts_once() {
        let store = MemoryCredentialStore::new(Some(credentials()));
        let (tx, mut rx) = mpsc_unbounded();
        let gateway =
            BackendGateway::new(&EngineConfig::default(), ExchangeKind::Mexc, store.clone())
                .with_alerts(tx);

        assert!(gateway.is_ready().await);
        gateway.expire_session(&credentials(), "jwt expired").await;
        gateway.expire_session(&credentials(), "jwt expired").await;

        assert_eq!(store.get(), None);
        assert!(!gateway.is_ready().await);
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.exchange, ExchangeKind::Mexc);
        assert_eq!(alert.message, "jwt expired");
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_expire_session_keeps_newer_login() {
        let renewed = Credentials {
            auth_token: "renewed".to_string(),
            ..credentials()
        };
        let store = MemoryCredentialStore::new(Some(renewed.clone()));
        let (tx, mut rx) = mpsc_unbounded();
        let gateway =
            BackendGateway::new(&EngineConfig::default(), ExchangeKind::Bybit, store.clone())
                .with_alerts(tx);

        gateway.expire_session(&credentials(), "jwt expired").await;

        assert_eq!(store.get(), Some(renewed));
        assert!(rx.try_recv().is_none());
    }

    /// Accept `connections` requests, then answer every one of them with `401 Unauthorized`.
    async fn serve_unauthorized(listener: TcpListener, connections: usize) {
        let mut streams = Vec::with_capacity(connections);
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
            }
            streams.push(stream);
        }

        let body = r#"{"message":"jwt expired"}"#;
        let response = format!(
            "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        for mut stream in streams {
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_rejections_alert_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_unauthorized(listener, 3));

        let config = EngineConfig {
            api_base_url: Url::parse(&format!("http://{address}")).unwrap(),
            ..EngineConfig::default()
        };
        let store = MemoryCredentialStore::new(Some(credentials()));
        let (tx, mut rx) = mpsc_unbounded();
        let gateway =
            BackendGateway::new(&config, ExchangeKind::Bybit, store.clone()).with_alerts(tx);

        let (id1, id2, id3) = (OrderId::from("1"), OrderId::from("2"), OrderId::from("3"));
        let (first, second, third) = tokio::join!(
            gateway.fetch_order(&id1),
            gateway.fetch_order(&id2),
            gateway.fetch_order(&id3),
        );
        server.await.unwrap();

        for result in [first, second, third] {
            assert!(matches!(result, Err(GatewayError::AuthExpired(_))));
        }
        assert_eq!(store.get(), None);
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }
}
