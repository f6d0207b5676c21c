use crate::OrderId;
use async_trait::async_trait;
use derive_more::Display;
use ordermark_integration::{Unrecoverable, error::SocketError};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Authorised backend [`OrderGateway`] built on the `ordermark-integration`
/// [`RestClient`](ordermark_integration::protocol::http::rest::client::RestClient).
pub mod backend;

/// Persisted [`Credentials`](credentials::Credentials) & their storage.
pub mod credentials;

/// Remote order lookup consumed by the [`ListEngine`](crate::engine::ListEngine).
#[async_trait]
pub trait OrderGateway: Send + Sync + 'static {
    /// Determines if lookups may currently be attempted (eg/ valid credentials are stored).
    async fn is_ready(&self) -> bool;

    async fn fetch_order(&self, id: &OrderId) -> Result<OrderRecord, GatewayError>;
}

/// Order record persisted by the backend. Only the fields the engine inspects are typed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Exchange order identifier the record belongs to.
    #[serde(default, deserialize_with = "de_order_id")]
    pub order_id: Option<OrderId>,

    #[serde(default)]
    pub receipt: Option<Receipt>,

    /// Bank & commission metadata, not interpreted by the engine.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Receipt {
    pub contact: Option<String>,
    pub price: Option<serde_json::Value>,
    pub amount: Option<serde_json::Value>,
    pub sum: Option<serde_json::Value>,
}

/// Deserialise an order identifier sent as either a JSON string or a JSON number.
fn de_order_id<'de, D>(deserializer: D) -> Result<Option<OrderId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|id| match id {
            StringOrNumber::String(id) => OrderId::new(id),
            StringOrNumber::Number(id) => OrderId::new(id.to_string()),
        }),
    )
}

/// All errors generated by an [`OrderGateway`] lookup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("order not found")]
    NotFound,

    /// The order exists but belongs to another user.
    #[error("access to order denied")]
    AccessDenied,

    #[error("session expired: {0}")]
    AuthExpired(String),

    #[error("not authenticated")]
    AuthNotReady,

    #[error("rate limited")]
    RateLimited,

    #[error("API error (status={status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("socket: {0}")]
    Socket(#[from] SocketError),
}

impl Unrecoverable for GatewayError {
    fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::AuthNotReady)
    }
}

/// Row level classification of a failed lookup.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
pub enum FetchFailure {
    /// Not found or not accessible. Suppressed for the not found TTL.
    #[display("not_found")]
    NotFound,
    #[display("auth")]
    Auth,
    #[display("rate_limit")]
    RateLimit,
    #[display("network")]
    Network,
}

impl From<&GatewayError> for FetchFailure {
    fn from(value: &GatewayError) -> Self {
        match value {
            GatewayError::NotFound | GatewayError::AccessDenied => Self::NotFound,
            GatewayError::AuthExpired(_) | GatewayError::AuthNotReady => Self::Auth,
            GatewayError::RateLimited => Self::RateLimit,
            GatewayError::Api { .. } | GatewayError::Socket(_) => Self::Network,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_de_order_record() {
        struct TestCase {
            input: &'static str,
            expected_id: Option<&'static str>,
            expected_receipt: bool,
        }

        let cases = vec![
            TestCase {
                // TC0: string identifier & receipt
                input: r#"{"orderId":"1923456789012345678","receipt":{"contact":"c","price":92.5,"amount":"100","sum":9250},"bank":"T"}"#,
                expected_id: Some("1923456789012345678"),
                expected_receipt: true,
            },
            TestCase {
                // TC1: null receipt
                input: r#"{"orderId":"d12345678901234567","receipt":null}"#,
                expected_id: Some("d12345678901234567"),
                expected_receipt: false,
            },
            TestCase {
                // TC2: numeric identifier keeps its digits
                input: r#"{"orderId":12345,"commission":0.1}"#,
                expected_id: Some("12345"),
                expected_receipt: false,
            },
            TestCase {
                // TC3: identifier absent
                input: r#"{}"#,
                expected_id: None,
                expected_receipt: false,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let actual = serde_json::from_str::<OrderRecord>(test.input).unwrap();
            assert_eq!(
                actual.order_id,
                test.expected_id.map(OrderId::from),
                "TC{index} failed"
            );
            assert_eq!(
                actual.receipt.is_some(),
                test.expected_receipt,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_fetch_failure_from_gateway_error() {
        assert_eq!(
            FetchFailure::from(&GatewayError::AccessDenied),
            FetchFailure::NotFound
        );
        assert_eq!(
            FetchFailure::from(&GatewayError::AuthExpired("expired".into())),
            FetchFailure::Auth
        );
        assert_eq!(
            FetchFailure::from(&GatewayError::RateLimited),
            FetchFailure::RateLimit
        );
        assert_eq!(
            FetchFailure::from(&GatewayError::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                message: String::new()
            }),
            FetchFailure::Network
        );
        assert!(GatewayError::AuthNotReady.is_unrecoverable());
        assert!(!GatewayError::RateLimited.is_unrecoverable());
    }
}
