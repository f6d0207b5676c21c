use self::rest::RestRequest;
use crate::error::SocketError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::error;

/// Defines an abstract [`RestRequest`] that can be executed by a fully
/// configurable [`RestClient`](rest::client::RestClient).
pub mod rest;

/// [`RestRequest`] build strategy for the API being interacted with.
///
/// An API that requires authenticated [`RestRequest`]s will add its authorisation header (eg/ a
/// bearer token) before building. An API that requires no authentication may just add mandatory
/// `reqwest` headers to the [`RestRequest`] before building.
pub trait BuildStrategy {
    /// Use a [`RestRequest`] and [`reqwest::RequestBuilder`] to construct a [`reqwest::Request`]
    /// that is ready for executing.
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest;
}

/// Utilised by a [`RestClient`](rest::client::RestClient) to deserialise
/// [`RestRequest::Response`], and upon failure classifies API errors returned from the server.
pub trait HttpParser {
    type ApiError: DeserializeOwned;
    type OutputError: From<SocketError>;

    /// Attempt to parse a [`StatusCode`] & bytes payload into a deserialisable `Response`.
    ///
    /// A successful status is only ever deserialised as `Response`, and a non-successful status
    /// is only ever interpreted as an API error. This prevents a loosely typed `Response` from
    /// accepting an error body.
    fn parse<Response>(
        &self,
        status: StatusCode,
        payload: &[u8],
    ) -> Result<Response, Self::OutputError>
    where
        Response: DeserializeOwned,
    {
        if status.is_success() {
            return serde_json::from_slice::<Response>(payload).map_err(|parse_ok_error| {
                error!(
                    status_code = ?status,
                    ?parse_ok_error,
                    response_body = %String::from_utf8_lossy(payload),
                    "error deserializing HTTP response"
                );
                Self::OutputError::from(SocketError::DeserialiseBinary {
                    error: parse_ok_error,
                    payload: payload.to_vec(),
                })
            });
        }

        match serde_json::from_slice::<Self::ApiError>(payload) {
            Ok(api_error) => Err(self.parse_api_error(status, api_error)),
            Err(_) => Err(self.parse_undecodable_error(status, payload)),
        }
    }

    /// Classify a non-successful response whose body deserialised into [`Self::ApiError`].
    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError;

    /// Classify a non-successful response whose body is not a recognisable API error (eg/ an
    /// HTML page served by a reverse proxy).
    fn parse_undecodable_error(&self, status: StatusCode, payload: &[u8]) -> Self::OutputError {
        Self::OutputError::from(SocketError::HttpResponse(
            status,
            String::from_utf8_lossy(payload).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u64,
    }

    #[derive(Debug, Deserialize)]
    struct ApiError {
        message: String,
    }

    #[derive(Debug)]
    enum TestError {
        Api(StatusCode, String),
        Socket(SocketError),
    }

    impl From<SocketError> for TestError {
        fn from(value: SocketError) -> Self {
            Self::Socket(value)
        }
    }

    struct TestParser;

    impl HttpParser for TestParser {
        type ApiError = ApiError;
        type OutputError = TestError;

        fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
            TestError::Api(status, error.message)
        }
    }

    #[test]
    fn test_parse_success_payload() {
        let actual = TestParser.parse::<Payload>(StatusCode::OK, br#"{"value":7}"#);
        assert_eq!(actual.unwrap(), Payload { value: 7 });
    }

    #[test]
    fn test_parse_error_status_never_deserialises_response() {
        #[derive(Debug, Deserialize)]
        struct Loose {
            #[allow(dead_code)]
            message: Option<String>,
        }

        let actual = TestParser.parse::<Loose>(StatusCode::NOT_FOUND, br#"{"message":"not found"}"#);
        match actual {
            Err(TestError::Api(status, message)) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_undecodable_error_body() {
        let actual = TestParser.parse::<Payload>(StatusCode::TOO_MANY_REQUESTS, b"<html></html>");
        match actual {
            Err(TestError::Socket(SocketError::HttpResponse(status, body))) => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body, "<html></html>");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed_success_payload() {
        let actual = TestParser.parse::<Payload>(StatusCode::OK, b"{");
        assert!(matches!(
            actual,
            Err(TestError::Socket(SocketError::DeserialiseBinary { .. }))
        ));
    }
}
