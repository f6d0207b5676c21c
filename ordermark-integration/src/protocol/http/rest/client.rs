use crate::{
    error::SocketError,
    metric::{Field, Metric, Tag},
    protocol::http::{BuildStrategy, HttpParser, rest::RestRequest},
};
use bytes::Bytes;
use chrono::Utc;
use url::Url;

/// Configurable REST client capable of executing [`RestRequest`]s against a single API base
/// [`Url`].
///
/// Each API requires a specific combination of [`BuildStrategy`] (eg/ bearer authorisation) and
/// [`HttpParser`] (eg/ classification of 403 response bodies).
#[derive(Debug, Clone)]
pub struct RestClient<Strategy, Parser> {
    /// HTTP [`reqwest::Client`] for executing [`reqwest::Request`]s.
    pub http_client: reqwest::Client,

    /// Base Url of the API being interacted with.
    pub base_url: Url,

    /// [`RestRequest`] build strategy for the API being interacted with that implements
    /// [`BuildStrategy`].
    pub strategy: Strategy,

    /// [`HttpParser`] that deserialises [`RestRequest::Response`]s, and upon failure parses
    /// API errors returned from the server.
    pub parser: Parser,
}

impl<Strategy, Parser> RestClient<Strategy, Parser>
where
    Strategy: BuildStrategy,
    Parser: HttpParser,
{
    /// Execute the provided [`RestRequest`].
    pub async fn execute<Request>(
        &self,
        request: Request,
    ) -> Result<(Request::Response, Metric), Parser::OutputError>
    where
        Request: RestRequest,
    {
        // Use provided Request to construct a reqwest::Request
        let request = self.build(request)?;

        // Measure request execution
        let (status, payload, latency) = self.measured_execution::<Request>(request).await?;

        // Attempt to parse API Success or Error response
        self.parser
            .parse::<Request::Response>(status, &payload)
            .map(|response| (response, latency))
    }

    /// Use the provided [`RestRequest`] to construct a Http [`reqwest::Request`].
    pub fn build<Request>(&self, request: Request) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        let url = self.url(&request.path())?;

        let mut builder = self
            .http_client
            .request(Request::method(), url)
            .timeout(request.timeout());

        if let Some(query_params) = request.query_params() {
            builder = builder.query(query_params);
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        self.strategy.build(request, builder)
    }

    /// Execute the built [`reqwest::Request`] using the [`reqwest::Client`].
    ///
    /// Measures and returns the Http request round trip duration.
    pub async fn measured_execution<Request>(
        &self,
        request: reqwest::Request,
    ) -> Result<(reqwest::StatusCode, Bytes, Metric), SocketError>
    where
        Request: RestRequest,
    {
        let mut latency = Metric {
            name: "http_request_duration",
            time: Utc::now().timestamp_millis() as u64,
            tags: vec![
                Tag::new("http_method", Request::method().as_str()),
                Tag::new("base_url", self.base_url.as_str()),
                Tag::new("path", request.url().path()),
            ],
            fields: Vec::with_capacity(1),
        };

        let start = std::time::Instant::now();
        let response = self.http_client.execute(request).await?;
        let duration = start.elapsed().as_millis() as u64;

        let status_code = response.status();
        latency
            .tags
            .push(Tag::new("status_code", status_code.as_str()));
        latency.fields.push(Field::new("duration", duration));

        let payload = response.bytes().await?;

        Ok((status_code, payload, latency))
    }
}

impl<Strategy, Parser> RestClient<Strategy, Parser> {
    /// Construct a new [`Self`] using the provided configuration.
    pub fn new(base_url: Url, strategy: Strategy, parser: Parser) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, strategy, parser)
    }

    /// Construct a new [`Self`] that shares an existing [`reqwest::Client`] connection pool.
    pub fn with_http_client(
        http_client: reqwest::Client,
        base_url: Url,
        strategy: Strategy,
        parser: Parser,
    ) -> Self {
        Self {
            http_client,
            base_url,
            strategy,
            parser,
        }
    }

    /// Resolve a request path against the base [`Url`], preserving any base path prefix.
    fn url(&self, path: &str) -> Result<Url, SocketError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(SocketError::from)
    }
}
