/// Contains HTTP client capable of executing authenticated requests, as well as the
/// associated request, build strategy and response parser abstractions.
pub mod http;
