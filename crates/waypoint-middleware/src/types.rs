//! Request and response types used throughout the pipeline.

use bytes::Bytes;
use http_body_util::Full;
use waypoint_core::RequestFailure;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// What a handler, and every stage after it, produces.
///
/// Failures travel up the chain untouched until the lifecycle stage
/// classifies them and renders the error envelope.
pub type HandlerResult = Result<Response, RequestFailure>;
