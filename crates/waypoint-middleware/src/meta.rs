//! Request metadata read by the lifecycle stage.

use crate::types::Request;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::HeaderMap;
use std::net::SocketAddr;

/// Header carrying the client-supplied request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header echoing the trace ID on responses.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Header carrying the proxy chain of client addresses.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header carrying the caller's user ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's session ID.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Header carrying the caller's tenant ID.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Header reporting the processing time on responses.
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Peer address of the connection, stored in request extensions by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// What the pipeline knows about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Request method.
    pub method: String,
    /// Raw request path, without the query.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Client address: first `X-Forwarded-For` entry, else the peer address.
    pub client_addr: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// Request body, when it is logged.
    pub body: Option<Bytes>,
}

impl RequestMeta {
    /// Reads the metadata of `request`.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        let headers = request.headers();
        let client_addr = header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .or_else(|| {
                request
                    .extensions()
                    .get::<RemoteAddr>()
                    .map(|addr| addr.0.ip().to_string())
            });

        Self {
            method: request.method().as_str().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers: headers.clone(),
            client_addr,
            user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
            body: None,
        }
    }
}

/// Returns a header as text, ignoring empty and non-UTF-8 values.
pub(crate) fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}
