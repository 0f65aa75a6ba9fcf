//! Per-request correlation ids.
//!
//! A well-formed `x-request-id` from the proxy in front of us is kept,
//! anything else is replaced with a fresh UUID v4. The id goes into the
//! `http_request` span, the Sentry scope and the response headers.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Span;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream id we keep.
const MAX_REQUEST_ID_LEN: usize = 128;

/// An upstream id, if present and made of printable ASCII.
fn upstream_request_id(headers: &HeaderMap) -> Option<&str> {
    let id = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?;
    let acceptable = !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic());
    acceptable.then_some(id)
}

pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = upstream_request_id(request.headers())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

    Span::current().record("request_id", id.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", &id));

    let header = HeaderValue::from_str(&id).ok();

    let mut response = next.run(request).await;
    if let Some(header) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_upstream_id_kept() {
        assert_eq!(
            upstream_request_id(&headers("lb-7f3a-0001")),
            Some("lb-7f3a-0001")
        );
    }

    #[test]
    fn test_upstream_id_rejected() {
        assert_eq!(upstream_request_id(&HeaderMap::new()), None);
        assert_eq!(upstream_request_id(&headers("")), None);
        assert_eq!(upstream_request_id(&headers("has space")), None);
        assert_eq!(upstream_request_id(&headers(&"x".repeat(129))), None);
    }
}
