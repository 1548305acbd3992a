//! Middleware and extractors for request metadata and response hardening

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::debug;
use url_scan_core::ClientContext;

/// Proxy and CDN headers probed for the client address, in priority order
pub const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",    // Cloudflare
    "x-real-ip",           // nginx
    "x-forwarded-for",     // de facto proxy standard
    "x-client-ip",         // Apache
    "x-cluster-client-ip", // load-balancer clusters
    "x-forwarded",
    "forwarded-for",
    "forwarded", // RFC 7239
];

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client address for logging and notifications.
///
/// The first header from [`CLIENT_IP_HEADERS`] whose first comma-separated
/// token is non-empty and not `unknown` wins; then the transport peer; then
/// the literal `unknown`. The value is not validated as an IP address.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in CLIENT_IP_HEADERS {
        let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        let candidate = value.split(',').next().unwrap_or("").trim();
        if !candidate.is_empty() && candidate != UNKNOWN_CLIENT {
            debug!("Client IP found in header {}: {}", name, candidate);
            return candidate.to_string();
        }
    }

    match peer {
        Some(addr) => {
            debug!("Client IP taken from peer address: {}", addr.ip());
            addr.ip().to_string()
        }
        None => {
            debug!("No client IP available");
            UNKNOWN_CLIENT.to_string()
        }
    }
}

/// Client address and user agent of the current request
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientContext);

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let ip = resolve_client_ip(&parts.headers, peer);
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|ua| !ua.is_empty())
            .unwrap_or(UNKNOWN_CLIENT)
            .to_string();

        Ok(ClientInfo(ClientContext::new(ip, user_agent)))
    }
}

/// Security headers middleware
///
/// Adds security-related headers to all responses.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "x-api-version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(name, value) in pairs {
            map.insert(name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_header_priority() {
        let map = headers(&[
            ("x-forwarded-for", "192.168.1.1, 10.0.0.1"),
            ("cf-connecting-ip", "203.0.113.5"),
            ("x-real-ip", "192.168.1.2"),
        ]);
        assert_eq!(resolve_client_ip(&map, None), "203.0.113.5");

        let map = headers(&[("x-forwarded-for", "192.168.1.1, 10.0.0.1"), ("x-real-ip", "192.168.1.2")]);
        assert_eq!(resolve_client_ip(&map, None), "192.168.1.2");
    }

    #[test]
    fn test_first_forwarded_token() {
        let map = headers(&[("x-forwarded-for", " 192.168.1.1 , 10.0.0.1")]);
        assert_eq!(resolve_client_ip(&map, None), "192.168.1.1");
    }

    #[test]
    fn test_unknown_and_empty_values_are_skipped() {
        let map = headers(&[
            ("cf-connecting-ip", "unknown"),
            ("x-real-ip", ""),
            ("x-forwarded-for", ", 10.0.0.1"),
            ("x-client-ip", "198.51.100.23"),
        ]);
        assert_eq!(resolve_client_ip(&map, None), "198.51.100.23");
    }

    #[test]
    fn test_rfc7239_header_is_last_resort_header() {
        let map = headers(&[("forwarded", "for=192.0.2.60;proto=http")]);
        assert_eq!(resolve_client_ip(&map, None), "for=192.0.2.60;proto=http");
    }

    #[test]
    fn test_peer_and_unknown_fallback() {
        let peer: SocketAddr = "127.0.0.1:54321".parse().unwrap();
        assert_eq!(resolve_client_ip(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), "unknown");

        let map = headers(&[("x-real-ip", "unknown")]);
        assert_eq!(resolve_client_ip(&map, Some(peer)), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_client_info_extractor() {
        let request = axum::http::Request::builder()
            .header("x-real-ip", "192.0.2.1")
            .header("user-agent", "Mozilla/5.0")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ClientInfo(client) = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.ip, "192.0.2.1");
        assert_eq!(client.user_agent, "Mozilla/5.0");

        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let ClientInfo(client) = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.ip, "unknown");
        assert_eq!(client.user_agent, "unknown");
    }
}
