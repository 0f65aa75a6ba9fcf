//! Rate limiting for the credential endpoints using governor and
//! `tower_governor`.
//!
//! Clients are keyed by the TCP peer address. `X-Forwarded-For` is only read
//! when the peer is one of the configured trusted proxies, and then from the
//! right: the first hop not added by a trusted proxy is the client.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Key extractor resolving the client address behind trusted proxies.
#[derive(Debug, Clone)]
pub struct ClientIpKeyExtractor {
    trusted_proxies: Arc<[IpAddr]>,
}

impl ClientIpKeyExtractor {
    #[must_use]
    pub fn new(trusted_proxies: &[IpAddr]) -> Self {
        Self {
            trusted_proxies: trusted_proxies.into(),
        }
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.contains(&ip)
    }

    /// The client behind `peer`, given the request headers.
    fn client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.is_trusted(peer) {
            return peer;
        }

        let hops: Vec<&str> = headers
            .get_all(FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .collect();

        let mut client = peer;
        for hop in hops.iter().rev() {
            let Ok(ip) = hop.parse::<IpAddr>() else {
                // Garbage in the chain; stop at the last proxy we trust
                break;
            };
            client = ip;
            if !self.is_trusted(ip) {
                break;
            }
        }
        client
    }
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;
        Ok(self.client_ip(peer, req.headers()))
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
/// This slows down password guessing and reset-email flooding.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(6)` and `burst_size(5)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter(trusted_proxies: &[IpAddr]) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor::new(trusted_proxies))
        .per_second(6) // Replenish 1 token every 6 seconds (~10/minute)
        .burst_size(5) // Allow burst of 5 requests
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    const PROXY: [u8; 4] = [10, 0, 0, 2];

    fn request(peer: [u8; 4], forwarded_for: &[&str]) -> Request<()> {
        let mut builder = Request::builder();
        for value in forwarded_for {
            builder = builder.header(FORWARDED_FOR, *value);
        }
        let mut req = builder.body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 4000))));
        req
    }

    fn behind_proxy() -> ClientIpKeyExtractor {
        ClientIpKeyExtractor::new(&[IpAddr::from(PROXY)])
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_for() {
        let req = request([192, 0, 2, 1], &["203.0.113.7"]);
        let ip = behind_proxy().extract(&req).unwrap();
        assert_eq!(ip, IpAddr::from([192, 0, 2, 1]));
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_hop() {
        // The client wrote the first entry itself; the proxy appended the second
        let req = request(PROXY, &["10.9.0.1, 198.51.100.2"]);
        let ip = behind_proxy().extract(&req).unwrap();
        assert_eq!(ip, IpAddr::from([198, 51, 100, 2]));
    }

    #[test]
    fn test_trusted_hops_are_skipped() {
        let extractor =
            ClientIpKeyExtractor::new(&[IpAddr::from(PROXY), IpAddr::from([10, 0, 0, 3])]);
        let req = request(PROXY, &["6.6.6.6, 198.51.100.2", "10.0.0.3"]);
        assert_eq!(
            extractor.extract(&req).unwrap(),
            IpAddr::from([198, 51, 100, 2])
        );
    }

    #[test]
    fn test_trusted_proxy_without_header_is_the_client() {
        let req = request(PROXY, &[]);
        assert_eq!(behind_proxy().extract(&req).unwrap(), IpAddr::from(PROXY));
    }

    #[test]
    fn test_garbage_hop_stops_the_walk() {
        let req = request(PROXY, &["198.51.100.2, not-an-ip"]);
        assert_eq!(behind_proxy().extract(&req).unwrap(), IpAddr::from(PROXY));
    }

    #[test]
    fn test_no_peer_is_an_error() {
        let req = Request::builder()
            .header(FORWARDED_FOR, "203.0.113.7")
            .body(())
            .unwrap();
        assert!(behind_proxy().extract(&req).is_err());
    }
}
