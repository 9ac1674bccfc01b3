//! HTTP helpers: client address resolution and response hardening.

use axum::body::Body as AxumBody;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::{middleware, response::Response};
use std::net::{IpAddr, SocketAddr};

/// Parses the first address of `x-forwarded-for`.
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// Client address for request spans: forwarded header first, then the peer.
pub fn resolve_client_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    extract_forwarded_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Uploaded content is served back verbatim, so browsers must not sniff it.
pub async fn add_security_headers(request: Request<AxumBody>, next: middleware::Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .expect("request");
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from((
            Ipv4Addr::LOCALHOST,
            4000,
        ))));
        assert_eq!(
            resolve_client_ip(&request),
            Some(IpAddr::from([203, 0, 113, 7]))
        );
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "not-an-ip")
            .body(())
            .expect("request");
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from((
            Ipv4Addr::LOCALHOST,
            4000,
        ))));
        assert_eq!(
            resolve_client_ip(&request),
            Some(IpAddr::from(Ipv4Addr::LOCALHOST))
        );
    }

    #[test]
    fn unknown_without_any_source() {
        let request = Request::builder().body(()).expect("request");
        assert_eq!(resolve_client_ip(&request), None);
    }
}
