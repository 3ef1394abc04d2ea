//! Header filtering for relayed exchanges.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from requests sent upstream
//! - Reduce upstream responses to the headers the caller may see
//!
//! # Design Decisions
//! - Bridged responses relay exactly `content-type` and `set-cookie`
//! - Rendered pages relay `location`, `vary` and `content-type`, plus
//!   `content-encoding` when the page body is still encoded
//! - Pass-through responses relay everything except hop-by-hop headers
//! - Every `set-cookie` occurrence is kept, in upstream order

use axum::http::HeaderMap;

use crate::protocol::Headers;

/// Upstream response headers visible to the caller of a bridged exchange.
pub const RELAYED_RESPONSE_HEADERS: [&str; 2] = ["content-type", "set-cookie"];

/// Upstream response headers visible to the caller of a rendered page.
pub const PAGE_RESPONSE_HEADERS: [&str; 3] = ["location", "vary", "content-type"];

/// Connection-level headers that never cross the relay.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Inbound headers to forward upstream.
///
/// `content-length` is dropped as well; the outbound body is re-framed.
pub fn request_headers(inbound: &Headers) -> Headers {
    inbound
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-length"))
        .collect()
}

/// Upstream response headers relayed by the HTTP bridge.
pub fn bridged_response_headers(upstream: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for name in RELAYED_RESPONSE_HEADERS {
        for value in upstream.get_all(name) {
            headers.push(name, String::from_utf8_lossy(value.as_bytes()));
        }
    }
    headers
}

/// Upstream response headers relayed with a rendered page.
pub fn page_response_headers(upstream: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    let names = PAGE_RESPONSE_HEADERS.into_iter().chain(["content-encoding"]);
    for name in names {
        if let Some(value) = upstream.get(name) {
            headers.push(name, String::from_utf8_lossy(value.as_bytes()));
        }
    }
    headers
}

/// Upstream response headers relayed on pass-through.
pub fn passthrough_response_headers(upstream: &HeaderMap) -> Headers {
    Headers::from(upstream)
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("content-type", "application/javascript".parse().unwrap());
        map.append("set-cookie", "a=1; Path=/".parse().unwrap());
        map.append("set-cookie", "b=2; Path=/".parse().unwrap());
        map.insert("connection", "keep-alive".parse().unwrap());
        map.insert("x-powered-by", "Next.js".parse().unwrap());
        map.insert("etag", "\"abc\"".parse().unwrap());
        map
    }

    #[test]
    fn bridged_headers_are_exact() {
        let headers = bridged_response_headers(&upstream());

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("content-type"), Some("application/javascript"));
        assert_eq!(
            headers.get_all("set-cookie").collect::<Vec<_>>(),
            vec!["a=1; Path=/", "b=2; Path=/"]
        );
        assert!(!headers.contains("connection"));
        assert!(!headers.contains("x-powered-by"));
    }

    #[test]
    fn bridged_headers_may_be_empty() {
        assert!(bridged_response_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn page_headers_keep_redirect_and_caching_hints() {
        let mut map = upstream();
        map.insert("location", "/login".parse().unwrap());
        map.insert("vary", "RSC, Next-Router-State-Tree".parse().unwrap());

        let headers = page_response_headers(&map);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("location"), Some("/login"));
        assert_eq!(headers.get("vary"), Some("RSC, Next-Router-State-Tree"));
        assert!(!headers.contains("set-cookie"));
        assert!(!headers.contains("content-encoding"));

        map.insert("content-encoding", "gzip".parse().unwrap());
        assert_eq!(page_response_headers(&map).get("content-encoding"), Some("gzip"));
    }

    #[test]
    fn passthrough_drops_only_hop_by_hop() {
        let headers = passthrough_response_headers(&upstream());

        assert!(!headers.contains("connection"));
        assert!(headers.contains("etag"));
        assert!(headers.contains("x-powered-by"));
        assert_eq!(headers.get_all("set-cookie").count(), 2);
    }

    #[test]
    fn request_headers_strip_framing() {
        let inbound: Headers = vec![
            ("Host", "localhost:8000"),
            ("Connection", "Upgrade"),
            ("Content-Length", "12"),
            ("Cookie", "sessionid=x"),
            ("Accept", "text/html"),
            ("Accept", "*/*"),
        ]
        .into_iter()
        .collect();

        let forwarded = request_headers(&inbound);
        assert_eq!(forwarded.get("host"), Some("localhost:8000"));
        assert_eq!(forwarded.get("cookie"), Some("sessionid=x"));
        assert_eq!(forwarded.get_all("accept").count(), 2);
        assert!(!forwarded.contains("connection"));
        assert!(!forwarded.contains("content-length"));
    }
}
