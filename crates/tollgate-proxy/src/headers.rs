//! Header hygiene for forwarded requests and relayed responses.

use hyper::header::{self, HeaderMap, HeaderName};

/// Headers that describe a single connection and never travel past it.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Names listed in `Connection` headers, which are hop-by-hop as well.
fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// Returns a copy of `headers` without hop-by-hop fields.
///
/// Multi-valued headers keep all their values in order.
pub fn strip_hop_headers(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_tokens(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_header(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers for a request sent on to the origin.
///
/// Besides hop-by-hop fields this drops `Host` and `Content-Length`, which
/// the client derives from the absolute URI and the buffered body.
pub fn forward_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = strip_hop_headers(headers);
    out.remove(header::HOST);
    out.remove(header::CONTENT_LENGTH);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn strips_standard_hop_headers() {
        let input = headers(&[
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("proxy-connection", "keep-alive"),
            ("transfer-encoding", "chunked"),
            ("content-type", "text/plain"),
        ]);

        let out = strip_hop_headers(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn strips_headers_named_in_connection() {
        let input = headers(&[("connection", "x-trace, close"), ("x-trace", "1"), ("x-keep", "2")]);

        let out = strip_hop_headers(&input);
        assert!(out.get("x-trace").is_none());
        assert_eq!(out.get("x-keep").unwrap(), "2");
    }

    #[test]
    fn keeps_multi_valued_headers_in_order() {
        let input = headers(&[("set-cookie", "a=1"), ("set-cookie", "b=2")]);

        let out = strip_hop_headers(&input);
        let values: Vec<_> = out.get_all("set-cookie").iter().collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn forward_request_drops_host_and_length() {
        let input = headers(&[
            ("host", "example.com"),
            ("content-length", "4"),
            ("proxy-authorization", "Basic abc"),
            ("accept", "*/*"),
        ]);

        let out = forward_request_headers(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("accept").unwrap(), "*/*");
    }
}
