//! Per-request dispatch: blacklist, tunnel, cache, or forward.
//!
//! Every request on the proxy port enters [`ProxyHandler::handle`]. It is
//! logged, checked against the blacklist, and then either tunneled (CONNECT)
//! or served from the cache / forwarded to the origin.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use tollgate_core::{
    is_cacheable, Blacklist, CacheEntry, FreshnessEvaluator, RequestLog, RequestLogEntry,
    ResponseMeta, SharedCache,
};

use crate::error::{ProxyError, Result};
use crate::headers::{forward_request_headers, strip_hop_headers};
use crate::tunnel::splice;

/// Body sent to plain HTTP clients whose target is blacklisted.
const BLOCKED_BODY: &str = "Blocked by blacklist!";

/// Marker header on blacklist responses.
const BLOCKED_HEADER: &str = "x-tollgate-blocked";

/// Handler configuration.
#[derive(Clone)]
pub struct HandlerConfig {
    /// Response cache; `None` disables caching.
    pub cache: Option<SharedCache>,
    /// Blocked host substrings.
    pub blacklist: Blacklist,
    /// Request metadata sink.
    pub request_log: RequestLog,
    /// Client used to contact origins.
    pub client: reqwest::Client,
    /// Decides whether cached entries can be served.
    pub evaluator: FreshnessEvaluator,
}

impl std::fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("cache", &self.cache)
            .field("blacklist", &self.blacklist.len())
            .field("request_log", &self.request_log.len())
            .finish_non_exhaustive()
    }
}

impl HandlerConfig {
    /// Creates a configuration whose origin client also performs revalidation.
    pub fn new(
        cache: Option<SharedCache>,
        blacklist: Blacklist,
        request_log: RequestLog,
    ) -> Result<Self> {
        let client = origin_client()?;
        Ok(Self {
            evaluator: FreshnessEvaluator::with_client(client.clone()),
            cache,
            blacklist,
            request_log,
            client,
        })
    }
}

/// Builds the client used to reach origins.
///
/// Redirects are relayed to the client rather than followed, and no
/// upstream proxy is consulted.
pub fn origin_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ProxyError::Proxy(format!("Failed to build HTTP client: {}", e)))
}

/// Request dispatcher shared by all connections.
#[derive(Clone, Debug)]
pub struct ProxyHandler {
    config: Arc<HandlerConfig>,
}

impl ProxyHandler {
    /// Creates a new proxy handler with the given configuration.
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The cache, if caching is enabled.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.config.cache.as_ref()
    }

    /// Handles one request. Never fails: errors become error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let host = request_host(&req);
        self.log_request(&req, &host);

        if let Some(pattern) = self.config.blacklist.matching_pattern(&host) {
            tracing::info!(host = %host, pattern = %pattern, "Blocked request");
            return blocked_response(req.method() == Method::CONNECT);
        }

        let result = if req.method() == Method::CONNECT {
            self.handle_connect(req).await
        } else {
            self.handle_http(req).await
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(host = %host, error = %e, "Request failed");
            error_response(&e)
        })
    }

    fn log_request<B>(&self, req: &Request<B>, host: &str) {
        self.config.request_log.append(RequestLogEntry::new(
            host,
            req.method().as_str(),
            declared_length(req.headers()),
            format!("{:?}", req.version()),
        ));
    }

    /// Dials the CONNECT target and splices it with the upgraded client
    /// connection once the 200 response has been sent.
    async fn handle_connect<B>(&self, mut req: Request<B>) -> Result<Response<Full<Bytes>>> {
        let target = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .ok_or_else(|| ProxyError::InvalidTarget(req.uri().to_string()))?;

        if req.extensions().get::<hyper::upgrade::OnUpgrade>().is_none() {
            return Err(ProxyError::Hijack);
        }

        let origin = TcpStream::connect(&target)
            .await
            .map_err(|source| ProxyError::Dial {
                target: target.clone(),
                source,
            })?;

        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    tracing::debug!(authority = %target, "Tunnel established");
                    splice(TokioIo::new(upgraded), origin).await;
                    tracing::debug!(authority = %target, "Tunnel closed");
                }
                Err(e) => tracing::warn!(authority = %target, error = %e, "Upgrade failed"),
            }
        });

        Ok(Response::new(Full::new(Bytes::new())))
    }

    async fn handle_http<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let uri = req.uri().clone();
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ProxyError::InvalidTarget(uri.to_string()));
        }
        let key = cache_key(&uri);

        let cache = self.config.cache.as_ref().filter(|_| is_cache_lookup(req.method()));
        let mut observed = None;

        if let Some(cache) = cache {
            if let Some(entry) = cache.get(&key) {
                if self.config.evaluator.evaluate(&entry).await?.is_fresh() {
                    tracing::info!(uri = %key, "Serving from cache");
                    return Ok(cached_response(&entry, req.method() == Method::HEAD));
                }
                tracing::debug!(uri = %key, "Cached entry is stale");
                observed = Some(entry);
            }
        }

        let method = req.method().clone();
        let (meta, body) = self.forward(req, &uri).await?;
        let response = relay_response(&meta, body.clone());

        if let Some(cache) = cache.filter(|_| method == Method::GET) {
            if is_cacheable(&meta.headers) {
                let entry = CacheEntry::new(key.clone(), meta, body);
                if cache.insert_if_unchanged(entry, observed.as_ref()) {
                    tracing::info!(uri = %key, "Inserted into cache");
                }
            }
        }

        Ok(response)
    }

    /// Sends the request to the origin and buffers the whole response.
    async fn forward<B>(&self, req: Request<B>, uri: &Uri) -> Result<(ResponseMeta, Bytes)>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))?
            .to_bytes();

        tracing::debug!(method = %parts.method, uri = %uri, "Forwarding to origin");

        let mut request = self
            .config
            .client
            .request(parts.method, uri.to_string())
            .headers(forward_request_headers(&parts.headers));
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let meta = ResponseMeta::new(
            response.status(),
            response.version(),
            response.headers().clone(),
        );
        let body = response.bytes().await?;

        Ok((meta, body))
    }
}

/// Target host as `host[:port]`, from the request target or the Host header.
fn request_host<B>(req: &Request<B>) -> String {
    if let Some(authority) = req.uri().authority() {
        return authority.to_string();
    }

    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Declared body length: `Content-Length` if present, -1 for a body of
/// unknown length, 0 for none.
fn declared_length(headers: &HeaderMap) -> i64 {
    if let Some(len) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return len;
    }
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return -1;
    }
    0
}

fn is_cache_lookup(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn blocked_response(tunnel: bool) -> Response<Full<Bytes>> {
    let body = if tunnel {
        Bytes::new()
    } else {
        Bytes::from_static(BLOCKED_BODY.as_bytes())
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = StatusCode::FORBIDDEN;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(BLOCKED_HEADER, HeaderValue::from_static("true"));
    response
}

fn error_response(error: &ProxyError) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(error.to_string())));
    *response.status_mut() = error.status();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn relay_response(meta: &ResponseMeta, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = meta.status;
    *response.headers_mut() = strip_hop_headers(&meta.headers);
    response
}

fn cached_response(entry: &CacheEntry, head: bool) -> Response<Full<Bytes>> {
    let body = if head { Bytes::new() } else { entry.body.clone() };
    let mut response = relay_response(&entry.meta, body);
    response
        .headers_mut()
        .insert(header::AGE, HeaderValue::from(entry.age()));
    response
}

/// Cache key for an absolute request target.
///
/// The key is the target as [`Uri`] renders it, so an empty path becomes `/`
/// and `http://host?q` shares an entry with `http://host/?q`. It stays a
/// fetchable URI for revalidation.
fn cache_key(uri: &Uri) -> String {
    uri.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use tokio::net::TcpListener;

    type Respond = Arc<dyn Fn(&Request<Incoming>) -> Response<Full<Bytes>> + Send + Sync>;

    /// Loopback origin that counts requests and answers with `respond`.
    struct Origin {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
    }

    impl Origin {
        async fn start(respond: Respond) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();

            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let respond = respond.clone();
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let response = respond(&req);
                            async move { Ok::<_, Infallible>(response) }
                        });
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
            });

            Self { addr, hits }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn respond_with(headers: &'static [(&'static str, &'static str)], body: &'static str) -> Respond {
        Arc::new(move |_req: &Request<Incoming>| {
            let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
            for (name, value) in headers {
                response
                    .headers_mut()
                    .append(*name, HeaderValue::from_static(*value));
            }
            response
        })
    }

    fn handler_with(blacklist: Blacklist) -> ProxyHandler {
        let cache = SharedCache::new(NonZeroUsize::new(8).unwrap());
        ProxyHandler::new(HandlerConfig::new(Some(cache), blacklist, RequestLog::new()).unwrap())
    }

    fn handler() -> ProxyHandler {
        handler_with(Blacklist::new())
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::get(uri).body(Full::new(Bytes::new())).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn declared_length_rules() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), 0);

        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert_eq!(declared_length(&headers), -1);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(declared_length(&headers), 42);
    }

    #[test]
    fn request_host_prefers_authority() {
        let req = Request::get("http://shop.example.com:8080/x")
            .header(header::HOST, "other.example")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), "shop.example.com:8080");

        let req = Request::get("/x")
            .header(header::HOST, "other.example")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), "other.example");
    }

    #[test]
    fn blocked_response_status_and_headers() {
        let response = blocked_response(false);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get(BLOCKED_HEADER).unwrap(), "true");
    }

    #[tokio::test]
    async fn blacklisted_host_is_blocked_without_contacting_origin() {
        let origin = Origin::start(respond_with(&[], "hello")).await;
        let handler = handler_with(Blacklist::with_patterns(["127.0.0.1"]));

        let response = handler.handle(get(&origin.url("/"))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_of(response).await, BLOCKED_BODY.as_bytes());
        assert_eq!(origin.hits(), 0);
        assert_eq!(handler.config.request_log.len(), 1);
    }

    #[tokio::test]
    async fn blocked_connect_gets_empty_forbidden() {
        let handler = handler_with(Blacklist::with_patterns(["amazon.com"]));
        let req = Request::connect("shop.amazon.com:443")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = handler.handle(req).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn cacheable_response_is_served_from_cache() {
        let origin = Origin::start(respond_with(
            &[("cache-control", "max-age=3600"), ("x-origin", "yes")],
            "cached body",
        ))
        .await;
        let handler = handler();
        let url = origin.url("/page");

        let first = handler.handle(get(&url)).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_of(first).await, "cached body");

        let second = handler.handle(get(&url)).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers().get("x-origin").unwrap(), "yes");
        assert_eq!(body_of(second).await, "cached body");

        assert_eq!(origin.hits(), 1);
        assert_eq!(handler.cache().unwrap().keys(), vec![url]);
    }

    #[tokio::test]
    async fn cache_hits_carry_age() {
        let origin = Origin::start(respond_with(&[("cache-control", "max-age=3600")], "aged")).await;
        let handler = handler();
        let url = origin.url("/age");

        let first = handler.handle(get(&url)).await;
        assert!(first.headers().get(header::AGE).is_none());

        let second = handler.handle(get(&url)).await;
        let age: u64 = second.headers()[header::AGE].to_str().unwrap().parse().unwrap();
        assert!(age < 60);
    }

    #[test]
    fn cache_key_normalizes_empty_path() {
        let bare: Uri = "http://example.com?q=1".parse().unwrap();
        let rooted: Uri = "http://example.com/?q=1".parse().unwrap();

        assert_eq!(cache_key(&bare), "http://example.com/?q=1");
        assert_eq!(cache_key(&bare), cache_key(&rooted));
    }

    #[tokio::test]
    async fn uncacheable_response_is_refetched() {
        let origin = Origin::start(respond_with(&[("cache-control", "no-store")], "fresh")).await;
        let handler = handler();
        let url = origin.url("/");

        handler.handle(get(&url)).await;
        handler.handle(get(&url)).await;

        assert_eq!(origin.hits(), 2);
        assert!(handler.cache().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_responses_are_not_cached() {
        let origin = Origin::start(respond_with(&[("cache-control", "max-age=60")], "ok")).await;
        let handler = handler();

        let req = Request::post(origin.url("/submit"))
            .body(Full::new(Bytes::from_static(b"data")))
            .unwrap();
        let response = handler.handle(req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(handler.cache().unwrap().is_empty());
    }

    #[tokio::test]
    async fn caching_disabled_always_forwards() {
        let origin = Origin::start(respond_with(&[("cache-control", "max-age=60")], "ok")).await;
        let handler = ProxyHandler::new(
            HandlerConfig::new(None, Blacklist::new(), RequestLog::new()).unwrap(),
        );
        let url = origin.url("/");

        handler.handle(get(&url)).await;
        handler.handle(get(&url)).await;

        assert_eq!(origin.hits(), 2);
        assert!(handler.cache().is_none());
    }

    #[tokio::test]
    async fn etag_revalidation_serves_cached_body() {
        let respond: Respond = Arc::new(|req: &Request<Incoming>| {
            let validator = req
                .headers()
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok());
            if req.method() == Method::HEAD && validator == Some("\"v1\"") {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                return response;
            }
            let mut response = Response::new(Full::new(Bytes::from_static(b"v1 body")));
            response
                .headers_mut()
                .insert(header::ETAG, HeaderValue::from_static("\"v1\""));
            response
        });
        let origin = Origin::start(respond).await;
        let handler = handler();
        let url = origin.url("/doc");

        let first = handler.handle(get(&url)).await;
        assert_eq!(body_of(first).await, "v1 body");

        let second = handler.handle(get(&url)).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_of(second).await, "v1 body");

        // One GET plus one conditional HEAD.
        assert_eq!(origin.hits(), 2);
        assert_eq!(handler.cache().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_entry_is_replaced_after_refetch() {
        let date = httpdate::fmt_http_date(SystemTime::now() - Duration::from_secs(3600));
        let expires = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(3600));
        let origin = Origin::start(respond_with(&[("cache-control", "max-age=600")], "new")).await;
        let handler = handler();
        let url = origin.url("/old");

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=10"));
        headers.insert(header::DATE, HeaderValue::from_str(&date).unwrap());
        // Expires is ignored once max-age decides.
        headers.insert(header::EXPIRES, HeaderValue::from_str(&expires).unwrap());
        let meta = ResponseMeta::new(StatusCode::OK, hyper::Version::HTTP_11, headers);
        let cache = handler.cache().unwrap();
        cache.set(CacheEntry::new(url.clone(), meta, Bytes::from_static(b"old")));

        let response = handler.handle(get(&url)).await;

        assert_eq!(body_of(response).await, "new");
        assert_eq!(origin.hits(), 1);
        assert_eq!(&cache.get(&url).unwrap().body[..], b"new");
    }

    #[tokio::test]
    async fn malformed_max_age_is_bad_gateway() {
        let handler = handler();
        let url = "http://127.0.0.1:9/never";

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=abc"));
        headers.insert(
            header::DATE,
            HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"),
        );
        let meta = ResponseMeta::new(StatusCode::OK, hyper::Version::HTTP_11, headers);
        let cache = handler.cache().unwrap();
        cache.set(CacheEntry::new(url, meta, Bytes::new()));

        let response = handler.handle(get(url)).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(cache.get(url).is_some());
    }

    #[tokio::test]
    async fn failed_revalidation_is_service_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handler = handler();
        let url = format!("http://{}/doc", addr);
        let mut headers = HeaderMap::new();
        headers.insert(header::ETAG, HeaderValue::from_static("\"v1\""));
        let meta = ResponseMeta::new(StatusCode::OK, hyper::Version::HTTP_11, headers);
        let cache = handler.cache().unwrap();
        cache.set(CacheEntry::new(url.clone(), meta, Bytes::from_static(b"v1 body")));
        let before = cache.get(&url).unwrap();

        let response = handler.handle(get(&url)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let after = cache.get(&url).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn unreachable_origin_is_service_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let response = handler().handle(get(&format!("http://{}/", addr))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn relative_target_is_bad_request() {
        let response = handler().handle(get("/relative")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn connect_without_upgrade_is_internal_error() {
        let req = Request::connect("127.0.0.1:9")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = handler().handle(req).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn concurrent_misses_store_one_entry() {
        let origin = Origin::start(respond_with(&[("cache-control", "max-age=60")], "x")).await;
        let handler = handler();
        let url = origin.url("/same");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handler = handler.clone();
                let url = url.clone();
                tokio::spawn(async move { handler.handle(get(&url)).await.status() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::OK);
        }

        let cache = handler.cache().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys(), vec![url]);
    }
}
