//! HTTP request handling: proxy-aware connection facts, content negotiation and body decoding.
//!
//! A [`Request`] is built once per inbound exchange from the raw fields the transport
//! provides (see [`RequestBuilder`]). Everything derived from those fields is computed
//! lazily on first access and memoized for the lifetime of the request; mutating the
//! headers or body through the request drops the affected cached values.
//!
//! Forwarding headers (`X-Forwarded-Host`, `X-Forwarded-Proto`, `X-Forwarded-Port`)
//! are only believed when the configured [`TrustPolicy`] trusts the peer. Anything
//! malformed falls back to the value observed on the connection itself.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Uri, Version, header};
use mime::Mime;
use once_cell::unsync::OnceCell;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::protocol::negotiation::{self, QualityItem};
use crate::protocol::trust::{is_valid_host, split_host_port};
use crate::protocol::{HeaderBag, HttpError, Message, ParseError, Peer, TrustPolicy, TrustedProxies, UploadedFile};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_PORT: &str = "x-forwarded-port";
pub const X_REQUESTED_WITH: &str = "x-requested-with";

/// Facts observed on the connection itself, before any forwarding header is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: IpAddr,
    /// Whether the transport itself is encrypted.
    pub secure: bool,
    pub server_port: u16,
    /// Used as host when the request carries neither `Host` nor an absolute target.
    pub server_name: String,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            secure: false,
            server_port: 80,
            server_name: "localhost".to_string(),
        }
    }
}

/// The request line and headers, as produced by [`crate::codec::HeadDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderBag,
}

/// Values derived from the headers, each computed at most once.
#[derive(Default)]
struct HeaderCache {
    trusted: OnceCell<bool>,
    host: OnceCell<String>,
    scheme: OnceCell<&'static str>,
    port: OnceCell<u16>,
    proxied_ip: OnceCell<Option<IpAddr>>,
    referer: OnceCell<Option<Url>>,
    url: OnceCell<Url>,
    ajax: OnceCell<bool>,
    accepts: OnceCell<Vec<Mime>>,
    languages: OnceCell<Vec<QualityItem>>,
    charsets: OnceCell<Vec<QualityItem>>,
    encodings: OnceCell<Vec<QualityItem>>,
}

/// An inbound HTTP request.
pub struct Request {
    message: Message,
    method: Method,
    uri: Uri,
    connection: ConnectionInfo,
    trust: Arc<dyn TrustPolicy + Send + Sync>,
    files: Vec<(String, UploadedFile)>,
    headers_cache: HeaderCache,
    json: OnceCell<serde_json::Value>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.message.version())
            .field("headers", self.message.headers())
            .field("connection", &self.connection)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target as received.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.message.version()
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn headers(&self) -> &HeaderBag {
        self.message.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.message.header(name)
    }

    /// Mutable access to the headers; drops every value derived from them.
    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        self.headers_cache = HeaderCache::default();
        self.message.headers_mut()
    }

    pub fn body(&self) -> &Bytes {
        self.message.body()
    }

    /// Replaces the body and drops the decoded JSON cache.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.json = OnceCell::new();
        self.message.set_body(body);
    }

    /// Whether the peer is trusted to supply forwarding headers.
    pub fn is_trusted_peer(&self) -> bool {
        *self.headers_cache.trusted.get_or_init(|| {
            let peer = Peer { addr: self.connection.remote_addr, host: self.header(header::HOST.as_str()).map(str::to_string) };
            self.trust.is_trusted(&peer)
        })
    }

    /// Host name the client addressed, without port.
    ///
    /// Taken from `X-Forwarded-Host` when the peer is trusted and the header is well
    /// formed, otherwise from `Host`, the absolute request target, or the server name.
    pub fn host(&self) -> &str {
        self.headers_cache.host.get_or_init(|| {
            let forwarded = self.header(X_FORWARDED_HOST);
            if let Some(value) = forwarded {
                if !self.is_trusted_peer() {
                    debug!(forwarded_host = value, "ignore forwarded host from untrusted peer");
                } else if let Some(host) = first_entry(value).and_then(normalize_host) {
                    return host;
                } else {
                    debug!(forwarded_host = value, "malformed forwarded host, fall back to host header");
                }
            }

            self.header(header::HOST.as_str())
                .and_then(normalize_host)
                .or_else(|| self.uri.host().and_then(normalize_host))
                .unwrap_or_else(|| self.connection.server_name.clone())
        })
    }

    /// `https` when the transport is secure or a trusted peer forwarded `https`.
    pub fn scheme(&self) -> &'static str {
        self.headers_cache.scheme.get_or_init(|| {
            if self.connection.secure {
                return "https";
            }
            let forwarded_https = self
                .header(X_FORWARDED_PROTO)
                .and_then(first_entry)
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
            if forwarded_https && self.is_trusted_peer() { "https" } else { "http" }
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme() == "https"
    }

    /// The server port, or `X-Forwarded-Port` from a trusted peer.
    pub fn port(&self) -> u16 {
        *self.headers_cache.port.get_or_init(|| {
            self.header(X_FORWARDED_PORT)
                .and_then(first_entry)
                .and_then(|port| port.parse().ok())
                .filter(|_| self.is_trusted_peer())
                .unwrap_or(self.connection.server_port)
        })
    }

    /// First address of `X-Forwarded-For`, whoever sent it.
    ///
    /// This value can be spoofed by any client. Use [`Request::client_ip`] when the
    /// address has to be reliable.
    pub fn proxied_ip(&self) -> Option<IpAddr> {
        *self.headers_cache.proxied_ip.get_or_init(|| {
            let entry = first_entry(self.header(X_FORWARDED_FOR)?)?;
            let (host, _) = split_host_port(entry)?;
            host.parse().ok()
        })
    }

    /// The forwarded client address when the peer is trusted, the peer address otherwise.
    pub fn client_ip(&self) -> IpAddr {
        if self.is_trusted_peer() {
            self.proxied_ip().unwrap_or(self.connection.remote_addr)
        } else {
            self.connection.remote_addr
        }
    }

    /// The `Referer` header as a URL; absent or unparsable values yield `None`.
    pub fn referer(&self) -> Option<&Url> {
        self.headers_cache
            .referer
            .get_or_init(|| self.header(header::REFERER.as_str()).and_then(|value| Url::parse(value).ok()))
            .as_ref()
    }

    /// The full URL the client requested, built from the resolved scheme, host and port.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUri`] when the pieces do not form a valid URL.
    pub fn url(&self) -> Result<&Url, ParseError> {
        self.headers_cache.url.get_or_try_init(|| {
            let host = self.host();
            let host = if host.parse::<Ipv6Addr>().is_ok() { format!("[{host}]") } else { host.to_string() };
            let path_and_query = self.uri.path_and_query().map_or("/", |pq| pq.as_str());
            let raw = format!("{}://{}:{}{}", self.scheme(), host, self.port(), path_and_query);
            Url::parse(&raw).map_err(|e| {
                debug!(url = %raw, cause = %e, "failed to build request url");
                ParseError::InvalidUri
            })
        })
    }

    /// True iff `X-Requested-With` is exactly `XMLHttpRequest`.
    pub fn is_ajax(&self) -> bool {
        *self.headers_cache.ajax.get_or_init(|| self.header(X_REQUESTED_WITH) == Some("XMLHttpRequest"))
    }

    /// Media types from `Accept`, most preferred first; empty when absent.
    pub fn accepts(&self) -> &[Mime] {
        self.headers_cache
            .accepts
            .get_or_init(|| self.header(header::ACCEPT.as_str()).map(negotiation::parse_accept).unwrap_or_default())
    }

    pub fn accept_languages(&self) -> &[QualityItem] {
        self.quality_list(&self.headers_cache.languages, header::ACCEPT_LANGUAGE.as_str())
    }

    pub fn accept_charsets(&self) -> &[QualityItem] {
        self.quality_list(&self.headers_cache.charsets, header::ACCEPT_CHARSET.as_str())
    }

    pub fn accept_encodings(&self) -> &[QualityItem] {
        self.quality_list(&self.headers_cache.encodings, header::ACCEPT_ENCODING.as_str())
    }

    fn quality_list<'a>(&'a self, cell: &'a OnceCell<Vec<QualityItem>>, name: &str) -> &'a [QualityItem] {
        cell.get_or_init(|| self.header(name).map(negotiation::parse_quality_list).unwrap_or_default())
    }

    /// The first of `available` media types the client accepts.
    pub fn negotiate_media<'a>(&self, available: &[&'a str]) -> Option<&'a str> {
        negotiation::negotiate_media(self.accepts(), available)
    }

    pub fn negotiate_language<'a>(&self, available: &[&'a str]) -> Option<&'a str> {
        negotiation::negotiate_token(self.accept_languages(), available)
    }

    /// The body decoded as JSON, parsed on first call.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidJson`] for malformed bodies; failures are not cached.
    pub fn json(&self) -> Result<&serde_json::Value, ParseError> {
        self.json.get_or_try_init(|| serde_json::from_slice(self.body()).map_err(ParseError::from))
    }

    /// Deserializes the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidJson`] when the body does not match `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        Ok(serde_json::from_slice(self.body())?)
    }

    /// Deserializes an `application/x-www-form-urlencoded` body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidBody`] when the body does not match `T`.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_urlencoded::from_bytes(self.body()).map_err(|e| ParseError::invalid_body(e.to_string()))
    }

    /// Deserializes the query string into `T`; a missing query reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUri`] when the query does not match `T`.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_qs::from_str(self.uri.query().unwrap_or_default()).map_err(|e| {
            debug!(cause = %e, "failed to decode query string");
            ParseError::InvalidUri
        })
    }

    /// Uploaded files sent under the form field `field`.
    pub fn files<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + use<'a> {
        self.files.iter().filter(move |(name, _)| name == field).map(|(_, file)| file)
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|(name, _)| name == field).map(|(_, file)| file)
    }

    pub fn file_mut(&mut self, field: &str) -> Option<&mut UploadedFile> {
        self.files.iter_mut().find(|(name, _)| name == field).map(|(_, file)| file)
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

/// First comma separated entry of a header value.
fn first_entry(value: &str) -> Option<&str> {
    value.split(',').next().map(str::trim).filter(|entry| !entry.is_empty())
}

/// Strips the port from a host header value and validates what is left.
fn normalize_host(value: &str) -> Option<String> {
    let (host, _) = split_host_port(value)?;
    is_valid_host(host).then(|| host.to_ascii_lowercase())
}

/// Builder for [`Request`], fed with the raw fields of one inbound exchange.
///
/// Errors are stored and reported by [`RequestBuilder::build`].
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderBag,
    body: Bytes,
    connection: ConnectionInfo,
    trust: Arc<dyn TrustPolicy + Send + Sync>,
    files: Vec<(String, UploadedFile)>,
    error: Option<HttpError>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::HTTP_11,
            headers: HeaderBag::new(),
            body: Bytes::new(),
            connection: ConnectionInfo::default(),
            trust: Arc::new(TrustedProxies::none()),
            files: Vec::new(),
            error: None,
        }
    }

    /// Takes method, target, version and headers from a decoded request head.
    #[must_use]
    pub fn head(mut self, head: RequestHead) -> Self {
        self.method = head.method;
        self.uri = head.uri;
        self.version = head.version;
        self.headers = head.headers;
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: &str) -> Self {
        match uri.parse() {
            Ok(uri) => self.uri = uri,
            Err(_) => self.fail(ParseError::InvalidUri),
        }
        self
    }

    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.append(name, value) {
            self.fail(e);
        }
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.connection.remote_addr = addr;
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.connection.secure = secure;
        self
    }

    #[must_use]
    pub fn server_port(mut self, port: u16) -> Self {
        self.connection.server_port = port;
        self
    }

    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.connection.server_name = name.into();
        self
    }

    #[must_use]
    pub fn trusted_proxies(self, proxies: TrustedProxies) -> Self {
        self.trust_policy(Arc::new(proxies))
    }

    #[must_use]
    pub fn trust_policy(mut self, policy: Arc<dyn TrustPolicy + Send + Sync>) -> Self {
        self.trust = policy;
        self
    }

    #[must_use]
    pub fn uploaded_file(mut self, field: impl Into<String>, file: UploadedFile) -> Self {
        self.files.push((field.into(), file));
        self
    }

    fn fail(&mut self, e: impl Into<HttpError>) {
        if self.error.is_none() {
            self.error = Some(e.into());
        }
    }

    /// # Errors
    ///
    /// Returns the first error recorded while building, or
    /// [`ParseError::UnsupportedVersion`] for an unsupported protocol version.
    pub fn build(self) -> Result<Request, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let message = Message::with_parts(self.version, self.headers, self.body)?;
        Ok(Request {
            message,
            method: self.method,
            uri: self.uri,
            connection: self.connection,
            trust: self.trust,
            files: self.files,
            headers_cache: HeaderCache::default(),
            json: OnceCell::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MockTrustPolicy;
    use crate::protocol::HeaderError;
    use serde::Deserialize;

    fn proxy_request() -> Request {
        Request::builder()
            .method(Method::GET)
            .uri("/blog/posts?order_by=title&order=asc")
            .version(Version::HTTP_11)
            .header("Host", "real-domain.tld:8080")
            .header("X-Forwarded-For", "192.168.1.2")
            .header("Referer", "invali_d")
            .remote_addr("192.168.1.100".parse().unwrap())
            .secure(true)
            .server_port(8080)
            .server_name("domain.tld")
            .trusted_proxies(TrustedProxies::new(["real-domain.tld:8080"]).unwrap())
            .body(r#"{"test":123}"#)
            .build()
            .unwrap()
    }

    #[test]
    fn proxy_host() {
        assert_eq!(proxy_request().host(), "real-domain.tld");
    }

    #[test]
    fn proxy_accepts_empty() {
        assert!(proxy_request().accepts().is_empty());
    }

    #[test]
    fn proxy_is_not_ajax() {
        let request = proxy_request();
        assert!(!request.is_ajax());
        assert!(!request.is_ajax());
    }

    #[test]
    fn proxy_is_secure() {
        let request = proxy_request();
        assert!(request.is_secure());
        assert!(request.is_secure());
    }

    #[test]
    fn proxy_json() {
        let mut request = proxy_request();
        request.set_body(r#"{"test":123}"#);
        assert_eq!(request.json().unwrap()["test"], 123);
    }

    #[test]
    fn proxy_port() {
        assert_eq!(proxy_request().port(), 8080);
    }

    #[test]
    fn proxy_proxied_ip() {
        assert_eq!(proxy_request().proxied_ip(), Some("192.168.1.2".parse().unwrap()));
    }

    #[test]
    fn proxy_referer_invalid() {
        assert_eq!(proxy_request().referer(), None);
    }

    #[test]
    fn proxy_url() {
        let request = proxy_request();
        assert_eq!(request.url().unwrap().as_str(), "https://real-domain.tld:8080/blog/posts?order_by=title&order=asc");
    }

    #[test]
    fn untrusted_forwarding_is_ignored() {
        let request = Request::builder()
            .uri("/index.html")
            .header("Host", "origin.tld")
            .header("X-Forwarded-Host", "evil.tld")
            .header("X-Forwarded-Proto", "https")
            .header("X-Forwarded-Port", "443")
            .header("X-Forwarded-For", "203.0.113.9")
            .remote_addr("10.0.0.1".parse().unwrap())
            .server_port(8080)
            .build()
            .unwrap();

        assert!(!request.is_trusted_peer());
        assert_eq!(request.host(), "origin.tld");
        assert_eq!(request.scheme(), "http");
        assert!(!request.is_secure());
        assert_eq!(request.port(), 8080);
        // best effort value is still reported
        assert_eq!(request.proxied_ip(), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(request.client_ip(), "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(request.url().unwrap().as_str(), "http://origin.tld:8080/index.html");
    }

    #[test]
    fn trusted_forwarding_overrides() {
        let request = Request::builder()
            .uri("/path?q=1")
            .header("Host", "internal:8080")
            .header("X-Forwarded-Host", "Public.tld:443, internal")
            .header("X-Forwarded-Proto", "https, http")
            .header("X-Forwarded-Port", "443")
            .header("X-Forwarded-For", "203.0.113.9, 10.1.2.3")
            .remote_addr("10.1.2.3".parse().unwrap())
            .server_port(8080)
            .trusted_proxies(TrustedProxies::new(["10.0.0.0/8"]).unwrap())
            .build()
            .unwrap();

        assert!(request.is_trusted_peer());
        assert_eq!(request.host(), "public.tld");
        assert_eq!(request.scheme(), "https");
        assert_eq!(request.port(), 443);
        assert_eq!(request.client_ip(), "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_eq!(request.url().unwrap().as_str(), "https://public.tld/path?q=1");
    }

    #[test]
    fn malformed_forwarded_host_fails_closed() {
        let request = Request::builder()
            .header("Host", "origin.tld")
            .header("X-Forwarded-Host", "evil.tld/../admin")
            .header("X-Forwarded-Port", "not-a-port")
            .remote_addr("10.1.2.3".parse().unwrap())
            .server_port(8080)
            .trusted_proxies(TrustedProxies::new(["10.1.2.3"]).unwrap())
            .build()
            .unwrap();

        assert_eq!(request.host(), "origin.tld");
        assert_eq!(request.port(), 8080);
    }

    #[test]
    fn host_falls_back_to_target_then_server_name() {
        let absolute = Request::builder().uri("http://Target.tld/x").server_name("server.tld").build().unwrap();
        assert_eq!(absolute.host(), "target.tld");

        let bare = Request::builder().uri("/x").server_name("server.tld").build().unwrap();
        assert_eq!(bare.host(), "server.tld");

        let invalid = Request::builder().header("Host", "bad host").server_name("server.tld").build().unwrap();
        assert_eq!(invalid.host(), "server.tld");
    }

    #[test]
    fn ipv6_host_in_url() {
        let request = Request::builder().uri("/").header("Host", "[::1]:8443").server_port(8443).build().unwrap();

        assert_eq!(request.host(), "::1");
        assert_eq!(request.url().unwrap().as_str(), "http://[::1]:8443/");
    }

    #[test]
    fn trust_is_evaluated_once() {
        let mut policy = MockTrustPolicy::new();
        policy
            .expect_is_trusted()
            .withf(|peer: &Peer| peer.addr == "10.0.0.2".parse::<IpAddr>().unwrap() && peer.host.as_deref() == Some("a.tld"))
            .times(1)
            .returning(|_| true);

        let request = Request::builder()
            .header("Host", "a.tld")
            .header("X-Forwarded-Host", "b.tld")
            .header("X-Forwarded-Proto", "https")
            .header("X-Forwarded-Port", "8443")
            .remote_addr("10.0.0.2".parse().unwrap())
            .trust_policy(Arc::new(policy))
            .build()
            .unwrap();

        assert!(request.is_secure());
        assert!(request.is_secure());
        assert_eq!(request.host(), "b.tld");
        assert_eq!(request.host(), "b.tld");
        assert_eq!(request.port(), 8443);
        assert!(request.is_trusted_peer());
    }

    #[test]
    fn secure_transport_skips_trust() {
        let mut policy = MockTrustPolicy::new();
        policy.expect_is_trusted().never();

        let request = Request::builder().secure(true).trust_policy(Arc::new(policy)).build().unwrap();

        assert!(request.is_secure());
        assert_eq!(request.port(), 80);
    }

    #[test]
    fn ajax_is_case_sensitive() {
        let ajax = Request::builder().header("X-Requested-With", "XMLHttpRequest").build().unwrap();
        assert!(ajax.is_ajax());
        assert!(ajax.is_ajax());

        let lowercase = Request::builder().header("x-requested-with", "xmlhttprequest").build().unwrap();
        assert!(!lowercase.is_ajax());
    }

    #[test]
    fn header_mutation_drops_cache() {
        let mut request = Request::builder().header("Host", "a.tld").build().unwrap();
        assert_eq!(request.host(), "a.tld");

        request.headers_mut().set("Host", "b.tld").unwrap();
        assert_eq!(request.host(), "b.tld");
    }

    #[test]
    fn json_failure_is_not_cached() {
        let mut request = Request::builder().body("{not json").build().unwrap();
        assert!(matches!(request.json(), Err(ParseError::InvalidJson { .. })));
        assert!(matches!(request.json(), Err(ParseError::InvalidJson { .. })));

        request.set_body(r#"{"a":[1,2]}"#);
        assert_eq!(request.json().unwrap()["a"][1], 2);

        request.set_body(r#"{"a":"replaced"}"#);
        assert_eq!(request.json().unwrap()["a"], "replaced");
    }

    #[test]
    fn typed_bodies() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Params {
            name: String,
            zip: String,
        }

        let form = Request::builder().body("name=ann&zip=123").build().unwrap();
        assert_eq!(form.form::<Params>().unwrap(), Params { name: "ann".into(), zip: "123".into() });
        assert!(matches!(form.json_as::<Params>(), Err(ParseError::InvalidJson { .. })));

        let json = Request::builder().body(r#"{"name":"bob","zip":"9"}"#).build().unwrap();
        assert_eq!(json.json_as::<Params>().unwrap(), Params { name: "bob".into(), zip: "9".into() });

        let query = Request::builder().uri("/search?name=cid&zip=7").build().unwrap();
        assert_eq!(query.query::<Params>().unwrap(), Params { name: "cid".into(), zip: "7".into() });
        assert!(matches!(Request::builder().build().unwrap().query::<Params>(), Err(ParseError::InvalidUri)));
    }

    #[test]
    fn negotiation() {
        let request = Request::builder()
            .header("Accept", "application/json;q=0.9, text/html")
            .header("Accept-Language", "pt-BR, en;q=0.5")
            .header("Accept-Encoding", "gzip, br;q=0.8")
            .header("Accept-Charset", "utf-8")
            .build()
            .unwrap();

        assert_eq!(request.accepts()[0], mime::TEXT_HTML);
        assert_eq!(request.negotiate_media(&["application/json"]), Some("application/json"));
        assert_eq!(request.negotiate_language(&["en-US"]), Some("en-US"));
        assert_eq!(request.accept_encodings()[1].value, "br");
        assert_eq!(request.accept_charsets()[0].value, "utf-8");
    }

    #[test]
    fn uploaded_files_by_field() {
        let request = Request::builder()
            .uploaded_file("photos", UploadedFile::new("a.png", "image/png", "/tmp/a", 1))
            .uploaded_file("doc", UploadedFile::new("b.pdf", "application/pdf", "/tmp/b", 2))
            .uploaded_file("photos", UploadedFile::new("c.png", "image/png", "/tmp/c", 3))
            .build()
            .unwrap();

        let names: Vec<_> = request.files("photos").map(UploadedFile::name).collect();
        assert_eq!(names, ["a.png", "c.png"]);
        assert_eq!(request.file("doc").map(UploadedFile::size), Some(2));
        assert!(request.file("missing").is_none());
        assert!(request.has_files());
    }

    #[test]
    fn file_outlives_field_name() {
        let request = Request::builder()
            .uploaded_file("avatar", UploadedFile::new("me.jpg", "image/jpeg", "/tmp/me", 7))
            .build()
            .unwrap();

        let file = {
            let field = String::from("avatar");
            request.file(&field)
        };
        assert_eq!(file.map(UploadedFile::name), Some("me.jpg"));
    }

    #[test]
    fn builder_reports_errors() {
        let injected = Request::builder().header("X-Test", "a\r\nb").build();
        assert!(matches!(
            injected,
            Err(HttpError::HeaderError { source: HeaderError::InvalidValue { .. } })
        ));

        let bad_uri = Request::builder().uri("http://[::1").build();
        assert!(matches!(bad_uri, Err(HttpError::RequestError { source: ParseError::InvalidUri })));

        let bad_version = Request::builder().version(Version::HTTP_09).build();
        assert!(matches!(bad_version, Err(HttpError::RequestError { source: ParseError::UnsupportedVersion { .. } })));
    }
}
