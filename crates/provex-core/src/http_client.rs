use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimal HTTP method set needed by provider adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
    /// Credential carried in the query string, e.g. `?api_key=...`.
    QueryParam { name: String, value: String },
}

/// HTTP request envelope used by adapter transport calls.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 10_000,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Append a percent-encoded query parameter to the URL.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!(
            "{}{separator}{}={}",
            self.url,
            urlencoding::encode(name),
            urlencoding::encode(value)
        );
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_auth(self, auth: &HttpAuth) -> Self {
        match auth {
            HttpAuth::None => self,
            HttpAuth::BearerToken(token) => {
                self.with_header("authorization", format!("Bearer {token}"))
            }
            HttpAuth::Header { name, value } => self.with_header(name.as_str(), value.as_str()),
            HttpAuth::QueryParam { name, value } => self.with_query(name, value),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// URL with credential-looking query values masked, for logs.
    pub fn redacted_url(&self) -> String {
        let Some((base, query)) = self.url.split_once('?') else {
            return self.url.clone();
        };
        let masked: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if is_secret_key(key) => format!("{key}=***"),
                _ => pair.to_owned(),
            })
            .collect();
        format!("{base}?{}", masked.join("&"))
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("key") || key.contains("token") || key.contains("secret")
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.redacted_url())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// HTTP response envelope returned by an adapter transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Connect,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Adapter transport contract that supports async execution and auth-aware requests.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest for real API calls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("provex/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    /// Create a ReqwestHttpClient with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            builder = builder.timeout(Duration::from_millis(request.timeout_ms));
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            // reqwest errors embed the full URL, which may carry an api key.
            let response = builder.send().await.map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::connect(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[derive(Debug, Clone)]
enum StubReply {
    Respond(HttpResponse),
    Fail(HttpError),
}

#[derive(Debug)]
struct StubRoute {
    pattern: String,
    reply: StubReply,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

/// Offline transport that answers by URL substring.
///
/// Routes are checked in insertion order; the first whose pattern occurs in
/// the request URL wins. Unmatched requests receive a 404.
#[derive(Debug, Default)]
pub struct StubHttpClient {
    routes: Vec<StubRoute>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, pattern: &str, reply: StubReply, delay: Option<Duration>) -> Self {
        self.routes.push(StubRoute {
            pattern: pattern.to_owned(),
            reply,
            delay,
            calls: AtomicUsize::new(0),
        });
        self
    }

    pub fn route(self, pattern: &str, response: HttpResponse) -> Self {
        self.push(pattern, StubReply::Respond(response), None)
    }

    pub fn route_json(self, pattern: &str, body: impl Into<String>) -> Self {
        self.route(pattern, HttpResponse::ok_json(body))
    }

    pub fn route_error(self, pattern: &str, error: HttpError) -> Self {
        self.push(pattern, StubReply::Fail(error), None)
    }

    pub fn route_delayed(self, pattern: &str, delay: Duration, response: HttpResponse) -> Self {
        self.push(pattern, StubReply::Respond(response), Some(delay))
    }

    /// Number of requests answered by the route registered under `pattern`.
    pub fn calls(&self, pattern: &str) -> usize {
        self.routes
            .iter()
            .filter(|route| route.pattern == pattern)
            .map(|route| route.calls.load(Ordering::SeqCst))
            .sum()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl HttpClient for StubHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }
            let Some(route) = self
                .routes
                .iter()
                .find(|route| request.url.contains(&route.pattern))
            else {
                return Ok(HttpResponse::with_status(404, "no stub route"));
            };
            route.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = route.delay {
                let budget = Duration::from_millis(request.timeout_ms);
                if delay > budget {
                    tokio::time::sleep(budget).await;
                    return Err(HttpError::timeout(format!(
                        "no response within {}ms",
                        request.timeout_ms
                    )));
                }
                tokio::time::sleep(delay).await;
            }
            match &route.reply {
                StubReply::Respond(response) => Ok(response.clone()),
                StubReply::Fail(error) => Err(error.clone()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_populates_authorization_header() {
        let request = HttpRequest::get("https://example.test/rates")
            .with_auth(&HttpAuth::BearerToken(String::from("token-123")));

        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer token-123")
        );
    }

    #[test]
    fn query_auth_is_encoded_and_redacted() {
        let request = HttpRequest::get("https://example.test/series?id=SOFR").with_auth(
            &HttpAuth::QueryParam {
                name: String::from("api_key"),
                value: String::from("a b&c"),
            },
        );

        assert_eq!(
            request.url,
            "https://example.test/series?id=SOFR&api_key=a%20b%26c"
        );
        assert_eq!(
            request.redacted_url(),
            "https://example.test/series?id=SOFR&api_key=***"
        );
        assert!(!format!("{request:?}").contains("a%20b"));
    }

    #[tokio::test]
    async fn stub_routes_by_substring_and_counts_calls() {
        let stub = StubHttpClient::new()
            .route_json("/chart/AAPL", r#"{"ok":true}"#)
            .route_error("/chart/MSFT", HttpError::timeout("slow"));

        let ok = stub
            .execute(HttpRequest::get("https://example.test/chart/AAPL?interval=1d"))
            .await
            .expect("route should answer");
        assert_eq!(ok.body, r#"{"ok":true}"#);

        let err = stub
            .execute(HttpRequest::get("https://example.test/chart/MSFT"))
            .await
            .expect_err("route should fail");
        assert_eq!(err.kind(), HttpErrorKind::Timeout);

        let missing = stub
            .execute(HttpRequest::get("https://example.test/other"))
            .await
            .expect("unmatched routes answer 404");
        assert_eq!(missing.status, 404);

        assert_eq!(stub.calls("/chart/AAPL"), 1);
        assert_eq!(stub.total_calls(), 3);
    }

    #[tokio::test]
    async fn delayed_route_respects_request_timeout() {
        let stub = StubHttpClient::new().route_delayed(
            "/slow",
            Duration::from_secs(5),
            HttpResponse::ok_json("{}"),
        );

        let error = stub
            .execute(HttpRequest::get("https://example.test/slow").with_timeout_ms(20))
            .await
            .expect_err("slower than the request timeout");
        assert_eq!(error.kind(), HttpErrorKind::Timeout);
        assert_eq!(stub.calls("/slow"), 1);
    }
}
