//! Authenticated fetch against the configured Redmine instance.
//!
//! [`RedmineClient`] composes the rest of the crate: it normalizes the
//! target URL, attaches the API-key and Basic-auth headers, asks the
//! [`ProxyResolver`] for a network path, performs the call, and classifies
//! the response. Callers receive the raw [`reqwest::Response`] to
//! interpret, with one exception: a non-2xx response carrying HTML is
//! converted into [`ClientError::HtmlResponse`], because it means the
//! request never reached the API at all.

use std::sync::Arc;

use base64::prelude::*;
use log::{debug, warn};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Proxy, Response};
use secrecy::ExposeSecret;
use typed_builder::TypedBuilder;
use url::Url;

use redbridge_common::Settings;

use crate::error::ClientError;
use crate::proxy::{ProxyResolver, masked};

/// Header carrying the Redmine API key.
static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-redmine-api-key");

/// How much of an HTML error body is kept for diagnostics.
const HTML_SNIPPET_CHARS: usize = 200;

/// Options for a single request.
///
/// # Examples
///
/// ```
/// use redbridge_client::RequestOptions;
/// use reqwest::Method;
///
/// let options = RequestOptions::builder()
///     .method(Method::POST)
///     .body(Some(r#"{"issue":{"subject":"test"}}"#.to_string()))
///     .build();
/// ```
#[derive(Debug, Default, TypedBuilder)]
pub struct RequestOptions {
    /// HTTP method; defaults to `GET`.
    #[builder(default)]
    pub method: Method,
    /// Caller-supplied headers, merged over the ones this layer sets.
    /// The caller wins on conflicts.
    #[builder(default)]
    pub headers: HeaderMap,
    /// Optional request body.
    #[builder(default)]
    pub body: Option<String>,
}

/// Proxy-aware, authenticated HTTP client for a Redmine instance.
///
/// Cheap to share behind an `Arc`; concurrent requests are independent
/// except for the lazily initialized PAC cache inside the resolver.
pub struct RedmineClient {
    settings: Arc<Settings>,
    resolver: ProxyResolver,
    http: reqwest::Client,
}

impl RedmineClient {
    /// Creates a client over the given settings.
    ///
    /// The direct transport is built with environment proxies disabled:
    /// proxy selection is this crate's job, and an ambient `HTTPS_PROXY`
    /// sneaking in underneath would bypass PAC resolution.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client fails to build.
    pub fn new(settings: Settings) -> Result<Self, ClientError> {
        let settings = Arc::new(settings);
        let http = reqwest::Client::builder().no_proxy().build()?;
        let resolver = ProxyResolver::new(Arc::clone(&settings), http.clone());
        Ok(Self {
            settings,
            resolver,
            http,
        })
    }

    /// The settings this client was built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Performs an authenticated request against `path`.
    ///
    /// `path` is joined onto the configured base URL with exactly one slash
    /// at the join point, regardless of trailing/leading slashes on either
    /// side.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] when the call itself fails,
    /// [`ClientError::HtmlResponse`] when a non-2xx response carries HTML.
    /// Any other response, including non-2xx API error payloads, is
    /// returned for the caller to interpret.
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let url = join_url(self.settings.base_url.as_str(), path);
        debug!("fetching {url}");

        let headers = self.compose_headers(&options.headers)?;
        let client = match self.resolver.resolve(&url).await {
            Some(endpoint) => self.proxied_client(&endpoint),
            None => self.http.clone(),
        };

        let mut request = client.request(options.method, &url).headers(headers);
        if let Some(body) = options.body {
            request = request.body(body);
        }

        let response = request.send().await?;
        debug!("response status: {} for {url}", response.status());

        check_html_response(response, &url).await
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.request(path, RequestOptions::default()).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(
        &self,
        path: &str,
        body: impl Into<String>,
    ) -> Result<Response, ClientError> {
        self.request(path, json_options(Method::POST, body.into()))
            .await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(&self, path: &str, body: impl Into<String>) -> Result<Response, ClientError> {
        self.request(path, json_options(Method::PUT, body.into()))
            .await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str) -> Result<Response, ClientError> {
        self.request(
            path,
            RequestOptions::builder().method(Method::DELETE).build(),
        )
        .await
    }

    /// Layer headers first, then the caller's on top.
    fn compose_headers(&self, caller: &HeaderMap) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();

        let mut api_key = HeaderValue::from_str(self.settings.api_key.expose_secret())?;
        api_key.set_sensitive(true);
        headers.insert(&API_KEY_HEADER, api_key);

        if let (Some(user), Some(password)) = (
            &self.settings.basic_auth_user,
            &self.settings.basic_auth_password,
        ) {
            let encoded =
                BASE64_STANDARD.encode(format!("{user}:{}", password.expose_secret()));
            let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        for (name, value) in caller {
            headers.insert(name, value.clone());
        }

        Ok(headers)
    }

    /// Client routed through `endpoint`, or the direct client when the
    /// proxy transport cannot be constructed (the request still proceeds).
    fn proxied_client(&self, endpoint: &Url) -> reqwest::Client {
        match Proxy::all(endpoint.clone())
            .and_then(|proxy| reqwest::Client::builder().proxy(proxy).build())
        {
            Ok(client) => client,
            Err(err) => {
                warn!(
                    "failed to route through proxy {}: {err}; connecting directly",
                    masked(endpoint)
                );
                self.http.clone()
            }
        }
    }
}

fn json_options(method: Method, body: String) -> RequestOptions {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    RequestOptions::builder()
        .method(method)
        .headers(headers)
        .body(Some(body))
        .build()
}

/// Joins `path` onto `base` with exactly one slash at the join point.
fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Fails a non-2xx response whose content type says HTML.
///
/// A login or gateway page in front of the API is a different failure class
/// than an API error payload; the latter is left to the caller.
async fn check_html_response(response: Response, url: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.contains("text/html"));
    if !html {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!("failed to read HTML error body from {url}: {err}");
            String::new()
        }
    };
    let snippet = body.chars().take(HTML_SNIPPET_CHARS).collect();
    Err(ClientError::HtmlResponse {
        status,
        url: url.to_owned(),
        snippet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RedmineClient {
        let settings = Settings::new(Url::parse(&server.uri()).unwrap(), "test-api-key");
        RedmineClient::new(settings).unwrap()
    }

    #[test]
    fn join_url_yields_one_slash_for_every_combination() {
        let cases = [
            ("https://rm.example.com", "/issues.json"),
            ("https://rm.example.com/", "/issues.json"),
            ("https://rm.example.com", "issues.json"),
            ("https://rm.example.com/", "issues.json"),
        ];
        for (base, path) in cases {
            assert_eq!(
                join_url(base, path),
                "https://rm.example.com/issues.json",
                "for ({base}, {path})"
            );
        }
    }

    #[test]
    fn join_url_preserves_subpath_deployments() {
        assert_eq!(
            join_url("https://rm.example.com/redmine/", "/issues.json"),
            "https://rm.example.com/redmine/issues.json"
        );
    }

    #[test]
    fn join_url_leaves_well_formed_inputs_untouched() {
        // A base without a trailing slash and a path with one leading slash
        // pass through as plain concatenation.
        assert_eq!(
            join_url("https://rm.example.com", "/issues/42.json"),
            "https://rm.example.com/issues/42.json"
        );
    }

    proptest! {
        #[test]
        fn join_url_property(
            base_slash in proptest::bool::ANY,
            path_slash in proptest::bool::ANY,
            segment in "[a-z]{1,12}",
        ) {
            let base = if base_slash {
                "https://rm.example.com/".to_string()
            } else {
                "https://rm.example.com".to_string()
            };
            let path = if path_slash {
                format!("/{segment}")
            } else {
                segment.clone()
            };
            prop_assert_eq!(
                join_url(&base, &path),
                format!("https://rm.example.com/{segment}")
            );
        }
    }

    #[tokio::test]
    async fn api_key_header_is_always_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(header("x-redmine-api-key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.get("/issues.json").await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn basic_auth_header_is_sent_when_both_credentials_are_set() {
        let server = MockServer::start().await;
        // base64("alice:s3cret")
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let settings = Settings::new(Url::parse(&server.uri()).unwrap(), "test-api-key")
            .with_basic_auth("alice", "s3cret");
        let client = RedmineClient::new(settings).unwrap();
        client.get("/issues.json").await.unwrap();
    }

    #[tokio::test]
    async fn basic_auth_header_is_absent_without_a_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let mut settings = Settings::new(Url::parse(&server.uri()).unwrap(), "test-api-key");
        settings.basic_auth_user = Some("alice".to_string());
        let client = RedmineClient::new(settings).unwrap();
        client.get("/issues.json").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(
            requests
                .iter()
                .all(|request| !request.headers.contains_key("authorization"))
        );
    }

    #[tokio::test]
    async fn caller_headers_win_over_layer_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .and(header("x-redmine-api-key", "caller-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut headers = HeaderMap::new();
        headers.insert(&API_KEY_HEADER, HeaderValue::from_static("caller-key"));
        client
            .request("/issues.json", RequestOptions::builder().headers(headers).build())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/issues.json"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"issue":{"subject":"test"}}"#))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client
            .post("/issues.json", r#"{"issue":{"subject":"test"}}"#)
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn html_failure_is_a_distinct_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(
                ResponseTemplate::new(502).set_body_raw(
                    "<html><body>Bad Gateway</body></html>".to_string(),
                    "text/html; charset=utf-8",
                ),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get("/issues.json").await.unwrap_err();

        assert!(err.is_html_response());
        let message = err.to_string();
        assert!(message.contains("502"));
        assert!(message.contains(&format!("{}/issues.json", server.uri())));
        assert!(message.contains("<html><body>Bad Gateway"));
    }

    #[tokio::test]
    async fn html_snippet_is_truncated_to_200_chars() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(1000);
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(
                ResponseTemplate::new(503).set_body_raw(long_body, "text/html"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get("/issues.json").await.unwrap_err();
        match err {
            ClientError::HtmlResponse { snippet, .. } => {
                assert_eq!(snippet.chars().count(), 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn json_failure_is_returned_for_the_caller_to_interpret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(
                ResponseTemplate::new(502)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"errors":["upstream"]}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.get("/issues.json").await.unwrap();
        assert_eq!(response.status(), 502);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["errors"][0], "upstream");
    }

    #[tokio::test]
    async fn successful_html_response_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.get("/page").await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn unconstructible_proxy_falls_back_to_direct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        // reqwest cannot build a proxy for an ftp:// endpoint; the request
        // must still go out directly.
        let settings = Settings::new(Url::parse(&server.uri()).unwrap(), "test-api-key")
            .with_proxy_url(Url::parse("ftp://proxy.example.com:21").unwrap());
        let client = RedmineClient::new(settings).unwrap();
        let response = client.get("/issues.json").await.unwrap();
        assert_eq!(response.status(), 200);
    }
}
