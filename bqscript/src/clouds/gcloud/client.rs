//! A Google Cloud REST client.

use hyper::StatusCode;
use mime::{self, Mime};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{header::CONTENT_TYPE, IntoUrl};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{error, fmt, time::Duration};

use super::auth::{authenticator, Authenticator};
use crate::common::*;
use crate::tls::{https_client, install_crypto_provider};
use crate::wait::{wait, WaitOptions, WaitStatus};

/// The OAuth2 scopes that we'll need.
static SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

/// An empty `GET` query.
#[derive(Debug, Serialize)]
pub(crate) struct NoQuery;

/// An HTTP client error. We break out the statuses our callers care about.
#[derive(Debug)]
pub(crate) enum ClientError {
    /// The resource at URL was not found.
    NotFound { method: String, url: Url },
    /// Anything else.
    Other(Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotFound { method, url } => {
                write!(f, "cannot {} {}: Not Found", method, url)
            }
            ClientError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ClientError::NotFound { .. } => None,
            ClientError::Other(err) => err.source(),
        }
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        ClientError::Other(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Other(err.into())
    }
}

/// Is it safe to send a request twice?
///
/// Job inserts are never retried, so a flaky network can't start the same
/// query twice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Idempotency {
    SafeToRetry,
    UnsafeToRetry,
}

/// Should a response with `status` be retried?
///
/// We only retry statuses we've actually seen be transient, so that
/// configuration mistakes fail fast.
fn should_retry_status(idempotency: Idempotency, status: StatusCode) -> bool {
    idempotency == Idempotency::SafeToRetry
        && [
            StatusCode::SERVICE_UNAVAILABLE,
            // Rate limits come back as 403 "Exceeded rate limits". So do real
            // permission errors, which is why retries are capped.
            StatusCode::FORBIDDEN,
        ]
        .contains(&status)
}

/// A Google Cloud REST client using OAuth2.
#[derive(Clone)]
pub(crate) struct Client {
    /// Provides OAuth2 tokens.
    authenticator: Authenticator,

    /// Our HTTP client.
    client: reqwest::Client,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new Google Cloud client.
    #[instrument(level = "trace")]
    pub(crate) async fn new() -> Result<Client> {
        install_crypto_provider();
        let authenticator = authenticator().await?;
        let client = https_client()?;
        Ok(Client {
            authenticator,
            client,
        })
    }

    /// Make an HTTP GET request with the specified URL and query parameters,
    /// and deserialize the result.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn get<Output, U, Query>(
        &self,
        url: U,
        query: Query,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
    {
        let url = build_url(url, query)?;
        trace!("GET {}", url);
        let token = self.token().await?;
        let wait_options = WaitOptions::default()
            .retry_interval(Duration::from_secs(10))
            // Some permanent errors probably look temporary to us, so don't
            // hang around too long.
            .allowed_errors(3);
        let url_ref = &url;
        let token_ref = &token;
        let http_resp = wait(&wait_options, move || async move {
            let resp_result = self
                .client
                .get(url_ref.as_str())
                .bearer_auth(token_ref.as_str())
                .send()
                .await;
            // GET is idempotent.
            self.response_to_wait_status("GET", url_ref, Idempotency::SafeToRetry, resp_result)
                .await
        })
        .await?;
        self.handle_response("GET", &url, http_resp).await
    }

    /// Make an HTTP POST request with the specified URL and body.
    ///
    /// With `Idempotency::SafeToRetry`, the request may be sent more than once.
    #[instrument(level = "trace", skip(self, body))]
    pub(crate) async fn post<Output, U, Query, Body>(
        &self,
        url: U,
        idempotency: Idempotency,
        query: Query,
        body: Body,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
        Body: fmt::Debug + Serialize + Sync + Send,
    {
        let url = build_url(url, query)?;
        trace!("POST {} {}", url, serde_json::to_string(&body)?);

        let token = self.token().await?;
        let wait_options = WaitOptions::default()
            .retry_interval(Duration::from_secs(4))
            .allowed_errors(4);
        let token_ref = &token;
        let url_ref = &url;
        let body_ref = &body;
        let http_resp = wait(&wait_options, move || async move {
            let resp_result = self
                .client
                .post(url_ref.as_str())
                .bearer_auth(token_ref.as_str())
                .json(body_ref)
                .send()
                .await;
            self.response_to_wait_status("POST", url_ref, idempotency, resp_result)
                .await
        })
        .await?;
        self.handle_response("POST", &url, http_resp).await
    }

    /// Delete the specified URL.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn delete<U, Query>(
        &self,
        url: U,
        query: Query,
    ) -> Result<(), ClientError>
    where
        U: IntoUrl + fmt::Debug,
        Query: fmt::Debug + Serialize,
    {
        let url = build_url(url, query)?;
        trace!("DELETE {}", url);
        let token = self.token().await?;
        let http_resp = self
            .client
            .delete(url.as_str())
            .bearer_auth(token.as_str())
            .send()
            .await
            .with_context(|| format!("error deleting {}", url))?;
        if http_resp.status().is_success() {
            Ok(())
        } else {
            Err(self.handle_error("DELETE", &url, http_resp).await)
        }
    }

    /// Get an access token.
    async fn token(&self) -> Result<String> {
        let token = self
            .authenticator
            .token(SCOPES)
            .await
            .context("could not get Google Cloud OAuth2 token")?;
        Ok(token.as_str().to_owned())
    }

    /// Decide whether an HTTP response is a result, or something to retry.
    async fn response_to_wait_status(
        &self,
        method: &str,
        url: &Url,
        idempotency: Idempotency,
        response_result: Result<reqwest::Response, reqwest::Error>,
    ) -> WaitStatus<reqwest::Response, ClientError> {
        match response_result {
            // The request never got an answer (DNS, connection reset, etc).
            Err(err) => {
                let temporary = idempotency == Idempotency::SafeToRetry
                    && (err.is_request() || err.is_timeout());
                let err: Error = err.into();
                let err: ClientError =
                    err.context(format!("could not {} {}", method, url)).into();
                if temporary {
                    WaitStatus::FailedTemporarily(err)
                } else {
                    WaitStatus::FailedPermanently(err)
                }
            }
            Ok(resp) if should_retry_status(idempotency, resp.status()) => {
                WaitStatus::FailedTemporarily(self.handle_error(method, url, resp).await)
            }
            Ok(resp) if resp.status().is_server_error() => {
                WaitStatus::FailedPermanently(self.handle_error(method, url, resp).await)
            }
            Ok(resp) => WaitStatus::Finished(resp),
        }
    }

    /// Decode a successful response, or turn a failed one into an error.
    async fn handle_response<Output>(
        &self,
        method: &str,
        url: &Url,
        http_resp: reqwest::Response,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
    {
        if http_resp.status().is_success() {
            let resp = http_resp.json::<Output>().await.with_context(|| {
                format!("error fetching JSON response from {}", url)
            })?;
            trace!("{} returned {:?}", method, resp);
            Ok(resp)
        } else {
            Err(self.handle_error(method, url, http_resp).await)
        }
    }

    /// Turn an HTTP error response into a `ClientError`.
    async fn handle_error(
        &self,
        method: &str,
        url: &Url,
        http_resp: reqwest::Response,
    ) -> ClientError {
        if http_resp.status() == StatusCode::NOT_FOUND {
            return ClientError::NotFound {
                method: method.to_owned(),
                url: url.to_owned(),
            };
        }

        // Check the content type before `bytes()` consumes the response.
        let should_parse_as_json = response_claims_to_be_json(&http_resp);
        let err_body = match http_resp
            .bytes()
            .await
            .with_context(|| format!("error fetching error response from {}", url))
        {
            Ok(err_body) => err_body,
            Err(err) => return err.into(),
        };

        if should_parse_as_json {
            if let Ok(resp) = serde_json::from_slice::<ErrorResponse>(&err_body) {
                trace!("{} error {:?}", method, resp);
                let err: Error = resp.error.into();
                return err.context(format!("{} error {}", method, url)).into();
            }
        }

        // Google occasionally sends HTML error pages, so report whatever we
        // got.
        let raw_err = String::from_utf8_lossy(&err_body);
        let err = format_err!("expected JSON describing error, but got {:?}", raw_err);
        err.context(format!("{} error {}", method, url)).into()
    }
}

/// Build a URL from `url` plus a query string serialized from `query`.
fn build_url<U, Query>(url: U, query: Query) -> Result<Url>
where
    U: IntoUrl,
    Query: fmt::Debug + Serialize,
{
    let mut url = url.into_url().context("could not parse URL")?;
    let query_str = serde_urlencoded::to_string(&query)?;
    if !query_str.is_empty() {
        url.set_query(Some(&query_str));
    }
    Ok(url)
}

/// A Google Cloud error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GCloudError,
}

/// Information about a Google Cloud error.
#[derive(Debug, Deserialize)]
pub(crate) struct GCloudError {
    pub(crate) code: i32,
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) errors: Vec<ErrorDetail>,
}

impl fmt::Display for GCloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Google Cloud error: {} {}", self.code, self.message)?;
        for detail in &self.errors {
            write!(f, " ({}: {})", detail.reason, detail.message)?;
        }
        Ok(())
    }
}

impl error::Error for GCloudError {}

/// Details about an individual Google Cloud error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorDetail {
    pub(crate) reason: String,
    pub(crate) message: String,
}

/// Percent-encode a string for use as a URL path component.
pub(crate) fn percent_encode(s: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(s, NON_ALPHANUMERIC)
}

/// Returns `true` if `http_resp` claims to be a JSON response.
fn response_claims_to_be_json(http_resp: &reqwest::Response) -> bool {
    let content_type = match http_resp.headers().get(CONTENT_TYPE) {
        Some(content_type) => content_type,
        None => return false,
    };
    let content_type_str = match content_type.to_str() {
        Ok(content_type_str) => content_type_str,
        Err(err) => {
            error!("Non-ASCII content type {:?}: {}", content_type, err);
            return false;
        }
    };
    let content_type_mime = match content_type_str.parse::<Mime>() {
        Ok(content_type_mime) => content_type_mime,
        Err(err) => {
            error!(
                "Could not parse content type {:?}: {}",
                content_type_str, err,
            );
            return false;
        }
    };
    content_type_mime.type_() == mime::APPLICATION
        && content_type_mime.subtype() == mime::JSON
}

#[test]
fn builds_urls_with_query_strings() {
    #[derive(Debug, Serialize)]
    struct Location {
        location: &'static str,
    }
    let url = build_url("https://example.com/jobs/a", Location { location: "US" }).unwrap();
    assert_eq!(url.as_str(), "https://example.com/jobs/a?location=US");
    let url = build_url("https://example.com/jobs/a", NoQuery).unwrap();
    assert_eq!(url.as_str(), "https://example.com/jobs/a");
}

#[test]
fn percent_encodes_path_components() {
    assert_eq!(percent_encode("my-proj:x/y").to_string(), "my%2Dproj%3Ax%2Fy");
}

#[test]
fn decodes_google_errors() {
    let body = r#"{"error": {"code": 404, "message": "Not found: Table p:d.t", "errors": [{"domain": "global", "reason": "notFound", "message": "Not found: Table p:d.t"}]}}"#;
    let resp = serde_json::from_str::<ErrorResponse>(body).unwrap();
    assert_eq!(resp.error.code, 404);
    assert_eq!(
        resp.error.to_string(),
        "Google Cloud error: 404 Not found: Table p:d.t (notFound: Not found: Table p:d.t)",
    );
}

#[test]
fn only_idempotent_requests_are_retried() {
    for status in [StatusCode::SERVICE_UNAVAILABLE, StatusCode::FORBIDDEN] {
        assert!(should_retry_status(Idempotency::SafeToRetry, status));
        assert!(!should_retry_status(Idempotency::UnsafeToRetry, status));
    }
    assert!(!should_retry_status(
        Idempotency::SafeToRetry,
        StatusCode::INTERNAL_SERVER_ERROR,
    ));
    assert!(!should_retry_status(Idempotency::SafeToRetry, StatusCode::NOT_FOUND));
}
