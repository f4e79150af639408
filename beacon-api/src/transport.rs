//! JSend HTTP transport
//!
//! Every REST call goes through [`Transport`]. It appends the escaped path
//! segments to the configured base URL (keeping its query), adds the
//! `X-App-Id` and `Authorization` headers and normalizes the response:
//!
//! - `{"status": "success", "data": ...}` yields `data`
//! - `{"status": "fail" | "error", ...}` becomes [`Error::Api`]
//! - any other non-2xx response becomes [`Error::Api`] with a code derived
//!   from the HTTP status
//! - any other 2xx JSON body is passed through unchanged, and an empty body
//!   reads as `null`

use crate::config::{ApiConfig, APP_ID_HEADER};
use beacon_core::{ApiError, Error, Result};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Normalized response: HTTP status plus decoded data
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
}

/// Request path relative to the base URL
///
/// Each segment is percent-encoded on its own, so identifiers containing
/// `/`, `?` or `#` stay inside their segment.
///
/// ```rust
/// use beacon_api::ApiPath;
///
/// let path = ApiPath::new("/v1/apps").segment("team/a");
/// assert_eq!(path.segments().collect::<Vec<_>>(), vec!["v1", "apps", "team/a"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath {
    segments: Vec<String>,
}

impl ApiPath {
    /// Split a literal path on `/`
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Append one segment verbatim
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl From<&str> for ApiPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ApiPath {
    fn from(path: String) -> Self {
        Self::new(&path)
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Do not send the bearer token
    pub skip_auth: bool,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// HTTP transport shared by the REST modules
///
/// Cloning is cheap; clones share the connection pool and the bearer token.
/// Every verb has a `*_with` variant taking [`RequestOptions`].
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    app_id: Option<Arc<str>>,
    token: Arc<RwLock<Option<String>>>,
}

impl Transport {
    /// Build a transport from its configuration
    ///
    /// # Errors
    ///
    /// `InvalidUrl` if the base URL does not parse or is not http(s), `Http`
    /// if the HTTP client cannot be created.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut base_url = Url::parse(config.base_url.trim())
            .map_err(|e| Error::InvalidUrl(format!("`{}`: {}", config.base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!(
                "`{}` is not an http(s) base URL",
                config.base_url
            )));
        }
        base_url.set_fragment(None);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            app_id: config.app_id.map(Arc::from),
            token: Arc::new(RwLock::new(config.token)),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Absolute URL for a path below the base URL
    pub fn url(&self, path: &ApiPath) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(path.segments());
        Ok(url)
    }

    /// Replace the bearer token sent with subsequent requests
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = Some(token.into());
    }

    /// Stop sending a bearer token
    pub fn clear_bearer_token(&self) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    fn bearer_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .filter(|t| !t.is_empty())
    }

    pub async fn get<T, P>(&self, path: P) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
    {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T, P>(
        &self,
        path: P,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
    {
        self.send(Method::GET, path, None, options).await
    }

    pub async fn post<T, P, B>(&self, path: P, body: &B) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        self.post_with(path, body, RequestOptions::default()).await
    }

    pub async fn post_with<T, P, B>(
        &self,
        path: P,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body), options).await
    }

    pub async fn put<T, P, B>(&self, path: P, body: &B) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        self.put_with(path, body, RequestOptions::default()).await
    }

    pub async fn put_with<T, P, B>(
        &self,
        path: P,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, Some(body), options).await
    }

    pub async fn patch<T, P, B>(&self, path: P, body: &B) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    pub async fn patch_with<T, P, B>(
        &self,
        path: P,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, Some(body), options).await
    }

    pub async fn delete<T, P>(&self, path: P) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
    {
        self.delete_with(path, RequestOptions::default()).await
    }

    pub async fn delete_with<T, P>(
        &self,
        path: P,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
    {
        self.send(Method::DELETE, path, None, options).await
    }

    /// Perform a request with an explicit method, body and options
    pub async fn send<T, P>(
        &self,
        method: Method,
        path: P,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: Into<ApiPath>,
    {
        let (status, data) = self.execute(method, path.into(), body, options).await?;
        Ok(ApiResponse {
            status,
            data: serde_json::from_value(data)?,
        })
    }

    #[tracing::instrument(
        skip(self, body, options),
        fields(method = %method, path = %path, status = tracing::field::Empty)
    )]
    async fn execute(
        &self,
        method: Method,
        path: ApiPath,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<(u16, Value)> {
        let url = self.url(&path)?;
        let mut request = self.http.request(method, url);

        if let Some(ref app_id) = self.app_id {
            request = request.header(APP_ID_HEADER, app_id.as_ref());
        }
        if !options.skip_auth {
            if let Some(token) = self.bearer_token() {
                request = request.bearer_auth(token);
            }
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Request failed");
            Error::Http(e.to_string())
        })?;

        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let data = normalize(status, &text)?;
        tracing::debug!("Request succeeded");
        Ok((status.as_u16(), data))
    }
}

/// Turn a raw response into its data or a typed error
fn normalize(status: StatusCode, text: &str) -> Result<Value> {
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(text) {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => Value::String(text.to_string()),
        }
    };

    match body.get("status").and_then(Value::as_str) {
        Some("success") => {
            if status.is_success() {
                Ok(body.get("data").cloned().unwrap_or(Value::Null))
            } else {
                Err(status_error(status, body))
            }
        }
        Some(kind @ ("fail" | "error")) => {
            let code = code_of(&body).unwrap_or_else(|| kind.to_string());
            let message = message_of(&body).unwrap_or_else(|| default_message(status));
            tracing::warn!(status = status.as_u16(), code = %code, "API returned {}", kind);
            Err(ApiError::new(status.as_u16(), code, message)
                .with_payload(body)
                .into())
        }
        _ if status.is_success() => Ok(body),
        _ => Err(status_error(status, body)),
    }
}

fn status_error(status: StatusCode, body: Value) -> Error {
    let code = code_of(&body).unwrap_or_else(|| status_code_name(status));
    let message = message_of(&body).unwrap_or_else(|| default_message(status));
    tracing::warn!(status = status.as_u16(), code = %code, "HTTP error response");
    ApiError::new(status.as_u16(), code, message)
        .with_payload(body)
        .into()
}

fn code_of(body: &Value) -> Option<String> {
    match body.get("code")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("data").and_then(|d| d.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| body.as_str().map(str::to_string))
}

fn status_code_name(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason
            .to_ascii_lowercase()
            .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        None => format!("http_{}", status.as_u16()),
    }
}

fn default_message(status: StatusCode) -> String {
    format!("Request failed with status {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_error(result: Result<Value>) -> ApiError {
        match result {
            Err(Error::Api(e)) => e,
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_success_envelope_unwrapped() {
        let data = normalize(StatusCode::OK, r#"{"status":"success","data":{"id":1}}"#).unwrap();
        assert_eq!(data, json!({"id": 1}));
    }

    #[test]
    fn test_success_without_data_is_null() {
        let data = normalize(StatusCode::OK, r#"{"status":"success"}"#).unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_plain_json_passed_through() {
        let data = normalize(StatusCode::OK, r#"{"ok":true}"#).unwrap();
        assert_eq!(data, json!({"ok": true}));
    }

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(normalize(StatusCode::NO_CONTENT, "").unwrap(), Value::Null);
    }

    #[test]
    fn test_fail_envelope() {
        let error = api_error(normalize(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"status":"fail","data":{"message":"Name is required","name":"required"}}"#,
        ));
        assert_eq!(error.status, 422);
        assert_eq!(error.code, "fail");
        assert_eq!(error.message, "Name is required");
        assert_eq!(error.payload["data"]["name"], "required");
    }

    #[test]
    fn test_error_envelope_on_2xx_still_fails() {
        let error = api_error(normalize(
            StatusCode::OK,
            r#"{"status":"error","message":"Database down","code":503}"#,
        ));
        assert_eq!(error.status, 200);
        assert_eq!(error.code, "503");
        assert_eq!(error.message, "Database down");
    }

    #[test]
    fn test_non_jsend_error_status() {
        let error = api_error(normalize(StatusCode::NOT_FOUND, r#"{"detail":"nope"}"#));
        assert_eq!(error.code, "not_found");
        assert!(error.is_not_found());
        assert_eq!(error.payload["detail"], "nope");
    }

    #[test]
    fn test_non_json_error_body_kept_as_text() {
        let error = api_error(normalize(StatusCode::BAD_GATEWAY, "upstream timeout"));
        assert_eq!(error.code, "bad_gateway");
        assert_eq!(error.message, "upstream timeout");
        assert_eq!(error.payload, json!("upstream timeout"));
    }

    #[test]
    fn test_invalid_json_on_success_is_serialization_error() {
        assert!(matches!(
            normalize(StatusCode::OK, "{broken"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = Transport::new(ApiConfig::new("ftp://example.com"));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert!(matches!(
            Transport::new(ApiConfig::new("not a url")),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_url_escapes_segments_and_keeps_prefix() {
        let transport = Transport::new(ApiConfig::new("http://localhost:8080/api/")).unwrap();

        let url = transport
            .url(&ApiPath::new("/v1/users").segment("a/b?c"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/users/a%2Fb%3Fc");
    }

    #[test]
    fn test_url_keeps_base_query() {
        let transport =
            Transport::new(ApiConfig::new("https://api.example.com/?tenant=a")).unwrap();

        let url = transport.url(&ApiPath::new("/v1/apps")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/apps?tenant=a");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let transport = Transport::new(ApiConfig::new("http://localhost:8080/")).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_empty_token_not_sent() {
        let transport = Transport::new(ApiConfig::new("http://localhost").token("")).unwrap();
        assert!(transport.bearer_token().is_none());

        transport.set_bearer_token("abc");
        assert_eq!(transport.bearer_token().as_deref(), Some("abc"));

        transport.clear_bearer_token();
        assert!(transport.bearer_token().is_none());
    }
}
