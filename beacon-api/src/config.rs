//! HTTP transport configuration

use std::fmt;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent` header value
pub const DEFAULT_USER_AGENT: &str = concat!("beacon/", env!("CARGO_PKG_VERSION"));

/// Header carrying the application identifier
pub const APP_ID_HEADER: &str = "X-App-Id";

/// Configuration for the REST transport
///
/// # Examples
///
/// ```rust
/// use beacon_api::ApiConfig;
/// use std::time::Duration;
///
/// let config = ApiConfig::new("https://api.example.com")
///     .app_id("dashboard")
///     .token("secret")
///     .timeout(Duration::from_secs(5));
/// assert_eq!(config.app_id.as_deref(), Some("dashboard"));
/// ```
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub app_id: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
