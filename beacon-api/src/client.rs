//! Entry point for the REST side

use crate::apps::AppsApi;
use crate::auth::AuthApi;
use crate::config::ApiConfig;
use crate::system::SystemApi;
use crate::transport::Transport;
use crate::users::UsersApi;
use beacon_core::Result;

/// REST client grouping the endpoint modules over one transport
///
/// # Examples
///
/// ```rust,no_run
/// use beacon_api::{ApiClient, ApiConfig};
///
/// # async fn example() -> beacon_core::Result<()> {
/// let api = ApiClient::new(ApiConfig::new("https://api.example.com").app_id("dashboard"))?;
///
/// let exchanged = api.auth().exchange_token("idp-token").await?;
/// api.set_bearer_token(exchanged.access_token);
///
/// let me = api.users().me().await?;
/// println!("Signed in as {}", me.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        tracing::debug!(?config, "Creating API client");
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    /// Underlying transport, for endpoints without a dedicated module
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn set_bearer_token(&self, token: impl Into<String>) {
        self.transport.set_bearer_token(token);
    }

    pub fn clear_bearer_token(&self) {
        self.transport.clear_bearer_token();
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.transport.clone())
    }

    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.transport.clone())
    }

    pub fn system(&self) -> SystemApi {
        SystemApi::new(self.transport.clone())
    }

    pub fn apps(&self) -> AppsApi {
        AppsApi::new(self.transport.clone())
    }
}
