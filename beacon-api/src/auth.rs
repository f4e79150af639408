//! Session endpoints

use crate::models::{Session, TokenExchange};
use crate::transport::{RequestOptions, Transport};
use beacon_core::Result;
use reqwest::Method;
use serde_json::json;

#[derive(Clone)]
pub struct AuthApi {
    transport: Transport,
}

impl AuthApi {
    pub(crate) fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Current session for the bearer token
    pub async fn session(&self) -> Result<Session> {
        Ok(self.transport.get::<Session, _>("/v1/auth/session").await?.data)
    }

    pub async fn logout(&self) -> Result<()> {
        self.transport
            .send::<serde_json::Value, _>(
                Method::POST,
                "/v1/auth/logout",
                None,
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }

    /// Trade an identity-provider token for a platform token
    ///
    /// Sent without the stored bearer token. The returned token is not
    /// installed anywhere; pass it to `set_bearer_token` if wanted.
    pub async fn exchange_token(&self, token: &str) -> Result<TokenExchange> {
        let response = self
            .transport
            .post_with::<TokenExchange, _, _>(
                "/v1/auth/token",
                &json!({ "token": token }),
                RequestOptions::new().skip_auth(),
            )
            .await?;
        Ok(response.data)
    }
}
