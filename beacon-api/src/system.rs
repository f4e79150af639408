//! System endpoints

use crate::models::{HealthStatus, SystemInfo};
use crate::transport::{RequestOptions, Transport};
use beacon_core::{Result, SystemNotification};

#[derive(Clone)]
pub struct SystemApi {
    transport: Transport,
}

impl SystemApi {
    pub(crate) fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Liveness check; sent without credentials
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .transport
            .get_with::<HealthStatus, _>("/v1/system/health", RequestOptions::new().skip_auth())
            .await?;
        Ok(response.data)
    }

    pub async fn info(&self) -> Result<SystemInfo> {
        Ok(self.transport.get::<SystemInfo, _>("/v1/system/info").await?.data)
    }

    /// System announcements currently published for this user
    pub async fn notifications(&self) -> Result<Vec<SystemNotification>> {
        Ok(self
            .transport
            .get::<Vec<SystemNotification>, _>("/v1/system/notifications")
            .await?
            .data)
    }
}
