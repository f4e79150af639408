//! Application endpoints

use crate::models::{App, AppUpdate, NewApp};
use crate::transport::{ApiPath, Transport};
use beacon_core::Result;

#[derive(Clone)]
pub struct AppsApi {
    transport: Transport,
}

fn app_path(id: &str) -> ApiPath {
    ApiPath::new("/v1/apps").segment(id)
}

impl AppsApi {
    pub(crate) fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<Vec<App>> {
        Ok(self.transport.get::<Vec<App>, _>("/v1/apps").await?.data)
    }

    pub async fn get(&self, id: &str) -> Result<App> {
        Ok(self.transport.get::<App, _>(app_path(id)).await?.data)
    }

    pub async fn create(&self, app: &NewApp) -> Result<App> {
        Ok(self.transport.post::<App, _, _>("/v1/apps", app).await?.data)
    }

    pub async fn update(&self, id: &str, update: &AppUpdate) -> Result<App> {
        Ok(self
            .transport
            .put::<App, _, _>(app_path(id), update)
            .await?
            .data)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.transport
            .delete::<serde_json::Value, _>(app_path(id))
            .await?;
        Ok(())
    }
}
