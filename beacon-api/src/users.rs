//! User endpoints

use crate::models::{User, UserUpdate};
use crate::transport::{ApiPath, RequestOptions, Transport};
use beacon_core::Result;

#[derive(Clone)]
pub struct UsersApi {
    transport: Transport,
}

impl UsersApi {
    pub(crate) fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn me(&self) -> Result<User> {
        Ok(self.transport.get::<User, _>("/v1/users/me").await?.data)
    }

    pub async fn update_me(&self, update: &UserUpdate) -> Result<User> {
        Ok(self
            .transport
            .patch::<User, _, _>("/v1/users/me", update)
            .await?
            .data)
    }

    pub async fn get(&self, id: &str) -> Result<User> {
        Ok(self
            .transport
            .get::<User, _>(ApiPath::new("/v1/users").segment(id))
            .await?
            .data)
    }

    /// Search users by name or email
    pub async fn search(&self, query: &str) -> Result<Vec<User>> {
        let response = self
            .transport
            .get_with::<Vec<User>, _>("/v1/users", RequestOptions::new().query("q", query))
            .await?;
        Ok(response.data)
    }
}
