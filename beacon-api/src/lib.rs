//! REST side of the beacon SDK
//!
//! A JSend-aware HTTP [`Transport`] and thin, stateless modules for the
//! platform's auth, users, system and apps endpoints. Nothing here retries
//! or caches: each call is one request, and failures surface as
//! [`beacon_core::Error::Api`] (server said no) or
//! [`beacon_core::Error::Http`] (request never completed).

mod apps;
mod auth;
mod client;
mod config;
pub mod models;
mod system;
mod transport;
mod users;

pub use apps::AppsApi;
pub use auth::AuthApi;
pub use client::ApiClient;
pub use config::{ApiConfig, APP_ID_HEADER, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use models::{
    App, AppUpdate, HealthStatus, NewApp, Session, SystemInfo, TokenExchange, User, UserUpdate,
};
pub use system::SystemApi;
pub use transport::{ApiPath, ApiResponse, RequestOptions, Transport};
pub use users::UsersApi;

pub use reqwest::Method;
