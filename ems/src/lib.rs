pub mod actions;
pub mod claims;
pub mod context;
mod http;
pub mod loaders;
pub mod routes;
pub mod session;
pub mod token;
pub mod types;

pub use crate::actions::Session;
pub use crate::context::{ClientSettings, Endpoints, ExecutionContext, Mode};
pub use crate::http::RequestOptions;
pub use crate::session::{ActionResult, GuardError, Redirect, SessionGuard, WriteState};
pub use crate::token::{SessionTokens, TokenError, TokenStore};

use crate::types::{
    AuthResponse, ConsumptionResponse, Device, DeviceCreateRequest, DeviceUpdateRequest,
    LoginRequest, RegisterRequest, User, UserCreateRequest, UserUpdateRequest,
};
use reqwest::{Client, Method};
use time::Date;

/// Message used when a failed response offers nothing better.
pub const GENERIC_FAILURE: &str = "Request failed with an error";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or protocol failure before a response was classified
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-2xx status
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A body could not be encoded, or a 2xx body had the wrong shape
    #[error("unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL for '{path}': {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    /// HTTP status of a classified backend failure.
    pub fn status(&self) -> Option<u16> {
        self.as_api().map(|err| err.status)
    }

    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the backend rejected the session token.
    pub fn is_unauthorized(&self) -> bool {
        self.as_api().is_some_and(ApiError::is_unauthorized)
    }
}

/// A non-2xx backend response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    /// Backend `message` field, else the status text, else [`GENERIC_FAILURE`]
    pub message: String,
    /// Parsed response body, kept for diagnostics
    pub body: Option<serde_json::Value>,
}

impl ApiError {
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Client for the dashboard backend, bound to one execution context.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct EmsClient {
    client: Client,
    settings: ClientSettings,
    context: ExecutionContext,
}

impl EmsClient {
    /// Creates a new `EmsClient` for code running in `context`.
    #[must_use]
    pub fn new(settings: ClientSettings, context: ExecutionContext) -> Self {
        Self {
            client: Client::new(),
            settings,
            context,
        }
    }

    /// Same client, same connection pool, different execution context.
    #[must_use]
    pub fn with_context(&self, context: ExecutionContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    pub const fn context(&self) -> ExecutionContext {
        self.context
    }

    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    async fn get<T>(&self, endpoint: &str, token: &str) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        self.request(endpoint, RequestOptions::new(Method::GET).with_token(token))
            .await
    }

    async fn send<T, B>(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
        B: serde::ser::Serialize,
    {
        let mut options = RequestOptions::new(method).with_json(body)?;
        if let Some(token) = token {
            options = options.with_token(token);
        }
        self.request(endpoint, options).await
    }

    async fn delete(&self, endpoint: &str, token: &str) -> Result<(), Error> {
        let _: serde_json::Value = self
            .request(endpoint, RequestOptions::new(Method::DELETE).with_token(token))
            .await?;
        Ok(())
    }

    /// Exchanges credentials for a session token.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or the backend rejects the credentials.
    pub async fn login(&self, payload: &LoginRequest) -> Result<AuthResponse, Error> {
        self.send(Method::POST, "/auth/login", None, payload).await
    }

    /// Creates an account and returns its first session token.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or the backend refuses the account.
    pub async fn register(&self, payload: &RegisterRequest) -> Result<AuthResponse, Error> {
        self.send(Method::POST, "/auth/register", None, payload).await
    }

    /// Retrieves the profile of the token's owner.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn me(&self, token: &str) -> Result<User, Error> {
        self.get("/user/me", token).await
    }

    /// Creates the profile of the token's owner.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn create_user(&self, token: &str, payload: &UserCreateRequest) -> Result<User, Error> {
        self.send(Method::POST, "/user/create", Some(token), payload)
            .await
    }

    /// Updates a profile.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn update_user(&self, token: &str, payload: &UserUpdateRequest) -> Result<User, Error> {
        self.send(Method::PUT, "/user/update", Some(token), payload)
            .await
    }

    /// Retrieves every profile (admin only).
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn get_all_users(&self, token: &str) -> Result<Vec<User>, Error> {
        self.get("/user/get_all", token).await
    }

    /// Registers a device.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn create_device(
        &self,
        token: &str,
        payload: &DeviceCreateRequest,
    ) -> Result<Device, Error> {
        self.send(Method::POST, "/device/create", Some(token), payload)
            .await
    }

    /// Retrieves all devices visible to the token's owner.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn read_devices(&self, token: &str) -> Result<Vec<Device>, Error> {
        self.get("/device/read/all", token).await
    }

    /// Retrieves one device.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn read_device(&self, token: &str, id: &str) -> Result<Device, Error> {
        self.get(&format!("/device/read/{id}"), token).await
    }

    /// Updates a device.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn update_device(
        &self,
        token: &str,
        payload: &DeviceUpdateRequest,
    ) -> Result<Device, Error> {
        self.send(Method::PUT, "/device/update", Some(token), payload)
            .await
    }

    /// Deletes one device.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn delete_device(&self, token: &str, id: &str) -> Result<(), Error> {
        self.delete(&format!("/device/delete/{id}"), token).await
    }

    /// Deletes every device visible to the token's owner.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn delete_all_devices(&self, token: &str) -> Result<(), Error> {
        self.delete("/device/delete/all", token).await
    }

    /// Retrieves the hourly consumption of a device on one day.
    ///
    /// # Arguments
    /// * `device_id` - The device to report on
    /// * `day` - Calendar day, sent as `YYYY-MM-DD`
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails or response cannot be parsed.
    pub async fn get_consumption(
        &self,
        token: &str,
        device_id: &str,
        day: Date,
    ) -> Result<ConsumptionResponse, Error> {
        let options = RequestOptions::new(Method::GET)
            .with_token(token)
            .with_query("device_id", device_id)
            .with_query("day", day.to_string());
        self.request("/monitor/consumption", options).await
    }
}
