//! Privileged operations the dashboard performs on behalf of a user.
//!
//! Every write requires a token up front (a missing token is a redirect, not
//! a result) and reports backend failures through [`SessionGuard::classify`].

use std::future::Future;
use time::Date;

use crate::routes::{ADMIN_ROUTE, DASHBOARD_ROUTE};
use crate::session::{ActionResult, Redirect, SessionGuard};
use crate::token::SessionTokens;
use crate::types::{
    AuthResponse, ConsumptionResponse, DeviceCreateRequest, DeviceUpdateRequest, LoginRequest,
    RegisterRequest, UserUpdateRequest,
};
use crate::{EmsClient, Error};

const LOGIN_FAILED: &str = "Unable to login. Please try again.";
const REGISTER_FAILED: &str = "Unable to register. Please try again.";

const USER_VIEWS: &[&str] = &[DASHBOARD_ROUTE];
const ADMIN_VIEWS: &[&str] = &[ADMIN_ROUTE, DASHBOARD_ROUTE];

/// A client and the session it acts for, bound to one execution context.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) client: EmsClient,
    pub(crate) guard: SessionGuard,
}

impl Session {
    /// Binds `client` to the execution context of `tokens`.
    pub fn new(client: &EmsClient, tokens: SessionTokens) -> Self {
        Self {
            client: client.with_context(tokens.context()),
            guard: SessionGuard::new(tokens),
        }
    }

    pub const fn client(&self) -> &EmsClient {
        &self.client
    }

    pub const fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    /// Logs in and stores the issued token in every reachable store.
    pub async fn login(&self, payload: &LoginRequest) -> ActionResult {
        let result = self.client.login(payload).await;
        self.start_session(result, LOGIN_FAILED)
    }

    /// Registers an account and signs straight into it.
    pub async fn register(&self, payload: &RegisterRequest) -> ActionResult {
        let result = self.client.register(payload).await;
        self.start_session(result, REGISTER_FAILED)
    }

    fn start_session(&self, result: Result<AuthResponse, Error>, fallback: &str) -> ActionResult {
        match result {
            Ok(auth) => match self.guard.tokens().set(&auth.access_token) {
                Ok(()) => ActionResult::committed(),
                Err(err) => {
                    tracing::warn!(error = %err, "could not store the session token");
                    ActionResult::failure(fallback)
                }
            },
            // A refused login is not an expired session: no redirect.
            Err(Error::Api(err)) => ActionResult::failure(err.message),
            Err(err) => {
                tracing::debug!(error = %err, "authentication call failed");
                ActionResult::failure(fallback)
            }
        }
    }

    /// Forgets the token and sends the user to the login page.
    pub fn logout(&self) -> Redirect {
        if let Err(err) = self.guard.tokens().clear() {
            tracing::warn!(error = %err, "failed to clear the session token on logout");
        }
        Redirect::login()
    }

    async fn mutate<T, F, Fut>(&self, views: &[&str], operation: F) -> Result<ActionResult, Redirect>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let token = self.guard.require_token()?;
        match operation(token).await {
            Ok(_) => Ok(ActionResult::committed().revalidating(views)),
            Err(err) => Ok(self.guard.classify(&err)),
        }
    }

    /// Updates the signed-in user's profile.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn update_profile(&self, payload: &UserUpdateRequest) -> Result<ActionResult, Redirect> {
        self.mutate(USER_VIEWS, |token| async move {
            self.client.update_user(&token, payload).await
        })
        .await
    }

    /// Updates one of the signed-in user's devices.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn update_device(&self, payload: &DeviceUpdateRequest) -> Result<ActionResult, Redirect> {
        self.mutate(USER_VIEWS, |token| async move {
            self.client.update_device(&token, payload).await
        })
        .await
    }

    /// Deletes one of the signed-in user's devices.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn delete_device(&self, id: &str) -> Result<ActionResult, Redirect> {
        self.mutate(USER_VIEWS, |token| async move {
            self.client.delete_device(&token, id).await
        })
        .await
    }

    /// Updates any user's profile from the admin console.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn admin_update_user(&self, payload: &UserUpdateRequest) -> Result<ActionResult, Redirect> {
        self.mutate(ADMIN_VIEWS, |token| async move {
            self.client.update_user(&token, payload).await
        })
        .await
    }

    /// Creates a device for any user from the admin console.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn admin_create_device(
        &self,
        payload: &DeviceCreateRequest,
    ) -> Result<ActionResult, Redirect> {
        self.mutate(ADMIN_VIEWS, |token| async move {
            self.client.create_device(&token, payload).await
        })
        .await
    }

    /// Updates any device from the admin console.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn admin_update_device(
        &self,
        payload: &DeviceUpdateRequest,
    ) -> Result<ActionResult, Redirect> {
        self.mutate(ADMIN_VIEWS, |token| async move {
            self.client.update_device(&token, payload).await
        })
        .await
    }

    /// Deletes any device from the admin console.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn admin_delete_device(&self, id: &str) -> Result<ActionResult, Redirect> {
        self.mutate(ADMIN_VIEWS, |token| async move {
            self.client.delete_device(&token, id).await
        })
        .await
    }

    /// Deletes every device from the admin console.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn admin_delete_all_devices(&self) -> Result<ActionResult, Redirect> {
        self.mutate(ADMIN_VIEWS, |token| async move {
            self.client.delete_all_devices(&token).await
        })
        .await
    }

    /// Fetches a device's hourly consumption for the chart.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub async fn fetch_consumption(
        &self,
        device_id: &str,
        day: Date,
    ) -> Result<ActionResult<ConsumptionResponse>, Redirect> {
        let token = self.guard.require_token()?;
        let result = match self.client.get_consumption(&token, device_id, day).await {
            Ok(data) => ActionResult::with_data(data),
            Err(err) => self.guard.classify(&err),
        };
        Ok(result)
    }
}
