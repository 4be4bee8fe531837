//! Data loaders for the dashboard and admin pages.
//!
//! Loaders are read paths: a missing or rejected session ends the load with a
//! [`Redirect`](crate::Redirect) inside [`GuardError`].

use time::{Date, OffsetDateTime};

use crate::actions::Session;
use crate::claims;
use crate::session::{GuardError, Redirect};
use crate::types::{ConsumptionResponse, Device, User};

/// Everything the dashboard page shows.
#[derive(Debug, Clone)]
pub struct DashboardData {
    /// Short label for the signed-in user
    pub label: String,
    pub is_admin: bool,
    pub user: User,
    /// Devices owned by the signed-in user
    pub devices: Vec<Device>,
    /// Day the consumption chart covers
    pub day: Date,
    /// Consumption of the first device, if it could be loaded
    pub consumption: Option<ConsumptionResponse>,
}

/// Everything the admin console shows.
#[derive(Debug, Clone)]
pub struct AdminData {
    pub label: String,
    pub users: Vec<User>,
    pub devices: Vec<Device>,
}

impl Session {
    /// Loads the dashboard for today.
    ///
    /// # Errors
    /// Returns a redirect when the session is missing or rejected, and any
    /// other failure of the profile or device calls.
    pub async fn dashboard(&self) -> Result<DashboardData, GuardError> {
        self.dashboard_for(OffsetDateTime::now_utc().date()).await
    }

    /// Loads the dashboard with the consumption chart on `day`.
    ///
    /// # Errors
    /// Returns a redirect when the session is missing or rejected, and any
    /// other failure of the profile or device calls.
    pub async fn dashboard_for(&self, day: Date) -> Result<DashboardData, GuardError> {
        let token = self.guard.require_token()?;
        let (client, token) = (&self.client, token.as_str());
        let claims = claims::decode(Some(token));
        let is_admin = claims::has_admin_role(claims.as_ref());

        let (user, mut devices) = self
            .guard
            .with_auth_handling(|| async move {
                futures::try_join!(client.me(token), client.read_devices(token))
            })
            .await?;

        // Admins can read every device; the dashboard only shows their own.
        if is_admin {
            devices.retain(|device| device.user_id == user.id);
        }

        let consumption = match devices.first() {
            Some(device) => {
                let fetched = self
                    .guard
                    .with_auth_handling(|| client.get_consumption(token, &device.id, day))
                    .await;
                match fetched {
                    Ok(consumption) => Some(consumption),
                    Err(GuardError::Redirect(redirect)) => return Err(redirect.into()),
                    Err(GuardError::Failed(err)) => {
                        tracing::debug!(device = %device.id, error = %err, "no consumption for chart");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(DashboardData {
            label: claims::display_label(claims.as_ref(), "User"),
            is_admin,
            user,
            devices,
            day,
            consumption,
        })
    }

    /// Loads the admin console. Non-admins are sent to the dashboard.
    ///
    /// # Errors
    /// Returns a redirect when the session is missing, rejected or not an
    /// admin session, and any other failure of the user or device calls.
    pub async fn admin_console(&self) -> Result<AdminData, GuardError> {
        let token = self.guard.require_token()?;
        let (client, token) = (&self.client, token.as_str());
        let claims = claims::decode(Some(token));
        if !claims::has_admin_role(claims.as_ref()) {
            return Err(Redirect::dashboard().into());
        }

        let (users, devices) = self
            .guard
            .with_auth_handling(|| async move {
                futures::try_join!(client.get_all_users(token), client.read_devices(token))
            })
            .await?;

        Ok(AdminData {
            label: claims::display_label(claims.as_ref(), "Admin"),
            users,
            devices,
        })
    }
}
