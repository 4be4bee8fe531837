//! Session guard: token gate for privileged calls and recovery from a
//! rejected session.
//!
//! Read paths stop with a [`Redirect`] the caller must follow. Write paths
//! never navigate on their own; they report the outcome as an
//! [`ActionResult`] and leave the navigation to the caller.

use serde::Serialize;
use std::fmt;
use std::future::Future;

use crate::routes::{DASHBOARD_ROUTE, LOGIN_ROUTE};
use crate::token::SessionTokens;
use crate::Error;

/// Shown when a failure carries no backend message.
pub const UNEXPECTED_ERROR: &str = "Unexpected error";

/// A navigation the caller must perform instead of continuing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Redirect {
    location: String,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// The login entry point.
    pub fn login() -> Self {
        Self::to(LOGIN_ROUTE)
    }

    /// The login entry point, marked as following an expired session.
    pub fn session_expired() -> Self {
        Self::to(format!("{LOGIN_ROUTE}?reason=expired"))
    }

    pub fn dashboard() -> Self {
        Self::to(DASHBOARD_ROUTE)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn into_location(self) -> String {
        self.location
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "redirect to {}", self.location)
    }
}

impl std::error::Error for Redirect {}

/// Why a guarded read did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Stop and navigate; the session is missing or was rejected
    #[error("{0}")]
    Redirect(Redirect),
    /// Any other failure, unchanged
    #[error(transparent)]
    Failed(#[from] Error),
}

impl From<Redirect> for GuardError {
    fn from(redirect: Redirect) -> Self {
        Self::Redirect(redirect)
    }
}

impl GuardError {
    pub const fn redirect(&self) -> Option<&Redirect> {
        match self {
            Self::Redirect(redirect) => Some(redirect),
            Self::Failed(_) => None,
        }
    }
}

/// Lifecycle of one privileged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Issued, no result yet
    Pending,
    /// The backend accepted the write; dependent views must be re-fetched
    Committed,
    /// The backend refused the write for a reason other than the session
    Failed,
    /// The session was rejected; the token is gone and login is required
    SessionExpired,
}

impl WriteState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome of a privileged operation as reported to the caller.
///
/// `redirect` is set exactly when the failure was a rejected session (401).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Routes whose data is stale after a successful write
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub revalidate: Vec<String>,
}

impl ActionResult<()> {
    pub const fn committed() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            redirect: None,
            revalidate: Vec::new(),
        }
    }
}

impl<T> ActionResult<T> {
    pub fn with_data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            redirect: None,
            revalidate: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            redirect: None,
            revalidate: Vec::new(),
        }
    }

    pub fn session_expired(error: impl Into<String>) -> Self {
        Self {
            redirect: Some(Redirect::login().into_location()),
            ..Self::failure(error)
        }
    }

    #[must_use]
    pub fn revalidating(mut self, routes: &[&str]) -> Self {
        self.revalidate = routes.iter().map(ToString::to_string).collect();
        self
    }

    pub fn state(&self) -> WriteState {
        match (self.success, &self.redirect) {
            (true, _) => WriteState::Committed,
            (false, Some(_)) => WriteState::SessionExpired,
            (false, None) => WriteState::Failed,
        }
    }
}

/// Enforces token presence and handles rejected sessions.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    tokens: SessionTokens,
}

impl SessionGuard {
    pub const fn new(tokens: SessionTokens) -> Self {
        Self { tokens }
    }

    pub const fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    /// The current token, or a redirect to the login entry point.
    ///
    /// # Errors
    /// Returns the login redirect when no token is stored.
    pub fn require_token(&self) -> Result<String, Redirect> {
        self.tokens.get().ok_or_else(Redirect::login)
    }

    /// Runs a privileged read. A 401 clears the session and turns into a
    /// redirect to the login page; other errors pass through unchanged.
    ///
    /// # Errors
    /// Returns [`GuardError::Redirect`] on a rejected session and
    /// [`GuardError::Failed`] for any other failure of `operation`.
    pub async fn with_auth_handling<T, F, Fut>(&self, operation: F) -> Result<T, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(err) if err.is_unauthorized() => {
                self.expire();
                Err(Redirect::session_expired().into())
            }
            Err(err) => Err(GuardError::Failed(err)),
        }
    }

    /// Turns a failed write into the result reported to the caller, clearing
    /// the session first when the backend rejected it.
    pub fn classify<T>(&self, error: &Error) -> ActionResult<T> {
        match error {
            Error::Api(err) if err.is_unauthorized() => {
                self.expire();
                ActionResult::session_expired(err.message.clone())
            }
            Error::Api(err) => ActionResult::failure(err.message.clone()),
            other => {
                tracing::debug!(error = %other, "write failed without a backend status");
                ActionResult::failure(UNEXPECTED_ERROR)
            }
        }
    }

    fn expire(&self) {
        tracing::warn!(context = ?self.tokens.context(), "backend rejected the session token");
        if let Err(err) = self.tokens.clear() {
            tracing::warn!(error = %err, "failed to clear the session token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{MemoryStore, TokenStore};
    use crate::{ApiError, ExecutionContext};
    use std::sync::Arc;

    fn guard_with(token: Option<&str>) -> (SessionGuard, Arc<MemoryStore>) {
        let store = Arc::new(token.map_or_else(MemoryStore::new, MemoryStore::with_token));
        let tokens = SessionTokens::new(ExecutionContext::Server).with_server_store(store.clone());
        (SessionGuard::new(tokens), store)
    }

    fn api(status: u16, message: &str) -> Error {
        Error::Api(ApiError {
            status,
            message: message.to_string(),
            body: Some(serde_json::json!({ "message": message })),
        })
    }

    #[test]
    fn require_token_redirects_without_a_token() {
        let (guard, _) = guard_with(None);
        assert_eq!(guard.require_token(), Err(Redirect::login()));

        let (guard, _) = guard_with(Some("abc"));
        assert_eq!(guard.require_token().as_deref(), Ok("abc"));
    }

    #[test]
    fn classify_unauthorized_clears_and_redirects() {
        let (guard, store) = guard_with(Some("abc"));
        let result: ActionResult = guard.classify(&api(401, "token expired"));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("token expired"));
        assert_eq!(result.redirect.as_deref(), Some("/login"));
        assert_eq!(result.state(), WriteState::SessionExpired);
        assert_eq!(store.get(), None);
    }

    #[test]
    fn classify_other_statuses_keep_the_session() {
        for status in [400, 403, 404, 500] {
            let (guard, store) = guard_with(Some("abc"));
            let result: ActionResult = guard.classify(&api(status, "nope"));
            assert_eq!(result.error.as_deref(), Some("nope"));
            assert_eq!(result.redirect, None);
            assert_eq!(result.state(), WriteState::Failed);
            assert_eq!(store.get().as_deref(), Some("abc"));
        }
    }

    #[test]
    fn classify_non_api_errors_use_generic_message() {
        let (guard, store) = guard_with(Some("abc"));
        let decode = serde_json::from_str::<u8>("x").unwrap_err();
        let result: ActionResult = guard.classify(&Error::Decode(decode));
        assert_eq!(result.error.as_deref(), Some(UNEXPECTED_ERROR));
        assert_eq!(result.redirect, None);
        assert_eq!(store.get().as_deref(), Some("abc"));
    }

    #[test]
    fn serialized_result_omits_absent_fields() {
        let json = serde_json::to_value(ActionResult::<()>::failure("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "boom"}));
        let json = serde_json::to_value(ActionResult::committed()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!WriteState::Pending.is_terminal());
        assert!(WriteState::Committed.is_terminal());
        assert!(WriteState::SessionExpired.is_terminal());
    }
}
