//! Token storage on both sides of the server/client boundary.
//!
//! The session token lives in a cookie. Trusted server code sees it through
//! the cookies of the request being handled ([`RequestCookies`]); client code
//! sees the browser-readable copy ([`BrowserCookies`]). [`SessionTokens`]
//! presents both as one logical value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use time::OffsetDateTime;

use crate::context::{ExecutionContext, Mode};

/// Name of the cookie carrying the session token.
pub const AUTH_COOKIE_NAME: &str = "auth_token";

const ONE_DAY_SECONDS: i64 = 60 * 60 * 24;

/// Default retention of a stored token.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = ONE_DAY_SECONDS * 7;

/// Errors that can occur while persisting a token
#[derive(Debug, Error)]
pub enum TokenError {
    /// I/O error while writing or removing the cookie file
    #[error("token storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cookie record could not be serialized
    #[error("token storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    /// Lifetime in seconds
    pub max_age: i64,
    /// Only send over HTTPS
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: AUTH_COOKIE_NAME.to_string(),
            max_age: DEFAULT_MAX_AGE_SECONDS,
            secure: false,
        }
    }
}

impl CookieSettings {
    /// Default cookie for the given mode; `Secure` is set only in production.
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            secure: mode.is_production(),
            ..Self::default()
        }
    }

    /// Renders a `Set-Cookie` value storing `token`. Not `HttpOnly`; client
    /// code reads it.
    pub fn set_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            self.name,
            urlencoding::encode(token),
            self.max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Renders a `Set-Cookie` value that deletes the cookie.
    pub fn expired_cookie(&self) -> String {
        format!("{}=; Path=/; Max-Age=0; SameSite=Lax", self.name)
    }

    /// Finds this cookie in a raw `Cookie` request header.
    pub fn find_in_header(&self, header: &str) -> Option<String> {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name != self.name || value.is_empty() {
                return None;
            }
            let decoded = urlencoding::decode(value)
                .map_or_else(|_| value.to_string(), |decoded| decoded.into_owned());
            Some(decoded)
        })
    }
}

/// A place a session token can be kept.
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, if any. Never mutates the store.
    fn get(&self) -> Option<String>;

    /// Stores `token`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn set(&self, token: &str) -> Result<(), TokenError>;

    /// Removes the token. Clearing an empty store is a no-op.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn clear(&self) -> Result<(), TokenError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    token: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryStore {
    fn get(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    fn set(&self, token: &str) -> Result<(), TokenError> {
        *lock(&self.token) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenError> {
        *lock(&self.token) = None;
        Ok(())
    }
}

// =============================================================================
// SERVER SIDE - cookies of the request being handled
// =============================================================================

#[derive(Debug, Default)]
struct RequestCookieState {
    token: Option<String>,
    outgoing: Vec<String>,
}

/// Request-scoped cookie jar available to trusted server code.
///
/// Built from the `Cookie` header of one incoming request. Writes update the
/// value seen by later reads in the same request and queue `Set-Cookie`
/// headers for the response.
#[derive(Debug)]
pub struct RequestCookies {
    settings: CookieSettings,
    state: Mutex<RequestCookieState>,
}

impl RequestCookies {
    /// An empty jar, as for a request that carried no cookies.
    pub fn new(settings: CookieSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(RequestCookieState::default()),
        }
    }

    /// A jar holding whatever session cookie the request header carried.
    pub fn from_cookie_header(header: &str, settings: CookieSettings) -> Self {
        let token = settings.find_in_header(header);
        Self {
            settings,
            state: Mutex::new(RequestCookieState {
                token,
                outgoing: Vec::new(),
            }),
        }
    }

    /// `Set-Cookie` values queued so far, oldest first.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        lock(&self.state).outgoing.clone()
    }

    /// Drains the queued `Set-Cookie` values for writing into a response.
    pub fn take_set_cookie_headers(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.state).outgoing)
    }
}

impl TokenStore for RequestCookies {
    fn get(&self) -> Option<String> {
        lock(&self.state).token.clone()
    }

    fn set(&self, token: &str) -> Result<(), TokenError> {
        let mut state = lock(&self.state);
        state.token = Some(token.to_string());
        state.outgoing.push(self.settings.set_cookie(token));
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenError> {
        let mut state = lock(&self.state);
        // A second clear in the same request queues nothing new.
        if state.token.take().is_some() || state.outgoing.is_empty() {
            state.outgoing.push(self.settings.expired_cookie());
        }
        Ok(())
    }
}

// =============================================================================
// CLIENT SIDE - browser-readable cookie persisted to disk
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    /// Unix timestamp after which the cookie is gone
    expires_at: i64,
}

/// Browser-readable cookie jar, kept in a file so the token survives restarts
/// until its `Max-Age` runs out.
#[derive(Debug, Clone)]
pub struct BrowserCookies {
    path: PathBuf,
    settings: CookieSettings,
}

impl BrowserCookies {
    /// Cookie file in the platform config directory.
    pub fn new(settings: CookieSettings) -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ems");
        Self::with_path(dir.join("cookies.json"), settings)
    }

    /// Cookie file at a custom path.
    pub fn with_path(path: impl Into<PathBuf>, settings: CookieSettings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<StoredCookie> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable cookie file");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(cookie) => Some(cookie),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt cookie file");
                None
            }
        }
    }
}

impl TokenStore for BrowserCookies {
    fn get(&self) -> Option<String> {
        let cookie = self.read()?;
        if cookie.name != self.settings.name || cookie.value.is_empty() {
            return None;
        }
        if cookie.expires_at <= OffsetDateTime::now_utc().unix_timestamp() {
            return None;
        }
        Some(cookie.value)
    }

    fn set(&self, token: &str) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let cookie = StoredCookie {
            name: self.settings.name.clone(),
            value: token.to_string(),
            expires_at: OffsetDateTime::now_utc().unix_timestamp() + self.settings.max_age,
        };
        let content = serde_json::to_string_pretty(&cookie)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // `mode` only applies on creation; tighten files left by older versions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(content.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// LOGICAL TOKEN - one value over both stores
// =============================================================================

/// The session token as one value over the server and client stores.
///
/// Reads come from the store of the current execution context. Writes and
/// clears go to every store that is attached, so a token issued on the
/// server is visible to client code in the same user action.
#[derive(Clone)]
pub struct SessionTokens {
    context: ExecutionContext,
    server: Option<Arc<dyn TokenStore>>,
    client: Option<Arc<dyn TokenStore>>,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("context", &self.context)
            .field("server", &self.server.is_some())
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl SessionTokens {
    /// No stores attached yet.
    pub const fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            server: None,
            client: None,
        }
    }

    #[must_use]
    pub fn with_server_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.server = Some(store);
        self
    }

    #[must_use]
    pub fn with_client_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.client = Some(store);
        self
    }

    pub const fn context(&self) -> ExecutionContext {
        self.context
    }

    fn current(&self) -> Option<&Arc<dyn TokenStore>> {
        match self.context {
            ExecutionContext::Server => self.server.as_ref(),
            ExecutionContext::Client => self.client.as_ref(),
        }
    }

    fn reachable(&self) -> impl Iterator<Item = &Arc<dyn TokenStore>> {
        self.server.iter().chain(self.client.iter())
    }

    /// Token visible in the current execution context.
    pub fn get(&self) -> Option<String> {
        self.current().and_then(|store| store.get())
    }

    /// Writes `token` to every attached store.
    ///
    /// If any store rejects the write, every store is cleared again so the
    /// two never disagree.
    ///
    /// # Errors
    /// Returns the first store error encountered.
    pub fn set(&self, token: &str) -> Result<(), TokenError> {
        let mut first_error = None;
        for store in self.reachable() {
            if let Err(err) = store.set(token) {
                first_error.get_or_insert(err);
            }
        }

        let Some(err) = first_error else {
            tracing::debug!(context = ?self.context, "session token stored");
            return Ok(());
        };

        tracing::warn!(context = ?self.context, error = %err, "session token write failed, clearing stores");
        if let Err(clear_err) = self.clear() {
            tracing::warn!(error = %clear_err, "could not clear session token after failed write");
        }
        Err(err)
    }

    /// Removes the token from every attached store.
    ///
    /// All stores are attempted even if one fails.
    ///
    /// # Errors
    /// Returns the first store error encountered.
    pub fn clear(&self) -> Result<(), TokenError> {
        let mut first_error = None;
        for store in self.reachable() {
            if let Err(err) = store.clear() {
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(context = ?self.context, "session token cleared");
        first_error.map_or(Ok(()), Err)
    }
}
