//! Execution context and backend address resolution.
//!
//! Code that talks to the backend runs either inside the trusted server
//! process (next to the backend, on the internal network) or on the user's
//! side of the boundary. The context is passed in explicitly; nothing here
//! inspects the process environment.

/// Internal service address used from the trusted server context.
pub const DEFAULT_INTERNAL_BASE_URL: &str = "http://traefik";
/// Public address used from the client context.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost";

/// Where the calling code is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// Trusted server-side execution with access to request-scoped cookies.
    Server,
    /// Untrusted client-side execution with access to browser-readable cookies.
    Client,
}

impl ExecutionContext {
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

/// Deployment mode. Production disables the development URL override and
/// marks cookies `Secure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Backend addresses for both execution contexts.
///
/// Addresses are kept as given and parsed when a request is built, so a bad
/// address surfaces as an error on the call that uses it.
#[derive(Debug, Clone)]
pub struct Endpoints {
    internal: String,
    public: String,
    dev_override: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_INTERNAL_BASE_URL, DEFAULT_PUBLIC_BASE_URL)
    }
}

impl Endpoints {
    /// Creates endpoints from explicit internal and public addresses.
    pub fn new(internal: impl Into<String>, public: impl Into<String>) -> Self {
        Self {
            internal: internal.into(),
            public: public.into(),
            dev_override: None,
        }
    }

    /// Sets an address that replaces both others outside production.
    #[must_use]
    pub fn with_dev_override(mut self, base: impl Into<String>) -> Self {
        self.dev_override = Some(base.into());
        self
    }

    /// Picks the base URL for one call.
    pub fn resolve(&self, context: ExecutionContext, mode: Mode) -> &str {
        if !mode.is_production() {
            if let Some(base) = &self.dev_override {
                return base;
            }
        }
        match context {
            ExecutionContext::Server => &self.internal,
            ExecutionContext::Client => &self.public,
        }
    }
}

/// Everything the client needs to know about its deployment.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub endpoints: Endpoints,
    pub mode: Mode,
    pub cookie: crate::token::CookieSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new("http://backend.internal:8080", "https://energy.example.com")
    }

    #[test]
    fn server_context_uses_internal_address() {
        let endpoints = endpoints();
        let base = endpoints.resolve(ExecutionContext::Server, Mode::Development);
        assert_eq!(base, "http://backend.internal:8080");
    }

    #[test]
    fn client_context_uses_public_address() {
        let endpoints = endpoints();
        let base = endpoints.resolve(ExecutionContext::Client, Mode::Production);
        assert_eq!(base, "https://energy.example.com");
    }

    #[test]
    fn dev_override_replaces_both_outside_production() {
        let endpoints = endpoints().with_dev_override("http://127.0.0.1:9000");
        for context in [ExecutionContext::Server, ExecutionContext::Client] {
            let base = endpoints.resolve(context, Mode::Development);
            assert_eq!(base, "http://127.0.0.1:9000");
        }
        let base = endpoints.resolve(ExecutionContext::Server, Mode::Production);
        assert_eq!(base, "http://backend.internal:8080");
    }

    #[test]
    fn defaults_match_deployment_addresses() {
        let endpoints = Endpoints::default();
        let server = endpoints.resolve(ExecutionContext::Server, Mode::Development);
        let client = endpoints.resolve(ExecutionContext::Client, Mode::Development);
        assert_eq!(server, "http://traefik");
        assert_eq!(client, "http://localhost");
    }
}
