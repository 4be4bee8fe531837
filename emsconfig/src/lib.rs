#![allow(clippy::multiple_crate_versions)]

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use ems::token::CookieSettings;
use ems::{ClientSettings, Endpoints, Mode};
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::Command;

pub const APP_NAME: &str = "ems";

/// Replaces the backend address for both contexts outside production.
pub const DEV_BASE_URL_ENV: &str = "API_BASE_URL_DEV";
/// Overrides `mode` (`production` or `development`).
pub const MODE_ENV: &str = "EMS_MODE";

/// Where a secret comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Literal(String),
    Env { env: String },
    Cmd { cmd: String },
}

impl Default for Secret {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_internal_base_url")]
    pub internal_base_url: String,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub dev_base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            internal_base_url: default_internal_base_url(),
            public_base_url: default_public_base_url(),
            dev_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmsConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub cookie: CookieConfig,
    pub username: Option<String>,
    #[serde(default)]
    pub password: Secret,
}

fn default_internal_base_url() -> String {
    ems::context::DEFAULT_INTERNAL_BASE_URL.to_string()
}

fn default_public_base_url() -> String {
    ems::context::DEFAULT_PUBLIC_BASE_URL.to_string()
}

fn default_cookie_name() -> String {
    ems::token::AUTH_COOKIE_NAME.to_string()
}

const fn default_max_age_days() -> u32 {
    7
}

#[derive(Debug, thiserror::Error)]
pub enum EmsConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid {var} value '{value}'; expected 'production' or 'development'")]
    InvalidMode { var: &'static str, value: String },
    #[error("missing {field}; set `{field}` in the ems config file")]
    Missing { field: &'static str },
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
    #[error("secret command failed: {cmd}: {message}")]
    CommandFailed { cmd: String, message: String },
    #[error("failed to execute secret command '{cmd}': {source}")]
    CommandExec { cmd: String, source: io::Error },
    #[error("secret command returned empty output: {cmd}")]
    CommandEmpty { cmd: String },
    #[error(
        "{field} required but stdin is not interactive; set `{field}` in {path} (example: password = {{ env = \"EMS_PASSWORD\" }})",
        path = .path.display()
    )]
    NonInteractive { field: &'static str, path: PathBuf },
    #[error("{field} entry cancelled")]
    Cancelled { field: &'static str },
}

pub type Result<T> = std::result::Result<T, EmsConfigError>;

impl EmsConfig {
    /// Loads the config file from the standard OS location and applies
    /// environment overrides.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized, or
    /// if an override carries an unknown mode.
    pub fn load() -> Result<Self> {
        let config: Self = confy::load(APP_NAME, None)?;
        config.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    /// Path of the config file, for messages.
    ///
    /// # Errors
    /// Returns an error if the platform config directory cannot be determined.
    pub fn path() -> Result<PathBuf> {
        Ok(confy::get_configuration_file_path(APP_NAME, None)?)
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(base) = lookup(DEV_BASE_URL_ENV).filter(|base| !base.trim().is_empty()) {
            self.api.dev_base_url = Some(base.trim().to_string());
        }
        if let Some(value) = lookup(MODE_ENV) {
            self.mode = parse_mode(&value).ok_or(EmsConfigError::InvalidMode {
                var: MODE_ENV,
                value,
            })?;
        }
        Ok(self)
    }

    /// Builds the client settings described by this config.
    pub fn client_settings(&self) -> ClientSettings {
        let mut endpoints = Endpoints::new(&self.api.internal_base_url, &self.api.public_base_url);
        if let Some(base) = &self.api.dev_base_url {
            endpoints = endpoints.with_dev_override(base);
        }
        ClientSettings {
            endpoints,
            mode: self.mode,
            cookie: CookieSettings {
                name: self.cookie.name.clone(),
                max_age: i64::from(self.cookie.max_age_days) * 24 * 60 * 60,
                secure: self.mode.is_production(),
            },
        }
    }

    /// The login name: `explicit`, else the configured default, else a prompt.
    ///
    /// # Errors
    /// Returns an error if no name is configured and stdin is not interactive.
    pub fn username(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit.or(self.username.as_deref()) {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
        prompt("username", "Username: ")
    }

    /// Resolves the password from the configured source, prompting when
    /// none is configured.
    ///
    /// # Errors
    /// Returns an error if the source cannot be resolved, or if nothing is
    /// configured and stdin is not interactive.
    pub fn password(&self) -> Result<String> {
        match &self.password {
            Secret::Literal(value) if value.trim().is_empty() => {
                prompt_hidden("password", "Password: ")
            }
            secret => secret.resolve("password"),
        }
    }
}

fn parse_mode(value: &str) -> Option<Mode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "production" | "prod" => Some(Mode::Production),
        "development" | "dev" => Some(Mode::Development),
        _ => None,
    }
}

fn require_terminal(field: &'static str) -> Result<()> {
    if io::stdin().is_terminal() {
        return Ok(());
    }
    Err(EmsConfigError::NonInteractive {
        field,
        path: EmsConfig::path()?,
    })
}

fn non_empty(field: &'static str, input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EmsConfigError::Missing { field });
    }
    Ok(trimmed.to_string())
}

fn prompt(field: &'static str, label: &str) -> Result<String> {
    require_terminal(field)?;

    eprint!("{label}");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    non_empty(field, &input)
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Submit,
    Cancel,
}

/// Applies one key press to a hidden input buffer.
fn apply_key(input: &mut String, key: KeyEvent) -> KeyOutcome {
    if key.kind != KeyEventKind::Press {
        return KeyOutcome::Continue;
    }
    match key.code {
        KeyCode::Enter => KeyOutcome::Submit,
        KeyCode::Esc => KeyOutcome::Cancel,
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyOutcome::Cancel
        }
        KeyCode::Backspace => {
            input.pop();
            KeyOutcome::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            input.push(c);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

/// Leaves raw mode when dropped, including on early return.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Like [`prompt`] but the typed characters are not echoed.
fn prompt_hidden(field: &'static str, label: &str) -> Result<String> {
    require_terminal(field)?;

    eprint!("{label}");
    io::stderr().flush()?;

    let mut input = String::new();
    let outcome = {
        let _raw = RawMode::enable()?;
        loop {
            if let Event::Key(key) = event::read()? {
                match apply_key(&mut input, key) {
                    KeyOutcome::Continue => {}
                    outcome => break outcome,
                }
            }
        }
    };
    eprintln!();

    match outcome {
        KeyOutcome::Cancel => Err(EmsConfigError::Cancelled { field }),
        _ => non_empty(field, &input),
    }
}

impl Secret {
    fn resolve(&self, field: &'static str) -> Result<String> {
        match self {
            Self::Literal(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(EmsConfigError::Missing { field });
                }
                Ok(trimmed.to_string())
            }
            Self::Env { env } => {
                let value = std::env::var(env)
                    .map_err(|_| EmsConfigError::MissingEnv { env: env.clone() })?;
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(EmsConfigError::Missing { field });
                }
                Ok(trimmed.to_string())
            }
            Self::Cmd { cmd } => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .map_err(|e| EmsConfigError::CommandExec {
                        cmd: cmd.clone(),
                        source: e,
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(EmsConfigError::CommandFailed {
                        cmd: cmd.clone(),
                        message: stderr.trim().to_string(),
                    });
                }

                let stdout = String::from_utf8_lossy(&output.stdout);
                let trimmed = stdout.trim();
                if trimmed.is_empty() {
                    return Err(EmsConfigError::CommandEmpty { cmd: cmd.clone() });
                }
                Ok(trimmed.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        apply_key, EmsConfig, EmsConfigError, KeyOutcome, Secret, DEV_BASE_URL_ENV, MODE_ENV,
    };
    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
    use ems::{ExecutionContext, Mode};
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn resolves_literal_secret() {
        let secret = Secret::Literal(" literal ".to_string());
        assert_eq!(secret.resolve("password").unwrap(), "literal");
    }

    #[test]
    fn resolves_env_secret() {
        let var = format!("EMSCONFIG_TEST_PASSWORD_{}", std::process::id());
        std::env::set_var(&var, "envvalue");
        let secret = Secret::Env { env: var.clone() };
        assert_eq!(secret.resolve("password").unwrap(), "envvalue");
        std::env::remove_var(&var);
    }

    #[test]
    fn missing_env_secret_is_error() {
        let secret = Secret::Env {
            env: "EMSCONFIG_TEST_SURELY_UNSET".to_string(),
        };
        let err = secret.resolve("password").unwrap_err();
        assert!(matches!(err, EmsConfigError::MissingEnv { .. }));
    }

    #[test]
    fn resolves_cmd_secret() {
        let secret = Secret::Cmd {
            cmd: "printf 'cmdvalue'".to_string(),
        };
        assert_eq!(secret.resolve("password").unwrap(), "cmdvalue");
    }

    #[test]
    fn cmd_empty_output_is_error() {
        let secret = Secret::Cmd {
            cmd: "printf ''".to_string(),
        };
        let err = secret.resolve("password").unwrap_err();
        assert!(matches!(err, EmsConfigError::CommandEmpty { .. }));
    }

    #[test]
    fn parses_file_with_defaults() {
        let config: EmsConfig = serde_json::from_str(
            r#"{"username": "alice", "password": {"cmd": "pass ems"}, "mode": "production"}"#,
        )
        .unwrap();
        assert_eq!(config.api.internal_base_url, "http://traefik");
        assert_eq!(config.api.public_base_url, "http://localhost");
        assert_eq!(config.cookie.name, "auth_token");
        assert_eq!(config.cookie.max_age_days, 7);
        assert_eq!(config.mode, Mode::Production);
        assert!(matches!(config.password, Secret::Cmd { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let config = EmsConfig::default()
            .with_env_overrides(overrides(&[
                (DEV_BASE_URL_ENV, "http://localhost:8000"),
                (MODE_ENV, "Production"),
            ]))
            .unwrap();
        assert_eq!(config.api.dev_base_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.mode, Mode::Production);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = EmsConfig::default()
            .with_env_overrides(overrides(&[(MODE_ENV, "staging")]))
            .unwrap_err();
        assert!(matches!(err, EmsConfigError::InvalidMode { .. }));
    }

    #[test]
    fn client_settings_follow_config() {
        let mut config = EmsConfig::default();
        config.api.dev_base_url = Some("http://localhost:8000".to_string());
        config.cookie.max_age_days = 1;

        let settings = config.client_settings();
        assert_eq!(settings.cookie.max_age, 86_400);
        assert!(!settings.cookie.secure);
        assert_eq!(
            settings.endpoints.resolve(ExecutionContext::Server, settings.mode),
            "http://localhost:8000"
        );

        config.mode = Mode::Production;
        let settings = config.client_settings();
        assert!(settings.cookie.secure);
        assert_eq!(
            settings.endpoints.resolve(ExecutionContext::Server, settings.mode),
            "http://traefik"
        );
    }

    #[test]
    fn explicit_username_wins() {
        let config = EmsConfig {
            username: Some("alice".to_string()),
            ..EmsConfig::default()
        };
        assert_eq!(config.username(Some(" bob ")).unwrap(), "bob");
        assert_eq!(config.username(None).unwrap(), "alice");
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn hidden_input_collects_and_edits_characters() {
        let mut input = String::new();
        for c in "hunter22".chars() {
            assert_eq!(apply_key(&mut input, press(KeyCode::Char(c))), KeyOutcome::Continue);
        }
        apply_key(&mut input, press(KeyCode::Backspace));
        assert_eq!(
            apply_key(&mut input, KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            KeyOutcome::Continue
        );
        assert_eq!(apply_key(&mut input, press(KeyCode::Enter)), KeyOutcome::Submit);
        assert_eq!(input, "hunter2A");
    }

    #[test]
    fn hidden_input_ignores_key_releases() {
        let mut input = String::new();
        let release = KeyEvent::new_with_kind(KeyCode::Char('x'), KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(apply_key(&mut input, release), KeyOutcome::Continue);
        assert!(input.is_empty());
    }

    #[test]
    fn hidden_input_can_be_cancelled() {
        let mut input = "sec".to_string();
        assert_eq!(apply_key(&mut input, press(KeyCode::Esc)), KeyOutcome::Cancel);
        assert_eq!(
            apply_key(&mut input, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyOutcome::Cancel
        );
        assert_eq!(input, "sec");
    }
}
