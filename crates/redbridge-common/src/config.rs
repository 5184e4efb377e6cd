//! Connection settings for the bridge.
//!
//! [`Settings`] is read once at startup and shared read-only for the process
//! lifetime. Secrets are stored as [`SecretString`] so they never show up in
//! `Debug` output or logs.

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Errors raised while loading settings from the environment.
///
/// These are startup-time fatal conditions: the bridge refuses to run with a
/// missing or malformed required setting rather than failing on the first
/// request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),

    /// An environment variable was set but does not parse as a URL.
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        /// Name of the offending environment variable.
        name: &'static str,
        /// The underlying parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Immutable snapshot of the bridge's connection parameters.
///
/// `base_url` and `api_key` are always present; construction fails without
/// them. Everything else is optional: Basic-auth credentials for deployments
/// behind an authenticating front end, and the proxy configuration (a fixed
/// proxy URL, a PAC URL, proxy credentials).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the Redmine instance, e.g. `https://redmine.example.com`.
    pub base_url: Url,
    /// Redmine API key, sent as the `X-Redmine-API-Key` header.
    pub api_key: SecretString,
    /// Username for HTTP Basic authentication.
    pub basic_auth_user: Option<String>,
    /// Password for HTTP Basic authentication.
    pub basic_auth_password: Option<SecretString>,
    /// Fixed upstream proxy URL, used when PAC resolution yields nothing.
    pub proxy_url: Option<Url>,
    /// URL of a Proxy Auto-Configuration script.
    pub pac_url: Option<Url>,
    /// Username embedded into the chosen proxy endpoint.
    pub proxy_auth_user: Option<String>,
    /// Password embedded into the chosen proxy endpoint.
    pub proxy_auth_password: Option<SecretString>,
    /// Whether write operations are disabled for this process.
    pub read_only_mode: bool,
}

impl Settings {
    /// Creates settings with the two required fields; everything else unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use redbridge_common::Settings;
    /// use url::Url;
    ///
    /// # fn example() -> Result<(), url::ParseError> {
    /// let settings = Settings::new(
    ///     Url::parse("https://redmine.example.com")?,
    ///     "0123456789abcdef",
    /// );
    /// assert!(settings.proxy_url.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: SecretString::new(api_key.into().into()),
            basic_auth_user: None,
            basic_auth_password: None,
            proxy_url: None,
            pac_url: None,
            proxy_auth_user: None,
            proxy_auth_password: None,
            read_only_mode: false,
        }
    }

    /// Sets the HTTP Basic authentication pair.
    #[must_use]
    pub fn with_basic_auth(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic_auth_user = Some(user.into());
        self.basic_auth_password = Some(SecretString::new(password.into().into()));
        self
    }

    /// Sets the fixed upstream proxy URL.
    #[must_use]
    pub fn with_proxy_url(mut self, proxy_url: Url) -> Self {
        self.proxy_url = Some(proxy_url);
        self
    }

    /// Sets the PAC script URL.
    #[must_use]
    pub fn with_pac_url(mut self, pac_url: Url) -> Self {
        self.pac_url = Some(pac_url);
        self
    }

    /// Sets the proxy credential pair.
    #[must_use]
    pub fn with_proxy_auth(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.proxy_auth_user = Some(user.into());
        self.proxy_auth_password = Some(SecretString::new(password.into().into()));
        self
    }

    /// Marks the process as read-only.
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only_mode = read_only;
        self
    }

    /// Loads settings from the environment.
    ///
    /// Required: `REDMINE_URL` and `REDMINE_API_KEY`. Optional:
    /// `REDMINE_BASIC_AUTH_USER` / `REDMINE_BASIC_AUTH_PASSWORD`,
    /// `REDMINE_PROXY_URL` (falling back to `HTTPS_PROXY`, then
    /// `HTTP_PROXY`), `REDMINE_PAC_URL` (falling back to `PAC_URL`),
    /// `REDMINE_PROXY_AUTH_USER` / `REDMINE_PROXY_AUTH_PASSWORD`, and
    /// `REDMINE_READ_ONLY` (the literal string `true` enables it).
    ///
    /// Empty variables are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// URL-valued variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_url("REDMINE_URL", &require_var("REDMINE_URL")?)?;
        let api_key = require_var("REDMINE_API_KEY")?;

        let mut settings = Self::new(base_url, api_key);
        settings.basic_auth_user = var("REDMINE_BASIC_AUTH_USER");
        settings.basic_auth_password =
            var("REDMINE_BASIC_AUTH_PASSWORD").map(|password| SecretString::new(password.into()));
        settings.proxy_url = first_url(&["REDMINE_PROXY_URL", "HTTPS_PROXY", "HTTP_PROXY"])?;
        settings.pac_url = first_url(&["REDMINE_PAC_URL", "PAC_URL"])?;
        settings.proxy_auth_user = var("REDMINE_PROXY_AUTH_USER");
        settings.proxy_auth_password =
            var("REDMINE_PROXY_AUTH_PASSWORD").map(|password| SecretString::new(password.into()));
        settings.read_only_mode = var("REDMINE_READ_ONLY").is_some_and(|value| value == "true");

        Ok(settings)
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::MissingVar(name))
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

/// First set variable in `names` wins; its value must parse as a URL.
fn first_url(names: &[&'static str]) -> Result<Option<Url>, ConfigError> {
    for name in names {
        if let Some(raw) = var(name) {
            return parse_url(name, &raw).map(Some);
        }
    }
    Ok(None)
}
