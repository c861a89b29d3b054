use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;

/// Path the App Engine runtime mounts the channel endpoints under
pub const DEFAULT_CHANNEL_PATH: &str = "/_ah/channel/";

/// Base URL of the production talkgadget gateway
pub const DEFAULT_GATEWAY_URL: &str = "https://talkgadget.google.com/talkgadget/";

/// Settings shared by every channel backend
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Application host, e.g. `localhost:8080` or `myapp.appspot.com`
    pub host: String,
    /// Client identifier the application assigned to this browser/client
    pub client_id: String,
    /// Channel token previously obtained from the application
    pub token: Secret<String>,
    pub channel_path: String,
}

// Never expose the token in serialization
impl Serialize for ChannelConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ChannelConfig", 4)?;
        state.serialize_field("host", &self.host)?;
        state.serialize_field("client_id", &self.client_id)?;
        state.serialize_field("token", "[REDACTED]")?;
        state.serialize_field("channel_path", &self.channel_path)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ChannelConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ChannelConfigHelper {
            host: String,
            client_id: String,
            token: String,
            channel_path: Option<String>,
        }

        let helper = ChannelConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            host: helper.host,
            client_id: helper.client_id,
            token: Secret::new(helper.token),
            channel_path: helper
                .channel_path
                .unwrap_or_else(|| DEFAULT_CHANNEL_PATH.to_string()),
        })
    }
}

impl ChannelConfig {
    /// Create a new configuration for a channel token
    #[must_use]
    pub fn new(host: String, client_id: String, token: String) -> Self {
        Self {
            host,
            client_id,
            token: Secret::new(token),
            channel_path: DEFAULT_CHANNEL_PATH.to_string(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_HOST` (e.g., `CHANNEL_HOST`)
    /// - `{PREFIX}_CLIENT_ID`
    /// - `{PREFIX}_TOKEN`
    /// - `{PREFIX}_PATH` (optional, defaults to `/_ah/channel/`)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let host_var = format!("{}_HOST", prefix);
        let client_id_var = format!("{}_CLIENT_ID", prefix);
        let token_var = format!("{}_TOKEN", prefix);
        let path_var = format!("{}_PATH", prefix);

        let host = env::var(&host_var).map_err(|_| ConfigError::MissingEnvironmentVariable(host_var))?;

        let client_id = env::var(&client_id_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(client_id_var))?;

        let token =
            env::var(&token_var).map_err(|_| ConfigError::MissingEnvironmentVariable(token_var))?;

        let config = Self::new(host, client_id, token);
        let config = match env::var(&path_var) {
            Ok(path) => config.channel_path(path),
            Err(_) => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from a .env file and environment variables
    ///
    /// **Security Warning**: channel tokens are bearer credentials; never commit .env files.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // No .env file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Override the channel endpoint path
    #[must_use]
    pub fn channel_path(mut self, channel_path: String) -> Self {
        self.channel_path = channel_path;
        self
    }

    /// Get the channel token (use carefully - exposes secret)
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Whether this host denotes the local development server
    pub fn is_development(&self) -> bool {
        self.host.contains("localhost")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "host must not be empty".to_string(),
            ));
        }
        if self.token().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "token must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the production talkgadget gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Gateway base URL; must end with a slash
    pub base_url: String,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// First acknowledged message id sent to the gateway
    pub initial_mid: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(60),
            initial_mid: 1,
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub const fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_base.is_zero() || self.backoff_base > self.backoff_max {
            return Err(ConfigError::InvalidConfiguration(format!(
                "backoff base {:?} must be non-zero and at most max {:?}",
                self.backoff_base, self.backoff_max
            )));
        }
        if !self.base_url.ends_with('/') {
            return Err(ConfigError::InvalidConfiguration(format!(
                "gateway base URL '{}' must end with '/'",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
