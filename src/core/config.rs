use crate::core::types::ExchangeType;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::str::FromStr;

/// Per-venue connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub exchange: String,
    pub client_id: Secret<String>,
    pub client_secret: Secret<String>,
    pub ws_url: String,
    pub rest_url: String,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ConnectionConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ConnectionConfig", 5)?;
        state.serialize_field("exchange", &self.exchange)?;
        state.serialize_field("client_id", "[REDACTED]")?;
        state.serialize_field("client_secret", "[REDACTED]")?;
        state.serialize_field("ws_url", &self.ws_url)?;
        state.serialize_field("rest_url", &self.rest_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ConnectionConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConnectionConfigHelper {
            exchange: String,
            #[serde(default)]
            client_id: String,
            #[serde(default)]
            client_secret: String,
            ws_url: Option<String>,
            rest_url: Option<String>,
        }

        let helper = ConnectionConfigHelper::deserialize(deserializer)?;
        let mut config = Self::new(&helper.exchange, helper.client_id, helper.client_secret);
        if let Some(ws_url) = helper.ws_url {
            config.ws_url = ws_url;
        }
        if let Some(rest_url) = helper.rest_url {
            config.rest_url = rest_url;
        }
        Ok(config)
    }
}

impl ConnectionConfig {
    /// Create a configuration with credentials and the venue's default endpoints
    ///
    /// Unknown venue names get empty endpoints; the factory rejects them later.
    #[must_use]
    pub fn new(exchange: &str, client_id: String, client_secret: String) -> Self {
        let venue = ExchangeType::from_str(exchange).ok();
        Self {
            exchange: exchange.to_string(),
            client_id: Secret::new(client_id),
            client_secret: Secret::new(client_secret),
            ws_url: venue
                .map(|v| v.default_ws_url().to_string())
                .unwrap_or_default(),
            rest_url: venue
                .map(|v| v.default_rest_url().to_string())
                .unwrap_or_default(),
        }
    }

    /// Configuration for public data only
    #[must_use]
    pub fn read_only(exchange: &str) -> Self {
        Self::new(exchange, String::new(), String::new())
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_CLIENT_ID` (e.g., `DERIBIT_CLIENT_ID`)
    /// - `{PREFIX}_CLIENT_SECRET`
    /// - `{PREFIX}_WS_URL` (optional, venue default otherwise)
    /// - `{PREFIX}_REST_URL` (optional, venue default otherwise)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let client_id_var = format!("{}_CLIENT_ID", prefix);
        let client_secret_var = format!("{}_CLIENT_SECRET", prefix);

        let client_id = env::var(&client_id_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(client_id_var))?;
        let client_secret = env::var(&client_secret_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(client_secret_var))?;

        let mut config = Self::new(&exchange_prefix.to_lowercase(), client_id, client_secret);
        if let Ok(ws_url) = env::var(format!("{}_WS_URL", prefix)) {
            config.ws_url = ws_url;
        }
        if let Ok(rest_url) = env::var(format!("{}_REST_URL", prefix)) {
            config.rest_url = rest_url;
        }
        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // no .env file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Check if this configuration carries credentials for authenticated sessions
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.client_id.expose_secret().is_empty() && !self.client_secret.expose_secret().is_empty()
    }

    #[must_use]
    pub fn with_ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = ws_url;
        self
    }

    #[must_use]
    pub fn with_rest_url(mut self, rest_url: String) -> Self {
        self.rest_url = rest_url;
        self
    }

    /// Get client id (use carefully - exposes secret)
    pub fn client_id(&self) -> &str {
        self.client_id.expose_secret()
    }

    /// Get client secret (use carefully - exposes secret)
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),
}
