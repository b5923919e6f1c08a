//! Client configuration.
//!
//! Configuration is built with chained setters or loaded from a TOML file:
//!
//! ```toml
//! endpoints = ["10.0.0.1:10800", "10.0.0.2:10800"]
//! connect_timeout = "5s"
//! operation_timeout = "30s"
//! default_schema = "PUBLIC"
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::logging::LogSink;
use crate::name;

/// Port assumed for endpoints configured without one.
pub const DEFAULT_PORT: u16 = 10800;

/// Client configuration.
///
/// Immutable once a session has been started from it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node endpoints (`host:port`), tried in order during bring-up.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Optional receiver for session log events.
    #[serde(skip)]
    pub logger: Option<Arc<dyn LogSink>>,

    /// Upper bound for one connection attempt: TCP connect plus handshake.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for each catalog request.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Pause between two unsuccessful rounds over the endpoint list.
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Schema assumed for identifiers without a schema part.
    #[serde(default = "default_schema")]
    pub default_schema: String,

    /// Name announced to nodes in the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Number of IO threads owned by each session.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_schema() -> String {
    name::DEFAULT_SCHEMA.to_string()
}

fn default_client_name() -> String {
    "cinder-client".to_string()
}

fn default_worker_threads() -> usize {
    2
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            logger: None,
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            reconnect_delay: default_reconnect_delay(),
            default_schema: default_schema(),
            client_name: default_client_name(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given endpoints.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Appends an endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    /// Replaces the endpoint list.
    pub fn endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the log sink.
    pub fn logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-request timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the pause between endpoint rounds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the default schema.
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Sets the client name.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the number of IO threads.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ClientError::InvalidConfig(format!("{}: {}", path.display(), e.message()))
        })
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self).map_err(|e| ClientError::InvalidConfig(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.endpoints.is_empty() {
            return Err(ClientError::InvalidConfig(
                "at least one endpoint is required".to_string(),
            ));
        }
        for endpoint in &self.endpoints {
            normalize_endpoint(endpoint)?;
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "operation_timeout must be greater than 0".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(ClientError::InvalidConfig(
                "worker_threads must be greater than 0".to_string(),
            ));
        }
        name::parse_component(&self.default_schema, &self.default_schema).map_err(|_| {
            ClientError::InvalidConfig(format!(
                "default_schema {:?} is not a valid identifier",
                self.default_schema
            ))
        })?;
        Ok(())
    }

    /// Returns the endpoints with the default port filled in.
    pub fn resolved_endpoints(&self) -> ClientResult<Vec<String>> {
        self.endpoints
            .iter()
            .map(|e| normalize_endpoint(e))
            .collect()
    }

    /// Returns the normalized default schema component.
    pub(crate) fn schema_component(&self) -> String {
        name::parse_component(&self.default_schema, &self.default_schema)
            .unwrap_or_else(|_| name::DEFAULT_SCHEMA.to_string())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoints", &self.endpoints)
            .field("logger", &self.logger.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("default_schema", &self.default_schema)
            .field("client_name", &self.client_name)
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

/// Checks `host:port` syntax and appends [`DEFAULT_PORT`] when the port is missing.
fn normalize_endpoint(endpoint: &str) -> ClientResult<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ClientError::InvalidConfig("empty endpoint".to_string()));
    }

    // Bracketed IPv6 literals carry colons inside the host part.
    let port_sep = match endpoint.rfind(']') {
        Some(close) => endpoint[close..].rfind(':').map(|i| close + i),
        None => endpoint.rfind(':'),
    };

    match port_sep {
        None => Ok(format!("{endpoint}:{DEFAULT_PORT}")),
        Some(i) => {
            let (host, port) = (&endpoint[..i], &endpoint[i + 1..]);
            if host.is_empty() {
                return Err(ClientError::InvalidConfig(format!(
                    "endpoint {endpoint:?} has no host"
                )));
            }
            port.parse::<u16>().map_err(|_| {
                ClientError::InvalidConfig(format!("endpoint {endpoint:?} has an invalid port"))
            })?;
            Ok(endpoint.to_string())
        }
    }
}

/// Serde helper for Duration using humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
