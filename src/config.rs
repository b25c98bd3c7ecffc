use std::{fmt::Debug, net::SocketAddr, path::Path, time::Duration};

use anyhow::{anyhow, Result};
use blob_gateway::BlobStorageConfig;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LOCAL_ENV: &str = "local";
const ENV_PREFIX: &str = "BLOBGATE_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    AmazonSqs { queue_url: String },
    /// Process-local queue; messages are retained until the server exits.
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub backend: QueueBackend,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::InMemory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub blob_storage: BlobStorageConfig,
    #[serde(default)]
    pub submission_queue: QueueConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            listen_addr: default_listen_addr(),
            blob_storage: Default::default(),
            submission_queue: Default::default(),
            telemetry: Default::default(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8900".to_string()
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}

impl ServerConfig {
    /// Load from a YAML file. `BLOBGATE_`-prefixed environment variables
    /// override file values, with `__` separating nested keys
    /// (`BLOBGATE_BLOB_STORAGE__PATH`).
    pub fn from_path(path: impl AsRef<Path>) -> Result<ServerConfig> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Defaults overridden by `BLOBGATE_`-prefixed environment variables.
    pub fn from_env() -> Result<ServerConfig> {
        let figment = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    #[cfg(test)]
    fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        Self::extract(Figment::new().merge(Yaml::string(config_str)))
    }

    fn extract(figment: Figment) -> Result<ServerConfig> {
        let config: ServerConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        self.blob_storage
            .validate()
            .map_err(|e| anyhow!("invalid blob storage config: {}", e))?;
        match &self.submission_queue.backend {
            QueueBackend::AmazonSqs { queue_url } if queue_url.is_empty() => {
                return Err(anyhow!("submission queue url must not be empty"));
            }
            // nothing consumes the in-memory queue, submissions die with the process
            QueueBackend::InMemory if self.env != LOCAL_ENV => {
                return Err(anyhow!(
                    "in_memory submission queue is only allowed in the {} env",
                    LOCAL_ENV
                ));
            }
            _ => {}
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than 0"));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }

    pub fn instance_id(&self) -> String {
        self.telemetry
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.env, Uuid::new_v4()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Enable metrics.
    #[serde(default)]
    pub enable_metrics: bool,
    // Export spans over OTLP.
    #[serde(default)]
    pub enable_tracing: bool,
    // OpenTelemetry collector grpc endpoint for both traces and metrics.
    // Defaults to using OTEL_EXPORTER_OTLP_ENDPOINT env var or to localhost:4317 if empty.
    #[serde(default)]
    pub endpoint: Option<String>,
    // Metrics export interval. Defaults to 10 seconds.
    #[serde(with = "duration_serde", default = "default_metrics_interval")]
    pub metrics_interval: Duration,
    // Used as the metric attribute "blobgate.instance.id".
    #[serde(default)]
    pub instance_id: Option<String>,
}

fn default_metrics_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            enable_tracing: false,
            endpoint: None,
            metrics_interval: default_metrics_interval(),
            instance_id: None,
        }
    }
}

// Serde module for Duration serialization/deserialization
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn should_parse_sample_config() {
        let config_yaml = include_str!("../sample_config.yaml");
        let config = ServerConfig::from_yaml_str(config_yaml).expect("unable to parse from yaml");

        assert_eq!("local", config.env);
        assert_eq!("0.0.0.0:8900", config.listen_addr);
        assert_eq!("memory:///", config.blob_storage.path);
        assert_eq!(16, config.blob_storage.enrichment_concurrency);
        assert_eq!(QueueBackend::InMemory, config.submission_queue.backend);
        assert_eq!(Duration::from_secs(30), config.telemetry.metrics_interval);
        assert!(!config.structured_logging());
    }

    #[test]
    fn test_sqs_backend_and_defaults() {
        let config = ServerConfig::from_yaml_str(
            r#"
env: prod
submission_queue:
  backend:
    amazon_sqs:
      queue_url: https://sqs.us-east-1.amazonaws.com/123456789012/sales-request-inbound
"#,
        )
        .unwrap();
        assert!(config.structured_logging());
        assert_eq!(
            config.submission_queue.backend,
            QueueBackend::AmazonSqs {
                queue_url: "https://sqs.us-east-1.amazonaws.com/123456789012/sales-request-inbound"
                    .to_string()
            }
        );
        assert!(config.blob_storage.path.starts_with("file://"));
        assert_eq!(config.max_upload_bytes, default_max_upload_bytes());
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let err = ServerConfig::from_yaml_str("listen_addr: not-an-addr").unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));

        let config = ServerConfig {
            submission_queue: QueueConfig {
                backend: QueueBackend::AmazonSqs {
                    queue_url: String::new(),
                },
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_in_memory_queue_only_in_local_env() {
        let err = ServerConfig::from_yaml_str("env: prod").unwrap_err();
        assert!(err.to_string().contains("in_memory submission queue"));

        let config = ServerConfig::from_yaml_str("env: local").unwrap();
        assert_eq!(config.submission_queue.backend, QueueBackend::InMemory);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "listen_addr: 127.0.0.1:9000\nblob_storage:\n  path: \"memory:///\"\n",
        )
        .unwrap();

        let config = ServerConfig::from_path(&path).unwrap();
        assert_eq!("127.0.0.1:9000", config.listen_addr);
        assert_eq!("memory:///", config.blob_storage.path);

        let err = ServerConfig::from_path(dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
