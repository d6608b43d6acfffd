//! Connection and sink configuration
//!
//! Plain structs with `Default` values matching a local development
//! database. Validation runs before any I/O so misconfiguration fails fast.

use std::path::PathBuf;

use crate::error::{BackupError, BackupResult};

/// PostgreSQL connection configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Schema whose base tables are backed up
    pub schema: String,
    /// Rows fetched per cursor round trip
    pub batch_size: u32,
    /// Application name for connection identification
    pub application_name: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: Some("default".to_string()),
            schema: "public".to_string(),
            batch_size: 1000,
            application_name: "sqlbackup".to_string(),
        }
    }
}

impl PostgresConfig {
    /// Create a config from a `postgres://` connection URL
    #[cfg(feature = "postgres")]
    pub fn from_url(url: &str) -> BackupResult<Self> {
        use tokio_postgres::config::Host;

        let config: tokio_postgres::Config = url
            .parse()
            .map_err(|e| BackupError::Config(format!("Invalid database URL: {e}")))?;

        let defaults = Self::default();
        let host = match config.get_hosts().first() {
            Some(Host::Tcp(s)) => s.clone(),
            #[cfg(unix)]
            Some(Host::Unix(path)) => {
                let lossy = path.to_string_lossy();
                if matches!(lossy, std::borrow::Cow::Owned(_)) {
                    tracing::warn!(
                        path_debug = ?path,
                        "Unix socket path contains invalid UTF-8"
                    );
                }
                lossy.to_string()
            }
            None => defaults.host.clone(),
        };

        Ok(Self {
            host,
            port: config.get_ports().first().copied().unwrap_or(defaults.port),
            database: config
                .get_dbname()
                .map(str::to_string)
                .unwrap_or(defaults.database),
            user: config.get_user().map(str::to_string).unwrap_or(defaults.user),
            password: config
                .get_password()
                .map(|s| String::from_utf8_lossy(s).to_string()),
            application_name: config
                .get_application_name()
                .map(str::to_string)
                .unwrap_or(defaults.application_name),
            ..defaults
        })
    }

    /// Validate configuration before connecting
    pub fn validate(&self) -> BackupResult<()> {
        if self.host.is_empty() {
            return Err(BackupError::Config("Host cannot be empty".to_string()));
        }

        if self.database.is_empty() {
            return Err(BackupError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }

        if self.user.is_empty() {
            return Err(BackupError::Config("Username cannot be empty".to_string()));
        }

        if self.schema.is_empty() {
            return Err(BackupError::Config("Schema cannot be empty".to_string()));
        }

        if self.batch_size == 0 {
            return Err(BackupError::Config(
                "Batch size must be at least 1".to_string(),
            ));
        }

        if self.host.contains("..") || self.host.contains("//") {
            return Err(BackupError::Config(
                "Invalid host: potential path traversal detected".to_string(),
            ));
        }

        Ok(())
    }

    /// Build tokio_postgres Config
    #[cfg(feature = "postgres")]
    pub fn build_pg_config(&self, connect_timeout: std::time::Duration) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name(&self.application_name)
            .connect_timeout(connect_timeout);

        if let Some(ref password) = self.password {
            config.password(password);
        }

        config
    }
}

/// S3-compatible object store destination
#[derive(Clone, Default)]
pub struct ObjectStoreConfig {
    /// Endpoint URL; empty means the AWS default endpoint
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Path-style addressing, required by most non-AWS stores
    pub force_path_style: bool,
    /// Permit plain `http://` endpoints
    pub allow_http: bool,
}

// Keeps the secret out of logs.
impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("force_path_style", &self.force_path_style)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

impl ObjectStoreConfig {
    pub fn validate(&self) -> BackupResult<()> {
        if self.bucket.is_empty() {
            return Err(BackupError::Config("Bucket cannot be empty".to_string()));
        }

        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(BackupError::Config(
                "Access key and secret key are required".to_string(),
            ));
        }

        if self.region.is_empty() {
            return Err(BackupError::Config("Region cannot be empty".to_string()));
        }

        if !self.endpoint.is_empty() {
            let scheme_ok = self.endpoint.starts_with("https://")
                || (self.allow_http && self.endpoint.starts_with("http://"));
            if !scheme_ok {
                return Err(BackupError::Config(format!(
                    "Endpoint must be an https:// URL (or http:// with allow_http): {}",
                    self.endpoint
                )));
            }
        }

        Ok(())
    }
}

/// Where the artifact goes
#[derive(Debug, Clone)]
pub enum SinkTarget {
    /// Local directory
    File { dir: PathBuf },
    /// Streamed upload to a bucket
    ObjectStore(ObjectStoreConfig),
}

impl Default for SinkTarget {
    fn default() -> Self {
        SinkTarget::File {
            dir: PathBuf::from("."),
        }
    }
}

impl SinkTarget {
    pub fn validate(&self) -> BackupResult<()> {
        match self {
            SinkTarget::File { dir } if dir.as_os_str().is_empty() => Err(BackupError::Config(
                "Output directory cannot be empty".to_string(),
            )),
            SinkTarget::File { .. } => Ok(()),
            SinkTarget::ObjectStore(config) => config.validate(),
        }
    }
}
