//! Command-line and environment settings
//!
//! Every option has an environment variable, so the tool runs with no
//! arguments at all. Flags override the environment, which overrides `.env`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, ValueEnum};
use sqlbackup_core::{BackupResult, ObjectStoreConfig, PostgresConfig, SinkTarget, TimeoutConfig};

#[derive(Parser, Debug)]
#[command(name = "sqlbackup", version)]
#[command(about = "Back up a PostgreSQL schema as plain SQL to a file or an S3 bucket")]
pub struct Cli {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub s3: S3Args,

    #[command(flatten)]
    pub timeouts: TimeoutArgs,

    /// Log output format
    #[arg(long, env = "BACKUP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// Connection URL; when set, the individual connection options are ignored
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "PGHOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "PGPORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long, env = "PGDATABASE", default_value = "postgres")]
    pub dbname: String,

    #[arg(long, env = "PGUSER", default_value = "postgres")]
    pub user: String,

    #[arg(long, env = "PGPASSWORD", default_value = "default", hide_env_values = true)]
    pub password: String,

    /// Schema whose base tables are backed up
    #[arg(long, env = "BACKUP_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Rows fetched per round trip
    #[arg(long, env = "BACKUP_BATCH_SIZE", default_value_t = 1000)]
    pub batch_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    File,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Where the backup goes
    #[arg(long, env = "BACKUP_SINK", value_enum, default_value_t = SinkKind::File)]
    pub sink: SinkKind,

    /// Directory for the file sink
    #[arg(long, env = "BACKUP_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct S3Args {
    /// Endpoint URL of an S3-compatible store; empty for AWS
    #[arg(long = "s3-endpoint", env = "S3_ENDPOINT", default_value = "")]
    pub endpoint: String,

    #[arg(long = "s3-region", env = "S3_REGION", default_value = "us-east-1")]
    pub region: String,

    #[arg(long = "s3-access-key-id", env = "S3_ACCESS_KEY_ID", default_value = "")]
    pub access_key_id: String,

    #[arg(
        long = "s3-secret-access-key",
        env = "S3_SECRET_ACCESS_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub secret_access_key: String,

    #[arg(long = "s3-bucket", env = "S3_BUCKET", default_value = "")]
    pub bucket: String,

    /// Path-style addressing, needed by most non-AWS stores
    #[arg(
        long = "s3-force-path-style",
        env = "S3_FORCE_PATH_STYLE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub force_path_style: bool,

    #[arg(
        long = "s3-allow-http",
        env = "S3_ALLOW_HTTP",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub allow_http: bool,
}

#[derive(Args, Debug)]
pub struct TimeoutArgs {
    #[arg(
        long,
        env = "BACKUP_CONNECT_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub connect_timeout: Duration,

    /// Limit for each catalog query and row fetch
    #[arg(
        long,
        env = "BACKUP_STATEMENT_TIMEOUT",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    pub statement_timeout: Duration,

    /// Limit for completing the upload after the last byte is written
    #[arg(
        long,
        env = "BACKUP_UPLOAD_TIMEOUT",
        default_value = "10m",
        value_parser = humantime::parse_duration
    )]
    pub upload_timeout: Duration,
}

impl Cli {
    pub fn postgres_config(&self) -> BackupResult<PostgresConfig> {
        let db = &self.database;
        let base = match db.database_url.as_deref() {
            Some(url) if !url.is_empty() => PostgresConfig::from_url(url)?,
            _ => PostgresConfig {
                host: db.host.clone(),
                port: db.port,
                database: db.dbname.clone(),
                user: db.user.clone(),
                password: Some(db.password.clone()).filter(|p| !p.is_empty()),
                ..Default::default()
            },
        };

        let config = PostgresConfig {
            schema: db.schema.clone(),
            batch_size: db.batch_size,
            ..base
        };
        config.validate()?;
        Ok(config)
    }

    pub fn sink_target(&self) -> BackupResult<SinkTarget> {
        let target = match self.output.sink {
            SinkKind::File => SinkTarget::File {
                dir: self.output.output_dir.clone(),
            },
            SinkKind::S3 => SinkTarget::ObjectStore(ObjectStoreConfig {
                endpoint: self.s3.endpoint.clone(),
                region: self.s3.region.clone(),
                access_key_id: self.s3.access_key_id.clone(),
                secret_access_key: self.s3.secret_access_key.clone(),
                bucket: self.s3.bucket.clone(),
                force_path_style: self.s3.force_path_style,
                allow_http: self.s3.allow_http,
            }),
        };
        target.validate()?;
        Ok(target)
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            connect_timeout: self.timeouts.connect_timeout,
            statement_timeout: self.timeouts.statement_timeout,
            upload_timeout: self.timeouts.upload_timeout,
        }
    }
}
