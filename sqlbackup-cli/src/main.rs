use chrono::Utc;
use clap::Parser;
use sqlbackup_core::{
    BackupFailure, BackupPhase, BackupResult, BackupSink, BackupSummary, FileSink,
    ObjectStoreSink, PgCatalog, SinkTarget, TimeoutConfig, artifact_name, run_backup, s3_store,
};

mod cli;

use cli::{Cli, LogFormat};

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

#[tokio::main]
async fn main() {
    // .env is read before parsing so clap sees its values as environment
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    match run(&cli).await {
        Ok(summary) => {
            tracing::info!(
                artifact = %summary.artifact,
                tables = summary.tables,
                rows = summary.rows,
                "Backup written"
            );
        }
        Err(failure) => {
            tracing::error!(
                error = %failure,
                phase = %failure.phase,
                tables_completed = failure.tables_completed,
                tables_total = failure.tables_total,
                "Backup failed"
            );
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<BackupSummary, BackupFailure> {
    let at_start = |e| BackupFailure::at(BackupPhase::Connecting, e);

    let timeouts = cli.timeouts();
    let pg_config = cli.postgres_config().map_err(at_start)?;
    let target = cli.sink_target().map_err(at_start)?;
    let artifact = artifact_name(Utc::now());

    tracing::info!(
        phase = %BackupPhase::Connecting,
        host = %pg_config.host,
        database = %pg_config.database,
        schema = %pg_config.schema,
        "Connecting to database"
    );
    let mut catalog = PgCatalog::connect(&pg_config, timeouts)
        .await
        .map_err(at_start)?;

    let result = match open_sink(&target, &artifact, timeouts).await {
        Ok(mut sink) => run_backup(&mut catalog, sink.as_mut(), &artifact).await,
        Err(e) => Err(at_start(e)),
    };

    catalog.close().await;
    result
}

async fn open_sink(
    target: &SinkTarget,
    artifact: &str,
    timeouts: TimeoutConfig,
) -> BackupResult<Box<dyn BackupSink>> {
    match target {
        SinkTarget::File { dir } => {
            let sink = FileSink::create(dir, artifact).await?;
            tracing::debug!(path = %sink.path().display(), "Writing to local file");
            Ok(Box::new(sink))
        }
        SinkTarget::ObjectStore(config) => {
            let store = s3_store(config)?;
            let sink = ObjectStoreSink::new(store, artifact, timeouts.upload_timeout);
            tracing::debug!(
                bucket = %config.bucket,
                key = %sink.location(),
                "Streaming to object store"
            );
            Ok(Box::new(sink))
        }
    }
}
