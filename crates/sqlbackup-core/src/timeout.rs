//! Operation timeout enforcement
//!
//! Without timeouts a stalled database or object store hangs the whole run.
//! Every network round trip goes through [`with_timeout`].

use std::future::Future;
use std::time::Duration;

use crate::error::{BackupError, BackupResult};

/// Configuration for operation timeouts
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Timeout for establishing the database connection
    pub connect_timeout: Duration,

    /// Timeout for each catalog query and cursor fetch
    pub statement_timeout: Duration,

    /// Timeout for completing the upload once the last byte is written
    pub upload_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(600),
        }
    }
}

impl TimeoutConfig {
    /// Tight limits for tests and local runs
    pub fn development() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(60),
        }
    }
}

/// Run `operation`, failing with [`BackupError::Timeout`] once `timeout` elapses
pub async fn with_timeout<F, T>(
    timeout: Duration,
    operation_name: &str,
    operation: F,
) -> BackupResult<T>
where
    F: Future<Output = BackupResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation = operation_name,
                timeout_secs = timeout.as_secs_f64(),
                "Operation timed out"
            );
            Err(BackupError::timeout(operation_name, timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_operation_reports_timeout() {
        let result: BackupResult<()> = with_timeout(Duration::from_secs(1), "fetch", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(BackupError::Timeout { operation, timeout }) => {
                assert_eq!(operation, "fetch");
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let ok = with_timeout(Duration::from_secs(1), "noop", async { Ok(5) }).await;
        assert_eq!(ok.unwrap(), 5);

        let err: BackupResult<()> = with_timeout(Duration::from_secs(1), "noop", async {
            Err(BackupError::Catalog("boom".to_string()))
        })
        .await;
        assert!(matches!(err, Err(BackupError::Catalog(_))));
    }

    #[test]
    fn development_is_stricter_than_default() {
        let dev = TimeoutConfig::development();
        let default = TimeoutConfig::default();
        assert!(dev.statement_timeout < default.statement_timeout);
        assert!(dev.upload_timeout < default.upload_timeout);
    }
}
