//! Polling for asynchronous workloads to settle.
//!
//! Setup stages hand deployments to the cluster and return before the
//! pods are actually running. [`poll_until_settled`] repeatedly probes
//! for in-flight work with exponential backoff until the probe comes
//! back empty or the per-stage ceiling is reached.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{CuppaError, Result};

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,

    /// Total time allowed before the poll gives up.
    pub max_elapsed: Duration,
}

impl PollConfig {
    pub fn with_ceiling(max_elapsed: Duration) -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.1,
            max_interval: Duration::from_secs(60),
            max_elapsed,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::with_ceiling(Duration::from_secs(120))
    }
}

/// Probe until the subject reports no pending work.
///
/// The probe returns a description of whatever is still in flight, an
/// empty string meaning settled. Probe failures are treated as "not
/// settled yet" and retried, transient API blips are common while a
/// cluster is coming up.
pub async fn poll_until_settled<F, Fut>(
    config: &PollConfig,
    subject: &str,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let started = Instant::now();
    let mut interval = config.initial_interval;

    loop {
        match probe().await {
            Ok(output) if output.trim().is_empty() => {
                info!(subject, "No pending deployments");
                metrics::counter!("cuppa_poll_settled_total").increment(1);
                return Ok(());
            }
            Ok(output) => {
                debug!(subject, pending = %output.trim(), "Deployments still in flight");
            }
            Err(err) => {
                warn!(subject, error = %err, "Readiness probe failed, retrying");
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= config.max_elapsed {
            metrics::counter!("cuppa_poll_timeout_total").increment(1);
            return Err(CuppaError::PollTimeout {
                subject: subject.to_string(),
                elapsed,
            });
        }

        // Never sleep past the ceiling.
        let remaining = config.max_elapsed - elapsed;
        tokio::time::sleep(interval.min(remaining)).await;

        interval = Duration::from_secs_f64(interval.as_secs_f64() * config.multiplier)
            .min(config.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config(max_elapsed: Duration) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(10),
            multiplier: 1.1,
            max_interval: Duration::from_millis(50),
            max_elapsed,
        }
    }

    #[tokio::test]
    async fn test_settles_immediately_without_retrying() {
        let calls = AtomicUsize::new(0);
        let config = quick_config(Duration::from_secs(5));

        poll_until_settled(&config, "core", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(String::new()) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_whitespace_output_counts_as_settled() {
        let config = quick_config(Duration::from_secs(5));
        poll_until_settled(&config, "core", || async { Ok("  \n".to_string()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_times_out_close_to_the_ceiling() {
        let config = quick_config(Duration::from_millis(100));
        let started = Instant::now();

        let err = poll_until_settled(&config, "mbaas", || async {
            Ok("fh-mbaas-1-deploy".to_string())
        })
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(5), "poll overran: {elapsed:?}");
        match err {
            CuppaError::PollTimeout { subject, .. } => assert_eq!(subject, "mbaas"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_probe_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let config = quick_config(Duration::from_secs(5));

        poll_until_settled(&config, "core", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(CuppaError::Internal("api not ready".to_string()))
                } else {
                    Ok(String::new())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
