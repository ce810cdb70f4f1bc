//! Polling with backoff, timeout and cancellation.
//!
//! Used both for waiting on a provider cluster to leave its pending state and
//! for waiting on another process to finish creating a shared cluster.

use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a wait ended without a result
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Timeout waiting for {resource} after {timeout:?} ({attempts} attempts)")]
    Timeout {
        resource: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("Wait for {resource} cancelled")]
    Cancelled { resource: String },

    #[error("Check for {resource} failed")]
    Check {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Configuration for resource waiting with exponential backoff.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Maximum delay between checks (cap for exponential growth)
    pub max_delay: Duration,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl WaitConfig {
    /// Poll at a fixed interval
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            timeout,
            jitter: false,
        }
    }
}

/// Poll `check` until it yields a value.
///
/// `check` returns `Ok(Some(value))` when done and `Ok(None)` to keep waiting.
/// An error from `check` ends the wait immediately. The final sleep is
/// shortened so the wait never overshoots `config.timeout`.
///
/// # Example
/// ```ignore
/// let state = wait_for_resource(
///     WaitConfig::default(),
///     Some(&cancel_token),
///     || async {
///         let state = provider.get_status(id).await?;
///         Ok((state != ClusterState::Pending).then_some(state))
///     },
///     "cluster 0101-abc",
/// ).await?;
/// ```
pub async fn wait_for_resource<T, F, Fut>(
    config: WaitConfig,
    cancel: Option<&CancellationToken>,
    check: F,
    resource_name: &str,
) -> Result<T, WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    let mut backoff = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .without_max_times();
    if config.jitter {
        backoff = backoff.with_jitter();
    }
    let mut delays = backoff.build();

    let cancelled = || WaitError::Cancelled {
        resource: resource_name.to_string(),
    };

    loop {
        attempts += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(cancelled());
        }

        if start.elapsed() >= config.timeout {
            return Err(WaitError::Timeout {
                resource: resource_name.to_string(),
                timeout: config.timeout,
                attempts,
            });
        }

        match check().await {
            Ok(Some(value)) => {
                debug!(resource = %resource_name, attempts, "Resource ready");
                return Ok(value);
            }
            Ok(None) => {
                let remaining = config.timeout.saturating_sub(start.elapsed());
                let delay = delays.next().unwrap_or(config.max_delay).min(remaining);
                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Resource not ready, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = async {
                        match cancel {
                            Some(token) => token.cancelled().await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        return Err(cancelled());
                    }
                }
            }
            Err(e) => {
                warn!(resource = %resource_name, error = ?e, "Resource check failed");
                return Err(WaitError::Check {
                    resource: resource_name.to_string(),
                    source: e,
                });
            }
        }
    }
}
