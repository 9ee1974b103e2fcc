//! Probe execution.
//!
//! One probe attempt per try; transport failures and timeouts are retried up
//! to the target's retry budget, and the returned outcome is always the last
//! attempt's. Assertion failures are judged later and never retried here.

mod http;
mod price;

pub use price::{PageRenderer, RenderedExtract};

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::model::{ProbeOutcome, ProbeSpec, TargetConfig};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("extraction failed: {0}")]
    Extract(String),
}

impl ProbeError {
    /// Only transport failures and timeouts are worth another attempt.
    fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::Timeout(_) | ProbeError::Network(_))
    }
}

/// Runs one check/tracker attempt with timeout and retry.
pub struct ProbeExecutor {
    client: reqwest::Client,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl ProbeExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            renderer: None,
        }
    }

    /// Attach the rendered-page extraction collaborator.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Execute one probe for the target, honoring its retry budget.
    ///
    /// The elapsed time in the returned outcome is that of the attempt which
    /// produced it, not the sum across retries.
    pub async fn execute(&self, target: &TargetConfig) -> ProbeOutcome {
        // Small jitter to avoid hammering targets at exact tick boundaries.
        let jitter = rand::random::<u64>() % 100;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(target.retry_delay_ms)).await;
            }

            let start = Instant::now();
            match self.attempt(target).await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    if !err.is_retryable() || attempt >= target.retry_count {
                        return ProbeOutcome::failed(err.to_string(), elapsed_ms);
                    }
                    tracing::debug!(
                        "probe attempt {} for {} failed, retrying: {}",
                        attempt + 1,
                        target.name,
                        err
                    );
                }
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, target: &TargetConfig) -> Result<ProbeOutcome, ProbeError> {
        match &target.spec {
            ProbeSpec::Check(spec) => http::run_check(&self.client, spec, target.timeout_ms).await,
            ProbeSpec::Price(spec) => {
                price::run_price(&self.client, self.renderer.as_ref(), spec, target.timeout_ms)
                    .await
            }
        }
    }
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new()
    }
}
