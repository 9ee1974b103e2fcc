//! Price probe: fetch a document and extract one numeric reading.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;

use super::ProbeError;
use crate::model::{Extraction, PriceSpec, ProbeOutcome};

/// External collaborator for extraction strategies that need a rendered page.
///
/// Implementations drive a headless browser or similar; the engine only
/// depends on this contract.
pub trait PageRenderer: Send + Sync {
    fn extract(&self, url: &str, selector: &str) -> Result<RenderedExtract, ProbeError>;
}

/// Value pulled out of a rendered page.
#[derive(Debug, Clone)]
pub struct RenderedExtract {
    pub value: f64,
    pub raw_text: String,
}

/// Run one price tracker attempt.
///
/// Transport failures and timeouts come back as `Err` and are retryable;
/// extraction failures are final and reported as a failed outcome.
pub(super) async fn run_price(
    client: &reqwest::Client,
    renderer: Option<&Arc<dyn PageRenderer>>,
    spec: &PriceSpec,
    timeout_ms: u64,
) -> Result<ProbeOutcome, ProbeError> {
    if let Extraction::Rendered { selector } = &spec.extraction {
        return run_rendered(renderer, &spec.url, selector).await;
    }

    let start = Instant::now();

    let response = client
        .get(&spec.url)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout_ms)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

    let text = response.text().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout_ms)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let elapsed_ms = start.elapsed().as_millis() as u64;

    match extract_value(&spec.extraction, &text) {
        Ok(value) => Ok(ProbeOutcome {
            success: true,
            value: Some(value),
            elapsed_ms,
            error: None,
            http: None,
        }),
        Err(e) => Ok(ProbeOutcome::failed(e.to_string(), elapsed_ms)),
    }
}

async fn run_rendered(
    renderer: Option<&Arc<dyn PageRenderer>>,
    url: &str,
    selector: &str,
) -> Result<ProbeOutcome, ProbeError> {
    let Some(renderer) = renderer else {
        return Ok(ProbeOutcome::failed(
            "invalid configuration: no page renderer configured".to_string(),
            0,
        ));
    };

    let renderer = renderer.clone();
    let url = url.to_string();
    let selector = selector.to_string();
    let start = Instant::now();

    // Renderers are expected to block on an external browser process.
    let result = tokio::task::spawn_blocking(move || renderer.extract(&url, &selector)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(extract)) => Ok(ProbeOutcome {
            success: true,
            value: Some(extract.value),
            elapsed_ms,
            error: None,
            http: None,
        }),
        Ok(Err(e)) => Ok(ProbeOutcome::failed(e.to_string(), elapsed_ms)),
        Err(e) => Ok(ProbeOutcome::failed(
            format!("renderer task failed: {}", e),
            elapsed_ms,
        )),
    }
}

/// Pull the numeric reading out of the fetched document.
fn extract_value(extraction: &Extraction, body: &str) -> Result<f64, ProbeError> {
    match extraction {
        Extraction::JsonPointer { pointer } => {
            let doc: serde_json::Value = serde_json::from_str(body)
                .map_err(|e| ProbeError::Extract(format!("invalid JSON: {}", e)))?;
            let value = doc
                .pointer(pointer)
                .ok_or_else(|| ProbeError::Extract(format!("no value at {}", pointer)))?;
            match value {
                serde_json::Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| ProbeError::Extract(format!("{} is not a float", n))),
                serde_json::Value::String(s) => parse_price(s),
                other => Err(ProbeError::Extract(format!(
                    "value at {} is not numeric: {}",
                    pointer, other
                ))),
            }
        }
        Extraction::Regex { pattern } => {
            let re = Regex::new(pattern)
                .map_err(|e| ProbeError::Extract(format!("invalid pattern: {}", e)))?;
            let caps = re
                .captures(body)
                .ok_or_else(|| ProbeError::Extract(format!("no match for {:?}", pattern)))?;
            let matched = caps
                .get(1)
                .or_else(|| caps.get(0))
                .ok_or_else(|| ProbeError::Extract("empty match".to_string()))?;
            parse_price(matched.as_str())
        }
        Extraction::Rendered { .. } => Err(ProbeError::Config(
            "rendered extraction requires the page renderer".to_string(),
        )),
    }
}

/// Parse a price string, tolerating currency symbols and thousands separators.
fn parse_price(raw: &str) -> Result<f64, ProbeError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse()
        .map_err(|_| ProbeError::Extract(format!("cannot parse number from {:?}", raw)))
}
