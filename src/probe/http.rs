//! HTTP probe for uptime checks.

use std::time::{Duration, Instant};

use super::ProbeError;
use crate::model::{CheckSpec, HttpExchange, ProbeOutcome, BODY_CAP};

/// Run one HTTP check attempt.
///
/// Any response, whatever its status code, is a transport success; the
/// assertion engine judges it afterwards. Errors returned here are
/// transport failures or timeouts eligible for retry, plus configuration
/// errors that are not.
pub(super) async fn run_check(
    client: &reqwest::Client,
    spec: &CheckSpec,
    timeout_ms: u64,
) -> Result<ProbeOutcome, ProbeError> {
    let method = reqwest::Method::from_bytes(spec.method.as_bytes())
        .map_err(|_| ProbeError::Config(format!("invalid HTTP method: {}", spec.method)))?;

    let mut request = client
        .request(method, &spec.url)
        .timeout(Duration::from_millis(timeout_ms));
    for (name, value) in &spec.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &spec.body {
        request = request.body(body.clone());
    }

    let start = Instant::now();

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout_ms)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).to_string(),
            )
        })
        .collect();

    // Read the full body to measure complete transfer time.
    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout_ms)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let cap = bytes.len().min(BODY_CAP);
    let body = String::from_utf8_lossy(&bytes[..cap]).to_string();

    Ok(ProbeOutcome {
        success: true,
        value: Some(status as f64),
        elapsed_ms,
        error: None,
        http: Some(HttpExchange {
            status,
            headers,
            body,
        }),
    })
}
