//! Generic JSON webhook channel.

use super::ChannelError;
use crate::model::AlertPayload;

pub(super) async fn send(
    client: &reqwest::Client,
    url: &str,
    payload: &AlertPayload,
) -> Result<(), ChannelError> {
    let body = build_body(payload);

    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(ChannelError::Status(response.status().as_u16()))
    }
}

fn build_body(payload: &AlertPayload) -> serde_json::Value {
    serde_json::json!({
        "title": payload.title(),
        "alert": payload.kind.as_str(),
        "target_id": payload.target_id,
        "target": payload.target_name,
        "status": payload.status.as_str(),
        "response_time_ms": payload.elapsed_ms,
        "value": payload.value,
        "error": payload.error,
        "at": payload.at.to_rfc3339(),
    })
}
