//! Transactional email channel, delivered through an HTTP mail API.

use super::{ChannelError, ChannelSecrets};
use crate::model::AlertPayload;

pub(super) async fn send(
    client: &reqwest::Client,
    secrets: &ChannelSecrets,
    to: &str,
    payload: &AlertPayload,
) -> Result<(), ChannelError> {
    let api_url = secrets
        .mail_api_url
        .as_deref()
        .ok_or_else(|| ChannelError::Config("mail API URL not set".to_string()))?;
    let api_key = secrets
        .mail_api_key
        .as_deref()
        .ok_or_else(|| ChannelError::Config("mail API key not set".to_string()))?;

    let body = serde_json::json!({
        "from": secrets.mail_from,
        "to": to,
        "subject": subject(payload),
        "html": render_html(payload),
    });

    let response = client
        .post(api_url)
        .bearer_auth(api_key)
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

fn subject(payload: &AlertPayload) -> String {
    format!("[Monitor] {}", payload.title())
}

fn render_html(payload: &AlertPayload) -> String {
    let mut rows = vec![
        ("Target", payload.target_name.clone()),
        ("Alert", payload.kind.as_str().to_string()),
        ("Status", payload.status.as_str().to_string()),
        ("Response time", format!("{}ms", payload.elapsed_ms)),
    ];
    if let Some(value) = payload.value {
        rows.push(("Value", value.to_string()));
    }
    if let Some(error) = &payload.error {
        rows.push(("Error", error.clone()));
    }
    rows.push(("Time", payload.at.to_rfc3339()));

    let mut html = String::from("<h2>");
    html.push_str(&payload.title());
    html.push_str("</h2><table border=\"1\" cellpadding=\"6\">");
    for (label, value) in rows {
        html.push_str(&format!("<tr><td><b>{}</b></td><td>{}</td></tr>", label, value));
    }
    html.push_str("</table>");
    html
}
