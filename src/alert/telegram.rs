//! Telegram bot channel.

use super::{ChannelError, ChannelSecrets};
use crate::model::{AlertKind, AlertPayload};

pub(super) async fn send(
    client: &reqwest::Client,
    secrets: &ChannelSecrets,
    chat_id: &str,
    payload: &AlertPayload,
) -> Result<(), ChannelError> {
    let token = secrets
        .telegram_token
        .as_deref()
        .ok_or_else(|| ChannelError::Config("telegram bot token not set".to_string()))?;

    let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
    let body = serde_json::json!({
        "chat_id": chat_id,
        "text": format_message(payload),
        "parse_mode": "HTML",
    });

    let response = client
        .post(&url)
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

fn format_message(payload: &AlertPayload) -> String {
    let marker = match payload.kind {
        AlertKind::Recovery => "🟢",
        AlertKind::Failure => "🔴",
        _ => "🟡",
    };

    let mut text = format!(
        "{} <b>{}</b>\nStatus: {}\nResponse time: {}ms",
        marker,
        payload.title(),
        payload.status.as_str(),
        payload.elapsed_ms
    );
    if let Some(value) = payload.value {
        text.push_str(&format!("\nValue: {}", value));
    }
    if let Some(error) = &payload.error {
        text.push_str(&format!("\nError: {}", error));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use chrono::Utc;

    #[test]
    fn test_message_markers_and_fields() {
        let mut payload = AlertPayload {
            kind: AlertKind::Recovery,
            target_id: 1,
            target_name: "Shop".to_string(),
            tags: vec![],
            status: Status::Healthy,
            consecutive_failures: 0,
            value: Some(200.0),
            elapsed_ms: 41,
            error: None,
            at: Utc::now(),
        };
        let text = format_message(&payload);
        assert!(text.starts_with("🟢 <b>RECOVERED: Shop</b>"));
        assert!(text.contains("Response time: 41ms"));

        payload.kind = AlertKind::Failure;
        payload.error = Some("timeout after 5000ms".to_string());
        let text = format_message(&payload);
        assert!(text.starts_with("🔴"));
        assert!(text.contains("Error: timeout after 5000ms"));

        payload.kind = AlertKind::PctDrop;
        assert!(format_message(&payload).starts_with("🟡"));
    }

    #[tokio::test]
    async fn test_missing_token_is_config_error() {
        let client = reqwest::Client::new();
        let secrets = ChannelSecrets::default();
        let payload = AlertPayload {
            kind: AlertKind::Failure,
            target_id: 1,
            target_name: "Shop".to_string(),
            tags: vec![],
            status: Status::Unhealthy,
            consecutive_failures: 3,
            value: None,
            elapsed_ms: 0,
            error: None,
            at: Utc::now(),
        };
        let err = send(&client, &secrets, "42", &payload).await.unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
    }
}
