//! Alert routing and multi-channel dispatch.
//!
//! Rules select channels; one payload is built per alert intent and fanned
//! out to every matched channel concurrently. A failing channel is logged
//! and never affects its siblings or the evaluation cycle.

mod email;
mod telegram;
mod webhook;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AlertKind, AlertPayload, AlertRule, RuleScope, TargetConfig};

/// Channel dispatch error types.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("channel not configured: {0}")]
    Config(String),
}

/// Notification transport selected by an alert rule. Each variant carries
/// only the per-rule fields; shared secrets come from [`ChannelSecrets`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConfig {
    Webhook { url: String },
    Telegram { chat_id: String },
    Email { to: String },
}

impl ChannelConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChannelConfig::Webhook { .. } => "webhook",
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Email { .. } => "email",
        }
    }

    /// Transform the payload into this channel's wire format and perform one
    /// outbound call. Success means a 2xx response.
    pub async fn send(
        &self,
        client: &reqwest::Client,
        secrets: &ChannelSecrets,
        payload: &AlertPayload,
    ) -> Result<(), ChannelError> {
        match self {
            ChannelConfig::Webhook { url } => webhook::send(client, url, payload).await,
            ChannelConfig::Telegram { chat_id } => {
                telegram::send(client, secrets, chat_id, payload).await
            }
            ChannelConfig::Email { to } => email::send(client, secrets, to, payload).await,
        }
    }
}

/// Credentials injected at construction rather than read from a process-wide
/// singleton.
#[derive(Debug, Clone, Default)]
pub struct ChannelSecrets {
    pub telegram_token: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
}

/// Selects channels for an alert and dispatches to them concurrently.
pub struct AlertRouter {
    client: reqwest::Client,
    secrets: ChannelSecrets,
}

impl AlertRouter {
    pub fn new(secrets: ChannelSecrets) -> Self {
        Self {
            client: reqwest::Client::new(),
            secrets,
        }
    }

    /// Dispatch the payload to every matching rule's channel. Each send runs
    /// in its own task; failures are logged per channel and all sends are
    /// awaited before returning.
    pub async fn dispatch(
        &self,
        rules: &[AlertRule],
        target: &TargetConfig,
        payload: AlertPayload,
    ) {
        let matched: Vec<&AlertRule> = rules
            .iter()
            .filter(|rule| rule_matches(rule, target, payload.kind))
            .collect();

        if matched.is_empty() {
            tracing::debug!(
                "no alert rules match {} alert for {}",
                payload.kind.as_str(),
                target.name
            );
            return;
        }

        let mut handles = Vec::with_capacity(matched.len());
        for rule in matched {
            let client = self.client.clone();
            let secrets = self.secrets.clone();
            let channel = rule.channel.clone();
            let payload = payload.clone();
            let rule_id = rule.id;
            handles.push(tokio::spawn(async move {
                let kind = channel.kind_name();
                (rule_id, kind, channel.send(&client, &secrets, &payload).await)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((rule_id, kind, Ok(()))) => {
                    tracing::info!("alert delivered via {} (rule {})", kind, rule_id);
                }
                Ok((rule_id, kind, Err(e))) => {
                    tracing::error!("alert delivery via {} failed (rule {}): {}", kind, rule_id, e);
                }
                Err(e) => {
                    tracing::error!("alert delivery task panicked: {}", e);
                }
            }
        }
    }
}

/// Whether a rule should receive this alert for this target.
pub fn rule_matches(rule: &AlertRule, target: &TargetConfig, kind: AlertKind) -> bool {
    if !rule.enabled {
        return false;
    }

    let wanted = match kind {
        AlertKind::Recovery => rule.on_recovery,
        // Failure and every threshold variant follow the on-failure flag.
        _ => rule.on_failure,
    };
    if !wanted {
        return false;
    }

    let scope_ok = match &rule.scope {
        RuleScope::Global => true,
        RuleScope::Target { id } => *id == target.id,
        RuleScope::Group { name } => target.group.as_deref() == Some(name.as_str()),
    };
    if !scope_ok {
        return false;
    }

    // Legacy tag routing: an untagged rule receives every alert; a tagged
    // rule needs at least one tag in common with the target.
    rule.tags.is_empty() || rule.tags.iter().any(|tag| target.tags.contains(tag))
}
