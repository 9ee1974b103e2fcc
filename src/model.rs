//! Core domain types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::alert::ChannelConfig;
use crate::assertion::Assertion;

/// Bounded per-target history capacity: 24 hours at a 5-minute cadence.
pub const HISTORY_CAPACITY: usize = 288;

/// Maximum number of response body bytes kept for assertion evaluation.
pub const BODY_CAP: usize = 64 * 1024;

/// Health status of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Unhealthy => "unhealthy",
        }
    }
}

/// A monitored target: an uptime check or a price tracker.
///
/// Owned by configuration storage; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: i64,
    pub name: String,
    pub spec: ProbeSpec,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub failure_threshold: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub enabled: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            spec: ProbeSpec::Check(CheckSpec::default()),
            timeout_ms: 5000,
            retry_count: 0,
            retry_delay_ms: 1000,
            failure_threshold: 3,
            tags: Vec::new(),
            group: None,
            enabled: true,
        }
    }
}

/// What to probe and how to judge it. One variant per target kind, each
/// carrying only the fields that kind needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeSpec {
    Check(CheckSpec),
    Price(PriceSpec),
}

/// Probe spec for an uptime check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
    /// Conjunction of assertions; empty means "status code equals 200".
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for CheckSpec {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: Vec::new(),
            body: None,
            assertions: Vec::new(),
        }
    }
}

/// Probe spec for a price tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSpec {
    pub url: String,
    pub extraction: Extraction,
    #[serde(default)]
    pub rules: PriceRules,
}

/// How the numeric value is extracted from the fetched document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Extraction {
    /// JSON pointer into the response document, e.g. `/data/price`.
    JsonPointer { pointer: String },
    /// Regex over the raw body; capture group 1 (or the whole match) is parsed.
    Regex { pattern: String },
    /// Headless-page extraction via the external renderer collaborator.
    Rendered { selector: String },
}

/// Independently evaluated threshold rules; any subset can fire from one
/// reading.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceRules {
    pub alert_below: Option<f64>,
    pub alert_above: Option<f64>,
    pub alert_pct_drop: Option<f64>,
    pub alert_pct_rise: Option<f64>,
}

/// Result of one probe evaluation. Created fresh each cycle and never
/// mutated after the assertion verdict is folded in.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Status code for checks, extracted price for trackers.
    pub value: Option<f64>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// Present for uptime checks whose transport succeeded.
    pub http: Option<HttpExchange>,
}

impl ProbeOutcome {
    pub fn failed(error: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            value: None,
            elapsed_ms,
            error: Some(error),
            http: None,
        }
    }
}

/// HTTP response snapshot consumed by the assertion engine.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body text truncated to [`BODY_CAP`] bytes.
    pub body: String,
}

/// Mutable per-target record, persisted in the hot-state blob after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    pub status: Status,
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    /// Retained across recovery so operators can still see the most recent
    /// error while the target is healthy.
    pub last_error: Option<String>,
    pub last_value: Option<f64>,
    /// First successful reading for a price tracker; cleared by an explicit
    /// baseline reset.
    pub baseline: Option<f64>,
    pub history: VecDeque<HistoryEntry>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            status: Status::Unknown,
            consecutive_failures: 0,
            last_check: None,
            last_success: None,
            last_error: None,
            last_value: None,
            baseline: None,
            history: VecDeque::new(),
        }
    }
}

impl TargetState {
    /// Append one history entry, dropping the oldest past capacity.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}

/// One entry in the bounded per-target history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub status: Status,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Severity class of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentKind {
    Degraded,
    Unhealthy,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Degraded => "degraded",
            IncidentKind::Unhealthy => "unhealthy",
        }
    }
}

/// A recorded span of degraded/unhealthy status for a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub target_id: i64,
    pub kind: IncidentKind,
    pub started_at: DateTime<Utc>,
    /// None while the incident is open.
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub trigger_error: Option<String>,
}

/// Which targets an alert rule or maintenance window applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Target { id: i64 },
    Group { name: String },
}

/// Routing rule mapping alerts to one notification channel.
///
/// All matching enabled rules fire; a global rule is not shadowed by a
/// narrower one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub scope: RuleScope,
    /// Legacy tag routing: empty matches every target, non-empty requires at
    /// least one tag in common.
    #[serde(default)]
    pub tags: Vec<String>,
    pub channel: ChannelConfig,
    pub on_failure: bool,
    pub on_recovery: bool,
    pub enabled: bool,
}

/// Scope of a maintenance window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum WindowScope {
    Target { id: i64 },
    Group { name: String },
}

/// A scheduled time range suppressing execution and/or alerting.
/// The range is half-open: `[starts_at, ends_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: i64,
    pub scope: WindowScope,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub suppress_alerts: bool,
    pub skip_checks: bool,
}

/// What kind of state change an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Failure,
    Recovery,
    DropBelow,
    RiseAbove,
    PctDrop,
    PctRise,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failure => "failure",
            AlertKind::Recovery => "recovery",
            AlertKind::DropBelow => "drop_below",
            AlertKind::RiseAbove => "rise_above",
            AlertKind::PctDrop => "pct_drop",
            AlertKind::PctRise => "pct_rise",
        }
    }
}

/// Ephemeral alert snapshot, built once per intent and fanned out unmodified
/// to every matched channel.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub kind: AlertKind,
    pub target_id: i64,
    pub target_name: String,
    pub tags: Vec<String>,
    pub status: Status,
    pub consecutive_failures: u32,
    pub value: Option<f64>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl AlertPayload {
    /// Title line shared by all channels.
    pub fn title(&self) -> String {
        match self.kind {
            AlertKind::Failure => format!("DOWN: {}", self.target_name),
            AlertKind::Recovery => format!("RECOVERED: {}", self.target_name),
            other => format!("ALERT: {} ({})", self.target_name, other.as_str()),
        }
    }
}

/// One append-only record per probe, handed to the analytics sink.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub at: DateTime<Utc>,
    pub target_id: i64,
    pub target_name: String,
    pub status: Status,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub value: Option<f64>,
}
