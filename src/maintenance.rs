//! Maintenance window suppression.

use chrono::{DateTime, Utc};

use crate::model::{MaintenanceWindow, TargetConfig, WindowScope};

/// What an active maintenance window asks of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowDecision {
    /// Do not execute the probe at all: state, history, and incidents stay
    /// untouched for this cycle.
    pub skip_checks: bool,
    /// Execute normally but discard any computed alert intent.
    pub suppress_alerts: bool,
}

/// Combine every window matching the target whose `[starts_at, ends_at)`
/// range contains `now`. Flags from multiple active windows are OR-ed.
pub fn decide(
    windows: &[MaintenanceWindow],
    target: &TargetConfig,
    now: DateTime<Utc>,
) -> WindowDecision {
    let mut decision = WindowDecision::default();
    for window in windows {
        if !scope_matches(&window.scope, target) {
            continue;
        }
        if now < window.starts_at || now >= window.ends_at {
            continue;
        }
        decision.skip_checks |= window.skip_checks;
        decision.suppress_alerts |= window.suppress_alerts;
    }
    decision
}

fn scope_matches(scope: &WindowScope, target: &TargetConfig) -> bool {
    match scope {
        WindowScope::Target { id } => *id == target.id,
        WindowScope::Group { name } => target.group.as_deref() == Some(name.as_str()),
    }
}
