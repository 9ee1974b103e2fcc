//! Per-target health state machine.
//!
//! Repeated outcomes are folded into a health status with hysteresis: a
//! target only becomes unhealthy after `failure_threshold` consecutive
//! failures, and each evaluation emits at most one alert intent.

use chrono::{DateTime, Utc};

use crate::model::{AlertKind, HistoryEntry, Status, TargetState};

/// One judged probe result fed into the state machine.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub passed: bool,
    pub elapsed_ms: u64,
    pub value: Option<f64>,
    pub error: Option<String>,
}

/// Apply one evaluation to the target's state.
///
/// Returns the alert intent for this transition, if any:
/// - `Recovery` iff a passing probe leaves a previously `Unhealthy` status.
///   A degraded target recovering is silent, since entering degraded never
///   alerted.
/// - `Failure` iff the consecutive-failure count reaches the threshold and
///   the target was not already `Unhealthy` (no repeat alerts while
///   sustained down).
///
/// Every evaluation appends exactly one history entry.
pub fn apply(
    state: &mut TargetState,
    eval: &Evaluation,
    failure_threshold: u32,
    now: DateTime<Utc>,
) -> Option<AlertKind> {
    let prior = state.status;
    state.last_check = Some(now);
    if eval.value.is_some() {
        state.last_value = eval.value;
    }

    let alert = if eval.passed {
        state.consecutive_failures = 0;
        state.status = Status::Healthy;
        state.last_success = Some(now);
        // last_error is deliberately retained across recovery.
        (prior == Status::Unhealthy).then_some(AlertKind::Recovery)
    } else {
        state.consecutive_failures += 1;
        state.last_error = eval.error.clone();
        if state.consecutive_failures >= failure_threshold.max(1) {
            state.status = Status::Unhealthy;
            (prior != Status::Unhealthy).then_some(AlertKind::Failure)
        } else {
            state.status = Status::Degraded;
            None
        }
    };

    state.push_history(HistoryEntry {
        at: now,
        status: state.status,
        elapsed_ms: eval.elapsed_ms,
        error: eval.error.clone(),
    });

    alert
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HISTORY_CAPACITY;

    fn pass() -> Evaluation {
        Evaluation {
            passed: true,
            elapsed_ms: 40,
            value: Some(200.0),
            error: None,
        }
    }

    fn fail(error: &str) -> Evaluation {
        Evaluation {
            passed: false,
            elapsed_ms: 40,
            value: None,
            error: Some(error.to_string()),
        }
    }

    fn state_with(status: Status, consecutive_failures: u32) -> TargetState {
        TargetState {
            status,
            consecutive_failures,
            ..Default::default()
        }
    }

    #[test]
    fn test_transition_table() {
        // (prior status, prior failures, passed, threshold) -> (new status, alert)
        let cases: Vec<(Status, u32, bool, u32, Status, Option<AlertKind>)> = vec![
            (Status::Unknown, 0, true, 3, Status::Healthy, None),
            (Status::Unknown, 0, false, 3, Status::Degraded, None),
            (Status::Healthy, 0, false, 3, Status::Degraded, None),
            (Status::Degraded, 2, false, 3, Status::Unhealthy, Some(AlertKind::Failure)),
            (Status::Unhealthy, 3, false, 3, Status::Unhealthy, None),
            (Status::Unhealthy, 3, true, 3, Status::Healthy, Some(AlertKind::Recovery)),
            (Status::Healthy, 0, true, 3, Status::Healthy, None),
            (Status::Degraded, 1, true, 3, Status::Healthy, None),
            // threshold=1 fires immediately on the very first failure
            (Status::Unknown, 0, false, 1, Status::Unhealthy, Some(AlertKind::Failure)),
        ];

        for (prior, failures, passed, threshold, expected_status, expected_alert) in cases {
            let mut state = state_with(prior, failures);
            let eval = if passed { pass() } else { fail("boom") };
            let alert = apply(&mut state, &eval, threshold, Utc::now());
            assert_eq!(
                state.status, expected_status,
                "prior={:?} failures={} passed={} threshold={}",
                prior, failures, passed, threshold
            );
            assert_eq!(
                alert, expected_alert,
                "prior={:?} failures={} passed={} threshold={}",
                prior, failures, passed, threshold
            );
        }
    }

    #[test]
    fn test_consecutive_failures_zero_when_healthy() {
        let mut state = state_with(Status::Unhealthy, 7);
        apply(&mut state, &pass(), 3, Utc::now());
        assert_eq!(state.status, Status::Healthy);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_degraded_recovery_is_silent() {
        let mut state = state_with(Status::Degraded, 1);
        let alert = apply(&mut state, &pass(), 3, Utc::now());
        assert_eq!(state.status, Status::Healthy);
        assert_eq!(alert, None);
    }

    #[test]
    fn test_last_error_retained_across_recovery() {
        let mut state = TargetState::default();
        apply(&mut state, &fail("connection refused"), 1, Utc::now());
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
        apply(&mut state, &pass(), 1, Utc::now());
        assert_eq!(state.status, Status::Healthy);
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_end_to_end_threshold_two() {
        let mut state = TargetState::default();
        let threshold = 2;

        let alert = apply(&mut state, &fail("503"), threshold, Utc::now());
        assert_eq!(state.status, Status::Degraded);
        assert_eq!(alert, None);

        let alert = apply(&mut state, &fail("503"), threshold, Utc::now());
        assert_eq!(state.status, Status::Unhealthy);
        assert_eq!(alert, Some(AlertKind::Failure));

        let alert = apply(&mut state, &fail("503"), threshold, Utc::now());
        assert_eq!(state.status, Status::Unhealthy);
        assert_eq!(alert, None);

        let alert = apply(&mut state, &pass(), threshold, Utc::now());
        assert_eq!(state.status, Status::Healthy);
        assert_eq!(alert, Some(AlertKind::Recovery));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.history.len(), 4);
    }

    #[test]
    fn test_history_appended_every_evaluation_and_bounded() {
        let mut state = TargetState::default();
        for _ in 0..HISTORY_CAPACITY + 5 {
            apply(&mut state, &pass(), 3, Utc::now());
        }
        assert_eq!(state.history.len(), HISTORY_CAPACITY);
    }
}
