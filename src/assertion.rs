//! Pass/fail predicates over probe outcomes.
//!
//! Uptime checks evaluate a conjunction of assertions (all must pass,
//! short-circuiting on the first failure). Price trackers evaluate a
//! disjunction of independent threshold rules, any subset of which can fire
//! from a single reading.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{AlertKind, HttpExchange, PriceRules, ProbeOutcome};

/// One assertion over an HTTP check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assertion {
    StatusEquals { status: u16 },
    StatusNotEquals { status: u16 },
    ElapsedBelow { ms: u64 },
    HeaderEquals { name: String, value: String },
    HeaderNotEquals { name: String, value: String },
    HeaderContains { name: String, value: String },
    HeaderMatches { name: String, pattern: String },
    BodyEquals { value: String },
    BodyNotEquals { value: String },
    BodyContains { value: String },
    BodyMatches { pattern: String },
}

/// Result of evaluating a check predicate.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub passed: bool,
    /// Description of the first failing assertion.
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn fail(reason: String) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate an uptime check's assertion conjunction against an outcome.
///
/// An empty assertion list defaults to "status code equals 200".
pub fn evaluate_check(outcome: &ProbeOutcome, assertions: &[Assertion]) -> Verdict {
    if !outcome.success {
        return Verdict {
            passed: false,
            reason: outcome.error.clone(),
        };
    }

    let Some(http) = &outcome.http else {
        return Verdict::fail("no HTTP response to evaluate".to_string());
    };

    if assertions.is_empty() {
        if http.status == 200 {
            return Verdict::pass();
        }
        return Verdict::fail(format!("expected status 200, got {}", http.status));
    }

    for assertion in assertions {
        if let Some(reason) = check_one(assertion, outcome, http) {
            return Verdict::fail(reason);
        }
    }
    Verdict::pass()
}

/// Returns the failure description if the assertion does not hold.
fn check_one(assertion: &Assertion, outcome: &ProbeOutcome, http: &HttpExchange) -> Option<String> {
    match assertion {
        Assertion::StatusEquals { status } => (http.status != *status)
            .then(|| format!("expected status {}, got {}", status, http.status)),
        Assertion::StatusNotEquals { status } => {
            (http.status == *status).then(|| format!("status must not be {}", status))
        }
        Assertion::ElapsedBelow { ms } => (outcome.elapsed_ms >= *ms).then(|| {
            format!(
                "response took {}ms, limit is {}ms",
                outcome.elapsed_ms, ms
            )
        }),
        Assertion::HeaderEquals { name, value } => match find_header(http, name) {
            None => Some(format!("header {} missing", name)),
            Some(got) if got != value.as_str() => Some(format!(
                "header {} is {:?}, expected {:?}",
                name, got, value
            )),
            Some(_) => None,
        },
        Assertion::HeaderNotEquals { name, value } => match find_header(http, name) {
            Some(got) if got == value.as_str() => {
                Some(format!("header {} must not be {:?}", name, value))
            }
            _ => None,
        },
        Assertion::HeaderContains { name, value } => match find_header(http, name) {
            None => Some(format!("header {} missing", name)),
            Some(got) if !got.contains(value.as_str()) => Some(format!(
                "header {} is {:?}, expected it to contain {:?}",
                name, got, value
            )),
            Some(_) => None,
        },
        Assertion::HeaderMatches { name, pattern } => match find_header(http, name) {
            None => Some(format!("header {} missing", name)),
            Some(got) => match_against(pattern, got)
                .map(|desc| format!("header {}: {}", name, desc)),
        },
        Assertion::BodyEquals { value } => (http.body != *value)
            .then(|| format!("body does not equal expected text ({} bytes)", value.len())),
        Assertion::BodyNotEquals { value } => {
            (http.body == *value).then(|| "body equals forbidden text".to_string())
        }
        Assertion::BodyContains { value } => (!http.body.contains(value.as_str()))
            .then(|| format!("body does not contain {:?}", value)),
        Assertion::BodyMatches { pattern } => match_against(pattern, &http.body),
    }
}

/// Case-insensitive header lookup; first match wins.
fn find_header<'a>(http: &'a HttpExchange, name: &str) -> Option<&'a str> {
    http.headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Returns a failure description if `text` does not match `pattern`.
fn match_against(pattern: &str, text: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(re) => (!re.is_match(text)).then(|| format!("no match for pattern {:?}", pattern)),
        Err(e) => Some(format!("invalid pattern {:?}: {}", pattern, e)),
    }
}

/// Evaluate a price tracker's threshold rules against the newest reading.
///
/// Each enabled rule is checked independently; more than one can fire.
/// Percentage change is computed against `baseline`, the first successful
/// reading recorded for the target.
pub fn evaluate_price(value: f64, rules: &PriceRules, baseline: Option<f64>) -> Vec<AlertKind> {
    let mut fired = Vec::new();

    if let Some(limit) = rules.alert_below {
        if value < limit {
            fired.push(AlertKind::DropBelow);
        }
    }
    if let Some(limit) = rules.alert_above {
        if value > limit {
            fired.push(AlertKind::RiseAbove);
        }
    }

    if let Some(baseline) = baseline.filter(|b| *b != 0.0) {
        let pct = (value - baseline) / baseline * 100.0;
        if let Some(drop) = rules.alert_pct_drop {
            if pct <= -drop {
                fired.push(AlertKind::PctDrop);
            }
        }
        if let Some(rise) = rules.alert_pct_rise {
            if pct >= rise {
                fired.push(AlertKind::PctRise);
            }
        }
    }

    fired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_outcome(status: u16, elapsed_ms: u64, body: &str) -> ProbeOutcome {
        ProbeOutcome {
            success: true,
            value: Some(status as f64),
            elapsed_ms,
            error: None,
            http: Some(HttpExchange {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.to_string(),
            }),
        }
    }

    #[test]
    fn test_default_predicate_is_status_200() {
        let outcome = ok_outcome(200, 50, "");
        assert!(evaluate_check(&outcome, &[]).passed);

        let outcome = ok_outcome(503, 50, "");
        let verdict = evaluate_check(&outcome, &[]);
        assert!(!verdict.passed);
        assert_eq!(verdict.reason.as_deref(), Some("expected status 200, got 503"));
    }

    #[test]
    fn test_conjunction_short_circuits_on_first_failure() {
        let outcome = ok_outcome(200, 900, "hello");
        let assertions = vec![
            Assertion::StatusEquals { status: 200 },
            Assertion::ElapsedBelow { ms: 500 },
            Assertion::BodyContains {
                value: "nope".to_string(),
            },
        ];
        let verdict = evaluate_check(&outcome, &assertions);
        assert!(!verdict.passed);
        // The elapsed assertion fails first; the body assertion is never reached.
        assert_eq!(
            verdict.reason.as_deref(),
            Some("response took 900ms, limit is 500ms")
        );
    }

    #[test]
    fn test_header_assertions() {
        let outcome = ok_outcome(200, 10, "");
        assert!(
            evaluate_check(
                &outcome,
                &[Assertion::HeaderContains {
                    name: "Content-Type".to_string(),
                    value: "json".to_string(),
                }]
            )
            .passed
        );
        let verdict = evaluate_check(
            &outcome,
            &[Assertion::HeaderEquals {
                name: "x-missing".to_string(),
                value: "1".to_string(),
            }],
        );
        assert_eq!(verdict.reason.as_deref(), Some("header x-missing missing"));
    }

    #[test]
    fn test_body_regex() {
        let outcome = ok_outcome(200, 10, r#"{"status":"ok","uptime":123}"#);
        assert!(
            evaluate_check(
                &outcome,
                &[Assertion::BodyMatches {
                    pattern: r#""status":"ok""#.to_string(),
                }]
            )
            .passed
        );
        let verdict = evaluate_check(
            &outcome,
            &[Assertion::BodyMatches {
                pattern: "[".to_string(),
            }],
        );
        assert!(!verdict.passed, "invalid pattern must fail the assertion");
    }

    #[test]
    fn test_transport_failure_keeps_probe_error() {
        let outcome = ProbeOutcome::failed("timeout after 5000ms".to_string(), 5000);
        let verdict = evaluate_check(&outcome, &[Assertion::StatusEquals { status: 200 }]);
        assert!(!verdict.passed);
        assert_eq!(verdict.reason.as_deref(), Some("timeout after 5000ms"));
    }

    #[test]
    fn test_pct_drop_fires_alone() {
        // 12% below a baseline of 100, alert_below unset.
        let rules = PriceRules {
            alert_pct_drop: Some(10.0),
            ..Default::default()
        };
        let fired = evaluate_price(88.0, &rules, Some(100.0));
        assert_eq!(fired, vec![AlertKind::PctDrop]);
    }

    #[test]
    fn test_drop_below_and_pct_drop_fire_together() {
        let rules = PriceRules {
            alert_below: Some(90.0),
            alert_pct_drop: Some(10.0),
            ..Default::default()
        };
        let fired = evaluate_price(85.0, &rules, Some(100.0));
        assert_eq!(fired, vec![AlertKind::DropBelow, AlertKind::PctDrop]);
    }

    #[test]
    fn test_rise_rules() {
        let rules = PriceRules {
            alert_above: Some(110.0),
            alert_pct_rise: Some(5.0),
            ..Default::default()
        };
        assert_eq!(
            evaluate_price(112.0, &rules, Some(100.0)),
            vec![AlertKind::RiseAbove, AlertKind::PctRise]
        );
        assert!(evaluate_price(104.0, &rules, Some(100.0)).is_empty());
    }

    #[test]
    fn test_pct_rules_need_baseline() {
        let rules = PriceRules {
            alert_pct_drop: Some(10.0),
            ..Default::default()
        };
        assert!(evaluate_price(1.0, &rules, None).is_empty());
        assert!(evaluate_price(1.0, &rules, Some(0.0)).is_empty());
    }
}
