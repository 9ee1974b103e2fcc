//! Evaluation orchestrator: one sequential pass over all enabled targets.
//!
//! Targets are evaluated strictly one at a time, each including its alert
//! dispatch, which bounds outbound concurrency and keeps the hot-state write
//! a single end-of-run operation. No per-target error aborts the rest of the
//! run.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::alert::AlertRouter;
use crate::assertion;
use crate::db::{DbError, Store};
use crate::incident::IncidentTracker;
use crate::maintenance;
use crate::model::{
    AlertKind, AlertPayload, AlertRule, HistoryRecord, MaintenanceWindow, ProbeSpec, TargetConfig,
};
use crate::probe::ProbeExecutor;
use crate::state::{self, Evaluation};
use crate::state_store::{HotState, StateStore, StateStoreError};

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("state store error: {0}")]
    State(#[from] StateStoreError),
}

pub struct Engine {
    store: Arc<Store>,
    state_store: StateStore,
    executor: ProbeExecutor,
    router: AlertRouter,
    incidents: IncidentTracker,
    hot: HotState,
}

impl Engine {
    /// Build an engine, loading the last persisted hot state.
    pub fn new(
        store: Arc<Store>,
        state_store: StateStore,
        executor: ProbeExecutor,
        router: AlertRouter,
    ) -> Self {
        let hot = state_store.load();
        let incidents = IncidentTracker::new(store.clone());
        Self {
            store,
            state_store,
            executor,
            router,
            incidents,
            hot,
        }
    }

    /// Run one evaluation cycle over all enabled targets.
    ///
    /// The hot-state write at the end is the only fatal failure: the cycle's
    /// computed work is lost, but committed state is never corrupted.
    pub async fn run_cycle(&mut self) -> Result<(), EngineError> {
        let targets = self.store.enabled_targets()?;
        let rules = self.store.enabled_alert_rules()?;
        let windows = self.store.maintenance_windows()?;

        tracing::info!("evaluating {} targets", targets.len());

        for target in &targets {
            if let Err(e) = self.run_target(target, &rules, &windows).await {
                tracing::error!("evaluation of target {} failed: {}", target.name, e);
            }
        }

        self.hot.last_run = Some(Utc::now());
        self.state_store.save(&self.hot)?;
        Ok(())
    }

    async fn run_target(
        &mut self,
        target: &TargetConfig,
        rules: &[AlertRule],
        windows: &[MaintenanceWindow],
    ) -> Result<(), EngineError> {
        let decision = maintenance::decide(windows, target, Utc::now());
        if decision.skip_checks {
            tracing::info!("skipping {} (maintenance window)", target.name);
            return Ok(());
        }

        let mut outcome = self.executor.execute(target).await;
        let now = Utc::now();

        // Fold the predicate verdict into the outcome. Price trackers
        // additionally evaluate their threshold rules against the baseline.
        let mut threshold_alerts: Vec<AlertKind> = Vec::new();
        match &target.spec {
            ProbeSpec::Check(spec) => {
                if outcome.success {
                    let verdict = assertion::evaluate_check(&outcome, &spec.assertions);
                    if !verdict.passed {
                        outcome.success = false;
                        outcome.error = verdict.reason;
                    }
                }
            }
            ProbeSpec::Price(spec) => {
                if outcome.success {
                    if let Some(value) = outcome.value {
                        let baseline =
                            self.hot.targets.get(&target.id).and_then(|s| s.baseline);
                        threshold_alerts = assertion::evaluate_price(value, &spec.rules, baseline);
                    }
                }
            }
        }

        // Price trackers alert on every error and recover on the next
        // success, so they run the state machine with a threshold of one.
        let threshold = match &target.spec {
            ProbeSpec::Check(_) => target.failure_threshold,
            ProbeSpec::Price(_) => 1,
        };

        let state = self.hot.targets.entry(target.id).or_default();
        let eval = Evaluation {
            passed: outcome.success,
            elapsed_ms: outcome.elapsed_ms,
            value: outcome.value,
            error: outcome.error.clone(),
        };
        let transition_alert = state::apply(state, &eval, threshold, now);

        if outcome.success && matches!(target.spec, ProbeSpec::Price(_)) && state.baseline.is_none()
        {
            state.baseline = outcome.value;
        }

        let status = state.status;
        let consecutive_failures = state.consecutive_failures;

        self.incidents
            .record_transition(target.id, status, outcome.error.as_deref(), now)?;

        let mut intents: Vec<AlertKind> = Vec::new();
        intents.extend(transition_alert);
        intents.extend(threshold_alerts);

        if !intents.is_empty() {
            if decision.suppress_alerts {
                tracing::info!(
                    "suppressing {} alert(s) for {} (maintenance window)",
                    intents.len(),
                    target.name
                );
            } else {
                for kind in intents {
                    let payload = AlertPayload {
                        kind,
                        target_id: target.id,
                        target_name: target.name.clone(),
                        tags: target.tags.clone(),
                        status,
                        consecutive_failures,
                        value: outcome.value,
                        elapsed_ms: outcome.elapsed_ms,
                        error: outcome.error.clone(),
                        at: now,
                    };
                    self.router.dispatch(rules, target, payload).await;
                }
            }
        }

        self.store.append_history(&HistoryRecord {
            at: now,
            target_id: target.id,
            target_name: target.name.clone(),
            status,
            error: outcome.error.clone(),
            elapsed_ms: outcome.elapsed_ms,
            value: outcome.value,
        })?;

        Ok(())
    }

    /// Clear a price tracker's baseline; the next successful reading
    /// re-establishes it.
    pub fn reset_baseline(&mut self, target_id: i64) {
        if let Some(state) = self.hot.targets.get_mut(&target_id) {
            state.baseline = None;
            tracing::info!("baseline reset for target {}", target_id);
        }
    }

    /// Read access to the in-memory hot state.
    pub fn hot_state(&self) -> &HotState {
        &self.hot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ChannelSecrets;
    use crate::model::{CheckSpec, Status, WindowScope};
    use chrono::Duration;
    use tempfile::TempDir;

    fn engine_with(dir: &TempDir) -> (Arc<Store>, Engine) {
        let store = Arc::new(Store::new(dir.path().join("cfg.db")).unwrap());
        let state_store = StateStore::new(dir.path().join("state.json"));
        let engine = Engine::new(
            store.clone(),
            state_store,
            ProbeExecutor::new(),
            AlertRouter::new(ChannelSecrets::default()),
        );
        (store, engine)
    }

    fn refused_target(store: &Store) -> TargetConfig {
        let mut target = TargetConfig {
            name: "refused".to_string(),
            spec: ProbeSpec::Check(CheckSpec {
                url: "http://127.0.0.1:1/health".to_string(),
                ..Default::default()
            }),
            timeout_ms: 1000,
            failure_threshold: 1,
            ..Default::default()
        };
        store.add_target(&mut target).unwrap();
        target
    }

    #[tokio::test]
    async fn test_skip_checks_window_prevents_probe_and_state_update() {
        let dir = TempDir::new().unwrap();
        let (store, mut engine) = engine_with(&dir);
        let target = refused_target(&store);

        let now = Utc::now();
        let mut window = MaintenanceWindow {
            id: 0,
            scope: WindowScope::Target { id: target.id },
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            suppress_alerts: false,
            skip_checks: true,
        };
        store.add_maintenance_window(&mut window).unwrap();

        engine.run_cycle().await.unwrap();

        // The probe never ran: no state entry, no history, no incident.
        assert!(engine.hot_state().targets.get(&target.id).is_none());
        assert!(store.recent_history(target.id, 10).unwrap().is_empty());
        assert!(store.open_incident(target.id).unwrap().is_none());
        assert!(engine.hot_state().last_run.is_some());
    }

    #[tokio::test]
    async fn test_suppress_alerts_window_still_updates_state_and_incidents() {
        let dir = TempDir::new().unwrap();
        let (store, mut engine) = engine_with(&dir);
        let target = refused_target(&store);

        let now = Utc::now();
        let mut window = MaintenanceWindow {
            id: 0,
            scope: WindowScope::Target { id: target.id },
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            suppress_alerts: true,
            skip_checks: false,
        };
        store.add_maintenance_window(&mut window).unwrap();

        engine.run_cycle().await.unwrap();

        let state = &engine.hot_state().targets[&target.id];
        assert_eq!(state.status, Status::Unhealthy);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.history.len(), 1);
        assert_eq!(store.recent_history(target.id, 10).unwrap().len(), 1);
        assert!(store.open_incident(target.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_state_survives_reload_between_cycles() {
        let dir = TempDir::new().unwrap();
        let (store, mut engine) = engine_with(&dir);
        let target = refused_target(&store);

        engine.run_cycle().await.unwrap();
        drop(engine);

        // A new engine picks up the persisted hot state.
        let state_store = StateStore::new(dir.path().join("state.json"));
        let engine = Engine::new(
            store,
            state_store,
            ProbeExecutor::new(),
            AlertRouter::new(ChannelSecrets::default()),
        );
        let state = &engine.hot_state().targets[&target.id];
        assert_eq!(state.status, Status::Unhealthy);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_reset_baseline() {
        let dir = TempDir::new().unwrap();
        let (_store, mut engine) = engine_with(&dir);
        engine
            .hot
            .targets
            .insert(4, crate::model::TargetState {
                baseline: Some(100.0),
                ..Default::default()
            });
        engine.reset_baseline(4);
        assert!(engine.hot_state().targets[&4].baseline.is_none());
    }
}
