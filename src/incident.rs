//! Incident lifecycle bookkeeping keyed to state-machine transitions.
//!
//! At most one incident is open per target at any time. A degraded target
//! escalating to unhealthy is the same outage continuing: the open row's
//! kind is updated, no second row is opened.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DbError, Store};
use crate::model::{IncidentKind, Status};

pub struct IncidentTracker {
    store: Arc<Store>,
}

impl IncidentTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Update the incident ledger after a state-machine evaluation.
    pub fn record_transition(
        &self,
        target_id: i64,
        new_status: Status,
        trigger_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let open = self.store.open_incident(target_id)?;

        match new_status {
            Status::Degraded | Status::Unhealthy => {
                let kind = if new_status == Status::Unhealthy {
                    IncidentKind::Unhealthy
                } else {
                    IncidentKind::Degraded
                };
                match open {
                    None => {
                        let id =
                            self.store
                                .open_new_incident(target_id, kind, trigger_error, now)?;
                        tracing::info!(
                            "opened {} incident {} for target {}",
                            kind.as_str(),
                            id,
                            target_id
                        );
                    }
                    Some(incident)
                        if incident.kind == IncidentKind::Degraded
                            && kind == IncidentKind::Unhealthy =>
                    {
                        self.store.escalate_incident(incident.id, kind)?;
                        tracing::info!(
                            "escalated incident {} for target {} to unhealthy",
                            incident.id,
                            target_id
                        );
                    }
                    Some(_) => {}
                }
            }
            Status::Healthy => {
                if let Some(incident) = open {
                    self.store.resolve_incident(incident.id, now)?;
                    tracing::info!(
                        "resolved incident {} for target {}",
                        incident.id,
                        target_id
                    );
                }
            }
            Status::Unknown => {}
        }

        Ok(())
    }
}
