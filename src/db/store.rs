//! SQLite database store implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::alert::ChannelConfig;
use crate::model::{
    AlertRule, HistoryRecord, Incident, IncidentKind, MaintenanceWindow, RuleScope, Status,
    TargetConfig, WindowScope,
};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    spec TEXT NOT NULL,
    timeout_ms INTEGER NOT NULL DEFAULT 5000,
    retry_count INTEGER NOT NULL DEFAULT 0,
    retry_delay_ms INTEGER NOT NULL DEFAULT 1000,
    failure_threshold INTEGER NOT NULL DEFAULT 3,
    tags TEXT NOT NULL DEFAULT '[]',
    group_name TEXT,
    enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS alert_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    channel TEXT NOT NULL,
    on_failure INTEGER NOT NULL DEFAULT 1,
    on_recovery INTEGER NOT NULL DEFAULT 1,
    enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS maintenance_windows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    suppress_alerts INTEGER NOT NULL DEFAULT 1,
    skip_checks INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    resolved_at TEXT,
    duration_secs INTEGER,
    trigger_error TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_open
    ON incidents(target_id) WHERE resolved_at IS NULL;

CREATE TABLE IF NOT EXISTS probe_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    target_name TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    elapsed_ms INTEGER NOT NULL,
    value REAL
);
CREATE INDEX IF NOT EXISTS idx_probe_history_target_time
    ON probe_history(target_id, time);
";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // --- Targets ---

    /// Add a new target and return its ID.
    pub fn add_target(&self, target: &mut TargetConfig) -> Result<i64, DbError> {
        if target.timeout_ms == 0 {
            target.timeout_ms = 5000;
        }
        if target.failure_threshold == 0 {
            target.failure_threshold = 1;
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO targets (name, spec, timeout_ms, retry_count, retry_delay_ms, failure_threshold, tags, group_name, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                target.name,
                serde_json::to_string(&target.spec)?,
                target.timeout_ms,
                target.retry_count,
                target.retry_delay_ms,
                target.failure_threshold,
                serde_json::to_string(&target.tags)?,
                target.group,
                target.enabled,
            ],
        )?;
        let id = conn.last_insert_rowid();
        target.id = id;
        Ok(id)
    }

    /// Update an existing target.
    pub fn update_target(&self, target: &TargetConfig) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE targets SET name=?1, spec=?2, timeout_ms=?3, retry_count=?4, retry_delay_ms=?5, failure_threshold=?6, tags=?7, group_name=?8, enabled=?9 WHERE id=?10",
            params![
                target.name,
                serde_json::to_string(&target.spec)?,
                target.timeout_ms,
                target.retry_count,
                target.retry_delay_ms,
                target.failure_threshold,
                serde_json::to_string(&target.tags)?,
                target.group,
                target.enabled,
                target.id,
            ],
        )?;
        Ok(())
    }

    /// Get all targets.
    pub fn get_targets(&self) -> Result<Vec<TargetConfig>, DbError> {
        self.query_targets("SELECT id, name, spec, timeout_ms, retry_count, retry_delay_ms, failure_threshold, tags, group_name, enabled FROM targets ORDER BY id")
    }

    /// Get enabled targets, in stable id order.
    pub fn enabled_targets(&self) -> Result<Vec<TargetConfig>, DbError> {
        self.query_targets("SELECT id, name, spec, timeout_ms, retry_count, retry_delay_ms, failure_threshold, tags, group_name, enabled FROM targets WHERE enabled = 1 ORDER BY id")
    }

    fn query_targets(&self, sql: &str) -> Result<Vec<TargetConfig>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let targets = stmt
            .query_map([], |row| {
                let spec_json: String = row.get(2)?;
                let tags_json: String = row.get(7)?;
                Ok(TargetConfig {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    spec: decode_json(2, &spec_json)?,
                    timeout_ms: row.get(3)?,
                    retry_count: row.get(4)?,
                    retry_delay_ms: row.get(5)?,
                    failure_threshold: row.get(6)?,
                    tags: decode_json(7, &tags_json)?,
                    group: row.get(8)?,
                    enabled: row.get(9)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(targets)
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<TargetConfig, DbError> {
        let conn = self.conn.lock().unwrap();
        let target = conn.query_row(
            "SELECT id, name, spec, timeout_ms, retry_count, retry_delay_ms, failure_threshold, tags, group_name, enabled FROM targets WHERE id = ?1",
            params![id],
            |row| {
                let spec_json: String = row.get(2)?;
                let tags_json: String = row.get(7)?;
                Ok(TargetConfig {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    spec: decode_json(2, &spec_json)?,
                    timeout_ms: row.get(3)?,
                    retry_count: row.get(4)?,
                    retry_delay_ms: row.get(5)?,
                    failure_threshold: row.get(6)?,
                    tags: decode_json(7, &tags_json)?,
                    group: row.get(8)?,
                    enabled: row.get(9)?,
                })
            },
        )?;
        Ok(target)
    }

    /// Delete a target along with its incidents and history.
    pub fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM incidents WHERE target_id = ?1", params![id])?;
        conn.execute("DELETE FROM probe_history WHERE target_id = ?1", params![id])?;
        conn.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Alert rules ---

    /// Add a new alert rule and return its ID.
    pub fn add_alert_rule(&self, rule: &mut AlertRule) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alert_rules (scope, tags, channel, on_failure, on_recovery, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                serde_json::to_string(&rule.scope)?,
                serde_json::to_string(&rule.tags)?,
                serde_json::to_string(&rule.channel)?,
                rule.on_failure,
                rule.on_recovery,
                rule.enabled,
            ],
        )?;
        let id = conn.last_insert_rowid();
        rule.id = id;
        Ok(id)
    }

    /// Get the enabled alert rules.
    pub fn enabled_alert_rules(&self) -> Result<Vec<AlertRule>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, scope, tags, channel, on_failure, on_recovery, enabled FROM alert_rules WHERE enabled = 1 ORDER BY id",
        )?;
        let rules = stmt
            .query_map([], |row| {
                let scope_json: String = row.get(1)?;
                let tags_json: String = row.get(2)?;
                let channel_json: String = row.get(3)?;
                let scope: RuleScope = decode_json(1, &scope_json)?;
                let channel: ChannelConfig = decode_json(3, &channel_json)?;
                Ok(AlertRule {
                    id: row.get(0)?,
                    scope,
                    tags: decode_json(2, &tags_json)?,
                    channel,
                    on_failure: row.get(4)?,
                    on_recovery: row.get(5)?,
                    enabled: row.get(6)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(rules)
    }

    /// Delete an alert rule.
    pub fn delete_alert_rule(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM alert_rules WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Maintenance windows ---

    /// Add a maintenance window and return its ID.
    pub fn add_maintenance_window(&self, window: &mut MaintenanceWindow) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO maintenance_windows (scope, starts_at, ends_at, suppress_alerts, skip_checks)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                serde_json::to_string(&window.scope)?,
                window.starts_at.to_rfc3339(),
                window.ends_at.to_rfc3339(),
                window.suppress_alerts,
                window.skip_checks,
            ],
        )?;
        let id = conn.last_insert_rowid();
        window.id = id;
        Ok(id)
    }

    /// Get all maintenance windows.
    pub fn maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, scope, starts_at, ends_at, suppress_alerts, skip_checks FROM maintenance_windows ORDER BY id",
        )?;
        let windows = stmt
            .query_map([], |row| {
                let scope_json: String = row.get(1)?;
                let starts: String = row.get(2)?;
                let ends: String = row.get(3)?;
                let scope: WindowScope = decode_json(1, &scope_json)?;
                Ok(MaintenanceWindow {
                    id: row.get(0)?,
                    scope,
                    starts_at: parse_time(2, &starts)?,
                    ends_at: parse_time(3, &ends)?,
                    suppress_alerts: row.get(4)?,
                    skip_checks: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(windows)
    }

    /// Delete a maintenance window.
    pub fn delete_maintenance_window(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM maintenance_windows WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Incidents ---

    /// The currently open incident for a target, if any.
    pub fn open_incident(&self, target_id: i64) -> Result<Option<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_id, kind, started_at, resolved_at, duration_secs, trigger_error
             FROM incidents WHERE target_id = ?1 AND resolved_at IS NULL",
        )?;
        let mut rows = stmt
            .query_map(params![target_id], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(rows.pop())
    }

    /// Open a new incident and return its ID.
    pub fn open_new_incident(
        &self,
        target_id: i64,
        kind: IncidentKind,
        trigger_error: Option<&str>,
        started_at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO incidents (target_id, kind, started_at, trigger_error) VALUES (?1, ?2, ?3, ?4)",
            params![target_id, kind.as_str(), started_at.to_rfc3339(), trigger_error],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Escalate an open incident to a new severity kind.
    pub fn escalate_incident(&self, id: i64, kind: IncidentKind) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE incidents SET kind = ?1 WHERE id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(())
    }

    /// Resolve an open incident, recording its duration.
    pub fn resolve_incident(&self, id: i64, resolved_at: DateTime<Utc>) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE incidents
             SET resolved_at = ?1,
                 duration_secs = CAST(strftime('%s', ?1) AS INTEGER) - CAST(strftime('%s', started_at) AS INTEGER)
             WHERE id = ?2",
            params![resolved_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// All incidents for a target, newest first.
    pub fn incidents_for_target(&self, target_id: i64) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_id, kind, started_at, resolved_at, duration_secs, trigger_error
             FROM incidents WHERE target_id = ?1 ORDER BY started_at DESC",
        )?;
        let incidents = stmt
            .query_map(params![target_id], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(incidents)
    }

    // --- Probe history (analytics sink) ---

    /// Append one record to the history sink.
    pub fn append_history(&self, record: &HistoryRecord) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO probe_history (time, target_id, target_name, status, error, elapsed_ms, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.at.to_rfc3339(),
                record.target_id,
                record.target_name,
                record.status.as_str(),
                record.error,
                record.elapsed_ms,
                record.value,
            ],
        )?;
        Ok(())
    }

    /// Most recent history records for a target, newest first.
    pub fn recent_history(&self, target_id: i64, limit: i64) -> Result<Vec<HistoryRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT time, target_id, target_name, status, error, elapsed_ms, value
             FROM probe_history WHERE target_id = ?1 ORDER BY time DESC LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![target_id, limit], |row| {
                let time: String = row.get(0)?;
                let status: String = row.get(3)?;
                Ok(HistoryRecord {
                    at: parse_time(0, &time)?,
                    target_id: row.get(1)?,
                    target_name: row.get(2)?,
                    status: parse_status(&status),
                    error: row.get(4)?,
                    elapsed_ms: row.get(5)?,
                    value: row.get(6)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(records)
    }
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> SqlResult<Incident> {
    let kind: String = row.get(2)?;
    let started: String = row.get(3)?;
    let resolved: Option<String> = row.get(4)?;
    let resolved_at = match resolved {
        Some(s) => Some(parse_time(4, &s)?),
        None => None,
    };
    Ok(Incident {
        id: row.get(0)?,
        target_id: row.get(1)?,
        kind: if kind == "unhealthy" {
            IncidentKind::Unhealthy
        } else {
            IncidentKind::Degraded
        },
        started_at: parse_time(3, &started)?,
        resolved_at,
        duration_secs: row.get(5)?,
        trigger_error: row.get(6)?,
    })
}

fn parse_status(raw: &str) -> Status {
    match raw {
        "healthy" => Status::Healthy,
        "degraded" => Status::Degraded,
        "unhealthy" => Status::Unhealthy,
        _ => Status::Unknown,
    }
}

/// Parse an RFC 3339 timestamp stored in a column.
fn parse_time(idx: usize, raw: &str) -> SqlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Decode a JSON column into a typed value.
fn decode_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> SqlResult<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ChannelConfig;
    use crate::model::{CheckSpec, ProbeSpec};
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_target_crud() {
        let (_tmp, store) = test_store();

        let mut target = TargetConfig {
            name: "Test".to_string(),
            spec: ProbeSpec::Check(CheckSpec {
                url: "https://example.com/health".to_string(),
                ..Default::default()
            }),
            tags: vec!["production".to_string()],
            group: Some("web".to_string()),
            ..Default::default()
        };
        let id = store.add_target(&mut target).unwrap();
        assert!(id > 0);

        let all = store.get_targets().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);

        let fetched = store.get_target(id).unwrap();
        assert_eq!(fetched.name, "Test");
        assert_eq!(fetched.tags, vec!["production".to_string()]);
        match &fetched.spec {
            ProbeSpec::Check(spec) => assert_eq!(spec.url, "https://example.com/health"),
            other => panic!("unexpected spec: {:?}", other),
        }

        let mut updated = fetched;
        updated.name = "Updated".to_string();
        updated.enabled = false;
        store.update_target(&updated).unwrap();
        assert_eq!(store.get_target(id).unwrap().name, "Updated");
        assert!(store.enabled_targets().unwrap().is_empty());

        store.delete_target(id).unwrap();
        assert!(store.get_target(id).is_err());
    }

    #[test]
    fn test_alert_rule_roundtrip() {
        let (_tmp, store) = test_store();

        let mut rule = AlertRule {
            id: 0,
            scope: RuleScope::Group {
                name: "web".to_string(),
            },
            tags: vec!["production".to_string()],
            channel: ChannelConfig::Telegram {
                chat_id: "42".to_string(),
            },
            on_failure: true,
            on_recovery: false,
            enabled: true,
        };
        store.add_alert_rule(&mut rule).unwrap();

        let rules = store.enabled_alert_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].scope, rule.scope);
        assert!(!rules[0].on_recovery);
        assert!(matches!(&rules[0].channel, ChannelConfig::Telegram { chat_id } if chat_id == "42"));

        store.delete_alert_rule(rules[0].id).unwrap();
        assert!(store.enabled_alert_rules().unwrap().is_empty());
    }

    #[test]
    fn test_maintenance_window_roundtrip() {
        let (_tmp, store) = test_store();

        let now = Utc::now();
        let mut window = MaintenanceWindow {
            id: 0,
            scope: WindowScope::Target { id: 3 },
            starts_at: now,
            ends_at: now + Duration::hours(2),
            suppress_alerts: true,
            skip_checks: false,
        };
        store.add_maintenance_window(&mut window).unwrap();

        let windows = store.maintenance_windows().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].scope, WindowScope::Target { id: 3 });
        assert!(windows[0].suppress_alerts);
    }

    #[test]
    fn test_incident_lifecycle_and_open_invariant() {
        let (_tmp, store) = test_store();

        let started = Utc::now() - Duration::minutes(10);
        let id = store
            .open_new_incident(1, IncidentKind::Degraded, Some("503"), started)
            .unwrap();

        // The partial unique index forbids a second open incident per target.
        assert!(store
            .open_new_incident(1, IncidentKind::Unhealthy, None, Utc::now())
            .is_err());

        store.escalate_incident(id, IncidentKind::Unhealthy).unwrap();
        let open = store.open_incident(1).unwrap().unwrap();
        assert_eq!(open.id, id);
        assert_eq!(open.kind, IncidentKind::Unhealthy);

        store.resolve_incident(id, Utc::now()).unwrap();
        assert!(store.open_incident(1).unwrap().is_none());

        let incidents = store.incidents_for_target(1).unwrap();
        assert_eq!(incidents.len(), 1);
        let resolved = &incidents[0];
        assert!(resolved.resolved_at.is_some());
        let duration = resolved.duration_secs.unwrap();
        assert!((590..=610).contains(&duration), "duration was {}", duration);
    }

    #[test]
    fn test_history_append_and_query() {
        let (_tmp, store) = test_store();

        for i in 0..3 {
            store
                .append_history(&HistoryRecord {
                    at: Utc::now() + Duration::seconds(i),
                    target_id: 9,
                    target_name: "API".to_string(),
                    status: Status::Healthy,
                    error: None,
                    elapsed_ms: 40 + i as u64,
                    value: Some(200.0),
                })
                .unwrap();
        }

        let records = store.recent_history(9, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].elapsed_ms, 42);
        assert_eq!(records[0].status, Status::Healthy);
    }
}
