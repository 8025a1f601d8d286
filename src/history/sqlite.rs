// src/history/sqlite.rs

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{FleetError, Result};
use crate::gateway::{ErrorDescriptor, RequestKey};
use crate::history::backend::{GroupQuery, Grouping, HistoryBackend};
use crate::history::record::{HistoryRecord, Partition};
use crate::tracker::JobLog;
use crate::types::{Params, TimeRange};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS api_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint TEXT NOT NULL,
    params TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    result TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS api_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint TEXT NOT NULL,
    params TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    status INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS job_logs (
    product_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    machine_id INTEGER NOT NULL,
    start_time INTEGER NOT NULL,
    log_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_history_key ON api_history(fingerprint, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_api_history_endpoint ON api_history(endpoint, timestamp);
CREATE INDEX IF NOT EXISTS idx_api_history_timestamp ON api_history(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_api_errors_key ON api_errors(fingerprint, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_api_errors_endpoint ON api_errors(endpoint, timestamp);
CREATE INDEX IF NOT EXISTS idx_api_errors_timestamp ON api_errors(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_job_logs_project ON job_logs(project_id, start_time);
"#;

/// History persisted in a SQLite database.
///
/// Timestamps are stored as microseconds since the Unix epoch; params as
/// canonical JSON text, so textual equality is structural equality.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        info!(path = %path.display(), "opened sqlite history");
        Ok(backend)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FleetError::Other(anyhow::anyhow!("sqlite connection mutex poisoned")))
    }
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(v: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(v)
        .ok_or_else(|| FleetError::Other(anyhow::anyhow!("timestamp out of range: {v}")))
}

fn bounds(range: &TimeRange) -> (Option<i64>, Option<i64>) {
    (range.start.map(micros), range.end.map(micros))
}

fn parse_params(text: &str) -> Result<Params> {
    Ok(serde_json::from_str(text)?)
}

/// `LIMIT -1` is "no limit" in SQLite.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}

impl HistoryBackend for SqliteBackend {
    fn insert(&self, partition: Partition, records: &[HistoryRecord]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let sql = match partition {
                Partition::Success => {
                    "INSERT INTO api_history (endpoint, params, fingerprint, result, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)"
                }
                Partition::Error => {
                    "INSERT INTO api_errors (endpoint, params, fingerprint, status, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)"
                }
            };
            let mut stmt = tx.prepare_cached(sql)?;

            for record in records {
                let key = record.key();
                let params_text = key.canonical_params();
                let fingerprint = key.fingerprint();
                let ts = micros(record.timestamp());

                match (partition, record) {
                    (Partition::Success, HistoryRecord::Success { result, .. }) => {
                        stmt.execute(params![
                            key.endpoint,
                            params_text,
                            fingerprint,
                            result.to_string(),
                            ts
                        ])?;
                    }
                    (Partition::Error, HistoryRecord::Failure { error, .. }) => {
                        stmt.execute(params![
                            key.endpoint,
                            params_text,
                            fingerprint,
                            error.status,
                            ts
                        ])?;
                    }
                    _ => {
                        return Err(FleetError::Validation(format!(
                            "record for '{}' does not belong to the {:?} partition",
                            key.endpoint, partition
                        )));
                    }
                }
            }
        }
        tx.commit()?;
        debug!(?partition, count = records.len(), "appended records (sqlite)");
        Ok(())
    }

    fn recent(
        &self,
        partition: Partition,
        key: &RequestKey,
        limit: usize,
        range: &TimeRange,
    ) -> Result<Vec<HistoryRecord>> {
        let conn = self.lock()?;
        let (start, end) = bounds(range);
        let payload_column = match partition {
            Partition::Success => "result",
            Partition::Error => "status",
        };
        let sql = format!(
            "SELECT {payload_column}, timestamp FROM {table}
             WHERE fingerprint = ?1 AND endpoint = ?2 AND params = ?3
               AND (?4 IS NULL OR timestamp >= ?4)
               AND (?5 IS NULL OR timestamp <= ?5)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?6",
            table = partition.table()
        );

        let fingerprint = key.fingerprint();
        let params_text = key.canonical_params();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare_cached(&sql)?;
        let args = params![fingerprint, key.endpoint, params_text, start, end, limit];

        let mut records = Vec::new();
        match partition {
            Partition::Success => {
                let rows = stmt.query_map(args, |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (result, ts) = row?;
                    records.push(HistoryRecord::Success {
                        endpoint: key.endpoint.clone(),
                        params: key.params.clone(),
                        result: serde_json::from_str(&result)?,
                        timestamp: from_micros(ts)?,
                    });
                }
            }
            Partition::Error => {
                let rows = stmt.query_map(args, |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (status, ts) = row?;
                    records.push(HistoryRecord::Failure {
                        endpoint: key.endpoint.clone(),
                        params: key.params.clone(),
                        error: ErrorDescriptor::new(status),
                        timestamp: from_micros(ts)?,
                    });
                }
            }
        }

        Ok(records)
    }

    fn count(&self, partition: Partition, endpoint: &str, range: &TimeRange) -> Result<u64> {
        let conn = self.lock()?;
        let (start, end) = bounds(range);
        let sql = format!(
            "SELECT COUNT(*) FROM {table}
             WHERE endpoint = ?1
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)",
            table = partition.table()
        );
        let n: i64 = conn.query_row(&sql, params![endpoint, start, end], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn group_counts(
        &self,
        partition: Partition,
        grouping: Grouping,
        query: &GroupQuery,
    ) -> Result<Vec<(Value, u64)>> {
        if grouping == Grouping::ErrorStatus && partition != Partition::Error {
            return Err(FleetError::Validation(
                "error status grouping only applies to the error partition".to_string(),
            ));
        }

        let conn = self.lock()?;
        let (start, end) = bounds(&query.range);
        let group_columns = match grouping {
            Grouping::ErrorStatus => "status",
            Grouping::RequestKey => "endpoint, params",
            Grouping::Params => "params",
        };
        let sql = format!(
            "SELECT {group_columns}, COUNT(*) AS n FROM {table}
             WHERE (?1 IS NULL OR endpoint = ?1)
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             GROUP BY {group_columns}
             ORDER BY n DESC, {group_columns}
             LIMIT ?4",
            table = partition.table()
        );

        let limit = sql_limit(query.limit);

        let mut stmt = conn.prepare_cached(&sql)?;
        let args = params![query.endpoint, start, end, limit];

        let mut groups = Vec::new();
        match grouping {
            Grouping::ErrorStatus => {
                let rows = stmt.query_map(args, |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (status, n) = row?;
                    groups.push((Value::from(status), n as u64));
                }
            }
            Grouping::RequestKey => {
                let rows = stmt.query_map(args, |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?;
                for row in rows {
                    let (endpoint, params_text, n) = row?;
                    let key = RequestKey::new(endpoint, parse_params(&params_text)?);
                    groups.push((serde_json::to_value(key)?, n as u64));
                }
            }
            Grouping::Params => {
                let rows = stmt.query_map(args, |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (params_text, n) = row?;
                    groups.push((Value::Object(parse_params(&params_text)?), n as u64));
                }
            }
        }

        Ok(groups)
    }

    fn save_job_log(&self, log: &JobLog) -> Result<()> {
        let json = serde_json::to_string(log)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO job_logs (product_id, project_id, machine_id, start_time, log_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                log.product_id.to_string(),
                log.project_id,
                log.machine_id,
                micros(log.start_time),
                json
            ],
        )?;
        Ok(())
    }

    fn job_logs(&self, project_id: &str) -> Result<Vec<JobLog>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT log_json FROM job_logs WHERE project_id = ?1 ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map([project_id], |row| row.get::<_, String>(0))?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(serde_json::from_str(&row?)?);
        }
        Ok(logs)
    }
}
