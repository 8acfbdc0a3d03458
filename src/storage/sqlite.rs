//! SQLite frontier implementation
//!
//! This module provides the SQLite-backed implementation of `FrontierStore`.
//! One connection is shared behind a mutex and every mutation runs in a
//! `BEGIN IMMEDIATE` transaction, so two handles on the same database file
//! still serialize their claims.

use crate::config::RetryConfig;
use crate::state::{TerminationReason, UrlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use crate::storage::{
    ClaimRequest, DiscoveredLink, EnqueueOutcome, FrontierStats, LinkBatch, LinkRecord, Outcome,
    Resolution, SessionRecord, SessionStatus, UrlRecord,
};
use crate::url::domain_key;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

const RECORD_COLUMNS: &str = "id, url, domain, status, depth, priority, parent_url, \
     discovered_at, last_attempt_at, eligible_at, retry_count, lease, needs_render, \
     http_status, content_hash, content_type, title, language, failure_reason, final_url, \
     finished_at, fetch_ms, body_bytes";

impl ToSql for UrlStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for UrlStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        UrlStatus::from_db_string(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown url status '{}'", text).into()))
    }
}

/// SQLite frontier backend
pub struct SqliteFrontier {
    conn: Mutex<Connection>,
    retry: RetryConfig,
}

impl SqliteFrontier {
    /// Opens (or creates) the frontier database at `path`
    ///
    /// The parent directory is created when missing. The database runs in WAL
    /// mode with `synchronous = FULL` so a committed transition survives a
    /// crash.
    pub fn open(path: &Path, retry: RetryConfig) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            retry,
        })
    }

    /// Creates an in-memory frontier (for tests and dry runs)
    pub fn open_in_memory(retry: RetryConfig) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry,
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs `f` inside one IMMEDIATE transaction and commits it
    fn write<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        status: row.get(3)?,
        depth: row.get(4)?,
        priority: row.get(5)?,
        parent_url: row.get(6)?,
        discovered_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
        eligible_at: row.get(9)?,
        retry_count: row.get(10)?,
        lease: row.get(11)?,
        needs_render: row.get(12)?,
        http_status: row.get(13)?,
        content_hash: row.get(14)?,
        content_type: row.get(15)?,
        title: row.get(16)?,
        language: row.get(17)?,
        failure_reason: row.get(18)?,
        final_url: row.get(19)?,
        finished_at: row.get(20)?,
        fetch_ms: row.get::<_, Option<i64>>(21)?.map(|ms| ms.max(0) as u64),
        body_bytes: row.get::<_, Option<i64>>(22)?.map(|n| n.max(0) as u64),
    })
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn enqueue_in(
    conn: &Connection,
    url: &Url,
    parent: Option<&str>,
    depth: u32,
    now: &str,
) -> StorageResult<EnqueueOutcome> {
    let known: Option<u32> = conn
        .prepare_cached("SELECT depth FROM urls WHERE url = ?1")?
        .query_row(params![url.as_str()], |row| row.get(0))
        .optional()?;

    if let Some(depth) = known {
        // First discovery fixes depth, priority and parent
        return Ok(EnqueueOutcome::Known { depth });
    }

    conn.prepare_cached(
        "INSERT INTO urls (url, domain, status, depth, priority, parent_url, discovered_at, eligible_at)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, 0)",
    )?
    .execute(params![
        url.as_str(),
        domain_key(url),
        UrlStatus::Queued,
        depth,
        parent,
        now
    ])?;
    Ok(EnqueueOutcome::Inserted)
}

/// Reserves `count` consecutive leases and returns the first
fn reserve_leases(conn: &Connection, count: usize) -> StorageResult<i64> {
    let count = count as i64;
    conn.execute(
        "UPDATE frontier_meta SET value = value + ?1 WHERE key = 'lease'",
        params![count],
    )?;
    let last: Option<i64> = conn
        .query_row(
            "SELECT value FROM frontier_meta WHERE key = 'lease'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let last = last.ok_or_else(|| StorageError::Corrupt("lease counter missing".to_string()))?;
    Ok(last - count + 1)
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StorageResult<u64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn millis_after(now: DateTime<Utc>, delay: Duration) -> i64 {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_add(delay_ms)
}

impl FrontierStore for SqliteFrontier {
    fn enqueue(
        &self,
        url: &Url,
        parent: Option<&str>,
        depth: u32,
    ) -> StorageResult<EnqueueOutcome> {
        let now = Utc::now().to_rfc3339();
        self.write(|conn| enqueue_in(conn, url, parent, depth, &now))
    }

    fn enqueue_links(
        &self,
        parent: &str,
        depth: u32,
        links: &[DiscoveredLink],
    ) -> StorageResult<LinkBatch> {
        let now = Utc::now().to_rfc3339();
        self.write(|conn| {
            let mut batch = LinkBatch::default();
            for link in links {
                let added = conn
                    .prepare_cached(
                        "INSERT OR IGNORE INTO links (from_url, to_url, in_scope) VALUES (?1, ?2, ?3)",
                    )?
                    .execute(params![parent, link.url.as_str(), link.in_scope])?;
                batch.edges += added as u64;

                if !link.follow {
                    continue;
                }
                match enqueue_in(conn, &link.url, Some(parent), depth, &now)? {
                    EnqueueOutcome::Inserted => batch.inserted += 1,
                    EnqueueOutcome::Known { .. } => batch.duplicates += 1,
                }
            }
            Ok(batch)
        })
    }

    fn claim_next(&self, request: &ClaimRequest) -> StorageResult<Vec<UrlRecord>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        self.write(|conn| {
            let mut sql = format!(
                "SELECT {} FROM urls WHERE status = ? AND eligible_at <= ? AND depth <= ?",
                RECORD_COLUMNS
            );
            let mut values = vec![
                Value::Text(UrlStatus::Queued.to_db_string().to_string()),
                Value::Integer(request.now.timestamp_millis()),
                Value::Integer(i64::from(request.max_depth)),
            ];
            if !request.skip_domains.is_empty() {
                let placeholders = vec!["?"; request.skip_domains.len()].join(", ");
                sql.push_str(&format!(" AND domain NOT IN ({})", placeholders));
                values.extend(request.skip_domains.iter().cloned().map(Value::Text));
            }
            sql.push_str(" ORDER BY priority ASC, id ASC LIMIT ?");
            values.push(Value::Integer(request.limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let mut records = stmt
                .query_map(params_from_iter(values.iter()), record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            if records.is_empty() {
                return Ok(records);
            }

            let first_lease = reserve_leases(conn, records.len())?;
            let claimed_at = request.now.to_rfc3339();
            for (offset, record) in records.iter_mut().enumerate() {
                let lease = first_lease + offset as i64;
                conn.prepare_cached(
                    "UPDATE urls SET status = ?1, lease = ?2, last_attempt_at = ?3
                     WHERE id = ?4 AND status = ?5",
                )?
                .execute(params![
                    UrlStatus::InFlight,
                    lease,
                    claimed_at,
                    record.id,
                    UrlStatus::Queued
                ])?;
                record.status = UrlStatus::InFlight;
                record.lease = Some(lease);
                record.last_attempt_at = Some(claimed_at.clone());
            }

            Ok(records)
        })
    }

    fn complete(
        &self,
        record: &UrlRecord,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> StorageResult<Resolution> {
        let Some(lease) = record.lease else {
            return Ok(Resolution::Stale);
        };

        self.write(|conn| {
            let current: Option<(UrlStatus, Option<i64>, u32)> = conn
                .query_row(
                    "SELECT status, lease, retry_count FROM urls WHERE id = ?1",
                    params![record.id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let retry_count = match current {
                Some((UrlStatus::InFlight, Some(held), retry_count)) if held == lease => {
                    retry_count
                }
                _ => return Ok(Resolution::Stale),
            };

            let finished_at = now.to_rfc3339();
            match outcome {
                Outcome::Done(page) => {
                    conn.execute(
                        "UPDATE urls SET status = ?1, lease = NULL, http_status = ?2,
                         content_hash = ?3, content_type = ?4, title = ?5, language = ?6,
                         final_url = ?7, failure_reason = NULL, finished_at = ?8,
                         fetch_ms = ?9, body_bytes = ?10
                         WHERE id = ?11",
                        params![
                            UrlStatus::Done,
                            page.http_status,
                            page.content_hash,
                            page.content_type,
                            page.title,
                            page.language,
                            page.final_url,
                            finished_at,
                            clamp_i64(page.fetch_ms),
                            clamp_i64(page.body_bytes),
                            record.id
                        ],
                    )?;
                    Ok(Resolution::Done)
                }
                Outcome::Skipped(reason) => {
                    conn.execute(
                        "UPDATE urls SET status = ?1, lease = NULL, failure_reason = ?2,
                         finished_at = ?3 WHERE id = ?4",
                        params![UrlStatus::Skipped, reason.as_str(), finished_at, record.id],
                    )?;
                    Ok(Resolution::Skipped)
                }
                Outcome::NeedsRender => {
                    conn.execute(
                        "UPDATE urls SET status = ?1, lease = NULL, needs_render = 1,
                         eligible_at = ?2 WHERE id = ?3",
                        params![UrlStatus::Queued, now.timestamp_millis(), record.id],
                    )?;
                    Ok(Resolution::RenderRequeued)
                }
                Outcome::Failed(failure) => {
                    let retry_count = retry_count.saturating_add(1);
                    if failure.kind.is_retryable() && retry_count < self.retry.max_retries {
                        let delay = self
                            .retry
                            .backoff(retry_count)
                            .max(failure.retry_after.unwrap_or_default());
                        let eligible_at = millis_after(now, delay);
                        conn.execute(
                            "UPDATE urls SET status = ?1, lease = NULL, retry_count = ?2,
                             eligible_at = ?3, failure_reason = ?4, http_status = ?5
                             WHERE id = ?6",
                            params![
                                UrlStatus::Queued,
                                retry_count,
                                eligible_at,
                                failure.reason,
                                failure.http_status,
                                record.id
                            ],
                        )?;
                        Ok(Resolution::Retry {
                            retry_count,
                            eligible_at,
                        })
                    } else {
                        conn.execute(
                            "UPDATE urls SET status = ?1, lease = NULL, retry_count = ?2,
                             failure_reason = ?3, http_status = ?4, finished_at = ?5
                             WHERE id = ?6",
                            params![
                                UrlStatus::Failed,
                                retry_count,
                                failure.reason,
                                failure.http_status,
                                finished_at,
                                record.id
                            ],
                        )?;
                        Ok(Resolution::Failed { retry_count })
                    }
                }
            }
        })
    }

    fn release(&self, record: &UrlRecord) -> StorageResult<bool> {
        let Some(lease) = record.lease else {
            return Ok(false);
        };
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE urls SET status = ?1, lease = NULL WHERE id = ?2 AND status = ?3 AND lease = ?4",
                params![UrlStatus::Queued, record.id, UrlStatus::InFlight, lease],
            )?;
            Ok(changed > 0)
        })
    }

    fn recover_in_flight(&self) -> StorageResult<u64> {
        self.write(|conn| {
            let swept = conn.execute(
                "UPDATE urls SET status = ?1, lease = NULL WHERE status = ?2",
                params![UrlStatus::Queued, UrlStatus::InFlight],
            )?;
            Ok(swept as u64)
        })
    }

    fn stats(&self) -> StorageResult<FrontierStats> {
        let conn = self.lock()?;
        let mut stats = FrontierStats::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM urls GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, UrlStatus>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, n) = row?;
            let n = n.max(0) as u64;
            match status {
                UrlStatus::Queued => stats.queued = n,
                UrlStatus::InFlight => stats.in_flight = n,
                UrlStatus::Done => stats.done = n,
                UrlStatus::Failed => stats.failed = n,
                UrlStatus::Skipped => stats.skipped = n,
            }
            stats.total += n;
        }

        stats.links = count(&conn, "SELECT COUNT(*) FROM links", [])?;
        let max_depth: Option<u32> = conn.query_row(
            "SELECT MAX(depth) FROM urls WHERE status = ?1",
            params![UrlStatus::Done],
            |row| row.get(0),
        )?;
        stats.max_done_depth = max_depth.unwrap_or(0);

        Ok(stats)
    }

    fn next_eligible_at(&self, max_depth: u32) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let earliest: Option<i64> = conn.query_row(
            "SELECT MIN(eligible_at) FROM urls WHERE status = ?1 AND depth <= ?2",
            params![UrlStatus::Queued, max_depth],
            |row| row.get(0),
        )?;
        Ok(earliest.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    fn queued_beyond_depth(&self, max_depth: u32) -> StorageResult<u64> {
        let conn = self.lock()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM urls WHERE status = ?1 AND depth > ?2",
            params![UrlStatus::Queued, max_depth],
        )
    }

    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE url = ?1", RECORD_COLUMNS),
                params![url],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn links(&self) -> StorageResult<Vec<LinkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT from_url, to_url, in_scope FROM links ORDER BY id")?;
        let links = stmt
            .query_map([], |row| {
                Ok(LinkRecord {
                    from_url: row.get(0)?,
                    to_url: row.get(1)?,
                    in_scope: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn records(&self) -> StorageResult<Vec<UrlRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM urls ORDER BY id", RECORD_COLUMNS))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn begin_session(&self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.write(|conn| {
            // A session still marked running was cut short by a crash
            conn.execute(
                "UPDATE sessions SET status = ?1 WHERE status = ?2",
                params![
                    SessionStatus::Interrupted.to_db_string(),
                    SessionStatus::Running.to_db_string()
                ],
            )?;
            conn.execute(
                "INSERT INTO sessions (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
                params![now, config_hash, SessionStatus::Running.to_db_string()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn finish_session(
        &self,
        id: i64,
        status: SessionStatus,
        reason: Option<TerminationReason>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.write(|conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, finished_at = ?2, termination_reason = ?3 WHERE id = ?4",
                params![status.to_db_string(), now, reason.map(|r| r.as_str()), id],
            )?;
            Ok(())
        })
    }

    fn sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, termination_reason
             FROM sessions ORDER BY id",
        )?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(SessionStatus::Interrupted),
                    termination_reason: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn reset(&self) -> StorageResult<()> {
        self.write(|conn| {
            conn.execute_batch(
                "
                DELETE FROM links;
                DELETE FROM urls;
                DELETE FROM sessions;
                DELETE FROM sqlite_sequence WHERE name IN ('links', 'urls', 'sessions');
            ",
            )?;
            Ok(())
        })
    }
}
