//! SQLite-backed attendance ledger.
//!
//! Records are kept in insertion order (by rowid) so that positional
//! deletion is stable across restarts. A UNIQUE index on
//! `(identity, subject, day)` guarantees at most one record per person,
//! subject and calendar day, and every mutation runs under one connection
//! lock so check-then-append is a single critical section.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS attendance (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        identity  TEXT NOT NULL,
        marked_at TEXT NOT NULL,
        subject   TEXT NOT NULL,
        day       TEXT NOT NULL,
        UNIQUE (identity, subject, day)
    );
";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("attendance already marked for {identity} in {subject} on {date}")]
    Duplicate {
        identity: String,
        subject: String,
        date: NaiveDate,
    },
    #[error("stored timestamp {0:?} is not in YYYY-MM-DD HH:MM:SS form")]
    BadTimestamp(String),
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// One attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: String,
    #[serde(with = "timestamp")]
    pub time: NaiveDateTime,
    pub subject: String,
}

impl AttendanceRecord {
    pub fn date(&self) -> NaiveDate {
        self.time.date()
    }
}

/// Persistent, ordered attendance store.
pub struct AttendanceLedger {
    conn: Mutex<Connection>,
}

impl AttendanceLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        let ledger = Self::init(conn)?;
        tracing::info!(path = %path.display(), records = ledger.len()?, "opened attendance ledger");
        Ok(ledger)
    }

    /// Ledger that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Whether `identity` already has a record for `subject` on `date`.
    pub fn is_marked(&self, identity: &str, subject: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        let conn = self.lock()?;
        is_marked(&conn, identity, subject, date)
    }

    /// Append a record. Fails with [`LedgerError::Duplicate`] if the
    /// identity is already marked for that subject and day.
    pub fn append(&self, identity: &str, subject: &str, time: NaiveDateTime) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        insert(&conn, identity, subject, time)
    }

    /// Append a record unless one already exists for the same identity,
    /// subject and day. Returns whether a record was written.
    pub fn mark_once(&self, identity: &str, subject: &str, time: NaiveDateTime) -> Result<bool, LedgerError> {
        let conn = self.lock()?;
        let written = mark_unless_present(&conn, identity, subject, time)?;
        if written {
            tracing::info!(identity, subject, time = %time.format(TIMESTAMP_FORMAT), "marked attendance");
        }
        Ok(written)
    }

    /// Mark every identity in `identities` at most once for `subject` on
    /// the day of `time`, in one transaction.
    ///
    /// Returns the identities written, in input order. If any write fails
    /// the whole batch is rolled back and the ledger is left as it was.
    pub fn mark_batch(
        &self,
        identities: &[String],
        subject: &str,
        time: NaiveDateTime,
    ) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut written = Vec::new();
        for identity in identities {
            if mark_unless_present(&tx, identity, subject, time)? {
                written.push(identity.clone());
            }
        }
        tx.commit()?;

        for identity in &written {
            tracing::info!(identity = %identity, subject, time = %time.format(TIMESTAMP_FORMAT), "marked attendance");
        }
        Ok(written)
    }

    /// Delete the record at position `index` (0-based, insertion order).
    ///
    /// Returns `false` without touching the ledger when `index` is out of
    /// range. Positions after `index` shift down by one.
    pub fn delete_at(&self, index: usize) -> Result<bool, LedgerError> {
        let conn = self.lock()?;
        let offset = i64::try_from(index).unwrap_or(i64::MAX);
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM attendance ORDER BY id LIMIT 1 OFFSET ?1",
                [offset],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => {
                conn.execute("DELETE FROM attendance WHERE id = ?1", [id])?;
                tracing::info!(index, "deleted attendance record");
                Ok(true)
            }
            None => {
                tracing::warn!(index, "delete failed: index out of range");
                Ok(false)
            }
        }
    }

    /// All records in insertion order.
    pub fn list_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT identity, marked_at, subject FROM attendance ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (identity, marked_at, subject) = row?;
            let time = NaiveDateTime::parse_from_str(&marked_at, TIMESTAMP_FORMAT)
                .map_err(|_| LedgerError::BadTimestamp(marked_at))?;
            records.push(AttendanceRecord {
                identity,
                time,
                subject,
            });
        }
        Ok(records)
    }

    /// Distinct identities with at least one record, in any subject.
    pub fn present_identities(&self) -> Result<BTreeSet<String>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT identity FROM attendance")?;
        let identities = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(identities)
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

fn is_marked(conn: &Connection, identity: &str, subject: &str, date: NaiveDate) -> Result<bool, LedgerError> {
    let day = date.format(DATE_FORMAT).to_string();
    let found = conn
        .query_row(
            "SELECT 1 FROM attendance WHERE identity = ?1 AND subject = ?2 AND day = ?3",
            params![identity, subject, day],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn mark_unless_present(
    conn: &Connection,
    identity: &str,
    subject: &str,
    time: NaiveDateTime,
) -> Result<bool, LedgerError> {
    if is_marked(conn, identity, subject, time.date())? {
        tracing::debug!(identity, subject, "already marked today");
        return Ok(false);
    }
    insert(conn, identity, subject, time)?;
    Ok(true)
}

fn insert(conn: &Connection, identity: &str, subject: &str, time: NaiveDateTime) -> Result<(), LedgerError> {
    let marked_at = time.format(TIMESTAMP_FORMAT).to_string();
    let day = time.format(DATE_FORMAT).to_string();
    let result = conn.execute(
        "INSERT INTO attendance (identity, marked_at, subject, day) VALUES (?1, ?2, ?3, ?4)",
        params![identity, marked_at, subject, day],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(LedgerError::Duplicate {
                identity: identity.to_string(),
                subject: subject.to_string(),
                date: time.date(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// `YYYY-MM-DD HH:MM:SS` serde representation for record timestamps.
mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
