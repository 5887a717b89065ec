//! SQLite transcript store.
//!
//! Persists finalized transcripts and answers the history/statistics
//! queries behind the CLI. The pipeline only ever calls [`TranscriptStore::add`];
//! records are owned by the store after handoff.

use crate::error::{EcouteError, Result};
use chrono::Local;
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// One persisted transcript row.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct TranscriptRecord {
    pub id: i64,
    pub text: String,
    /// SQLite datetime text, UTC.
    pub timestamp: String,
    pub is_emergency: bool,
    pub emergency_words: Vec<String>,
    pub audio_level: u8,
}

/// Aggregates over a trailing window of days.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct StoreStatistics {
    pub transcriptions: u64,
    pub total_words: u64,
    pub avg_audio_level: f64,
    pub emergency_count: u64,
}

/// Handle to the transcript database.
///
/// All methods take `&self`; the connection is serialized internally so the
/// pipeline thread and CLI queries can share one handle.
pub struct TranscriptStore {
    conn: Mutex<Connection>,
}

impl TranscriptStore {
    /// Open (and initialize) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transcriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                has_emergency BOOLEAN DEFAULT 0,
                emergency_words TEXT,
                audio_level INTEGER DEFAULT 0,
                word_count INTEGER DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_timestamp
                ON transcriptions(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_emergency
                ON transcriptions(has_emergency);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| EcouteError::Store {
            message: "store connection poisoned".to_string(),
        })
    }

    /// Persist one finalized transcript. Returns the new row id.
    pub fn add(
        &self,
        text: &str,
        is_emergency: bool,
        emergency_words: &BTreeSet<String>,
        audio_level: u8,
    ) -> Result<i64> {
        let word_count = text.split_whitespace().count() as i64;
        let words_json = if emergency_words.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&emergency_words).map_err(|e| EcouteError::Store {
                    message: format!("failed to encode emergency words: {e}"),
                })?,
            )
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transcriptions
             (text, has_emergency, emergency_words, audio_level, word_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![text, is_emergency, words_json, audio_level, word_count],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent transcripts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<TranscriptRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, timestamp, has_emergency, emergency_words, audio_level
             FROM transcriptions
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], map_record)?;
        collect(rows)
    }

    /// Transcripts from one calendar day ("YYYY-MM-DD"), newest first.
    pub fn by_date(&self, date: &str) -> Result<Vec<TranscriptRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, timestamp, has_emergency, emergency_words, audio_level
             FROM transcriptions
             WHERE DATE(timestamp) = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![date], map_record)?;
        collect(rows)
    }

    /// Transcripts flagged as emergencies, newest first.
    pub fn emergency(&self, limit: usize) -> Result<Vec<TranscriptRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, timestamp, has_emergency, emergency_words, audio_level
             FROM transcriptions
             WHERE has_emergency = 1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], map_record)?;
        collect(rows)
    }

    /// Substring search over transcript text, newest first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<TranscriptRecord>> {
        let pattern = format!("%{}%", query);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, timestamp, has_emergency, emergency_words, audio_level
             FROM transcriptions
             WHERE text LIKE ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], map_record)?;
        collect(rows)
    }

    /// Aggregates over the last `days` days.
    pub fn statistics(&self, days: u32) -> Result<StoreStatistics> {
        let conn = self.lock()?;
        let stats = conn.query_row(
            "SELECT
                COUNT(*) AS total_transcriptions,
                SUM(word_count) AS total_words,
                AVG(audio_level) AS avg_audio_level,
                COUNT(CASE WHEN has_emergency = 1 THEN 1 END) AS emergency_count
             FROM transcriptions
             WHERE timestamp >= datetime('now', '-' || ?1 || ' days')",
            params![days],
            |row| {
                Ok(StoreStatistics {
                    transcriptions: row.get::<_, Option<i64>>(0)?.unwrap_or(0) as u64,
                    total_words: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                    avg_audio_level: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    emergency_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }

    /// Delete transcripts older than `days` days. Returns the deleted count.
    pub fn purge_older_than(&self, days: u32) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM transcriptions
             WHERE timestamp < datetime('now', '-' || ?1 || ' days')",
            params![days],
        )?;
        Ok(deleted)
    }

    /// Export transcripts as a text file, oldest first, with a header banner
    /// and an emergency marker per flagged entry. Returns the entry count.
    pub fn export(&self, path: &Path, date: Option<&str>) -> Result<usize> {
        let records = match date {
            Some(d) => self.by_date(d)?,
            None => self.recent(1000)?,
        };

        let mut file = std::fs::File::create(path)?;
        writeln!(file, "{}", "=".repeat(80))?;
        writeln!(
            file,
            "Historique des transcriptions - {}",
            Local::now().format("%Y-%m-%d %H:%M")
        )?;
        writeln!(file, "{}", "=".repeat(80))?;
        writeln!(file)?;

        // Queries return newest first; the file reads oldest to newest.
        for record in records.iter().rev() {
            write!(file, "[{}]", record.timestamp)?;
            if record.is_emergency {
                write!(file, " ⚠️ URGENCE")?;
            }
            writeln!(file, "\n{}\n", record.text)?;
        }

        Ok(records.len())
    }

    /// Total number of stored transcripts.
    pub fn total_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM transcriptions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
impl TranscriptStore {
    /// Drop the backing table so the next insert fails. Lets sink tests
    /// exercise the persistence-failure path without filesystem tricks.
    pub(crate) fn break_for_tests(&self) {
        if let Ok(conn) = self.lock() {
            conn.execute_batch("DROP TABLE transcriptions").ok();
        }
    }
}

fn map_record(row: &rusqlite::Row) -> rusqlite::Result<TranscriptRecord> {
    let words_json: Option<String> = row.get("emergency_words")?;
    let emergency_words = words_json
        .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
        .unwrap_or_default();
    let audio_level: i64 = row.get("audio_level")?;

    Ok(TranscriptRecord {
        id: row.get("id")?,
        text: row.get("text")?,
        timestamp: row.get("timestamp")?,
        is_emergency: row.get("has_emergency")?,
        emergency_words,
        audio_level: audio_level.clamp(0, 100) as u8,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<TranscriptRecord>>,
) -> Result<Vec<TranscriptRecord>> {
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}
