use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thought_common::{Error, Result};
use tracing::info;

use crate::gateway::StorageGateway;

/// Store-local clock at millisecond precision, UTC.
const NOW_SQL: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

/// A persisted thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: i64,
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a thought before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewThought {
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Trailing time window used for digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestWindow {
    LastHour,
    LastDay,
    Minutes(u32),
}

impl DigestWindow {
    pub fn seconds(&self) -> i64 {
        match self {
            Self::LastHour => 3600,
            Self::LastDay => 86_400,
            Self::Minutes(m) => i64::from(*m) * 60,
        }
    }

    /// SQLite date modifier, e.g. `-3600 seconds`.
    fn modifier(&self) -> String {
        format!("-{} seconds", self.seconds())
    }
}

impl fmt::Display for DigestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastHour => write!(f, "hour"),
            Self::LastDay => write!(f, "day"),
            Self::Minutes(m) => write!(f, "{m}m"),
        }
    }
}

impl FromStr for DigestWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" | "1h" => Ok(Self::LastHour),
            "day" | "daily" | "24h" => Ok(Self::LastDay),
            other => other
                .strip_suffix('m')
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(Self::Minutes)
                .ok_or_else(|| Error::Validation(format!("unknown digest window: {s}"))),
        }
    }
}

/// Typed access to the `thoughts` table.
#[derive(Debug, Clone)]
pub struct ThoughtStore {
    gateway: StorageGateway,
}

impl ThoughtStore {
    pub fn new(gateway: StorageGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Insert one thought and return its store-assigned id.
    pub fn insert(&self, thought: &NewThought) -> Result<i64> {
        if thought.content.trim().is_empty() {
            return Err(Error::Validation("content is required".into()));
        }

        let tags = serde_json::to_string(&thought.tags)?;
        let metadata = serde_json::to_string(&thought.metadata)?;

        let result = self.gateway.run(
            &format!(
                "INSERT INTO thoughts (content, source, tags, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, {NOW_SQL})"
            ),
            params![thought.content, thought.source, tags, metadata],
        )?;

        info!(
            thought_id = result.inserted_id,
            source = %thought.source,
            "thought ingested"
        );
        Ok(result.inserted_id)
    }

    pub fn get(&self, id: i64) -> Result<Option<Thought>> {
        let mut rows = self.gateway.query_map(
            "SELECT id, content, source, tags, metadata, created_at
             FROM thoughts WHERE id = ?1",
            params![id],
            row_to_thought,
        )?;
        Ok(rows.pop())
    }

    /// Up to `limit` most recently created thoughts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Thought>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.gateway.query_map(
            "SELECT id, content, source, tags, metadata, created_at
             FROM thoughts
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
            row_to_thought,
        )
    }

    /// Thoughts whose content contains `needle`, newest first.
    ///
    /// Matching uses SQLite `LIKE`, so ASCII letters compare case-insensitively.
    pub fn search(&self, needle: &str) -> Result<Vec<Thought>> {
        self.gateway.query_map(
            "SELECT id, content, source, tags, metadata, created_at
             FROM thoughts
             WHERE content LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY created_at DESC, id DESC",
            params![escape_like(needle)],
            row_to_thought,
        )
    }

    /// Thoughts created inside the trailing `window`, newest first.
    pub fn digest_window(&self, window: DigestWindow) -> Result<Vec<Thought>> {
        self.gateway.query_map(
            "SELECT id, content, source, tags, metadata, created_at
             FROM thoughts
             WHERE created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', ?1)
             ORDER BY created_at DESC, id DESC",
            params![window.modifier()],
            row_to_thought,
        )
    }

    pub fn count(&self) -> Result<i64> {
        let counts = self
            .gateway
            .query_map("SELECT count(*) FROM thoughts", [], |row| row.get::<_, i64>(0))?;
        Ok(counts.into_iter().next().unwrap_or(0))
    }
}

fn row_to_thought(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thought> {
    let tags_str: String = row.get(3)?;
    let tags = serde_json::from_str(&tags_str).map_err(|e| conversion_failure(3, e))?;

    let metadata_str: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_str).map_err(|e| conversion_failure(4, e))?;

    let created_at_str: String = row.get(5)?;
    let created_at = parse_timestamp(&created_at_str).map_err(|e| conversion_failure(5, e))?;

    Ok(Thought {
        id: row.get(0)?,
        content: row.get(1)?,
        source: row.get(2)?,
        tags,
        metadata,
        created_at,
    })
}

fn conversion_failure(column: usize, err: impl fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(std::io::Error::other(err.to_string())),
    )
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}
