// SQLite-backed store. Payloads are JSON columns next to indexed metadata.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crosslink_protocol::FieldDef;
use crosslink_recon::{Batch, Rule, RuleSet};

use crate::{BatchHeader, Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
    batch_id TEXT PRIMARY KEY,
    batch_name TEXT NOT NULL,
    created_at TEXT NOT NULL,      -- RFC 3339, UTC, microseconds
    rerun_of TEXT,
    payload TEXT NOT NULL          -- JSON Batch
);

CREATE INDEX IF NOT EXISTS batches_created_at ON batches (created_at);

CREATE TABLE IF NOT EXISTS rules (
    rule_id INTEGER PRIMARY KEY,
    position INTEGER NOT NULL,
    payload TEXT NOT NULL          -- JSON Rule
);

CREATE TABLE IF NOT EXISTS fields (
    position INTEGER PRIMARY KEY,
    field_name TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL          -- JSON FieldDef
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const SCHEMA_VERSION: &str = "1";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const META_SCHEMA_VERSION: &str = "schema_version";
const META_NEXT_RULE_ID: &str = "next_rule_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, SCHEMA_VERSION],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::corrupt(what, e))
}

impl Store for SqliteStore {
    fn insert_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(batch).map_err(|e| StoreError::corrupt("batch payload", e))?;
        let batch_id = batch.batch_id.to_string();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM batches WHERE batch_id = ?1",
                params![batch_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(StoreError::DuplicateBatch(batch.batch_id));
        }
        tx.execute(
            "INSERT INTO batches (batch_id, batch_name, created_at, rerun_of, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                batch_id,
                batch.batch_name,
                timestamp(&batch.created_at),
                batch.rerun_of.map(|id| id.to_string()),
                payload,
            ],
        )?;
        tx.commit()?;
        log::debug!("stored batch {batch_id} ({} bytes)", payload.len());
        Ok(())
    }

    fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM batches WHERE batch_id = ?1",
                params![batch_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| StoreError::corrupt(format!("batch {batch_id}"), e)))
            .transpose()
    }

    fn list_batches(&self) -> Result<Vec<BatchHeader>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT batch_id, batch_name, created_at, rerun_of FROM batches ORDER BY created_at DESC, rowid DESC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, name, created_at, rerun_of)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| StoreError::corrupt(format!("batch {id} created_at"), e))?
                    .with_timezone(&Utc);
                Ok(BatchHeader {
                    batch_id: parse_uuid(&id, "batch id")?,
                    batch_name: name,
                    created_at,
                    rerun_of: rerun_of.as_deref().map(|r| parse_uuid(r, "rerun_of")).transpose()?,
                })
            })
            .collect()
    }

    fn load_rules(&self) -> Result<Option<RuleSet>, StoreError> {
        let conn = self.conn.lock();
        let next_id: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_NEXT_RULE_ID],
                |row| row.get(0),
            )
            .optional()?;
        let Some(next_id) = next_id else {
            return Ok(None);
        };
        let next_id: u64 = next_id
            .parse()
            .map_err(|e| StoreError::corrupt(META_NEXT_RULE_ID, e))?;

        let mut stmt = conn.prepare("SELECT rule_id, payload FROM rules ORDER BY position")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let rules = rows
            .into_iter()
            .map(|(id, payload)| {
                serde_json::from_str::<Rule>(&payload).map_err(|e| StoreError::corrupt(format!("rule {id}"), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RuleSet::from_parts(rules, next_id)))
    }

    fn save_rules(&self, rules: &RuleSet) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rules", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO rules (rule_id, position, payload) VALUES (?1, ?2, ?3)")?;
            for (position, rule) in rules.list().iter().enumerate() {
                let payload =
                    serde_json::to_string(rule).map_err(|e| StoreError::corrupt("rule payload", e))?;
                stmt.execute(params![rule.rule_id as i64, position as i64, payload])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![META_NEXT_RULE_ID, rules.next_id().to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_fields(&self) -> Result<Vec<FieldDef>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT field_name, payload FROM fields ORDER BY position")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(name, payload)| {
                serde_json::from_str(&payload).map_err(|e| StoreError::corrupt(format!("field '{name}'"), e))
            })
            .collect()
    }

    fn save_fields(&self, fields: &[FieldDef]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM fields", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO fields (position, field_name, payload) VALUES (?1, ?2, ?3)")?;
            for (position, field) in fields.iter().enumerate() {
                let payload =
                    serde_json::to_string(field).map_err(|e| StoreError::corrupt("field payload", e))?;
                stmt.execute(params![position as i64, field.field_name, payload])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
