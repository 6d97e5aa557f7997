//! SQLite-backed mutation store.
//!
//! One row per mutation in a single `mutations` table, plus a single-row
//! `sync_status` table for the derived status snapshot. The connection is
//! shared behind a mutex; every operation is a single statement, so each
//! record update is atomic on its own.

use crate::{MutationStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use outbox_types::{
    EntityTarget, Mutation, MutationId, MutationKind, MutationStatus, Payload, RemoteSnapshot,
    SyncStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistent mutation store backed by SQLite.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::Unavailable(format!("failed to open mutation store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Unavailable(format!("failed to open in-memory mutation store: {e}"))
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS mutations (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT,
                payload TEXT NOT NULL,
                queued_at TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                max_attempts INTEGER NOT NULL,
                status TEXT NOT NULL,
                last_error TEXT,
                remote_snapshot TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_mutations_status ON mutations(status);

            CREATE TABLE IF NOT EXISTS sync_status (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot TEXT NOT NULL
            );
            ",
        )?;
        debug!("mutation store schema ready");
        Ok(())
    }
}

impl MutationStore for SqliteStore {
    fn append(&self, mutation: &Mutation) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mutations (id, kind, entity_type, entity_id, payload, queued_at,
                                    attempts, max_attempts, status, last_error, remote_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                mutation.id.to_string(),
                mutation.kind.as_str(),
                mutation.target.entity_type,
                mutation.target.entity_id,
                serde_json::to_string(&mutation.payload)?,
                mutation.queued_at.to_rfc3339(),
                mutation.attempts,
                mutation.max_attempts,
                mutation.status.as_str(),
                mutation.last_error,
                encode_snapshot(mutation.remote_snapshot.as_ref())?,
            ],
        )?;
        Ok(())
    }

    fn update(&self, mutation: &Mutation) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE mutations
             SET kind = ?2, entity_type = ?3, entity_id = ?4, payload = ?5, queued_at = ?6,
                 attempts = ?7, max_attempts = ?8, status = ?9, last_error = ?10,
                 remote_snapshot = ?11
             WHERE id = ?1",
            params![
                mutation.id.to_string(),
                mutation.kind.as_str(),
                mutation.target.entity_type,
                mutation.target.entity_id,
                serde_json::to_string(&mutation.payload)?,
                mutation.queued_at.to_rfc3339(),
                mutation.attempts,
                mutation.max_attempts,
                mutation.status.as_str(),
                mutation.last_error,
                encode_snapshot(mutation.remote_snapshot.as_ref())?,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(mutation.id.to_string()));
        }
        Ok(())
    }

    fn remove(&self, id: MutationId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM mutations WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    fn get(&self, id: MutationId) -> StoreResult<Option<Mutation>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, kind, entity_type, entity_id, payload, queued_at,
                        attempts, max_attempts, status, last_error, remote_snapshot
                 FROM mutations WHERE id = ?1",
                params![id.to_string()],
                decode_row,
            )
            .optional()?;
        row.transpose()
    }

    fn list_all(&self) -> StoreResult<Vec<Mutation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, entity_type, entity_id, payload, queued_at,
                    attempts, max_attempts, status, last_error, remote_snapshot
             FROM mutations ORDER BY id",
        )?;
        let rows = stmt.query_map([], decode_row)?;

        let mut mutations = Vec::new();
        for row in rows {
            mutations.push(row??);
        }
        Ok(mutations)
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM mutations", [])?;
        Ok(())
    }

    fn read_status(&self) -> StoreResult<Option<SyncStatus>> {
        let conn = self.conn.lock().unwrap();
        let snapshot: Option<String> = conn
            .query_row("SELECT snapshot FROM sync_status WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match snapshot {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_status(&self, status: &SyncStatus) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_status (id, snapshot) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET snapshot = excluded.snapshot",
            params![serde_json::to_string(status)?],
        )?;
        Ok(())
    }
}

fn encode_snapshot(snapshot: Option<&RemoteSnapshot>) -> StoreResult<Option<String>> {
    snapshot
        .map(|s| serde_json::to_string(s))
        .transpose()
        .map_err(Into::into)
}

/// Decodes a mutations row. Returns a nested result so rusqlite's row
/// mapping stays infallible while decode failures surface as `StoreError`.
fn decode_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<Mutation>> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let entity_id: Option<String> = row.get(3)?;
    let payload: String = row.get(4)?;
    let queued_at: String = row.get(5)?;
    let attempts: u32 = row.get(6)?;
    let max_attempts: u32 = row.get(7)?;
    let status: String = row.get(8)?;
    let last_error: Option<String> = row.get(9)?;
    let remote_snapshot: Option<String> = row.get(10)?;

    Ok(build_mutation(
        id,
        kind,
        entity_type,
        entity_id,
        payload,
        queued_at,
        attempts,
        max_attempts,
        status,
        last_error,
        remote_snapshot,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_mutation(
    id: String,
    kind: String,
    entity_type: String,
    entity_id: Option<String>,
    payload: String,
    queued_at: String,
    attempts: u32,
    max_attempts: u32,
    status: String,
    last_error: Option<String>,
    remote_snapshot: Option<String>,
) -> StoreResult<Mutation> {
    let id = MutationId::parse(&id)
        .map_err(|e| StoreError::InvalidData(format!("invalid mutation id: {e}")))?;
    let kind: MutationKind = kind
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("{e}")))?;
    let status: MutationStatus = status
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("{e}")))?;
    let payload: Payload = serde_json::from_str(&payload)?;
    let queued_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&queued_at)
        .map_err(|e| StoreError::InvalidData(format!("invalid queued_at: {e}")))?
        .with_timezone(&Utc);
    let remote_snapshot: Option<RemoteSnapshot> = remote_snapshot
        .map(|json| serde_json::from_str(&json))
        .transpose()?;

    Ok(Mutation {
        id,
        kind,
        target: EntityTarget {
            entity_type,
            entity_id,
        },
        payload,
        queued_at,
        attempts,
        max_attempts,
        status,
        last_error,
        remote_snapshot,
    })
}
