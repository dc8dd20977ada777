use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use super::{
    raw_date, schema, Collection, RemoteDocument, RemoteStore, StoreOp, SubscriberHub,
    Subscription, Touch,
};
use crate::config::ConfigPaths;
use crate::error::StoreError;
use crate::model::{DateRange, Fields, PlanId};

/// Document store backed by a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    hub: Arc<SubscriberHub>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Open the database at the configured location.
    pub fn init(paths: &ConfigPaths) -> Result<Self> {
        let store = Self::open(&paths.database_path)?;
        tracing::info!(path = %paths.database_path.display(), "document store ready");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        prepare_connection(&conn)?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hub: SubscriberHub::new(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    pub fn document(&self, collection: Collection, id: &PlanId) -> Result<Option<Fields>, StoreError> {
        let conn = self.conn.lock();
        load_fields(&conn, collection, id)
    }

    fn query(
        &self,
        collection: Collection,
        range: Option<DateRange>,
    ) -> Result<Vec<RemoteDocument>, StoreError> {
        let conn = self.conn.lock();
        let (start, end) = match range {
            Some(range) => (Some(range.start.to_string()), Some(range.end.to_string())),
            None => (None, None),
        };
        let mut stmt = conn.prepare_cached(
            "SELECT id, fields
             FROM documents
             WHERE collection = ?1
               AND (?2 IS NULL OR (date >= ?2 AND date <= ?3))
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![collection.as_ref(), start, end], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut documents = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            let fields: Fields = serde_json::from_str(&raw)?;
            documents.push(RemoteDocument {
                id: PlanId::from(id),
                fields,
            });
        }
        Ok(documents)
    }
}

fn prepare_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    Ok(())
}

fn load_fields(conn: &Connection, collection: Collection, id: &PlanId) -> Result<Option<Fields>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.as_ref(), id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn store_fields(conn: &Connection, collection: Collection, id: &PlanId, fields: &Fields) -> Result<(), StoreError> {
    let body = serde_json::to_string(fields)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO documents (collection, id, date, fields, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(collection, id) DO UPDATE SET
            date = excluded.date,
            fields = excluded.fields,
            updated_at = excluded.updated_at",
        params![collection.as_ref(), id.as_str(), raw_date(fields), body, now],
    )?;
    Ok(())
}

fn apply_op(conn: &Connection, op: &StoreOp, touched: &mut Vec<Touch>) -> Result<(), StoreError> {
    let collection = op.collection();
    let previous = load_fields(conn, collection, op.id())?;
    if let Some(old) = &previous {
        touched.push((collection, raw_date(old)));
    }
    match op {
        StoreOp::Put { id, fields, .. } => {
            store_fields(conn, collection, id, fields)?;
            touched.push((collection, raw_date(fields)));
        }
        StoreOp::Patch { id, fields, .. } => {
            let mut merged = previous.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            for (name, value) in fields {
                merged.insert(name.clone(), value.clone());
            }
            store_fields(conn, collection, id, &merged)?;
            touched.push((collection, raw_date(&merged)));
        }
        StoreOp::Delete { id, .. } => {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.as_ref(), id.as_str()],
            )?;
        }
    }
    Ok(())
}

impl RemoteStore for SqliteStore {
    fn write(&self, collection: Collection, fields: Fields) -> Result<PlanId, StoreError> {
        let id = PlanId::generate();
        self.commit(&[StoreOp::Put {
            collection,
            id: id.clone(),
            fields,
        }])?;
        Ok(id)
    }

    fn update(&self, collection: Collection, id: &PlanId, fields: Fields) -> Result<(), StoreError> {
        self.commit(&[StoreOp::Patch {
            collection,
            id: id.clone(),
            fields,
        }])
    }

    fn delete(&self, collection: Collection, id: &PlanId) -> Result<(), StoreError> {
        self.commit(&[StoreOp::Delete {
            collection,
            id: id.clone(),
        }])
    }

    fn commit(&self, ops: &[StoreOp]) -> Result<(), StoreError> {
        let mut touched = Vec::new();
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for op in ops {
                apply_op(&tx, op, &mut touched)?;
            }
            tx.commit()?;
        }
        self.hub
            .publish(&touched, |collection, range| self.query(collection, range));
        Ok(())
    }

    fn subscribe(
        &self,
        collection: Collection,
        range: Option<DateRange>,
    ) -> Result<Subscription, StoreError> {
        self.hub
            .subscribe(collection, range, |collection, range| self.query(collection, range))
    }
}
