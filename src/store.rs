//! Durable per-channel option overrides.
//!
//! One embedded SQLite table, one row per channel, one nullable column per
//! schema field. Every piece of SQL here is generated from the schema table
//! in [`crate::options::schema`], so the persisted layout follows the
//! declared fields without any per-call reflection. Upserts merge
//! field-by-field in a single `INSERT .. ON CONFLICT .. RETURNING`
//! statement, which keeps concurrent writers atomic without explicit
//! transactions.

use std::path::Path;
use std::sync::LazyLock;

use libsql::{Builder, Connection, params};

use crate::error::StoreError;
use crate::options::schema::{self, FieldKind, FieldValue, OptionsPatch};

const TABLE: &str = "channel_options";

static CREATE_TABLE_SQL: LazyLock<String> = LazyLock::new(|| {
    let columns: Vec<String> = schema::FIELDS
        .iter()
        .map(|spec| format!("{} {}", spec.name, spec.kind.column_type()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (channel TEXT PRIMARY KEY, {})",
        columns.join(", ")
    )
});

static SELECT_SQL: LazyLock<String> = LazyLock::new(|| {
    format!("SELECT {} FROM {TABLE} WHERE channel = ?1", field_list())
});

static UPSERT_SQL: LazyLock<String> = LazyLock::new(|| {
    let placeholders: Vec<String> = (0..schema::FIELDS.len())
        .map(|i| format!("?{}", i + 2))
        .collect();
    let merges: Vec<String> = schema::FIELDS
        .iter()
        .map(|spec| {
            format!(
                "{name} = COALESCE(excluded.{name}, {TABLE}.{name})",
                name = spec.name
            )
        })
        .collect();
    format!(
        "INSERT INTO {TABLE} (channel, {fields}) VALUES (?1, {placeholders}) \
         ON CONFLICT(channel) DO UPDATE SET {merges} RETURNING {fields}",
        fields = field_list(),
        placeholders = placeholders.join(", "),
        merges = merges.join(", "),
    )
});

fn field_list() -> String {
    schema::FIELDS
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persistent mapping from channel id to its option override record.
///
/// The sole writer of channel overrides. Each `get`/`upsert` is one
/// statement on one connection; no cross-call locks are held.
#[derive(Clone)]
pub struct ChannelOptionStore {
    conn: Connection,
}

impl ChannelOptionStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = Builder::new_local(path).build().await?;
        let store = Self::init(db).await?;
        tracing::debug!(path = %path.display(), "channel option store opened");
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::init(db).await
    }

    async fn init(db: libsql::Database) -> Result<Self, StoreError> {
        let conn = db.connect()?;
        conn.execute(&CREATE_TABLE_SQL, ()).await?;
        Ok(Self { conn })
    }

    /// The stored override for `channel`, or an all-absent record if the
    /// channel has never set defaults. A missing row is not an error.
    pub async fn get(&self, channel: &str) -> Result<OptionsPatch, StoreError> {
        let mut rows = self.conn.query(&SELECT_SQL, params![channel]).await?;
        match rows.next().await? {
            Some(row) => row_to_patch(channel, &row),
            None => Ok(OptionsPatch::default()),
        }
    }

    /// Merge `updates` into the stored record for `channel`, creating the
    /// record if needed, and return the resulting full record. Fields absent
    /// from `updates` keep their stored values.
    pub async fn upsert(
        &self,
        channel: &str,
        updates: &OptionsPatch,
    ) -> Result<OptionsPatch, StoreError> {
        let mut bound = Vec::with_capacity(schema::FIELDS.len() + 1);
        bound.push(libsql::Value::Text(channel.to_string()));
        bound.extend(bind_values(updates));
        let mut rows = self.conn.query(&UPSERT_SQL, bound).await?;
        let row = rows.next().await?.ok_or_else(|| StoreError::Decode {
            channel: channel.to_string(),
            reason: "upsert returned no row".to_string(),
        })?;
        let stored = row_to_patch(channel, &row)?;
        tracing::debug!(channel, "channel override updated");
        Ok(stored)
    }
}

/// Patch values as SQL parameters, in schema field order. Absent fields
/// bind NULL, which the COALESCE merge treats as "keep the stored value".
fn bind_values(patch: &OptionsPatch) -> Vec<libsql::Value> {
    schema::FIELDS
        .iter()
        .map(|spec| match patch.get(spec.name) {
            None => libsql::Value::Null,
            Some(FieldValue::String(s)) => libsql::Value::Text(s),
            Some(FieldValue::Float(v)) => libsql::Value::Real(v),
            Some(FieldValue::Integer(v)) => libsql::Value::Integer(v),
            Some(FieldValue::Boolean(v)) => libsql::Value::Integer(v as i64),
        })
        .collect()
}

fn row_to_patch(channel: &str, row: &libsql::Row) -> Result<OptionsPatch, StoreError> {
    let mut patch = OptionsPatch::default();
    for (index, spec) in schema::FIELDS.iter().enumerate() {
        let index = index as i32;
        let value = match spec.kind {
            FieldKind::String => row.get::<Option<String>>(index)?.map(FieldValue::String),
            FieldKind::Float => row.get::<Option<f64>>(index)?.map(FieldValue::Float),
            FieldKind::Integer => row.get::<Option<i64>>(index)?.map(FieldValue::Integer),
            FieldKind::Boolean => row
                .get::<Option<i64>>(index)?
                .map(|v| FieldValue::Boolean(v != 0)),
        };
        if let Some(value) = value {
            patch.set(spec.name, value).map_err(|e| StoreError::Decode {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(patch)
}
