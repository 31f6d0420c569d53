//! Postgres backend: one JSONB document per row in `users` / `groups`.
//!
//! Every write is a single `INSERT .. ON CONFLICT` statement, so creation and
//! patching are atomic per document without explicit transactions. Patches are
//! applied server side by the `doc_apply` function installed by the migrations.

use async_trait::async_trait;
use models::entities::{group_doc, user_doc};
use models::{Collection, Document, Patch};
use sea_orm::{DatabaseConnection, DbBackend, EntityTrait, Statement, Value as DbValue};
use serde_json::Value;
use tracing::debug;

use super::{BackendMode, DocumentBackend};
use crate::errors::StoreError;
use crate::query::ListQuery;

const COLUMNS: &str = "id, seq, doc, created_at, updated_at";
const RETURNING: &str = "RETURNING id, seq, doc, created_at, updated_at";
// A row inserted by a concurrent transaction after this statement's snapshot
// is invisible to it; the retry sees the committed row.
const GET_OR_CREATE_ATTEMPTS: usize = 3;

pub struct PgDocumentStore {
    pub db: DatabaseConnection,
}

impl PgDocumentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch_one(&self, collection: Collection, stmt: Statement) -> Result<Document, StoreError> {
        let mut rows = self.fetch_all(collection, stmt).await?;
        match rows.pop() {
            Some(doc) => Ok(doc),
            None => Err(StoreError::Db(format!("{collection}: upsert returned no row"))),
        }
    }

    async fn fetch_all(&self, collection: Collection, stmt: Statement) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<Document> = match collection {
            Collection::Users => user_doc::Entity::find()
                .from_raw_sql(stmt)
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| with_id(m.id, m.doc))
                .collect(),
            Collection::Groups => group_doc::Entity::find()
                .from_raw_sql(stmt)
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| with_id(m.id, m.doc))
                .collect(),
        };
        Ok(rows)
    }
}

fn with_id(id: String, doc: Value) -> Document {
    let mut doc = match doc {
        Value::Object(map) => map,
        _ => Document::new(),
    };
    doc.insert("id".into(), Value::String(id));
    doc
}

fn json(doc: &Document) -> DbValue {
    Value::Object(doc.clone()).into()
}

/// Insert `defaults` unless the row exists; returns the stored row either way.
/// An existing row is only read, never rewritten.
pub(crate) fn get_or_create_stmt(collection: Collection, id: &str, defaults: &Document) -> Statement {
    let table = collection.name();
    let sql = format!(
        "WITH ins AS (INSERT INTO {table} (id, doc) VALUES ($1, $2::jsonb) \
         ON CONFLICT (id) DO NOTHING {RETURNING}) \
         SELECT {COLUMNS} FROM ins \
         UNION ALL SELECT {COLUMNS} FROM {table} WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM ins)"
    );
    Statement::from_sql_and_values(DbBackend::Postgres, sql, [DbValue::from(id), json(defaults)])
}

/// Apply `patch` to the stored row, or to `defaults` when the row is absent.
pub(crate) fn merge_update_stmt(collection: Collection, id: &str, defaults: &Document, patch: &Patch) -> Statement {
    let table = collection.name();
    let sql = format!(
        "INSERT INTO {table} (id, doc) VALUES ($1, doc_apply($2::jsonb, $3::jsonb)) \
         ON CONFLICT (id) DO UPDATE SET doc = doc_apply({table}.doc, $3::jsonb), updated_at = now() {RETURNING}"
    );
    Statement::from_sql_and_values(DbBackend::Postgres, sql, [DbValue::from(id), json(defaults), DbValue::from(patch.to_json())])
}

/// Filter and sort on `defaults || doc` so missing fields compare as their
/// defaults. Ties fall back to insertion order.
pub(crate) fn list_stmt(collection: Collection, query: &ListQuery, defaults: &Document) -> Statement {
    let table = collection.name();
    let mut values: Vec<DbValue> = vec![json(defaults)];
    let mut sql = format!("SELECT {COLUMNS} FROM {table}");

    let mut conds = Vec::new();
    for (field, expected) in query.filter.iter() {
        values.push(field.into());
        let f = values.len();
        values.push(expected.clone().into());
        let v = values.len();
        conds.push(format!("(($1::jsonb || doc) -> ${f}::text) = ${v}::jsonb"));
    }
    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }

    values.push(query.sort.field.as_str().into());
    let k = values.len();
    let dir = if query.sort.descending { "DESC" } else { "ASC" };
    sql.push_str(&format!(
        " ORDER BY CASE WHEN jsonb_typeof(($1::jsonb || doc) -> ${k}::text) = 'number' \
         THEN (($1::jsonb || doc) ->> ${k}::text)::numeric ELSE 0 END {dir}, seq ASC"
    ));
    if query.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", query.limit));
    }
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

#[async_trait]
impl DocumentBackend for PgDocumentStore {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn get_or_create(&self, collection: Collection, id: &str, defaults: &Document) -> Result<Document, StoreError> {
        for attempt in 1..=GET_OR_CREATE_ATTEMPTS {
            let mut rows = self.fetch_all(collection, get_or_create_stmt(collection, id, defaults)).await?;
            if let Some(doc) = rows.pop() {
                return Ok(doc);
            }
            debug!(%collection, id, attempt, "row inserted concurrently; reading again");
        }
        Err(StoreError::Db(format!("{collection}: no row for {id} after {GET_OR_CREATE_ATTEMPTS} attempts")))
    }

    async fn merge_update(
        &self,
        collection: Collection,
        id: &str,
        defaults: &Document,
        patch: &Patch,
    ) -> Result<Document, StoreError> {
        debug!(%collection, id, ops = patch.ops().len(), "applying patch");
        self.fetch_one(collection, merge_update_stmt(collection, id, defaults, patch)).await
    }

    async fn list(&self, collection: Collection, query: &ListQuery, defaults: &Document) -> Result<Vec<Document>, StoreError> {
        self.fetch_all(collection, list_stmt(collection, query, defaults)).await
    }
}
