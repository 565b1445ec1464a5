//! `SQLite` document store.
//!
//! Each document is stored as JSON text in a single `documents` table keyed
//! by `(collection, key)`. Field lookups go through SQLite's JSON functions,
//! so the range scan used by discovery is a `json_extract(...) BETWEEN`
//! filter evaluated inside the database.

// SQLite operations need to hold the lock for the duration of the operation.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{
    apply_array_move, apply_array_remove, apply_array_union, Document, DocumentStore, Result,
    StoreError,
};

/// `SQLite`-backed document store.
///
/// Blocking `rusqlite` calls run on the tokio blocking pool. Writes that
/// read-modify-write a document hold the connection lock for the whole edit,
/// which makes array union/remove atomic per document.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore").finish_non_exhaustive()
    }
}

impl SqliteDocumentStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| {
                StoreError::Unavailable(format!("Failed to acquire database lock: {e}"))
            })?;
            op(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("Store task failed: {e}")))?
    }

    async fn edit<F>(&self, collection: &str, key: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Document) -> Result<()> + Send + 'static,
    {
        let collection = collection.to_string();
        let key = key.to_string();

        self.run(move |conn| {
            let mut document = read_document(conn, &collection, &key)?
                .ok_or_else(|| StoreError::not_found(&collection, &key))?;
            edit(&mut document)?;
            write_document(conn, &collection, &key, &document)
        })
        .await
    }
}

fn read_document(conn: &Connection, collection: &str, key: &str) -> Result<Option<Document>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection, key],
            |row| row.get(0),
        )
        .optional()?;

    body.map(|b| parse_document(&b)).transpose()
}

fn write_document(
    conn: &Connection,
    collection: &str,
    key: &str,
    document: &Document,
) -> Result<()> {
    let body = serde_json::to_string(document)?;
    conn.execute(
        r"
        INSERT INTO documents (collection, key, body)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(collection, key) DO UPDATE SET body = excluded.body
        ",
        params![collection, key, body],
    )?;
    Ok(())
}

fn parse_document(body: &str) -> Result<Document> {
    match serde_json::from_str(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidDocument(
            "stored body is not a JSON object".to_string(),
        )),
    }
}

fn query_documents(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    bodies.iter().map(|b| parse_document(b)).collect()
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| write_document(conn, &collection, &key, &document))
            .await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Document> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| {
            read_document(conn, &collection, &key)?
                .ok_or_else(|| StoreError::not_found(&collection, &key))
        })
        .await
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let path = json_path(field);
        let value = serde_json::to_string(value)?;
        self.run(move |conn| {
            query_documents(
                conn,
                r"
                SELECT body FROM documents
                WHERE collection = ?1
                  AND json_extract(body, ?2) = json_extract(?3, '$')
                ORDER BY key
                ",
                params![collection, path, value],
            )
        })
        .await
    }

    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        start: &str,
        end: &str,
        order_by: &str,
    ) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let path = json_path(field);
        let order_path = json_path(order_by);
        let start = start.to_string();
        let end = end.to_string();
        self.run(move |conn| {
            query_documents(
                conn,
                r"
                SELECT body FROM documents
                WHERE collection = ?1
                  AND json_type(body, ?2) = 'text'
                  AND json_extract(body, ?2) BETWEEN ?3 AND ?4
                ORDER BY json_extract(body, ?5), key
                ",
                params![collection, path, start, end, order_path],
            )
        })
        .await
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let path = json_path(field);
        let value = serde_json::to_string(value)?;
        self.run(move |conn| {
            query_documents(
                conn,
                r"
                SELECT body FROM documents
                WHERE collection = ?1
                  AND json_type(body, ?2) = 'array'
                  AND EXISTS (
                      SELECT 1 FROM json_each(documents.body, ?2) AS item
                      WHERE item.value = json_extract(?3, '$')
                  )
                ORDER BY key
                ",
                params![collection, path, value],
            )
        })
        .await
    }

    async fn update_fields(&self, collection: &str, key: &str, fields: Document) -> Result<()> {
        self.edit(collection, key, move |document| {
            document.extend(fields);
            Ok(())
        })
        .await
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let field = field.to_string();
        self.edit(collection, key, move |document| {
            apply_array_union(document, &field, value)
        })
        .await
    }

    async fn array_remove(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let field = field.to_string();
        self.edit(collection, key, move |document| {
            apply_array_remove(document, &field, &value)
        })
        .await
    }

    async fn array_move(
        &self,
        collection: &str,
        key: &str,
        from: &str,
        to: &str,
        value: Value,
    ) -> Result<()> {
        let from = from.to_string();
        let to = to.to_string();
        self.edit(collection, key, move |document| {
            apply_array_move(document, &from, &to, value)
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
            )?;
            if removed == 0 {
                return Err(StoreError::not_found(&collection, &key));
            }
            Ok(())
        })
        .await
    }
}
