use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use super::{matches_all, Document, DocumentStore, Fields, Filter, RemoteError};

/// Document store backed by a local SQLite database.
///
/// Each document is one row holding its fields as a JSON object. Used as the
/// CLI's default backend when no hosted project is configured.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode_row(row: DocumentRow) -> Result<Document, RemoteError> {
        let value: serde_json::Value =
            serde_json::from_str(&row.data).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Document::new(row.id, value))
    }
}

fn backend(e: sqlx::Error) -> RemoteError {
    RemoteError::Backend(e.to_string())
}

fn encode(fields: &Fields) -> Result<String, RemoteError> {
    serde_json::to_string(fields).map_err(|e| RemoteError::Backend(e.to_string()))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(encode(&fields)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;

        let mut doc = match row {
            Some(row) => Self::decode_row(row)?,
            None => return Err(RemoteError::not_found(collection, id)),
        };
        doc.fields.extend(fields);

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(encode(&doc.fields)?)
            .bind(Utc::now().to_rfc3339())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, RemoteError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let doc = Self::decode_row(row)?;
            if matches_all(filters, &doc.fields) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}
