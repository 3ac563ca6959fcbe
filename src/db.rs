// src/db.rs
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::backend::{increment_patch, BackendError, Counts, DocumentRef, DocumentStore};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

pub async fn ensure_schema(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vote_documents (
            collection TEXT NOT NULL,
            document TEXT NOT NULL,
            counts JSONB NOT NULL DEFAULT '{}'::jsonb,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (collection, document)
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("vote_documents table ready");
    Ok(())
}

/// Totals documents stored as JSONB rows, one per (collection, document).
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn fetch(&self, doc: DocumentRef) -> Result<Option<Counts>, BackendError> {
        let counts = sqlx::query_scalar::<_, Json<Counts>>(
            "SELECT counts FROM vote_documents WHERE collection = $1 AND document = $2",
        )
        .bind(doc.collection)
        .bind(doc.document)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counts.map(|Json(counts)| counts))
    }

    async fn increment(&self, doc: DocumentRef, key: &str) -> Result<Counts, BackendError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO vote_documents (collection, document)
            VALUES ($1, $2)
            ON CONFLICT (collection, document) DO NOTHING
            "#,
        )
        .bind(doc.collection)
        .bind(doc.document)
        .execute(&mut *tx)
        .await?;

        // Row lock held until commit; concurrent increments queue here.
        let Json(current) = sqlx::query_scalar::<_, Json<Counts>>(
            "SELECT counts FROM vote_documents WHERE collection = $1 AND document = $2 FOR UPDATE",
        )
        .bind(doc.collection)
        .bind(doc.document)
        .fetch_one(&mut *tx)
        .await?;

        let patch = increment_patch(Some(&current), key);

        let Json(merged) = sqlx::query_scalar::<_, Json<Counts>>(
            r#"
            UPDATE vote_documents
            SET counts = counts || $3, updated_at = now()
            WHERE collection = $1 AND document = $2
            RETURNING counts
            "#,
        )
        .bind(doc.collection)
        .bind(doc.document)
        .bind(Json(patch))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(merged)
    }
}
