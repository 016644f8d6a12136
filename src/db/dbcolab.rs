use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};

/// Permission a principal holds on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocPermission {
    Owner,
    Edit,
    View,
}

/// What the ACL tables say about one (principal, document) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentAccess {
    /// No live document with that key.
    Missing,
    /// The document exists but grants the principal nothing.
    Denied,
    Granted(DocPermission),
}

/// Database connection pool
pub struct DbColab {
    pool: PgPool,
}

impl DbColab {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Connectivity check used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), SqlxError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the snapshot table if it does not exist yet. The ACL tables
    /// belong to the document service and are only read here.
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        let query_sql = r#"
            CREATE TABLE IF NOT EXISTS document_snapshots (
                kind TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                content BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (kind, doc_id)
            )
        "#;
        sqlx::query(query_sql).execute(&self.pool).await?;
        info!("Snapshot table ready");
        Ok(())
    }

    /// Load the stored snapshot of a document
    ///
    /// # Returns
    /// * `Result<Option<Vec<u8>>, SqlxError>` - Snapshot bytes, or None for a new document
    pub async fn load_snapshot(&self, kind: &str, doc_id: &str) -> Result<Option<Vec<u8>>, SqlxError> {
        let row = sqlx::query(
            "SELECT content FROM document_snapshots WHERE kind = $1 AND doc_id = $2",
        )
        .bind(kind)
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("content")?)),
            None => Ok(None),
        }
    }

    /// Overwrite the snapshot of a document
    pub async fn save_snapshot(&self, kind: &str, doc_id: &str, content: &[u8]) -> Result<(), SqlxError> {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "Saving snapshot of {}/{} ({} bytes). Pool connections: {} idle, {} in use",
            kind,
            doc_id,
            content.len(),
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        let query_sql = r#"
            INSERT INTO document_snapshots (kind, doc_id, content, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, doc_id)
            DO UPDATE SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
        "#;

        sqlx::query(query_sql)
            .bind(kind)
            .bind(doc_id)
            .bind(content)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to save snapshot of {}/{}: {}", kind, doc_id, e);
                e
            })?;
        Ok(())
    }

    /// Resolve what `principal` may do on a document.
    pub async fn document_access(
        &self,
        kind: &str,
        doc_id: &str,
        principal: &str,
    ) -> Result<DocumentAccess, SqlxError> {
        let query_sql = r#"
            SELECT
                d.owner = $3 AS is_owner,
                COALESCE(BOOL_OR(da.permission = 'edit'), FALSE) AS can_edit,
                COALESCE(BOOL_OR(da.permission = 'view'), FALSE) AS can_view
            FROM documents d
            LEFT JOIN document_acl da
                ON da.kind = d.kind AND da.document = d.id AND da.prpl = $3
            WHERE
                d.kind = $1
                AND d.id = $2
                AND d.deleted = FALSE
            GROUP BY d.owner
        "#;

        let row = sqlx::query(query_sql)
            .bind(kind)
            .bind(doc_id)
            .bind(principal)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(DocumentAccess::Missing);
        };
        let is_owner: bool = row.try_get("is_owner")?;
        let can_edit: bool = row.try_get("can_edit")?;
        let can_view: bool = row.try_get("can_view")?;

        Ok(if is_owner {
            DocumentAccess::Granted(DocPermission::Owner)
        } else if can_edit {
            DocumentAccess::Granted(DocPermission::Edit)
        } else if can_view {
            DocumentAccess::Granted(DocPermission::View)
        } else {
            DocumentAccess::Denied
        })
    }
}
