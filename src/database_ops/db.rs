use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Executor, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::database_ops::ebooks::{IngestPolicy, IngestReport, RowFailure, StoredBook};
use crate::error::{Result, SyncError};

const CREATE_EBOOKS: &str = "CREATE TABLE IF NOT EXISTS Ebooks (\
    book_id INTEGER PRIMARY KEY NOT NULL,\
    name VARCHAR(140) NOT NULL,\
    author VARCHAR(140),\
    rating INTEGER,\
    tags VARCHAR(140),\
    bannerUrl VARCHAR(256),\
    thumbnailUrl VARCHAR(256)\
)";

const SELECT_BOOKS: &str = "SELECT book_id AS id, name, \
    COALESCE(author, '') AS author, \
    COALESCE(rating, 0) AS rating, \
    COALESCE(tags, '') AS tags, \
    COALESCE(bannerUrl, '') AS banner_url, \
    COALESCE(thumbnailUrl, '') AS thumbnail_url \
    FROM Ebooks ORDER BY book_id";

const INSERT_BOOK: &str = "INSERT INTO Ebooks (book_id, name, author, rating, tags, bannerUrl, thumbnailUrl) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

/// Owned handle to the local book store.
///
/// Backed by a single-connection pool: the store file has exactly one writer and
/// every statement (including a whole ingestion transaction) runs on that one
/// connection. Clones share the same connection.
#[derive(Clone, Debug)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the store file at `path` and ensure the schema.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        info!("book store opened");

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Ephemeral store; lives as long as the handle.
    pub async fn in_memory() -> Result<Self> {
        // An in-memory SQLite database is wiped once its last connection closes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        debug!("in-memory book store opened");

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_EBOOKS).execute(&self.pool).await?;
        Ok(())
    }

    /// Cheap liveness probe for health checks.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn count_books(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM Ebooks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn list_books(&self) -> Result<Vec<StoredBook>> {
        let rows = sqlx::query_as::<_, StoredBook>(SELECT_BOOKS)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Insert one row outside any ingestion pass. Returns the SQLite rowid.
    pub async fn insert_book(&self, book: &StoredBook) -> Result<i64> {
        Ok(insert_row(&self.pool, book).await?)
    }

    /// Delete every stored book; returns how many rows went away.
    pub async fn delete_all(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM Ebooks").execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    /// Write a freshly mapped catalog inside one transaction, one awaited insert at a time.
    ///
    /// Each row runs in its own savepoint. Under [`IngestPolicy::Lenient`] a failed row
    /// is rolled back to its savepoint, logged, recorded in the report and skipped.
    /// Under [`IngestPolicy::Atomic`] the first failure rolls everything back.
    /// A failure that ends the enclosing transaction itself (`RAISE(ROLLBACK)`, a full
    /// disk) stops the pass with a storage error under either policy.
    #[instrument(skip(self, books), fields(rows = books.len()))]
    pub async fn ingest(&self, books: &[StoredBook], policy: IngestPolicy) -> Result<IngestReport> {
        let mut report = IngestReport {
            attempted: books.len(),
            ..IngestReport::default()
        };
        let mut tx = self.pool.begin().await?;

        for book in books {
            let mut row = tx.begin().await?;
            match insert_row(&mut *row, book).await {
                Ok(_) => {
                    row.commit().await?;
                    report.inserted += 1;
                    debug!(id = book.id, "inserted book");
                }
                Err(err) => {
                    if let Err(lost) = row.rollback().await {
                        error!(id = book.id, error = %err, savepoint = %lost, "insert ended the ingest transaction");
                        return Err(SyncError::Storage(err));
                    }
                    match policy {
                        IngestPolicy::Lenient => {
                            warn!(id = book.id, name = %book.name, error = %err, "could not insert book; skipping");
                            report.failed.push(RowFailure {
                                id: book.id,
                                name: book.name.clone(),
                                reason: err.to_string(),
                            });
                        }
                        IngestPolicy::Atomic => {
                            tx.rollback().await?;
                            return Err(SyncError::RowInsert {
                                id: book.id,
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Release the underlying connection. Further use of any clone fails.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("book store closed");
    }
}

async fn insert_row<'e, E>(executor: E, book: &StoredBook) -> std::result::Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(INSERT_BOOK)
        .bind(book.id)
        .bind(&book.name)
        .bind(&book.author)
        .bind(book.rating)
        .bind(&book.tags)
        .bind(&book.banner_url)
        .bind(&book.thumbnail_url)
        .execute(executor)
        .await?;
    Ok(done.last_insert_rowid())
}
