//! Catalog synchronizer: keeps the local book store holding the remote catalog,
//! fetching only when the store is empty or a refresh was requested.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::database_ops::catalog::{CatalogProvider, HttpCatalogProvider};
use crate::database_ops::db::Db;
use crate::database_ops::ebooks::{map_catalog, IngestPolicy, IngestReport, StoredBook};
use crate::error::{Result, SyncError};
use crate::util::env;

/// Settings needed to stand up a synchronizer against a store file and a remote catalog.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub catalog_url: String,
    pub http_timeout_secs: u64,
    pub policy: IngestPolicy,
}

impl SyncConfig {
    /// Resolve from `POUCH_*` environment variables (after dotenv).
    pub fn from_env() -> anyhow::Result<Self> {
        env::init_env();
        let policy = env::env_parse_strict::<IngestPolicy>("POUCH_INGEST_POLICY")?.unwrap_or_default();
        let http_timeout_secs = env::env_parse_strict::<u64>("POUCH_HTTP_TIMEOUT_SECS")?.unwrap_or(15);
        Ok(Self {
            db_path: env::db_path(),
            catalog_url: env::catalog_url(),
            http_timeout_secs,
            policy,
        })
    }

    /// Open only the book store; the catalog URL is not consulted.
    pub async fn open_store(&self) -> Result<Db> {
        Db::open(&self.db_path).await
    }
}

/// Where the books of a successful synchronize came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncSource {
    /// Store was already populated; nothing was fetched.
    Cache,
    /// Store was empty; the catalog was fetched and ingested.
    Fetched(IngestReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Rows as re-read from the store after the run, ordered by id.
    pub books: Vec<StoredBook>,
    pub source: SyncSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    Cache { rows: usize },
    Fetched { rows: usize, failed: usize },
    Failed { kind: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub forced: bool,
    #[serde(flatten)]
    pub result: RunResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub in_flight: bool,
    pub policy: IngestPolicy,
    pub last_run: Option<LastRun>,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Held for the whole of any store mutation. The flag is declared first so it
/// is cleared before the gate opens for the next holder.
struct Exclusive<'a> {
    _flag: InFlight<'a>,
    _gate: MutexGuard<'a, ()>,
}

/// Owns the store handle and the catalog source; serializes every mutation of the store.
pub struct CatalogSynchronizer {
    db: Db,
    provider: Arc<dyn CatalogProvider>,
    policy: IngestPolicy,
    gate: Mutex<()>,
    in_flight: AtomicBool,
    last_run: StdMutex<Option<LastRun>>,
}

impl CatalogSynchronizer {
    pub fn new(db: Db, provider: Arc<dyn CatalogProvider>, policy: IngestPolicy) -> Self {
        Self {
            db,
            provider,
            policy,
            gate: Mutex::new(()),
            in_flight: AtomicBool::new(false),
            last_run: StdMutex::new(None),
        }
    }

    /// Open the store at `cfg.db_path` and wire an HTTP catalog provider.
    pub async fn connect(cfg: &SyncConfig) -> Result<Self> {
        let provider = HttpCatalogProvider::new(&cfg.catalog_url, Some(cfg.http_timeout_secs))?;
        let db = Db::open(&cfg.db_path).await?;
        info!(
            db_path = %cfg.db_path.display(),
            catalog_url = %cfg.catalog_url,
            policy = %cfg.policy,
            "catalog synchronizer ready"
        );
        Ok(Self::new(db, Arc::new(provider), cfg.policy))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn policy(&self) -> IngestPolicy {
        self.policy
    }

    pub fn catalog_url(&self) -> &str {
        self.provider.base_url()
    }

    /// Ensure the store holds the catalog. Waits for any run already in flight.
    pub async fn synchronize(&self, force_refresh: bool) -> Result<SyncOutcome> {
        let _held = self.exclusive().await;
        self.run_exclusive(force_refresh).await
    }

    /// Like [`synchronize`](Self::synchronize) but fails with [`SyncError::InFlight`]
    /// instead of waiting when another run holds the store.
    pub async fn try_synchronize(&self, force_refresh: bool) -> Result<SyncOutcome> {
        let _held = self.try_exclusive()?;
        self.run_exclusive(force_refresh).await
    }

    /// Discard the stored catalog and ingest it again.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        self.synchronize(true).await
    }

    pub async fn try_refresh(&self) -> Result<SyncOutcome> {
        self.try_synchronize(true).await
    }

    /// Current rows, without touching the network.
    pub async fn books(&self) -> Result<Vec<StoredBook>> {
        self.db.list_books().await
    }

    /// Delete every stored book. Waits for any run in flight.
    pub async fn clear(&self) -> Result<u64> {
        let _held = self.exclusive().await;
        let removed = self.db.delete_all().await?;
        info!(removed, "stored books cleared");
        Ok(removed)
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            policy: self.policy,
            last_run: self.last_run_snapshot(),
        }
    }

    async fn exclusive(&self) -> Exclusive<'_> {
        let gate = self.gate.lock().await;
        Exclusive {
            _flag: InFlight::enter(&self.in_flight),
            _gate: gate,
        }
    }

    fn try_exclusive(&self) -> Result<Exclusive<'_>> {
        let gate = self.gate.try_lock().map_err(|_| SyncError::InFlight)?;
        Ok(Exclusive {
            _flag: InFlight::enter(&self.in_flight),
            _gate: gate,
        })
    }

    fn last_run_snapshot(&self) -> Option<LastRun> {
        match self.last_run.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, run: LastRun) {
        match self.last_run.lock() {
            Ok(mut guard) => *guard = Some(run),
            Err(poisoned) => *poisoned.into_inner() = Some(run),
        }
    }

    async fn run_exclusive(&self, force_refresh: bool) -> Result<SyncOutcome> {
        let started_at = Utc::now();
        let t0 = Instant::now();

        let outcome = self.pipeline(force_refresh).await;

        let result = match &outcome {
            Ok(SyncOutcome {
                books,
                source: SyncSource::Cache,
            }) => RunResult::Cache { rows: books.len() },
            Ok(SyncOutcome {
                books,
                source: SyncSource::Fetched(report),
            }) => RunResult::Fetched {
                rows: books.len(),
                failed: report.failed.len(),
            },
            Err(err) => {
                error!(kind = err.kind(), error = %err, forced = force_refresh, "catalog synchronize failed");
                RunResult::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        self.record(LastRun {
            started_at,
            duration_ms: t0.elapsed().as_millis() as u64,
            forced: force_refresh,
            result,
        });
        outcome
    }

    #[instrument(skip(self), fields(catalog_url = %self.provider.base_url()))]
    async fn pipeline(&self, force_refresh: bool) -> Result<SyncOutcome> {
        if force_refresh {
            let removed = self.db.delete_all().await?;
            info!(removed, "cleared stored books for refresh");
        }

        let count = self.db.count_books().await?;
        if count > 0 {
            debug!(count, "store already populated; skipping download");
            let books = self.db.list_books().await?;
            return Ok(SyncOutcome {
                books,
                source: SyncSource::Cache,
            });
        }

        info!(index = %self.provider.index_url(), "store empty; downloading catalog");
        let entries = self.provider.fetch_catalog().await?;
        let rows = map_catalog(&entries, self.provider.base_url());
        let report = self.db.ingest(&rows, self.policy).await?;
        if report.is_complete() {
            info!(inserted = report.inserted, "catalog ingested");
        } else {
            warn!(
                inserted = report.inserted,
                failed = report.failed.len(),
                "catalog ingested with skipped rows"
            );
        }

        let books = self.db.list_books().await?;
        Ok(SyncOutcome {
            books,
            source: SyncSource::Fetched(report),
        })
    }
}
