use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pouch_books::database_ops::catalog::{CatalogProvider, HttpCatalogProvider};
use pouch_books::database_ops::ebooks::{IngestPolicy, StoredBook};
use pouch_books::logging::init_tracing;
use pouch_books::util::env;
use pouch_books::{CatalogSynchronizer, SyncConfig, SyncOutcome, SyncSource};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pouch", version, about = "E-book catalog cache admin CLI")]
struct Cli {
    /// Book store file (overrides POUCH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Catalog base URL, with trailing '/' (overrides POUCH_CATALOG_URL)
    #[arg(long, global = true)]
    catalog_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Download the catalog if the store is empty, then print a summary
    Sync {
        /// Clear the store first and download again
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Fail the whole ingestion if any row cannot be inserted
        #[arg(long, default_value_t = false)]
        atomic: bool,
    },
    /// Clear the store and download the catalog again (same as `sync --force`)
    Refresh {
        #[arg(long, default_value_t = false)]
        atomic: bool,
    },
    /// Print the stored books
    List {
        /// Emit JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the number of stored books
    Count,
    /// Delete every stored book
    Clear,
    /// Fetch and decode the remote catalog without touching the store
    Fetch {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn resolve_config(cli: &Cli) -> Result<SyncConfig> {
    let mut cfg = SyncConfig::from_env()?;
    if let Some(db) = &cli.db {
        cfg.db_path = db.clone();
    }
    if let Some(url) = &cli.catalog_url {
        cfg.catalog_url = url.clone();
    }
    Ok(cfg)
}

fn print_books(books: &[StoredBook]) {
    for b in books {
        println!(
            "{:>4}  {:<40}  {:<24}  {:>2}  {}",
            b.id, b.name, b.author, b.rating, b.thumbnail_url
        );
    }
}

fn print_outcome(outcome: &SyncOutcome) {
    match &outcome.source {
        SyncSource::Cache => println!(
            "store already populated: {} books (no download)",
            outcome.books.len()
        ),
        SyncSource::Fetched(report) => {
            println!(
                "downloaded catalog: {} of {} books stored",
                report.inserted, report.attempted
            );
            for f in &report.failed {
                println!("  skipped #{} {:?}: {}", f.id, f.name, f.reason);
            }
        }
    }
}

async fn run_sync(cfg: SyncConfig, force: bool) -> Result<()> {
    let sync = CatalogSynchronizer::connect(&cfg)
        .await
        .context("opening book store")?;
    let result = sync.synchronize(force).await;
    sync.db().close().await;
    let outcome = result.context("catalog synchronize failed")?;
    print_outcome(&outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("warn,pouch_books=info")?;
    env::bootstrap_cli("pouch");

    let cli = Cli::parse();
    let mut cfg = resolve_config(&cli)?;

    let outcome = match cli.command {
        Commands::Sync { force, atomic } => {
            if atomic {
                cfg.policy = IngestPolicy::Atomic;
            }
            run_sync(cfg, force).await
        }
        Commands::Refresh { atomic } => {
            if atomic {
                cfg.policy = IngestPolicy::Atomic;
            }
            run_sync(cfg, true).await
        }
        Commands::List { json } => {
            let db = cfg.open_store().await.context("opening book store")?;
            let books = db.list_books().await;
            db.close().await;
            let books = books?;
            if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
            } else {
                print_books(&books);
            }
            Ok(())
        }
        Commands::Count => {
            let db = cfg.open_store().await.context("opening book store")?;
            let count = db.count_books().await;
            db.close().await;
            println!("{}", count?);
            Ok(())
        }
        Commands::Clear => {
            let db = cfg.open_store().await.context("opening book store")?;
            let removed = db.delete_all().await;
            db.close().await;
            let removed = removed?;
            info!(removed, "clear finished");
            println!("removed {removed} books");
            Ok(())
        }
        Commands::Fetch { json } => {
            let provider = HttpCatalogProvider::new(&cfg.catalog_url, Some(cfg.http_timeout_secs))?;
            let entries = provider
                .fetch_catalog()
                .await
                .with_context(|| format!("fetching {}", provider.index_url()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (i, e) in entries.iter().enumerate() {
                    println!(
                        "{:>4}  {:<40}  {:<24}  {:>4}  {}",
                        i,
                        e.name,
                        e.attributes.author,
                        e.rating,
                        e.attributes.isbn.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
    };

    if let Err(err) = &outcome {
        error!(error = %format!("{err:#}"), "pouch command failed");
    }
    outcome
}
