// HTTP API server binary for the book catalog
// Synchronizes once at startup, then serves the stored list and refresh triggers

use actix_web::web;
use anyhow::{Context, Result};
use pouch_books::api::ApiServer;
use pouch_books::logging::{init_tracing, DEFAULT_FILTER};
use pouch_books::util::env as env_util;
use pouch_books::{CatalogSynchronizer, SyncConfig};

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    env_util::bootstrap_cli("api_server");

    let server = ApiServer::from_env()?;
    let cfg = SyncConfig::from_env()?;
    let sync = CatalogSynchronizer::connect(&cfg)
        .await
        .context("opening book store")?;
    let sync = web::Data::new(sync);

    // Mount-time population: a failure is logged and the server still starts with
    // whatever the store already holds.
    match sync.synchronize(false).await {
        Ok(outcome) => tracing::info!(books = outcome.books.len(), "initial synchronize done"),
        Err(err) => tracing::warn!(error = %err, "initial synchronize failed; serving current store"),
    }

    let result = server.run(sync.clone()).await;
    sync.db().close().await;
    result
}
