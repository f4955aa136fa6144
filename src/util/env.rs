//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use tracing::{debug, info};

use crate::database_ops::catalog::DEFAULT_CATALOG_URL;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        // Fallback to Cargo project root
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Common bootstrap for binaries: load env once and log which settings came from it.
pub fn bootstrap_cli(bin_name: &str) {
    init_env();
    for key in [
        "POUCH_DB_PATH",
        "POUCH_CATALOG_URL",
        "POUCH_INGEST_POLICY",
        "POUCH_HTTP_TIMEOUT_SECS",
    ] {
        if env_opt(key).is_some() {
            debug!(target: "bootstrap", bin = bin_name, key, "setting provided by environment");
        }
    }
    info!(target: "bootstrap", bin = bin_name, "environment loaded");
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parsed value that must be valid when present.
pub fn env_parse_strict<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(None),
    }
}

/// Catalog base URL (`POUCH_CATALOG_URL`), defaulting to the public online catalog.
pub fn catalog_url() -> String {
    env_opt("POUCH_CATALOG_URL").unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string())
}

/// Book store file (`POUCH_DB_PATH`), defaulting to `ebooks.db` in the working directory.
pub fn db_path() -> PathBuf {
    env_opt("POUCH_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ebooks.db"))
}
