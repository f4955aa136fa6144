use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Document name of the catalog index, relative to the catalog base URL.
pub const CATALOG_INDEX: &str = "index.json";

/// Base of the public online catalog the app was built against.
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/rodrigoelp/reactnative-typescript-exercise-15/master/onlineCatalog/";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

// ---------- Catalog wire shapes ----------
// Only `name`, `rate`, `tags` and the author/image attributes are required; the
// remaining overview attributes are carried for previews and never persisted.

/// One book as listed by the remote catalog index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub tags: String,
    #[serde(rename = "rate")]
    pub rating: f64,
    pub attributes: CatalogAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAttributes {
    #[serde(rename = "overview_author")]
    pub author: String,
    #[serde(rename = "images_thumbnail")]
    pub thumbnail_path: String,
    #[serde(rename = "images_banner")]
    pub banner_path: String,
    #[serde(rename = "overview_status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "overview_category", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "overview_name", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "overview_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "overview_isbn", default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(rename = "overview_provider", default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(rename = "overview_description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Decode a catalog index body. Anything but a JSON array of entries is a decode error.
pub fn decode_catalog(body: &[u8]) -> Result<Vec<CatalogEntry>> {
    Ok(serde_json::from_slice(body)?)
}

/// Join the catalog base with a relative path. The base is used verbatim, as published.
pub fn resolve_catalog_url(base_url: &str, relative: &str) -> String {
    format!("{base_url}{relative}")
}

/// Source of the remote catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Base URL that relative asset paths and the index are resolved against.
    fn base_url(&self) -> &str;

    fn index_url(&self) -> String {
        resolve_catalog_url(self.base_url(), CATALOG_INDEX)
    }

    /// Fetch and decode the catalog index. Issues exactly one request.
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>>;
}

/// Catalog provider backed by a plain HTTP GET of `<base>index.json`.
#[derive(Debug, Clone)]
pub struct HttpCatalogProvider {
    base_url: String,
    http: Client,
}

impl HttpCatalogProvider {
    pub fn new(base_url: &str, timeout_secs: Option<u64>) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("invalid catalog url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "catalog url must be http(s), got {}",
                parsed.scheme()
            )));
        }
        if !base_url.ends_with('/') {
            warn!(
                catalog_url = base_url,
                "catalog url has no trailing '/'; asset paths are appended verbatim"
            );
        }
        let timeout_secs = timeout_secs.unwrap_or(15);
        let http = Client::builder()
            .user_agent(concat!("pouch-books/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let url = self.index_url();
        debug!(%url, "fetching catalog index");

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 512);
            return Err(SyncError::Network(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("GET {url}: reading body: {e}")))?;
        let entries = decode_catalog(&body)?;
        info!(%url, entries = entries.len(), "catalog index fetched");
        Ok(entries)
    }
}
