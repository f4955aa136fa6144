use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database_ops::catalog::{resolve_catalog_url, CatalogEntry};

/// A catalog entry as persisted in the `Ebooks` table and handed to presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredBook {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub rating: i64,
    pub tags: String,
    pub banner_url: String,
    pub thumbnail_url: String,
}

impl StoredBook {
    /// Build the row for the entry found at `position` in a freshly fetched catalog.
    pub fn from_entry(position: usize, entry: &CatalogEntry, base_url: &str) -> Self {
        Self {
            id: position as i64,
            name: entry.name.clone(),
            author: entry.attributes.author.clone(),
            rating: entry.rating.round() as i64,
            tags: entry.tags.clone(),
            banner_url: resolve_catalog_url(base_url, &entry.attributes.banner_path),
            thumbnail_url: resolve_catalog_url(base_url, &entry.attributes.thumbnail_path),
        }
    }
}

/// Map a fetched catalog to rows; ids are zero-based positions in fetch order.
pub fn map_catalog(entries: &[CatalogEntry], base_url: &str) -> Vec<StoredBook> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| StoredBook::from_entry(i, entry, base_url))
        .collect()
}

/// How a failed row insert affects the rest of an ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Log and skip the row; the rest of the catalog is still committed.
    #[default]
    Lenient,
    /// Roll the whole pass back on the first failed row.
    Atomic,
}

impl FromStr for IngestPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" | "skip" => Ok(IngestPolicy::Lenient),
            "atomic" | "strict" | "all-or-nothing" => Ok(IngestPolicy::Atomic),
            other => Err(format!("unknown ingest policy {other:?} (expected lenient|atomic)")),
        }
    }
}

impl fmt::Display for IngestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestPolicy::Lenient => "lenient",
            IngestPolicy::Atomic => "atomic",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub id: i64,
    pub name: String,
    pub reason: String,
}

/// Per-row outcome of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub attempted: usize,
    pub inserted: usize,
    pub failed: Vec<RowFailure>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.inserted == self.attempted
    }
}
