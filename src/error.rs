use thiserror::Error;

/// Failure outcomes of the catalog store, the catalog client and the synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("network: {0}")]
    Network(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("insert of book {id} failed: {reason}")]
    RowInsert { id: i64, reason: String },
    #[error("a catalog synchronize is already in flight")]
    InFlight,
    #[error("config: {0}")]
    Config(String),
}

impl SyncError {
    /// Short machine-readable tag used in logs, status payloads and API errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Storage(_) => "storage",
            SyncError::Network(_) => "network",
            SyncError::Decode(_) => "decode",
            SyncError::RowInsert { .. } => "row_insert",
            SyncError::InFlight => "in_flight",
            SyncError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
