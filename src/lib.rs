pub mod api;
pub mod database_ops;
pub mod error;
pub mod logging;
pub mod sync;

pub mod util {
    pub mod env;
}

pub use error::{Result, SyncError};
pub use sync::{CatalogSynchronizer, SyncConfig, SyncOutcome, SyncSource};
