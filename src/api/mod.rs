// HTTP surface over the catalog synchronizer: book list, sync/refresh triggers, status

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
