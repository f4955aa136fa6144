// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                // Book list for presentation clients
                .route("/books", web::get().to(handlers::list_books))
                .route("/books/sync", web::post().to(handlers::sync_books))
                .route("/books/refresh", web::post().to(handlers::refresh_books))
                .route("/sync/status", web::get().to(handlers::sync_status)),
        );
}
