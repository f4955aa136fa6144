// API server implementation using actix-web

use crate::api::{auth, middleware, routes};
use crate::sync::CatalogSynchronizer;
use crate::util::env;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub api_secret: Option<String>,
    pub allowed_origins: String,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        env::init_env();

        let host = env::env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env::env_parse_strict::<u16>("API_PORT")
            .context("Invalid API_PORT")?
            .unwrap_or(8080);
        let api_secret = env::env_opt("API_SECRET");
        let allowed_origins = env::env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:8081".to_string());

        if api_secret.is_none() {
            tracing::warn!("API_SECRET not set; sync and refresh endpoints are unauthenticated");
        }

        Ok(Self {
            host,
            port,
            api_secret,
            allowed_origins,
        })
    }

    /// Start the HTTP server; returns once it has shut down.
    pub async fn run(self, sync: web::Data<CatalogSynchronizer>) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            catalog_url = %sync.catalog_url(),
            "Starting book catalog API server"
        );

        let api_secret = self.api_secret.clone();
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = auth::Auth::new(api_secret.clone());

            App::new()
                .app_data(sync.clone())
                .wrap(auth)
                .wrap(compress)
                .wrap(cors)
                .wrap(logger)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ApiResponse;
    use crate::database_ops::catalog::{CatalogEntry, CatalogProvider};
    use crate::database_ops::db::Db;
    use crate::database_ops::ebooks::IngestPolicy;
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EmptyCatalog;

    #[async_trait]
    impl CatalogProvider for EmptyCatalog {
        fn base_url(&self) -> &str {
            "https://x/"
        }

        async fn fetch_catalog(&self) -> crate::error::Result<Vec<CatalogEntry>> {
            Ok(Vec::new())
        }
    }

    async fn guarded_app_data() -> web::Data<CatalogSynchronizer> {
        let db = Db::in_memory().await.unwrap();
        web::Data::new(CatalogSynchronizer::new(
            db,
            Arc::new(EmptyCatalog),
            IngestPolicy::Lenient,
        ))
    }

    #[actix_web::test]
    async fn secret_guards_mutations_but_not_reads() {
        let app = test::init_service(
            App::new()
                .app_data(guarded_app_data().await)
                .wrap(auth::Auth::new(Some("s3cret".into())))
                .configure(routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/books").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/api/v1/books/refresh").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ApiResponse<()> = test::read_body_json(resp).await;
        assert!(!body.success);

        let req = test::TestRequest::post()
            .uri("/api/v1/books/refresh")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn blank_secret_disables_auth() {
        let app = test::init_service(
            App::new()
                .app_data(guarded_app_data().await)
                .wrap(auth::Auth::new(Some("  ".into())))
                .configure(routes::configure_routes),
        )
        .await;
        let req = test::TestRequest::post().uri("/api/v1/books/sync").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
