// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::error::SyncError;
use crate::sync::CatalogSynchronizer;
use actix_web::{web, HttpResponse, Result};

/// Map a synchronizer failure onto a status code and error envelope.
pub fn error_response(err: &SyncError) -> HttpResponse {
    let body = ApiResponse::<()>::error_with_code(err.kind(), err.to_string());
    match err {
        SyncError::InFlight => HttpResponse::Conflict().json(body),
        SyncError::Network(_) | SyncError::Decode(_) => HttpResponse::BadGateway().json(body),
        SyncError::Storage(_) | SyncError::RowInsert { .. } | SyncError::Config(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Health check endpoint
pub async fn health_check(sync: web::Data<CatalogSynchronizer>) -> Result<HttpResponse> {
    let db_status = if sync.db().ping().await {
        "connected"
    } else {
        "disconnected"
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Current stored books, no synchronization
pub async fn list_books(sync: web::Data<CatalogSynchronizer>) -> Result<HttpResponse> {
    match sync.books().await {
        Ok(books) => Ok(HttpResponse::Ok().json(ApiResponse::success(BooksResponse::from(books)))),
        Err(err) => {
            tracing::error!(error = %err, "listing books failed");
            Ok(error_response(&err))
        }
    }
}

/// Synchronize without discarding the store (fetches only when empty)
pub async fn sync_books(sync: web::Data<CatalogSynchronizer>) -> Result<HttpResponse> {
    tracing::info!("catalog sync requested");
    match sync.synchronize(false).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(SyncResponse::from(outcome)))),
        Err(err) => Ok(error_response(&err)),
    }
}

/// Pull-to-refresh: discard and re-ingest; rejected while another run is in flight
pub async fn refresh_books(sync: web::Data<CatalogSynchronizer>) -> Result<HttpResponse> {
    tracing::info!("catalog refresh requested");
    match sync.try_refresh().await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(SyncResponse::from(outcome)))),
        Err(err) => {
            if matches!(err, SyncError::InFlight) {
                tracing::info!("refresh rejected; synchronize already running");
            }
            Ok(error_response(&err))
        }
    }
}

/// In-flight flag and the last run summary
pub async fn sync_status(sync: web::Data<CatalogSynchronizer>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(sync.status())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::configure_routes;
    use crate::database_ops::catalog::{decode_catalog, CatalogEntry, CatalogProvider};
    use crate::database_ops::db::Db;
    use crate::database_ops::ebooks::IngestPolicy;
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct StaticCatalog(&'static str);

    #[async_trait]
    impl CatalogProvider for StaticCatalog {
        fn base_url(&self) -> &str {
            "https://x/"
        }

        async fn fetch_catalog(&self) -> crate::error::Result<Vec<CatalogEntry>> {
            decode_catalog(self.0.as_bytes())
        }
    }

    const TWO_BOOKS: &str = r#"[
        {"name":"A","rate":4,"tags":"t","attributes":{"overview_author":"X","images_banner":"a-b.png","images_thumbnail":"a-t.png"}},
        {"name":"B","rate":2,"tags":"u","attributes":{"overview_author":"Y","images_banner":"b-b.png","images_thumbnail":"b-t.png"}}
    ]"#;

    async fn data(body: &'static str) -> web::Data<CatalogSynchronizer> {
        let db = Db::in_memory().await.unwrap();
        web::Data::new(CatalogSynchronizer::new(
            db,
            Arc::new(StaticCatalog(body)),
            IngestPolicy::Lenient,
        ))
    }

    #[actix_web::test]
    async fn health_reports_database() {
        let app = test::init_service(
            App::new()
                .app_data(data(TWO_BOOKS).await)
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["database"], "connected");
    }

    #[actix_web::test]
    async fn sync_then_list_returns_books() {
        let app = test::init_service(
            App::new()
                .app_data(data(TWO_BOOKS).await)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/books").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["count"], 0);

        let req = test::TestRequest::post().uri("/api/v1/books/sync").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["source"]["kind"], "fetched");
        assert_eq!(body["data"]["count"], 2);

        let req = test::TestRequest::get().uri("/api/v1/books").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["books"][1]["thumbnailUrl"], "https://x/b-t.png");
    }

    #[actix_web::test]
    async fn refresh_reports_fetch_and_status_records_it() {
        let app = test::init_service(
            App::new()
                .app_data(data(TWO_BOOKS).await)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/books/refresh")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/v1/sync/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["in_flight"], false);
        assert_eq!(body["data"]["last_run"]["forced"], true);
        assert_eq!(body["data"]["last_run"]["rows"], 2);
    }

    #[actix_web::test]
    async fn bad_catalog_maps_to_bad_gateway() {
        let app = test::init_service(
            App::new()
                .app_data(data("not json").await)
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::post().uri("/api/v1/books/sync").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "decode");
    }

    #[actix_web::test]
    async fn in_flight_maps_to_conflict() {
        let resp = error_response(&SyncError::InFlight);
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
