pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::bus::BusClient;
use crate::reconciler::PgStatusStore;
use handlers::ApiDoc;

/// Shared handler state. The bus client is injected here so the ingestion
/// path can publish decisions without reaching into any global.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bus: BusClient,
    pub status_store: PgStatusStore,
}

impl AppState {
    pub fn new(pool: PgPool, bus: BusClient) -> Self {
        let status_store = PgStatusStore::new(pool.clone());
        Self {
            pool,
            bus,
            status_store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/api/v1/greenhouse",
            post(handlers::create_greenhouse).get(handlers::list_greenhouses),
        )
        .route(
            "/api/v1/greenhouse/{id}",
            get(handlers::get_greenhouse)
                .put(handlers::update_greenhouse)
                .delete(handlers::delete_greenhouse),
        )
        .route(
            "/api/v1/readings/{greenhouse_id}",
            post(handlers::add_reading),
        )
        .route(
            "/api/v1/readings/{greenhouse_id}/all",
            get(handlers::get_all_readings),
        )
        .route(
            "/api/v1/readings/{greenhouse_id}/latest",
            get(handlers::get_latest_reading),
        )
        .route(
            "/api/v1/actuator_status/{greenhouse_id}",
            post(handlers::add_actuator_status),
        )
        .route(
            "/api/v1/actuator_status/{greenhouse_id}/all",
            get(handlers::get_all_actuator_statuses),
        )
        .route(
            "/api/v1/actuator_status/{greenhouse_id}/latest",
            get(handlers::get_latest_actuator_status),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
