use crate::controller::{counter_controller, health_check_controller};
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Live Counter API"
        ),
        paths(
            counter_controller::subscribe,
            counter_controller::publish,
            counter_controller::publish_direct,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                domain::counter::CounterUpdate,
            )
        ),
        tags(
            (name = "live_counter", description = "Dual-mode live counter broadcast API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(counter_routes(app_state))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .fallback_service(static_routes())
}

fn counter_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/counter/{id}", get(counter_controller::subscribe))
        .route("/counter/{id}", post(counter_controller::publish))
        .route(
            "/vanilla/counter/{id}",
            post(counter_controller::publish_direct),
        )
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

// Serves the static browser demo client as a fallback for unmatched paths
pub fn static_routes() -> Router {
    Router::new().fallback_service(ServeDir::new("./public"))
}
